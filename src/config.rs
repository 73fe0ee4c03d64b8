//! Configuration types for market-capture

use crate::capture::CaptureSettings;
use crate::publish::PublisherConfig;
use crate::replication::{ConnectionProps, StreamNames};
use crate::telemetry::LogFormat;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub connection: ConnectionProps,
    #[serde(default)]
    pub streams: StreamNames,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub revisions: RevisionConfig,
    #[serde(default)]
    pub publisher: PublishConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Capture engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Window for both session-contents snapshots to arrive (seconds)
    #[serde(default = "default_init_timeout_secs")]
    pub init_timeout_secs: u64,

    /// Engine mailbox capacity
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Gateway ping interval (seconds)
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
}

fn default_init_timeout_secs() -> u64 {
    30
}
fn default_mailbox_capacity() -> usize {
    1024
}
fn default_ping_interval_secs() -> u64 {
    30
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            init_timeout_secs: 30,
            mailbox_capacity: 1024,
            ping_interval_secs: 30,
        }
    }
}

/// Revision store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionConfig {
    /// JSON file holding the last processed revision per stream
    #[serde(default = "default_revisions_path")]
    pub path: PathBuf,

    /// Coalescing delay before a changed table is written (milliseconds)
    #[serde(default = "default_revision_flush_ms")]
    pub flush_interval_ms: u64,
}

fn default_revisions_path() -> PathBuf {
    PathBuf::from("./state/revisions.json")
}
fn default_revision_flush_ms() -> u64 {
    500
}

impl Default for RevisionConfig {
    fn default() -> Self {
        Self {
            path: default_revisions_path(),
            flush_interval_ms: 500,
        }
    }
}

/// Downstream publisher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Directory receiving Parquet files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Batches queued before the publisher reports itself full
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Events buffered before a flush
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Maximum time between flushes (seconds)
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./data")
}
fn default_queue_capacity() -> usize {
    1024
}
fn default_buffer_size() -> usize {
    1000
}
fn default_flush_interval_secs() -> u64 {
    5
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            queue_capacity: 1024,
            buffer_size: 1000,
            flush_interval_secs: 5,
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Prometheus endpoint port; no endpoint when unset
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Engine settings derived from this configuration
    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            streams: self.streams.clone(),
            init_timeout: Duration::from_secs(self.capture.init_timeout_secs),
            mailbox_capacity: self.capture.mailbox_capacity,
        }
    }

    /// Publisher queue settings derived from this configuration
    pub fn publisher_config(&self) -> PublisherConfig {
        PublisherConfig {
            queue_capacity: self.publisher.queue_capacity,
            buffer_size: self.publisher.buffer_size,
            flush_interval: Duration::from_secs(self.publisher.flush_interval_secs),
        }
    }
}
