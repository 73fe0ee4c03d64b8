//! Capture command implementation

use crate::capture::{self, MarketCapture};
use crate::config::Config;
use crate::publish::{ParquetSink, QueuePublisher};
use crate::replication::{GatewayConfig, GatewayConnection};
use crate::revision::FileRevisionTracker;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Output directory for captured data (overrides config)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Gateway host (overrides config)
    #[arg(long)]
    pub host: Option<String>,

    /// Gateway port (overrides config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Connect to the gateway over TLS
    #[arg(long)]
    pub tls: bool,
}

impl CaptureArgs {
    /// Run one engine until Ctrl-C or its first fault. A fault is returned
    /// as an error so the process exits non-zero and can be restarted.
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let mut props = config.connection.clone();
        if let Some(host) = &self.host {
            props.host = host.clone();
        }
        if let Some(port) = self.port {
            props.port = port;
        }

        let tracker = Arc::new(FileRevisionTracker::load(&config.revisions.path)?);
        let flusher =
            tracker.spawn_flusher(Duration::from_millis(config.revisions.flush_interval_ms));

        let output_dir = self
            .output
            .clone()
            .unwrap_or_else(|| config.publisher.output_dir.clone());
        let (publisher, writer) =
            QueuePublisher::spawn(ParquetSink::new(output_dir.clone()), config.publisher_config());
        let publisher = Arc::new(publisher);

        let gateway = GatewayConnection::new(GatewayConfig {
            scheme: if self.tls { "wss" } else { "ws" }.to_string(),
            ..GatewayConfig::default()
        }
        .ping_interval(Duration::from_secs(config.capture.ping_interval_secs)));

        let engine = MarketCapture::new(
            gateway,
            tracker.clone(),
            publisher.clone(),
            config.capture_settings(),
        );
        let mut handle = capture::spawn(engine);

        tracing::info!(
            run_id = %handle.run_id(),
            host = %props.host,
            port = props.port,
            output = ?output_dir,
            "Starting market capture"
        );
        handle.connect(props).await?;

        let finished = tokio::select! {
            result = handle.wait() => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };
        let result = match finished {
            Some(result) => result,
            None => {
                tracing::info!("Received Ctrl-C, shutting down");
                handle.shutdown().await
            }
        };

        // The engine is gone, so this is the last publisher handle
        drop(publisher);
        if let Err(e) = writer.await {
            tracing::error!(error = %e, "Publisher writer task failed");
        }

        flusher.abort();
        tracker.flush().await?;

        match result {
            Ok(()) => {
                tracing::info!("Market capture stopped");
                Ok(())
            }
            Err(fault) => {
                tracing::error!(kind = fault.kind(), error = %fault, "Market capture terminated");
                Err(fault.into())
            }
        }
    }
}
