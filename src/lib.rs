//! market-capture: capture engine for derivatives replication feeds
//!
//! This library provides the core components for:
//! - Connecting to a replication gateway and demultiplexing its streams
//! - Building session reference data from snapshot batches
//! - Tracking per-stream resumption revisions across generations
//! - Republishing order-log and trade records downstream
//! - Data capture to Parquet
//! - Logging and Prometheus metrics

pub mod capture;
pub mod cli;
pub mod config;
pub mod publish;
pub mod replication;
pub mod repository;
pub mod revision;
pub mod telemetry;
