//! CLI interface for market-capture
//!
//! Provides subcommands for:
//! - `capture`: Run the capture engine
//! - `revisions`: Inspect or reset stored stream revisions
//! - `config`: Show effective configuration

mod capture;
mod revisions;

pub use capture::CaptureArgs;
pub use revisions::{RevisionsArgs, RevisionsCommand};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "market-capture")]
#[command(about = "Capture engine for derivatives replication feeds")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the capture engine until Ctrl-C or a fatal fault
    Capture(CaptureArgs),
    /// Inspect or reset stored stream revisions
    Revisions(RevisionsArgs),
    /// Show effective configuration
    Config,
}
