//! Revision store maintenance commands

use crate::config::Config;
use crate::revision::{FileRevisionTracker, RevisionTracker};
use clap::{Args, Subcommand};

#[derive(Args, Debug)]
pub struct RevisionsArgs {
    #[command(subcommand)]
    pub command: RevisionsCommand,
}

#[derive(Subcommand, Debug)]
pub enum RevisionsCommand {
    /// List stored revisions
    Show,
    /// Forget the stored revision of a stream so it restarts from a snapshot
    Reset {
        /// Replication table name, e.g. FORTS_ORDLOG_REPL
        stream: String,
    },
}

impl RevisionsArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let tracker = FileRevisionTracker::load(&config.revisions.path)?;

        match &self.command {
            RevisionsCommand::Show => {
                let table = tracker.snapshot();
                if table.is_empty() {
                    println!("No stored revisions in {}", tracker.path().display());
                    return Ok(());
                }

                println!("Stored revisions ({}):", tracker.path().display());
                for (stream, entry) in table.iter() {
                    println!(
                        "  {:<24} {:<24} {}",
                        stream,
                        entry.category.to_string(),
                        entry.revision
                    );
                }
            }
            RevisionsCommand::Reset { stream } => {
                let known = tracker.snapshot().iter().any(|(name, _)| name == stream);
                if !known {
                    println!("No stored revision for {}", stream);
                    return Ok(());
                }

                tracker.reset(stream)?;
                tracker.flush().await?;
                tracing::info!(stream = %stream, "Stored revision reset");
                println!("Reset stored revision for {}", stream);
            }
        }

        Ok(())
    }
}
