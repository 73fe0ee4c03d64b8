//! Downstream event sinks

use super::CapturedEvent;
use async_trait::async_trait;

/// Destination the publisher's writer task flushes batches into
#[async_trait]
pub trait EventSink: Send {
    /// Persist a batch. An error stops the writer.
    async fn write(&mut self, events: &[CapturedEvent]) -> anyhow::Result<()>;

    /// Release resources once the queue has drained
    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}
