//! Downstream publishing
//!
//! Order-log and trade rows are normalized into [`CapturedEvent`]s and handed
//! to a [`Publisher`]. Publishing never blocks the capture engine. The
//! engine only moves a stream's revision once the publisher acknowledges that
//! the batch reached its sink.

mod events;
mod normalize;
mod parquet;
mod queue;
mod sink;

pub use events::{CapturedEvent, OrderAction, OrderEvent, Side, TradeEvent};
pub use normalize::{normalize_deal, normalize_order, NormalizeError};
pub use self::parquet::{order_schema, trade_schema, ParquetReader, ParquetSink, ParquetWriter, TradeRow};
pub use queue::{PublisherConfig, PublisherStats, QueuePublisher};
pub use sink::EventSink;

use crate::capture::CaptureEvent;
use crate::replication::{Revision, StreamCategory};
use tokio::sync::mpsc;

/// Why a batch could not be handed off
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error("publisher queue is full")]
    QueueFull,
    #[error("publisher queue is closed")]
    Closed,
}

/// Highest revision covered by a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub stream: StreamCategory,
    /// Stream generation the batch was captured under
    pub generation: u64,
    pub revision: Revision,
}

/// One stream's events handed off together
#[derive(Debug, Clone)]
pub struct Batch {
    pub events: Vec<CapturedEvent>,
    pub receipt: Receipt,
    /// Mailbox that receives `CaptureEvent::Persisted` once the events are written
    pub acks: mpsc::Sender<CaptureEvent>,
}

/// Hand-off point for captured events
pub trait Publisher: Send + Sync {
    /// Enqueue a batch without waiting. Events keep their order.
    ///
    /// The receipt is returned on `batch.acks` only after every event of the
    /// batch has been durably written. A batch that is never written is never
    /// acknowledged.
    fn publish(&self, batch: Batch) -> Result<(), PublishError>;
}
