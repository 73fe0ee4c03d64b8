//! Replication feed plumbing
//!
//! Stream identities, the raw records each stream carries, per-stream handles
//! and the `Connection` seam the capture engine drives.

mod gateway;
mod records;
mod stream;
mod types;
mod wire;

pub use gateway::{GatewayConfig, GatewayConnection};
pub use records::{DealRecord, OrderLogRecord, SessionContentsRecord};
pub use stream::{DataStream, StreamSet, StreamStatus};
pub use types::{
    liveness, ConnectionProps, InstrumentKind, LifeNum, Liveness, Revision, StreamCategory,
    StreamDescriptor, StreamNames, Termination, TransportError,
};
pub use wire::{GatewayFrame, GatewayRequest};

use crate::capture::CaptureEvent;
use tokio::sync::mpsc;

/// Handle to an external replication session.
///
/// Calls never block: completions and stream traffic arrive later as
/// `CaptureEvent`s on the sender handed to `open`.
pub trait Connection: Send {
    /// Begin connecting. An `Err` is a synchronous connect failure.
    fn open(
        &mut self,
        props: &ConnectionProps,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<(), TransportError>;

    /// Request a stream, resuming after `resume_from` when given
    fn open_stream(
        &mut self,
        stream: &StreamDescriptor,
        resume_from: Option<Revision>,
    ) -> Result<(), TransportError>;

    /// Tear the session down
    fn close(&mut self);

    /// Death watch that resolves when the session ends
    fn watch(&self) -> Termination;
}
