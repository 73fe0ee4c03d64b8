//! Market capture engine
//!
//! A state machine that connects to the replication feed, builds the
//! session reference data from the two session-contents streams and then
//! republishes the order-log and trade streams downstream.

mod engine;
mod event;
mod handle;
mod state;

pub use engine::{CaptureSettings, MarketCapture};
pub use event::{CaptureEvent, CaptureFault};
pub use handle::{spawn, CaptureHandle};
pub use state::{CaptureState, CaptureStatus, ContentsRepository, MarketContents, PendingContents};
