//! Supervision handle for a running engine

use super::{CaptureEvent, CaptureFault, CaptureStatus, MarketCapture};
use crate::replication::{Connection, ConnectionProps};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Owner's view of a capture engine running on its own task.
///
/// Dropping the handle requests an orderly shutdown.
pub struct CaptureHandle {
    run_id: Uuid,
    events: mpsc::Sender<CaptureEvent>,
    status: watch::Receiver<CaptureStatus>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), CaptureFault>>,
}

/// Run `engine` on a new task
pub fn spawn<C>(engine: MarketCapture<C>) -> CaptureHandle
where
    C: Connection + 'static,
{
    let run_id = engine.run_id();
    let events = engine.sender();
    let status = engine.subscribe();
    let (shutdown, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(engine.run(shutdown_rx));

    CaptureHandle {
        run_id,
        events,
        status,
        shutdown: Some(shutdown),
        task,
    }
}

impl CaptureHandle {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Last state the engine reported
    pub fn status(&self) -> CaptureStatus {
        *self.status.borrow()
    }

    /// Watch of state changes
    pub fn subscribe(&self) -> watch::Receiver<CaptureStatus> {
        self.status.clone()
    }

    /// Wait until the engine reports `target`. Returns false if the engine
    /// ended first.
    pub async fn wait_for(&mut self, target: CaptureStatus) -> bool {
        self.status.wait_for(|status| *status == target).await.is_ok()
    }

    /// Deliver an event to the engine's mailbox
    pub async fn send(&self, event: CaptureEvent) -> Result<(), CaptureFault> {
        self.events
            .send(event)
            .await
            .map_err(|_| CaptureFault::Aborted("capture engine is gone".into()))
    }

    /// Ask the engine to connect
    pub async fn connect(&self, props: ConnectionProps) -> Result<(), CaptureFault> {
        self.send(CaptureEvent::Connect(props)).await
    }

    /// Whether the engine task has ended
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the engine and wait for it. A fault that happened before the
    /// request is still reported.
    pub async fn shutdown(mut self) -> Result<(), CaptureFault> {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.wait().await
    }

    /// Wait for the engine to end. `Ok` only after an orderly shutdown.
    pub async fn wait(&mut self) -> Result<(), CaptureFault> {
        match (&mut self.task).await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(CaptureFault::Aborted("capture task panicked".into())),
            Err(e) => Err(CaptureFault::Aborted(e.to_string())),
        }
    }
}
