//! Integration tests for the capture engine running under its handle

use async_trait::async_trait;
use chrono::Utc;
use market_capture::capture::{
    self, CaptureEvent, CaptureFault, CaptureHandle, CaptureSettings, CaptureStatus,
    MarketCapture,
};
use market_capture::publish::{
    Batch, CapturedEvent, EventSink, PublishError, Publisher, PublisherConfig, QueuePublisher,
};
use market_capture::replication::{
    liveness, Connection, ConnectionProps, LifeNum, Liveness, OrderLogRecord, Revision,
    SessionContentsRecord, StreamCategory, StreamDescriptor, Termination, TransportError,
};
use market_capture::revision::{MemoryRevisionTracker, RevisionTracker};
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Connection double whose session "connects" immediately
struct MockConnection {
    streams: Arc<Mutex<Vec<StreamDescriptor>>>,
    closed: Arc<Mutex<bool>>,
    session: Arc<Mutex<Option<Liveness>>>,
    termination: Termination,
    fail_open: bool,
}

struct MockControl {
    streams: Arc<Mutex<Vec<StreamDescriptor>>>,
    closed: Arc<Mutex<bool>>,
    session: Arc<Mutex<Option<Liveness>>>,
}

impl MockControl {
    /// Simulate the session dying underneath the engine
    fn kill_session(&self) {
        self.session.lock().unwrap().take();
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock().unwrap()
    }

    fn opened(&self) -> Vec<StreamCategory> {
        self.streams.lock().unwrap().iter().map(|d| d.category).collect()
    }
}

fn mock_connection(fail_open: bool) -> (MockConnection, MockControl) {
    let (guard, termination) = liveness();
    let streams = Arc::new(Mutex::new(Vec::new()));
    let closed = Arc::new(Mutex::new(false));
    let session = Arc::new(Mutex::new(Some(guard)));

    let connection = MockConnection {
        streams: streams.clone(),
        closed: closed.clone(),
        session: session.clone(),
        termination,
        fail_open,
    };
    let control = MockControl {
        streams,
        closed,
        session,
    };
    (connection, control)
}

impl Connection for MockConnection {
    fn open(
        &mut self,
        _props: &ConnectionProps,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<(), TransportError> {
        if self.fail_open {
            return Err(TransportError::ConnectFailed("connection refused".into()));
        }
        events
            .try_send(CaptureEvent::ConnectionEstablished)
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn open_stream(
        &mut self,
        stream: &StreamDescriptor,
        _resume_from: Option<Revision>,
    ) -> Result<(), TransportError> {
        self.streams.lock().unwrap().push(stream.clone());
        Ok(())
    }

    fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
        self.session.lock().unwrap().take();
    }

    fn watch(&self) -> Termination {
        self.termination.clone()
    }
}

/// Discards events and acknowledges them at once
struct InstantPublisher;

impl Publisher for InstantPublisher {
    fn publish(&self, batch: Batch) -> Result<(), PublishError> {
        let _ = batch.acks.try_send(CaptureEvent::Persisted(batch.receipt));
        Ok(())
    }
}

struct FailingSink;

#[async_trait]
impl EventSink for FailingSink {
    async fn write(&mut self, _events: &[CapturedEvent]) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

#[derive(Clone, Default)]
struct CountingSink {
    written: Arc<Mutex<usize>>,
}

#[async_trait]
impl EventSink for CountingSink {
    async fn write(&mut self, events: &[CapturedEvent]) -> anyhow::Result<()> {
        *self.written.lock().unwrap() += events.len();
        Ok(())
    }
}

fn props() -> ConnectionProps {
    ConnectionProps::new("127.0.0.1", 4001, "capture")
}

fn settings() -> CaptureSettings {
    CaptureSettings {
        init_timeout: Duration::from_secs(5),
        ..CaptureSettings::default()
    }
}

fn contents(isin_id: i32, isin: &str) -> SessionContentsRecord {
    SessionContentsRecord {
        isin_id,
        isin: isin.to_string(),
        short_isin: String::new(),
        name: isin.to_string(),
        sess_id: 4021,
        signs: 0,
        state: 1,
    }
}

fn order(revision: u64) -> OrderLogRecord {
    OrderLogRecord {
        revision: Revision(revision),
        sess_id: 4021,
        isin_id: 166911,
        id_ord: revision as i64,
        moment: Utc::now(),
        price: dec!(17510),
        amount: 1,
        amount_rest: 1,
        action: 1,
        dir: 2,
        id_deal: None,
    }
}

fn start(fail_open: bool) -> (CaptureHandle, MockControl, Arc<MemoryRevisionTracker>) {
    let (connection, control) = mock_connection(fail_open);
    let tracker = Arc::new(MemoryRevisionTracker::new());
    let engine = MarketCapture::new(connection, tracker.clone(), Arc::new(InstantPublisher), settings());
    (capture::spawn(engine), control, tracker)
}

/// Connect and wait until the engine asks for session contents
async fn initialize(handle: &mut CaptureHandle) {
    handle.connect(props()).await.unwrap();
    assert!(handle.wait_for(CaptureStatus::InitializingMarketContents).await);
}

async fn send_snapshots(handle: &CaptureHandle) {
    handle
        .send(CaptureEvent::Snapshot {
            stream: StreamCategory::FutureSessionContents,
            records: vec![contents(166911, "GMKR-6.12")],
        })
        .await
        .unwrap();
    handle
        .send(CaptureEvent::Snapshot {
            stream: StreamCategory::OptionSessionContents,
            records: vec![contents(160734, "RTS-6.12M150612PA 175000")],
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_reaches_capturing_and_shuts_down() {
    let (mut handle, control, _tracker) = start(false);
    assert_eq!(handle.status(), CaptureStatus::Idle);

    initialize(&mut handle).await;

    send_snapshots(&handle).await;
    assert!(handle.wait_for(CaptureStatus::Capturing).await);
    assert_eq!(control.opened().len(), 5);

    assert!(handle.shutdown().await.is_ok());
    assert!(control.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_initialization_timeout_is_fatal() {
    let (mut handle, control, _tracker) = start(false);

    initialize(&mut handle).await;
    handle
        .send(CaptureEvent::Snapshot {
            stream: StreamCategory::FutureSessionContents,
            records: vec![contents(166911, "GMKR-6.12")],
        })
        .await
        .unwrap();

    let fault = handle.wait().await.unwrap_err();
    assert!(matches!(fault, CaptureFault::InitializationTimeout(_)));
    assert!(control.is_closed());
}

#[tokio::test(start_paused = true)]
async fn test_no_timeout_once_capturing() {
    let (mut handle, _control, _tracker) = start(false);

    initialize(&mut handle).await;
    send_snapshots(&handle).await;
    assert!(handle.wait_for(CaptureStatus::Capturing).await);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(!handle.is_finished());
    assert_eq!(handle.status(), CaptureStatus::Capturing);
    assert!(handle.shutdown().await.is_ok());
}

#[tokio::test]
async fn test_connection_termination_is_fatal() {
    let (mut handle, control, _tracker) = start(false);

    initialize(&mut handle).await;

    control.kill_session();

    let fault = handle.wait().await.unwrap_err();
    assert!(matches!(fault, CaptureFault::ConnectionTerminated));
    assert_eq!(fault.kind(), "dependency");
}

#[tokio::test]
async fn test_connect_failure_terminates_without_retry() {
    let (mut handle, control, _tracker) = start(true);

    handle.connect(props()).await.unwrap();

    let fault = handle.wait().await.unwrap_err();
    assert!(matches!(
        fault,
        CaptureFault::Transport(TransportError::ConnectFailed(_))
    ));
    assert!(control.opened().is_empty());
}

#[tokio::test]
async fn test_unexpected_message_terminates_watchers() {
    let (mut handle, _control, _tracker) = start(false);
    let mut status = handle.subscribe();

    handle
        .send(CaptureEvent::Orders {
            stream: StreamCategory::OrderLog,
            records: vec![order(1)],
        })
        .await
        .unwrap();

    // The watch closes when the engine dies
    assert!(status.changed().await.is_err());

    let fault = handle.wait().await.unwrap_err();
    assert!(matches!(
        fault,
        CaptureFault::UnexpectedEvent {
            state: CaptureStatus::Idle,
            ..
        }
    ));
}

#[tokio::test]
async fn test_dropping_handle_stops_engine() {
    let (handle, control, _tracker) = start(false);
    handle.connect(props()).await.unwrap();
    drop(handle);

    for _ in 0..100 {
        if control.is_closed() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(control.is_closed());
}

#[tokio::test]
async fn test_life_num_change_resets_revision_while_running() {
    let (mut handle, _control, tracker) = start(false);
    tracker
        .update(StreamCategory::FutureTrade, "FORTS_FUTTRADE_REPL", Revision(50))
        .unwrap();
    tracker
        .update(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL", Revision(60))
        .unwrap();

    initialize(&mut handle).await;
    send_snapshots(&handle).await;
    assert!(handle.wait_for(CaptureStatus::Capturing).await);

    handle
        .send(CaptureEvent::LifeNumChanged {
            stream: StreamCategory::FutureTrade,
            life_num: LifeNum(9),
        })
        .await
        .unwrap();
    handle
        .send(CaptureEvent::Orders {
            stream: StreamCategory::OrderLog,
            records: vec![order(61), order(62)],
        })
        .await
        .unwrap();

    // Shutdown takes priority over queued events, so let the engine drain first
    for _ in 0..100 {
        if tracker.revision(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL") == Some(Revision(62)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        tracker.revision(StreamCategory::FutureTrade, "FORTS_FUTTRADE_REPL"),
        None
    );
    assert_eq!(
        tracker.revision(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL"),
        Some(Revision(62))
    );
    assert!(handle.shutdown().await.is_ok());
}

#[tokio::test]
async fn test_sink_failure_fails_engine_and_keeps_revision() {
    let (connection, _control) = mock_connection(false);
    let (publisher, writer) = QueuePublisher::spawn(
        FailingSink,
        PublisherConfig {
            queue_capacity: 16,
            buffer_size: 1,
            flush_interval: Duration::from_secs(60),
        },
    );
    let tracker = Arc::new(MemoryRevisionTracker::new());
    tracker
        .update(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL", Revision(499))
        .unwrap();
    let engine = MarketCapture::new(connection, tracker.clone(), Arc::new(publisher), settings());
    let mut handle = capture::spawn(engine);

    initialize(&mut handle).await;
    send_snapshots(&handle).await;
    assert!(handle.wait_for(CaptureStatus::Capturing).await);

    handle
        .send(CaptureEvent::Orders {
            stream: StreamCategory::OrderLog,
            records: vec![order(500)],
        })
        .await
        .unwrap();
    writer.await.unwrap();

    // The writer is gone, so the next hand-off fails
    let _ = handle
        .send(CaptureEvent::Orders {
            stream: StreamCategory::OrderLog,
            records: vec![order(501)],
        })
        .await;

    let fault = handle.wait().await.unwrap_err();
    assert!(matches!(fault, CaptureFault::Publish(PublishError::Closed)));
    assert_eq!(
        tracker.revision(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL"),
        Some(Revision(499))
    );
}

#[tokio::test]
async fn test_revision_advances_only_after_sink_write() {
    let (connection, _control) = mock_connection(false);
    let sink = CountingSink::default();
    let written = sink.written.clone();
    let (publisher, writer) = QueuePublisher::spawn(
        sink,
        PublisherConfig {
            queue_capacity: 16,
            buffer_size: 2,
            flush_interval: Duration::from_secs(60),
        },
    );
    let tracker = Arc::new(MemoryRevisionTracker::new());
    let engine = MarketCapture::new(connection, tracker.clone(), Arc::new(publisher), settings());
    let mut handle = capture::spawn(engine);

    initialize(&mut handle).await;
    send_snapshots(&handle).await;
    assert!(handle.wait_for(CaptureStatus::Capturing).await);

    handle
        .send(CaptureEvent::Orders {
            stream: StreamCategory::OrderLog,
            records: vec![order(500)],
        })
        .await
        .unwrap();

    // One event sits in the writer's buffer, below the flush threshold
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(*written.lock().unwrap(), 0);
    assert_eq!(tracker.revision(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL"), None);

    handle
        .send(CaptureEvent::Orders {
            stream: StreamCategory::OrderLog,
            records: vec![order(501)],
        })
        .await
        .unwrap();

    for _ in 0..100 {
        if tracker.revision(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL") == Some(Revision(501)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(*written.lock().unwrap(), 2);
    assert_eq!(
        tracker.revision(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL"),
        Some(Revision(501))
    );

    assert!(handle.shutdown().await.is_ok());
    writer.await.unwrap();
}
