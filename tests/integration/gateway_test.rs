//! End-to-end tests against a loopback replication gateway

use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use market_capture::capture::{
    self, CaptureEvent, CaptureFault, CaptureSettings, CaptureStatus, MarketCapture,
};
use market_capture::publish::{Batch, CapturedEvent, PublishError, Publisher};
use market_capture::replication::{
    ConnectionProps, DealRecord, GatewayConnection, GatewayFrame, GatewayRequest, InstrumentKind,
    OrderLogRecord, Revision, SessionContentsRecord, StreamCategory, TransportError,
};
use market_capture::revision::{MemoryRevisionTracker, RevisionTracker};
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};

/// Keeps events in memory and acknowledges every batch at once
#[derive(Default)]
struct RecordingPublisher {
    events: Mutex<Vec<CapturedEvent>>,
}

impl Publisher for RecordingPublisher {
    fn publish(&self, batch: Batch) -> Result<(), PublishError> {
        self.events.lock().unwrap().extend(batch.events);
        let _ = batch.acks.try_send(CaptureEvent::Persisted(batch.receipt));
        Ok(())
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

/// Frames the gateway answers an `open` request with
fn replies(stream: &str) -> Vec<GatewayFrame> {
    let opened = GatewayFrame::Opened {
        stream: stream.to_string(),
    };
    match stream {
        "FORTS_FUTINFO_REPL" => vec![
            opened,
            GatewayFrame::Snapshot {
                stream: stream.to_string(),
                records: vec![contents(166911, "GMKR-6.12")],
            },
        ],
        "FORTS_OPTINFO_REPL" => vec![
            opened,
            GatewayFrame::Snapshot {
                stream: stream.to_string(),
                records: vec![contents(160734, "RTS-6.12M150612PA 175000")],
            },
        ],
        "FORTS_ORDLOG_REPL" => vec![
            opened,
            GatewayFrame::LifeNum {
                stream: stream.to_string(),
                life_num: 12,
            },
            GatewayFrame::Orders {
                stream: stream.to_string(),
                records: vec![OrderLogRecord {
                    revision: Revision(101),
                    sess_id: 4021,
                    isin_id: 166911,
                    id_ord: 9001,
                    moment: Utc::now(),
                    price: dec!(17510),
                    amount: 3,
                    amount_rest: 3,
                    action: 1,
                    dir: 1,
                    id_deal: None,
                }],
            },
        ],
        "FORTS_FUTTRADE_REPL" => vec![
            opened,
            GatewayFrame::Deals {
                stream: stream.to_string(),
                records: vec![DealRecord {
                    revision: Revision(7),
                    sess_id: 4021,
                    isin_id: 166911,
                    id_deal: 555,
                    moment: Utc::now(),
                    price: dec!(17505),
                    amount: 1,
                    id_ord_buy: 9001,
                    id_ord_sell: 9002,
                }],
            },
        ],
        _ => vec![opened],
    }
}

/// Loopback gateway replaying `replies` for every stream it is asked to open
async fn spawn_gateway() -> (u16, mpsc::UnboundedReceiver<GatewayRequest>, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (requests_tx, requests_rx) = mpsc::unbounded_channel();

    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();

        while let Some(Ok(msg)) = ws.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            let request = GatewayRequest::decode(&text).unwrap();
            let _ = requests_tx.send(request.clone());

            if let GatewayRequest::Open { stream, .. } = request {
                for frame in replies(&stream) {
                    let text = frame.encode().unwrap();
                    if ws.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
            }
        }
    });

    (port, requests_rx, server)
}

fn props(port: u16) -> ConnectionProps {
    ConnectionProps::new("127.0.0.1", port, "capture")
}

#[tokio::test]
async fn test_full_capture_through_gateway() {
    let (port, mut requests, server) = spawn_gateway().await;

    let tracker = Arc::new(MemoryRevisionTracker::new());
    tracker
        .update(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL", Revision(100))
        .unwrap();
    let publisher = Arc::new(RecordingPublisher::default());

    let engine = MarketCapture::new(
        GatewayConnection::default(),
        tracker.clone(),
        publisher.clone(),
        CaptureSettings::default(),
    );
    let mut handle = capture::spawn(engine);

    handle.connect(props(port)).await.unwrap();
    assert!(handle.wait_for(CaptureStatus::Capturing).await);

    for _ in 0..200 {
        let order_log = tracker.revision(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL");
        let future_trade = tracker.revision(StreamCategory::FutureTrade, "FORTS_FUTTRADE_REPL");
        if order_log == Some(Revision(101)) && future_trade.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    {
        let events = publisher.events.lock().unwrap();
        assert_eq!(events.len(), 2);

        let order = events
            .iter()
            .find_map(|e| match e {
                CapturedEvent::Order(order) => Some(order),
                _ => None,
            })
            .unwrap();
        assert_eq!(order.isin.as_deref(), Some("GMKR-6.12"));
        assert_eq!(order.kind, Some(InstrumentKind::Future));
        assert_eq!(order.order_id, 9001);

        let trade = events
            .iter()
            .find_map(|e| match e {
                CapturedEvent::Trade(trade) => Some(trade),
                _ => None,
            })
            .unwrap();
        assert_eq!(trade.kind, InstrumentKind::Future);
        assert_eq!(trade.deal_id, 555);
    }

    // The life number change cleared 100 before revision 101 was stored
    assert_eq!(
        tracker.revision(StreamCategory::OrderLog, "FORTS_ORDLOG_REPL"),
        Some(Revision(101))
    );
    assert_eq!(
        tracker.revision(StreamCategory::FutureTrade, "FORTS_FUTTRADE_REPL"),
        Some(Revision(7))
    );

    assert!(handle.shutdown().await.is_ok());
    server.await.unwrap();

    let mut opens = Vec::new();
    let mut closes = 0;
    while let Ok(request) = requests.try_recv() {
        match request {
            GatewayRequest::Open { stream, revision } => opens.push((stream, revision)),
            GatewayRequest::Close { .. } => closes += 1,
        }
    }
    assert_eq!(opens.len(), 5);
    assert_eq!(closes, 5);
    assert_eq!(opens[0], ("FORTS_FUTINFO_REPL".to_string(), None));
    assert!(opens.contains(&("FORTS_ORDLOG_REPL".to_string(), Some(Revision(100)))));
    assert!(opens.contains(&("FORTS_OPTTRADE_REPL".to_string(), None)));
}

#[tokio::test]
async fn test_gateway_close_is_transport_fault() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        let _ = ws.close(None).await;
    });

    let engine = MarketCapture::new(
        GatewayConnection::default(),
        Arc::new(MemoryRevisionTracker::new()),
        Arc::new(RecordingPublisher::default()),
        CaptureSettings::default(),
    );
    let mut handle = capture::spawn(engine);
    handle.connect(props(port)).await.unwrap();

    let fault = handle.wait().await.unwrap_err();
    assert!(matches!(fault, CaptureFault::Transport(_)), "got {:?}", fault);
}

#[tokio::test]
async fn test_native_error_frame_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let mut ws = accept_async(tcp).await.unwrap();
        // Fail the first open request
        let _ = ws.next().await;
        let frame = GatewayFrame::Error {
            code: -2,
            message: "replication state corrupt".into(),
        };
        let _ = ws.send(Message::Text(frame.encode().unwrap())).await;
        while ws.next().await.is_some() {}
    });

    let engine = MarketCapture::new(
        GatewayConnection::default(),
        Arc::new(MemoryRevisionTracker::new()),
        Arc::new(RecordingPublisher::default()),
        CaptureSettings::default(),
    );
    let mut handle = capture::spawn(engine);
    handle.connect(props(port)).await.unwrap();

    let fault = handle.wait().await.unwrap_err();
    assert!(matches!(
        fault,
        CaptureFault::Transport(TransportError::Native { code: -2, .. })
    ));
}

#[tokio::test]
async fn test_unreachable_gateway_is_fatal() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let engine = MarketCapture::new(
        GatewayConnection::default(),
        Arc::new(MemoryRevisionTracker::new()),
        Arc::new(RecordingPublisher::default()),
        CaptureSettings::default(),
    );
    let mut handle = capture::spawn(engine);
    handle.connect(props(port)).await.unwrap();

    let fault = handle.wait().await.unwrap_err();
    assert!(matches!(
        fault,
        CaptureFault::Transport(TransportError::ConnectFailed(_))
    ));
}

#[tokio::test]
async fn test_invalid_props_fail_synchronously() {
    let engine = MarketCapture::new(
        GatewayConnection::default(),
        Arc::new(MemoryRevisionTracker::new()),
        Arc::new(RecordingPublisher::default()),
        CaptureSettings::default(),
    );
    let mut handle = capture::spawn(engine);
    handle
        .connect(ConnectionProps::new("", 4001, "capture"))
        .await
        .unwrap();

    let fault = handle.wait().await.unwrap_err();
    assert!(matches!(
        fault,
        CaptureFault::Transport(TransportError::InvalidProps(_))
    ));
}
