//! WebSocket replication gateway connection
//!
//! One socket carries every stream of a session. Frames are demultiplexed to
//! stream categories by replication table name and delivered to the capture
//! engine's mailbox. The session never reconnects: any socket failure is
//! reported once and the session task ends.

use super::wire::{GatewayFrame, GatewayRequest};
use super::{
    liveness, Connection, ConnectionProps, LifeNum, Liveness, Revision, StreamCategory,
    StreamDescriptor, Termination, TransportError,
};
use crate::capture::CaptureEvent;
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Gateway connection configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// URL scheme, `ws` or `wss`
    pub scheme: String,
    /// Interval for sending ping frames
    pub ping_interval: Duration,
    /// Capacity of the outbound request queue
    pub request_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            scheme: "ws".to_string(),
            ping_interval: Duration::from_secs(30),
            request_buffer: 64,
        }
    }
}

impl GatewayConfig {
    /// Set ping interval
    pub fn ping_interval(mut self, d: Duration) -> Self {
        self.ping_interval = d;
        self
    }
}

enum Command {
    Open {
        descriptor: StreamDescriptor,
        resume_from: Option<Revision>,
    },
    Close,
}

/// Replication session over a WebSocket gateway
pub struct GatewayConnection {
    config: GatewayConfig,
    commands: Option<mpsc::Sender<Command>>,
    liveness: Option<Liveness>,
    termination: Termination,
}

impl GatewayConnection {
    pub fn new(config: GatewayConfig) -> Self {
        let (guard, termination) = liveness();
        Self {
            config,
            commands: None,
            liveness: Some(guard),
            termination,
        }
    }

    /// Gateway URL for the given session properties
    pub fn url(&self, props: &ConnectionProps) -> String {
        format!(
            "{}://{}:{}/{}",
            self.config.scheme, props.host, props.port, props.app_name
        )
    }
}

impl Default for GatewayConnection {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}

impl Connection for GatewayConnection {
    fn open(
        &mut self,
        props: &ConnectionProps,
        events: mpsc::Sender<CaptureEvent>,
    ) -> Result<(), TransportError> {
        props.validate()?;
        if self.commands.is_some() {
            return Err(TransportError::ConnectFailed("session already open".into()));
        }
        let guard = self
            .liveness
            .take()
            .ok_or_else(|| TransportError::ConnectFailed("session already closed".into()))?;

        let (tx, rx) = mpsc::channel(self.config.request_buffer);
        let url = self.url(props);
        let ping_interval = self.config.ping_interval;

        tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = run_session(&url, ping_interval, &events, rx).await {
                tracing::error!(error = %e, url = %url, "Replication session failed");
                let _ = events.send(CaptureEvent::TransportFault(e)).await;
            }
        });

        self.commands = Some(tx);
        Ok(())
    }

    fn open_stream(
        &mut self,
        stream: &StreamDescriptor,
        resume_from: Option<Revision>,
    ) -> Result<(), TransportError> {
        let commands = self.commands.as_ref().ok_or(TransportError::NotConnected)?;
        commands
            .try_send(Command::Open {
                descriptor: stream.clone(),
                resume_from,
            })
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn close(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.try_send(Command::Close);
        }
        self.liveness.take();
    }

    fn watch(&self) -> Termination {
        self.termination.clone()
    }
}

/// Maps replication table names to the streams opened on this session
#[derive(Debug, Default)]
struct StreamRegistry {
    streams: HashMap<String, StreamCategory>,
}

impl StreamRegistry {
    fn register(&mut self, descriptor: StreamDescriptor) {
        self.streams.insert(descriptor.name, descriptor.category);
    }

    fn names(&self) -> impl Iterator<Item = &str> {
        self.streams.keys().map(String::as_str)
    }

    fn category(&self, name: &str) -> Result<StreamCategory, TransportError> {
        self.streams
            .get(name)
            .copied()
            .ok_or_else(|| TransportError::UnknownStream(name.to_string()))
    }

    /// Translate a text frame into an engine event
    fn decode(&self, text: &str) -> Result<CaptureEvent, TransportError> {
        let event = match GatewayFrame::decode(text)? {
            GatewayFrame::Opened { stream } => CaptureEvent::StreamOnline {
                stream: self.category(&stream)?,
            },
            GatewayFrame::LifeNum { stream, life_num } => CaptureEvent::LifeNumChanged {
                stream: self.category(&stream)?,
                life_num: LifeNum(life_num),
            },
            GatewayFrame::Snapshot { stream, records } => CaptureEvent::Snapshot {
                stream: self.category(&stream)?,
                records,
            },
            GatewayFrame::Orders { stream, records } => CaptureEvent::Orders {
                stream: self.category(&stream)?,
                records,
            },
            GatewayFrame::Deals { stream, records } => CaptureEvent::Deals {
                stream: self.category(&stream)?,
                records,
            },
            GatewayFrame::Error { code, message } => {
                return Err(TransportError::Native { code, message })
            }
        };
        Ok(event)
    }
}

/// Connect and pump frames until the socket fails or a close is requested
async fn run_session(
    url: &str,
    ping_interval: Duration,
    events: &mpsc::Sender<CaptureEvent>,
    mut commands: mpsc::Receiver<Command>,
) -> Result<(), TransportError> {
    tracing::info!(url = %url, "Connecting to replication gateway");

    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

    let (mut write, mut read) = ws_stream.split();

    tracing::info!("Replication gateway connected");

    if events.send(CaptureEvent::ConnectionEstablished).await.is_err() {
        return Ok(());
    }

    let mut registry = StreamRegistry::default();

    let mut ping = tokio::time::interval(ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping.tick().await;
    let mut waiting_for_pong = false;

    loop {
        tokio::select! {
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let event = registry.decode(&text)?;
                        if events.send(event).await.is_err() {
                            tracing::debug!("Capture engine gone, closing session");
                            return Ok(());
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        return Err(TransportError::Decode("unexpected binary frame".into()));
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await
                            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        waiting_for_pong = false;
                    }
                    Some(Ok(Message::Close(_))) => {
                        return Err(TransportError::Closed("gateway sent close frame".into()));
                    }
                    Some(Err(e)) => {
                        return Err(TransportError::Closed(e.to_string()));
                    }
                    None => {
                        return Err(TransportError::Closed("stream ended unexpectedly".into()));
                    }
                    _ => {}
                }
            }

            command = commands.recv() => {
                match command {
                    Some(Command::Open { descriptor, resume_from }) => {
                        let request = GatewayRequest::open(&descriptor, resume_from).encode()?;
                        tracing::info!(
                            stream = %descriptor.name,
                            category = %descriptor.category,
                            revision = ?resume_from,
                            "Opening replication stream"
                        );
                        registry.register(descriptor);
                        write.send(Message::Text(request)).await
                            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                    }
                    Some(Command::Close) | None => {
                        for stream in registry.names() {
                            let request = GatewayRequest::Close { stream: stream.to_string() };
                            if let Ok(text) = request.encode() {
                                let _ = write.send(Message::Text(text)).await;
                            }
                        }
                        let _ = write.send(Message::Close(None)).await;
                        tracing::info!("Replication session closed");
                        return Ok(());
                    }
                }
            }

            _ = ping.tick() => {
                if waiting_for_pong {
                    return Err(TransportError::Closed("pong timeout".into()));
                }
                write.send(Message::Ping(vec![])).await
                    .map_err(|e| TransportError::SendFailed(e.to_string()))?;
                waiting_for_pong = true;
            }
        }
    }
}
