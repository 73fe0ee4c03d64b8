//! Replication identity types

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

/// The five replication streams a capture session consumes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamCategory {
    /// Futures session contents (instrument reference data)
    FutureSessionContents,
    /// Options session contents (instrument reference data)
    OptionSessionContents,
    /// Full order log
    OrderLog,
    /// Futures deals
    FutureTrade,
    /// Options deals
    OptionTrade,
}

impl StreamCategory {
    /// Every category, in declaration order
    pub const ALL: [StreamCategory; 5] = [
        StreamCategory::FutureSessionContents,
        StreamCategory::OptionSessionContents,
        StreamCategory::OrderLog,
        StreamCategory::FutureTrade,
        StreamCategory::OptionTrade,
    ];

    /// Categories whose records are forwarded downstream
    pub const TRANSACTIONAL: [StreamCategory; 3] = [
        StreamCategory::OrderLog,
        StreamCategory::FutureTrade,
        StreamCategory::OptionTrade,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StreamCategory::FutureSessionContents => "future_session_contents",
            StreamCategory::OptionSessionContents => "option_session_contents",
            StreamCategory::OrderLog => "order_log",
            StreamCategory::FutureTrade => "future_trade",
            StreamCategory::OptionTrade => "option_trade",
        }
    }

    pub fn is_session_contents(&self) -> bool {
        matches!(
            self,
            StreamCategory::FutureSessionContents | StreamCategory::OptionSessionContents
        )
    }

    /// Whether resumption state for this stream lives in the revision store.
    /// Session contents are always rebuilt from a full snapshot.
    pub fn tracks_revision(&self) -> bool {
        !self.is_session_contents()
    }

    /// Instrument kind carried by the stream, if it is specific to one
    pub fn instrument_kind(&self) -> Option<InstrumentKind> {
        match self {
            StreamCategory::FutureSessionContents | StreamCategory::FutureTrade => {
                Some(InstrumentKind::Future)
            }
            StreamCategory::OptionSessionContents | StreamCategory::OptionTrade => {
                Some(InstrumentKind::Option)
            }
            StreamCategory::OrderLog => None,
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for StreamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Futures or options market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    Future,
    Option,
}

impl InstrumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstrumentKind::Future => "future",
            InstrumentKind::Option => "option",
        }
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stream's identity: its category and replication table name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamDescriptor {
    pub category: StreamCategory,
    pub name: String,
}

impl StreamDescriptor {
    pub fn new(category: StreamCategory, name: impl Into<String>) -> Self {
        Self {
            category,
            name: name.into(),
        }
    }
}

/// Replication table names for the captured streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamNames {
    pub future_session_contents: String,
    pub option_session_contents: String,
    pub order_log: String,
    pub future_trade: String,
    pub option_trade: String,
}

impl Default for StreamNames {
    fn default() -> Self {
        Self {
            future_session_contents: "FORTS_FUTINFO_REPL".to_string(),
            option_session_contents: "FORTS_OPTINFO_REPL".to_string(),
            order_log: "FORTS_ORDLOG_REPL".to_string(),
            future_trade: "FORTS_FUTTRADE_REPL".to_string(),
            option_trade: "FORTS_OPTTRADE_REPL".to_string(),
        }
    }
}

impl StreamNames {
    pub fn name(&self, category: StreamCategory) -> &str {
        match category {
            StreamCategory::FutureSessionContents => &self.future_session_contents,
            StreamCategory::OptionSessionContents => &self.option_session_contents,
            StreamCategory::OrderLog => &self.order_log,
            StreamCategory::FutureTrade => &self.future_trade,
            StreamCategory::OptionTrade => &self.option_trade,
        }
    }

    pub fn descriptor(&self, category: StreamCategory) -> StreamDescriptor {
        StreamDescriptor::new(category, self.name(category))
    }
}

/// Exchange-assigned generation counter of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LifeNum(pub u64);

impl fmt::Display for LifeNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-stream sequence cursor, monotonic within one LifeNum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection properties for a replication session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProps {
    pub host: String,
    pub port: u16,
    pub app_name: String,
}

impl ConnectionProps {
    pub fn new(host: impl Into<String>, port: u16, app_name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            app_name: app_name.into(),
        }
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if self.host.trim().is_empty() {
            return Err(TransportError::InvalidProps("host is empty".into()));
        }
        if self.port == 0 {
            return Err(TransportError::InvalidProps("port is zero".into()));
        }
        if self.app_name.trim().is_empty() {
            return Err(TransportError::InvalidProps("application name is empty".into()));
        }
        Ok(())
    }
}

/// Replication transport errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("invalid connection properties: {0}")]
    InvalidProps(String),
    #[error("connection failed: {0}")]
    ConnectFailed(String),
    #[error("connection closed: {0}")]
    Closed(String),
    #[error("not connected")]
    NotConnected,
    #[error("undecodable frame: {0}")]
    Decode(String),
    #[error("frame for unopened stream {0}")]
    UnknownStream(String),
    /// Failure reported by the vendor replication library
    #[error("native failure {code}: {message}")]
    Native { code: i32, message: String },
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Held by whatever keeps a connection alive; dropping it terminates the watch
#[derive(Debug)]
pub struct Liveness(#[allow(dead_code)] watch::Sender<()>);

/// Death watch over a connection
#[derive(Debug, Clone)]
pub struct Termination(watch::Receiver<()>);

/// Create a linked liveness guard and death watch
pub fn liveness() -> (Liveness, Termination) {
    let (tx, rx) = watch::channel(());
    (Liveness(tx), Termination(rx))
}

impl Termination {
    /// Resolves once the paired `Liveness` has been dropped
    pub async fn terminated(&mut self) {
        while self.0.changed().await.is_ok() {}
    }

    pub fn is_terminated(&self) -> bool {
        self.0.has_changed().is_err()
    }
}
