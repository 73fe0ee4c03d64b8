//! Engine mailbox messages and terminal faults

use super::CaptureStatus;
use crate::publish::{NormalizeError, PublishError, Receipt};
use crate::replication::{
    ConnectionProps, DealRecord, LifeNum, OrderLogRecord, SessionContentsRecord, StreamCategory,
    TransportError,
};
use crate::revision::RevisionError;
use std::time::Duration;

/// Message delivered to the capture engine's mailbox
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// Start connecting with the given session properties
    Connect(ConnectionProps),
    /// The connection is usable
    ConnectionEstablished,
    /// The connection failed or was lost
    TransportFault(TransportError),
    /// A requested stream is open on the gateway
    StreamOnline { stream: StreamCategory },
    /// The exchange started a new generation of a stream
    LifeNumChanged {
        stream: StreamCategory,
        life_num: LifeNum,
    },
    /// Full or partial session-contents batch
    Snapshot {
        stream: StreamCategory,
        records: Vec<SessionContentsRecord>,
    },
    /// Order-log rows
    Orders {
        stream: StreamCategory,
        records: Vec<OrderLogRecord>,
    },
    /// Deal rows from a trade stream
    Deals {
        stream: StreamCategory,
        records: Vec<DealRecord>,
    },
    /// The publisher durably wrote a forwarded batch
    Persisted(Receipt),
    /// The initialization window elapsed
    StateTimeout,
}

impl CaptureEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureEvent::Connect(_) => "connect",
            CaptureEvent::ConnectionEstablished => "connection_established",
            CaptureEvent::TransportFault(_) => "transport_fault",
            CaptureEvent::StreamOnline { .. } => "stream_online",
            CaptureEvent::LifeNumChanged { .. } => "life_num_changed",
            CaptureEvent::Snapshot { .. } => "snapshot",
            CaptureEvent::Orders { .. } => "orders",
            CaptureEvent::Deals { .. } => "deals",
            CaptureEvent::Persisted(_) => "persisted",
            CaptureEvent::StateTimeout => "state_timeout",
        }
    }
}

/// Condition that terminated a capture engine
#[derive(Debug, thiserror::Error)]
pub enum CaptureFault {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("unexpected {event} event in state {state}")]
    UnexpectedEvent {
        state: CaptureStatus,
        event: &'static str,
    },

    #[error("{event} event for stream {stream} which was never opened")]
    StreamNotOpen {
        stream: StreamCategory,
        event: &'static str,
    },

    #[error("{event} event cannot arrive on stream {stream}")]
    WrongStream {
        stream: StreamCategory,
        event: &'static str,
    },

    #[error("malformed record on stream {stream}: {source}")]
    MalformedRecord {
        stream: StreamCategory,
        #[source]
        source: NormalizeError,
    },

    #[error("market contents not initialized within {0:?}")]
    InitializationTimeout(Duration),

    #[error("replication connection terminated")]
    ConnectionTerminated,

    #[error("publisher failure: {0}")]
    Publish(#[from] PublishError),

    #[error("revision store failure: {0}")]
    Revision(#[from] RevisionError),

    #[error("capture task aborted: {0}")]
    Aborted(String),
}

impl CaptureFault {
    /// Fault class used for logging and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CaptureFault::Transport(_) => "transport",
            CaptureFault::UnexpectedEvent { .. }
            | CaptureFault::StreamNotOpen { .. }
            | CaptureFault::WrongStream { .. }
            | CaptureFault::MalformedRecord { .. } => "protocol",
            CaptureFault::InitializationTimeout(_) => "timeout",
            CaptureFault::ConnectionTerminated => "dependency",
            CaptureFault::Publish(_) | CaptureFault::Revision(_) => "infrastructure",
            CaptureFault::Aborted(_) => "aborted",
        }
    }
}
