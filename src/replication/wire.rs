//! Replication gateway frames
//!
//! Inbound frames are JSON objects tagged by `type`; outbound requests are
//! tagged by `op`.

use super::{DealRecord, OrderLogRecord, Revision, SessionContentsRecord, StreamDescriptor, TransportError};
use serde::{Deserialize, Serialize};

/// Frame received from the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayFrame {
    /// Stream is open and replicating online
    Opened { stream: String },
    /// Stream moved to a new generation
    LifeNum { stream: String, life_num: u64 },
    /// Batch of session-contents records
    Snapshot {
        stream: String,
        records: Vec<SessionContentsRecord>,
    },
    /// Batch of order-log rows
    Orders {
        stream: String,
        records: Vec<OrderLogRecord>,
    },
    /// Batch of deals
    Deals {
        stream: String,
        records: Vec<DealRecord>,
    },
    /// Failure raised by the vendor library behind the gateway
    Error { code: i32, message: String },
}

impl GatewayFrame {
    pub fn decode(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub fn encode(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

/// Request sent to the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GatewayRequest {
    /// Open a stream, resuming after `revision` when given
    Open {
        stream: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        revision: Option<Revision>,
    },
    Close { stream: String },
}

impl GatewayRequest {
    pub fn open(stream: &StreamDescriptor, resume_from: Option<Revision>) -> Self {
        GatewayRequest::Open {
            stream: stream.name.clone(),
            revision: resume_from,
        }
    }

    pub fn encode(&self) -> Result<String, TransportError> {
        serde_json::to_string(self).map_err(|e| TransportError::Decode(e.to_string()))
    }

    pub fn decode(text: &str) -> Result<Self, TransportError> {
        serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))
    }
}
