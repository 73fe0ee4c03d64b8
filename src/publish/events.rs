//! Normalized events handed to the downstream queue

use crate::replication::{InstrumentKind, Revision};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order-log action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    /// Order removed from the book
    Cancel,
    /// Order added to the book
    Add,
    /// Order (partially) matched
    Fill,
}

impl OrderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderAction::Cancel => "cancel",
            OrderAction::Add => "add",
            OrderAction::Fill => "fill",
        }
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized order-log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub session_id: i32,
    pub isin_id: i32,
    /// Instrument code, when the instrument is in the session contents
    pub isin: Option<String>,
    pub kind: Option<InstrumentKind>,
    pub order_id: i64,
    pub action: OrderAction,
    pub side: Side,
    pub price: Decimal,
    pub amount: i64,
    pub amount_rest: i64,
    pub deal_id: Option<i64>,
    /// Exchange timestamp
    pub moment: DateTime<Utc>,
    pub revision: Revision,
}

/// Normalized deal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    pub kind: InstrumentKind,
    pub session_id: i32,
    pub isin_id: i32,
    pub isin: Option<String>,
    pub deal_id: i64,
    pub price: Decimal,
    pub amount: i64,
    pub buy_order_id: i64,
    pub sell_order_id: i64,
    pub moment: DateTime<Utc>,
    pub revision: Revision,
}

/// Event published downstream while capturing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CapturedEvent {
    Order(OrderEvent),
    Trade(TradeEvent),
}

impl CapturedEvent {
    pub fn revision(&self) -> Revision {
        match self {
            CapturedEvent::Order(order) => order.revision,
            CapturedEvent::Trade(trade) => trade.revision,
        }
    }
}
