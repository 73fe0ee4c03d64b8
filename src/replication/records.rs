//! Raw records carried by the replication streams

use super::Revision;
use crate::repository::Keyed;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One instrument as published in a session-contents snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContentsRecord {
    /// Numeric instrument id
    pub isin_id: i32,
    /// Instrument code, e.g. "RTS-6.12"
    pub isin: String,
    #[serde(default)]
    pub short_isin: String,
    /// Human readable name
    #[serde(default)]
    pub name: String,
    pub sess_id: i32,
    /// Contract-type bit flags
    #[serde(default)]
    pub signs: i64,
    /// Trading state flag
    #[serde(default)]
    pub state: i32,
}

impl Keyed for SessionContentsRecord {
    type Key = i32;

    fn key(&self) -> i32 {
        self.isin_id
    }
}

/// One order-log row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLogRecord {
    pub revision: Revision,
    pub sess_id: i32,
    pub isin_id: i32,
    pub id_ord: i64,
    pub moment: DateTime<Utc>,
    pub price: Decimal,
    pub amount: i64,
    #[serde(default)]
    pub amount_rest: i64,
    /// 0 = removed, 1 = added, 2 = matched
    pub action: i8,
    /// 1 = buy, 2 = sell
    pub dir: i8,
    #[serde(default)]
    pub id_deal: Option<i64>,
}

/// One deal row from a trade stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRecord {
    pub revision: Revision,
    pub sess_id: i32,
    pub isin_id: i32,
    pub id_deal: i64,
    pub moment: DateTime<Utc>,
    pub price: Decimal,
    pub amount: i64,
    pub id_ord_buy: i64,
    pub id_ord_sell: i64,
}
