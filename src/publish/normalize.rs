//! Raw replication rows to normalized events

use super::{OrderAction, OrderEvent, Side, TradeEvent};
use crate::replication::{DealRecord, InstrumentKind, OrderLogRecord, SessionContentsRecord};

/// A row whose codes cannot be interpreted
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    #[error("unknown order action code {0}")]
    UnknownAction(i8),
    #[error("unknown order direction code {0}")]
    UnknownSide(i8),
}

impl TryFrom<i8> for OrderAction {
    type Error = NormalizeError;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(OrderAction::Cancel),
            1 => Ok(OrderAction::Add),
            2 => Ok(OrderAction::Fill),
            other => Err(NormalizeError::UnknownAction(other)),
        }
    }
}

impl TryFrom<i8> for Side {
    type Error = NormalizeError;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Side::Buy),
            2 => Ok(Side::Sell),
            other => Err(NormalizeError::UnknownSide(other)),
        }
    }
}

/// Normalize an order-log row, enriched with its instrument when known
pub fn normalize_order(
    record: &OrderLogRecord,
    instrument: Option<(InstrumentKind, &SessionContentsRecord)>,
) -> Result<OrderEvent, NormalizeError> {
    Ok(OrderEvent {
        session_id: record.sess_id,
        isin_id: record.isin_id,
        isin: instrument.map(|(_, contents)| contents.isin.clone()),
        kind: instrument.map(|(kind, _)| kind),
        order_id: record.id_ord,
        action: OrderAction::try_from(record.action)?,
        side: Side::try_from(record.dir)?,
        price: record.price,
        amount: record.amount,
        amount_rest: record.amount_rest,
        deal_id: record.id_deal,
        moment: record.moment,
        revision: record.revision,
    })
}

/// Normalize a deal from a futures or options trade stream
pub fn normalize_deal(
    kind: InstrumentKind,
    record: &DealRecord,
    contents: Option<&SessionContentsRecord>,
) -> TradeEvent {
    TradeEvent {
        kind,
        session_id: record.sess_id,
        isin_id: record.isin_id,
        isin: contents.map(|c| c.isin.clone()),
        deal_id: record.id_deal,
        price: record.price,
        amount: record.amount,
        buy_order_id: record.id_ord_buy,
        sell_order_id: record.id_ord_sell,
        moment: record.moment,
        revision: record.revision,
    }
}
