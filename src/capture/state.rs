//! Capture lifecycle states and the data each one carries

use crate::replication::{InstrumentKind, SessionContentsRecord};
use crate::repository::{MergeSummary, Repository};
use serde::Serialize;
use std::fmt;
use tokio::time::Instant;

/// Session contents keyed by numeric instrument id
pub type ContentsRepository = Repository<i32, SessionContentsRecord>;

/// Lifecycle phase of a capture engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    Idle,
    Connecting,
    InitializingMarketContents,
    Capturing,
}

impl CaptureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CaptureStatus::Idle => "idle",
            CaptureStatus::Connecting => "connecting",
            CaptureStatus::InitializingMarketContents => "initializing_market_contents",
            CaptureStatus::Capturing => "capturing",
        }
    }

    /// Value reported on the state gauge
    pub fn gauge_value(&self) -> f64 {
        match self {
            CaptureStatus::Idle => 0.0,
            CaptureStatus::Connecting => 1.0,
            CaptureStatus::InitializingMarketContents => 2.0,
            CaptureStatus::Capturing => 3.0,
        }
    }
}

impl fmt::Display for CaptureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contents received while waiting for both session snapshots
#[derive(Debug)]
pub struct PendingContents {
    futures: Option<ContentsRepository>,
    options: Option<ContentsRepository>,
    deadline: Instant,
}

impl PendingContents {
    pub fn new(deadline: Instant) -> Self {
        Self {
            futures: None,
            options: None,
            deadline,
        }
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Merge a snapshot batch. An empty batch still marks the kind as seen.
    pub fn merge(&mut self, kind: InstrumentKind, records: Vec<SessionContentsRecord>) -> MergeSummary {
        let slot = match kind {
            InstrumentKind::Future => &mut self.futures,
            InstrumentKind::Option => &mut self.options,
        };
        slot.get_or_insert_with(ContentsRepository::new).merge(records)
    }

    /// Repository for `kind`, once its first snapshot has arrived
    pub fn repository(&self, kind: InstrumentKind) -> Option<&ContentsRepository> {
        match kind {
            InstrumentKind::Future => self.futures.as_ref(),
            InstrumentKind::Option => self.options.as_ref(),
        }
    }

    /// Both repositories once each has seen a snapshot, otherwise `self`
    pub fn complete(self) -> Result<MarketContents, Self> {
        match self {
            PendingContents {
                futures: Some(futures),
                options: Some(options),
                ..
            } => Ok(MarketContents { futures, options }),
            pending => Err(pending),
        }
    }
}

/// Fully initialized session reference data
#[derive(Debug, Clone, Default)]
pub struct MarketContents {
    futures: ContentsRepository,
    options: ContentsRepository,
}

impl MarketContents {
    pub fn repository(&self, kind: InstrumentKind) -> &ContentsRepository {
        match kind {
            InstrumentKind::Future => &self.futures,
            InstrumentKind::Option => &self.options,
        }
    }

    pub fn merge(&mut self, kind: InstrumentKind, records: Vec<SessionContentsRecord>) -> MergeSummary {
        match kind {
            InstrumentKind::Future => self.futures.merge(records),
            InstrumentKind::Option => self.options.merge(records),
        }
    }

    /// Find an instrument in either market
    pub fn instrument(&self, isin_id: i32) -> Option<(InstrumentKind, &SessionContentsRecord)> {
        self.futures
            .get(&isin_id)
            .map(|record| (InstrumentKind::Future, record))
            .or_else(|| {
                self.options
                    .get(&isin_id)
                    .map(|record| (InstrumentKind::Option, record))
            })
    }
}

/// Engine state with per-state data
#[derive(Debug)]
pub enum CaptureState {
    Idle,
    Connecting,
    InitializingMarketContents(PendingContents),
    Capturing(MarketContents),
}

impl CaptureState {
    pub fn status(&self) -> CaptureStatus {
        match self {
            CaptureState::Idle => CaptureStatus::Idle,
            CaptureState::Connecting => CaptureStatus::Connecting,
            CaptureState::InitializingMarketContents(_) => CaptureStatus::InitializingMarketContents,
            CaptureState::Capturing(_) => CaptureStatus::Capturing,
        }
    }

    /// When the current state times out, if it can
    pub fn deadline(&self) -> Option<Instant> {
        match self {
            CaptureState::InitializingMarketContents(pending) => Some(pending.deadline()),
            _ => None,
        }
    }
}
