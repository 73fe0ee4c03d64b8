//! Prometheus metrics

use crate::capture::CaptureStatus;
use crate::replication::StreamCategory;
use metrics::{counter, gauge};

/// Session-contents records merged from snapshots
pub fn record_snapshot(stream: StreamCategory, records: usize) {
    counter!("capture_snapshot_records_total", "stream" => stream.as_str()).increment(records as u64);
}

/// Records forwarded to the publisher
pub fn record_forwarded(stream: StreamCategory, records: usize) {
    counter!("capture_records_forwarded_total", "stream" => stream.as_str())
        .increment(records as u64);
}

/// Stream generation changes
pub fn record_life_num_change(stream: StreamCategory) {
    counter!("capture_life_num_changes_total", "stream" => stream.as_str()).increment(1);
}

/// Terminal engine faults by class
pub fn record_fault(kind: &'static str) {
    counter!("capture_faults_total", "kind" => kind).increment(1);
}

/// Current engine state
pub fn set_state(status: CaptureStatus) {
    gauge!("capture_state").set(status.gauge_value());
}

/// Events persisted by the publisher's sink
pub fn record_events_written(count: usize) {
    counter!("publisher_events_written_total").increment(count as u64);
}

/// Failed sink writes
pub fn record_flush_failure() {
    counter!("publisher_flush_failures_total").increment(1);
}
