//! Queue publisher with a dedicated writer task
//!
//! `publish` only enqueues, so the capture engine never waits on I/O. The
//! writer task buffers events and flushes them to the sink when the buffer
//! fills or the flush interval passes. Each batch's receipt goes back to the
//! engine only after a successful write.

use super::{Batch, CapturedEvent, EventSink, PublishError, Publisher, Receipt};
use crate::capture::CaptureEvent;
use crate::telemetry;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

/// Configuration for the publisher queue and writer
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Queued batches before `publish` reports the queue full
    pub queue_capacity: usize,
    /// Buffered events before a flush
    pub buffer_size: usize,
    /// Maximum time between flushes
    pub flush_interval: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            buffer_size: 1000,
            flush_interval: Duration::from_secs(5),
        }
    }
}

/// Publishing statistics
#[derive(Debug, Default, Clone)]
pub struct PublisherStats {
    pub events_received: u64,
    pub events_written: u64,
    pub flushes: u64,
    pub flush_failures: u64,
    pub last_flush: Option<DateTime<Utc>>,
}

/// Non-blocking publisher backed by a bounded queue
pub struct QueuePublisher {
    tx: mpsc::Sender<Batch>,
    stats: Arc<RwLock<PublisherStats>>,
}

type PendingAck = (Receipt, mpsc::Sender<CaptureEvent>);

impl QueuePublisher {
    /// Start the writer task for `sink`. The task ends once every publisher
    /// handle is dropped and the queue is drained, or when the sink fails.
    pub fn spawn<S>(sink: S, config: PublisherConfig) -> (Self, JoinHandle<()>)
    where
        S: EventSink + 'static,
    {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let stats = Arc::new(RwLock::new(PublisherStats::default()));

        let writer_stats = stats.clone();
        let writer = tokio::spawn(async move {
            Self::run_writer(rx, sink, config, writer_stats).await;
        });

        (Self { tx, stats }, writer)
    }

    /// Get current statistics
    pub async fn stats(&self) -> PublisherStats {
        self.stats.read().await.clone()
    }

    async fn run_writer<S: EventSink>(
        mut rx: mpsc::Receiver<Batch>,
        mut sink: S,
        config: PublisherConfig,
        stats: Arc<RwLock<PublisherStats>>,
    ) {
        let mut buffer: Vec<CapturedEvent> = Vec::with_capacity(config.buffer_size);
        let mut pending: Vec<PendingAck> = Vec::new();
        let mut last_flush = tokio::time::Instant::now();

        loop {
            tokio::select! {
                result = rx.recv() => {
                    match result {
                        Some(batch) => {
                            {
                                let mut s = stats.write().await;
                                s.events_received += batch.events.len() as u64;
                            }
                            buffer.extend(batch.events);
                            pending.push((batch.receipt, batch.acks));

                            if buffer.len() >= config.buffer_size {
                                if !Self::flush(&mut buffer, &mut pending, &mut sink, &stats).await {
                                    return;
                                }
                                last_flush = tokio::time::Instant::now();
                            }
                        }
                        None => {
                            if !buffer.is_empty()
                                && !Self::flush(&mut buffer, &mut pending, &mut sink, &stats).await
                            {
                                return;
                            }
                            if let Err(e) = sink.close().await {
                                tracing::error!(error = %e, "Failed to close event sink");
                            }
                            tracing::info!("Publisher writer shutting down");
                            break;
                        }
                    }
                }

                _ = tokio::time::sleep_until(last_flush + config.flush_interval) => {
                    if !buffer.is_empty()
                        && !Self::flush(&mut buffer, &mut pending, &mut sink, &stats).await
                    {
                        return;
                    }
                    last_flush = tokio::time::Instant::now();
                }
            }
        }
    }

    /// Flush the buffer to the sink and acknowledge the batches it held.
    /// Returns false if the sink failed, in which case nothing is
    /// acknowledged, the writer stops and the queue closes behind it.
    async fn flush<S: EventSink>(
        buffer: &mut Vec<CapturedEvent>,
        pending: &mut Vec<PendingAck>,
        sink: &mut S,
        stats: &Arc<RwLock<PublisherStats>>,
    ) -> bool {
        let count = buffer.len();

        match sink.write(buffer).await {
            Ok(()) => {
                {
                    let mut s = stats.write().await;
                    s.events_written += count as u64;
                    s.flushes += 1;
                    s.last_flush = Some(Utc::now());
                }
                telemetry::record_events_written(count);
                tracing::debug!(count, "Flushed captured events");
                buffer.clear();
                Self::acknowledge(pending).await;
                true
            }
            Err(e) => {
                stats.write().await.flush_failures += 1;
                telemetry::record_flush_failure();
                tracing::error!(error = %e, count, "Failed to write captured events, stopping publisher");
                false
            }
        }
    }

    /// Send one receipt per stream generation carrying its highest revision
    async fn acknowledge(pending: &mut Vec<PendingAck>) {
        let mut latest: Vec<PendingAck> = Vec::new();
        for (receipt, acks) in pending.drain(..) {
            match latest
                .iter_mut()
                .find(|(r, _)| r.stream == receipt.stream && r.generation == receipt.generation)
            {
                Some((r, _)) => r.revision = r.revision.max(receipt.revision),
                None => latest.push((receipt, acks)),
            }
        }

        for (receipt, acks) in latest {
            if acks.send(CaptureEvent::Persisted(receipt)).await.is_err() {
                tracing::debug!(
                    category = %receipt.stream,
                    revision = %receipt.revision,
                    "Capture engine gone, receipt dropped"
                );
            }
        }
    }
}

impl Publisher for QueuePublisher {
    fn publish(&self, batch: Batch) -> Result<(), PublishError> {
        if batch.events.is_empty() {
            return Ok(());
        }
        self.tx.try_send(batch).map_err(|e| match e {
            TrySendError::Full(_) => PublishError::QueueFull,
            TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}
