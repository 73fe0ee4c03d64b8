//! Market capture state machine
//!
//! One engine owns one replication connection and its five stream handles.
//! Every input, including connection callbacks and the initialization
//! timeout, arrives through a single mailbox and is handled to completion
//! before the next one is taken. Any fault ends the engine: there is no
//! recovery inside the state machine, a supervisor restarts a fresh one.

use super::{
    CaptureEvent, CaptureFault, CaptureState, CaptureStatus, ContentsRepository, MarketContents,
    PendingContents,
};
use crate::publish::{normalize_deal, normalize_order, Batch, CapturedEvent, Publisher, Receipt};
use crate::replication::{
    Connection, DealRecord, InstrumentKind, LifeNum, OrderLogRecord, StreamCategory, StreamNames,
    StreamSet,
};
use crate::revision::{revision_key, RevisionTracker};
use crate::telemetry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Engine tuning
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    /// Replication table names of the five streams
    pub streams: StreamNames,
    /// Window for both session-contents snapshots to arrive
    pub init_timeout: Duration,
    /// Mailbox capacity
    pub mailbox_capacity: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            streams: StreamNames::default(),
            init_timeout: Duration::from_secs(30),
            mailbox_capacity: 1024,
        }
    }
}

/// The capture engine
pub struct MarketCapture<C: Connection> {
    run_id: Uuid,
    settings: CaptureSettings,
    connection: C,
    streams: StreamSet,
    tracker: Arc<dyn RevisionTracker>,
    publisher: Arc<dyn Publisher>,
    state: CaptureState,
    sender: mpsc::Sender<CaptureEvent>,
    mailbox: mpsc::Receiver<CaptureEvent>,
    status: watch::Sender<CaptureStatus>,
}

impl<C: Connection> MarketCapture<C> {
    pub fn new(
        connection: C,
        tracker: Arc<dyn RevisionTracker>,
        publisher: Arc<dyn Publisher>,
        settings: CaptureSettings,
    ) -> Self {
        let (sender, mailbox) = mpsc::channel(settings.mailbox_capacity.max(1));
        let (status, _) = watch::channel(CaptureStatus::Idle);

        Self {
            run_id: Uuid::new_v4(),
            streams: StreamSet::new(&settings.streams),
            settings,
            connection,
            tracker,
            publisher,
            state: CaptureState::Idle,
            sender,
            mailbox,
            status,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn status(&self) -> CaptureStatus {
        self.state.status()
    }

    /// Sender for the engine's mailbox
    pub fn sender(&self) -> mpsc::Sender<CaptureEvent> {
        self.sender.clone()
    }

    /// Watch of state changes
    pub fn subscribe(&self) -> watch::Receiver<CaptureStatus> {
        self.status.subscribe()
    }

    pub fn streams(&self) -> &StreamSet {
        &self.streams
    }

    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Session contents for `kind`, once a snapshot for it has arrived
    pub fn contents(&self, kind: InstrumentKind) -> Option<&ContentsRepository> {
        match &self.state {
            CaptureState::InitializingMarketContents(pending) => pending.repository(kind),
            CaptureState::Capturing(contents) => Some(contents.repository(kind)),
            _ => None,
        }
    }

    /// Process one event. After an `Err` the engine is unusable and must be
    /// dropped.
    pub fn handle(&mut self, event: CaptureEvent) -> Result<(), CaptureFault> {
        tracing::trace!(event = event.kind(), state = %self.state.status(), "Handling capture event");

        let state = std::mem::replace(&mut self.state, CaptureState::Idle);
        let next = self.transition(state, event)?;
        self.set_state(next);
        Ok(())
    }

    fn transition(
        &mut self,
        state: CaptureState,
        event: CaptureEvent,
    ) -> Result<CaptureState, CaptureFault> {
        match (state, event) {
            (_, CaptureEvent::TransportFault(e)) => Err(CaptureFault::Transport(e)),

            (state, CaptureEvent::LifeNumChanged { stream, life_num }) => {
                self.on_life_num(stream, life_num)?;
                Ok(state)
            }

            (state, CaptureEvent::StreamOnline { stream }) => {
                self.ensure_open(stream, "stream_online")?;
                self.streams.get_mut(stream).mark_online();
                tracing::info!(stream = %self.streams.get(stream).name(), category = %stream, "Stream online");
                Ok(state)
            }

            (CaptureState::Idle, CaptureEvent::Connect(props)) => {
                tracing::info!(
                    host = %props.host,
                    port = props.port,
                    app_name = %props.app_name,
                    "Connecting to replication feed"
                );
                self.connection.open(&props, self.sender.clone())?;
                Ok(CaptureState::Connecting)
            }

            (CaptureState::Connecting, CaptureEvent::ConnectionEstablished) => {
                self.open_stream(StreamCategory::FutureSessionContents)?;
                self.open_stream(StreamCategory::OptionSessionContents)?;
                let deadline = Instant::now() + self.settings.init_timeout;
                Ok(CaptureState::InitializingMarketContents(PendingContents::new(deadline)))
            }

            (
                CaptureState::InitializingMarketContents(mut pending),
                CaptureEvent::Snapshot { stream, records },
            ) => {
                let kind = self.contents_kind(stream)?;
                let summary = pending.merge(kind, records);
                telemetry::record_snapshot(stream, summary.total());
                tracing::info!(
                    category = %stream,
                    inserted = summary.inserted,
                    replaced = summary.replaced,
                    "Merged session contents snapshot"
                );

                match pending.complete() {
                    Ok(contents) => {
                        tracing::info!(
                            futures = contents.repository(InstrumentKind::Future).len(),
                            options = contents.repository(InstrumentKind::Option).len(),
                            "Market contents initialized"
                        );
                        for category in StreamCategory::TRANSACTIONAL {
                            self.open_stream(category)?;
                        }
                        Ok(CaptureState::Capturing(contents))
                    }
                    Err(pending) => Ok(CaptureState::InitializingMarketContents(pending)),
                }
            }

            (CaptureState::InitializingMarketContents(_), CaptureEvent::StateTimeout) => {
                Err(CaptureFault::InitializationTimeout(self.settings.init_timeout))
            }

            (CaptureState::Capturing(mut contents), CaptureEvent::Snapshot { stream, records }) => {
                let kind = self.contents_kind(stream)?;
                let summary = contents.merge(kind, records);
                telemetry::record_snapshot(stream, summary.total());
                tracing::debug!(
                    category = %stream,
                    inserted = summary.inserted,
                    replaced = summary.replaced,
                    "Merged session contents update"
                );
                Ok(CaptureState::Capturing(contents))
            }

            (CaptureState::Capturing(contents), CaptureEvent::Orders { stream, records }) => {
                let events = self.normalize_orders(&contents, stream, &records)?;
                self.forward(stream, events)?;
                Ok(CaptureState::Capturing(contents))
            }

            (CaptureState::Capturing(contents), CaptureEvent::Deals { stream, records }) => {
                let events = self.normalize_deals(&contents, stream, &records)?;
                self.forward(stream, events)?;
                Ok(CaptureState::Capturing(contents))
            }

            (CaptureState::Capturing(contents), CaptureEvent::Persisted(receipt)) => {
                self.confirm(receipt)?;
                Ok(CaptureState::Capturing(contents))
            }

            (state, event) => Err(CaptureFault::UnexpectedEvent {
                state: state.status(),
                event: event.kind(),
            }),
        }
    }

    fn set_state(&mut self, next: CaptureState) {
        let from = self.state.status();
        let to = next.status();
        self.state = next;

        if from != to {
            tracing::info!(from = %from, to = %to, "Capture state changed");
            telemetry::set_state(to);
            self.status.send_replace(to);
        }
    }

    fn ensure_open(&self, stream: StreamCategory, event: &'static str) -> Result<(), CaptureFault> {
        if self.streams.get(stream).exists() {
            Ok(())
        } else {
            Err(CaptureFault::StreamNotOpen { stream, event })
        }
    }

    /// Request a stream, resuming transactional streams from their stored
    /// revision
    fn open_stream(&mut self, category: StreamCategory) -> Result<(), CaptureFault> {
        let descriptor = self.streams.get(category).descriptor().clone();
        let resume_from = if category.tracks_revision() {
            self.tracker.revision(category, revision_key(&descriptor))
        } else {
            None
        };

        self.connection.open_stream(&descriptor, resume_from)?;
        self.streams.get_mut(category).mark_opening();

        tracing::info!(
            stream = %descriptor.name,
            category = %category,
            resume_from = ?resume_from,
            "Requested replication stream"
        );
        Ok(())
    }

    fn on_life_num(&mut self, stream: StreamCategory, life_num: LifeNum) -> Result<(), CaptureFault> {
        self.ensure_open(stream, "life_num_changed")?;

        let handle = self.streams.get_mut(stream);
        let previous = handle.observe_life_num(life_num);
        telemetry::record_life_num_change(stream);

        if stream.tracks_revision() {
            self.tracker.reset(revision_key(handle.descriptor()))?;
            tracing::info!(
                stream = %handle.name(),
                life_num = %life_num,
                previous = ?previous,
                "Stream generation changed, stored revision reset"
            );
        } else {
            tracing::info!(
                stream = %handle.name(),
                life_num = %life_num,
                previous = ?previous,
                "Session contents generation changed"
            );
        }
        Ok(())
    }

    fn contents_kind(&self, stream: StreamCategory) -> Result<InstrumentKind, CaptureFault> {
        match stream.instrument_kind() {
            Some(kind) if stream.is_session_contents() => {
                self.ensure_open(stream, "snapshot")?;
                Ok(kind)
            }
            _ => Err(CaptureFault::WrongStream {
                stream,
                event: "snapshot",
            }),
        }
    }

    fn normalize_orders(
        &self,
        contents: &MarketContents,
        stream: StreamCategory,
        records: &[OrderLogRecord],
    ) -> Result<Vec<CapturedEvent>, CaptureFault> {
        if stream != StreamCategory::OrderLog {
            return Err(CaptureFault::WrongStream {
                stream,
                event: "orders",
            });
        }
        self.ensure_open(stream, "orders")?;

        records
            .iter()
            .map(|record| {
                normalize_order(record, contents.instrument(record.isin_id))
                    .map(CapturedEvent::Order)
                    .map_err(|source| CaptureFault::MalformedRecord { stream, source })
            })
            .collect()
    }

    fn normalize_deals(
        &self,
        contents: &MarketContents,
        stream: StreamCategory,
        records: &[DealRecord],
    ) -> Result<Vec<CapturedEvent>, CaptureFault> {
        let kind = match stream {
            StreamCategory::FutureTrade => InstrumentKind::Future,
            StreamCategory::OptionTrade => InstrumentKind::Option,
            _ => {
                return Err(CaptureFault::WrongStream {
                    stream,
                    event: "deals",
                })
            }
        };
        self.ensure_open(stream, "deals")?;

        let repository = contents.repository(kind);
        Ok(records
            .iter()
            .map(|record| {
                CapturedEvent::Trade(normalize_deal(kind, record, repository.get(&record.isin_id)))
            })
            .collect())
    }

    /// Hand a batch to the publisher. The stream's revision moves only when
    /// the publisher returns the batch's receipt.
    fn forward(&mut self, stream: StreamCategory, events: Vec<CapturedEvent>) -> Result<(), CaptureFault> {
        let Some(last) = events.iter().map(CapturedEvent::revision).max() else {
            return Ok(());
        };
        let count = events.len();
        let receipt = Receipt {
            stream,
            generation: self.streams.get(stream).generation(),
            revision: last,
        };

        self.publisher.publish(Batch {
            events,
            receipt,
            acks: self.sender.clone(),
        })?;
        telemetry::record_forwarded(stream, count);

        tracing::debug!(category = %stream, count, revision = %last, "Forwarded records");
        Ok(())
    }

    /// Advance the stored revision for a batch the publisher has written
    fn confirm(&mut self, receipt: Receipt) -> Result<(), CaptureFault> {
        let handle = self.streams.get(receipt.stream);
        if receipt.generation != handle.generation() {
            tracing::debug!(
                stream = %handle.name(),
                revision = %receipt.revision,
                "Ignoring receipt from an earlier stream generation"
            );
            return Ok(());
        }

        self.tracker
            .update(receipt.stream, revision_key(handle.descriptor()), receipt.revision)?;
        tracing::debug!(stream = %handle.name(), revision = %receipt.revision, "Revision persisted");
        Ok(())
    }

    /// Run until shutdown or the first fault.
    ///
    /// Shutdown is requested by sending on, or dropping, the sender side of
    /// `shutdown`. A fault is returned after the connection is closed.
    pub async fn run(mut self, mut shutdown: oneshot::Receiver<()>) -> Result<(), CaptureFault> {
        let span = tracing::info_span!("capture", run_id = %self.run_id);

        async move {
            tracing::info!("Capture engine started");
            telemetry::set_state(self.state.status());
            let mut termination = self.connection.watch();

            loop {
                let deadline = self.state.deadline();

                let result = tokio::select! {
                    biased;

                    _ = &mut shutdown => {
                        self.stop();
                        return Ok(());
                    }

                    _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        self.handle(CaptureEvent::StateTimeout)
                    }

                    event = self.mailbox.recv() => match event {
                        Some(event) => self.handle(event),
                        None => Err(CaptureFault::Aborted("mailbox closed".into())),
                    },

                    _ = termination.terminated() => Err(CaptureFault::ConnectionTerminated),
                };

                if let Err(fault) = result {
                    return Err(self.fail(fault));
                }
            }
        }
        .instrument(span)
        .await
    }

    fn fail(&mut self, fault: CaptureFault) -> CaptureFault {
        let state = *self.status.borrow();
        tracing::error!(
            state = %state,
            kind = fault.kind(),
            error = %fault,
            "Capture engine failed"
        );
        telemetry::record_fault(fault.kind());
        self.connection.close();
        self.streams.close_all();
        fault
    }

    fn stop(&mut self) {
        let open = self.streams.close_all();
        self.connection.close();
        tracing::info!(state = %self.state.status(), streams = open, "Capture engine stopped");
    }
}
