//! Event-driven refresh orchestration
//!
//! At most one refresh runs at a time. `refresh()` while one is pending is a
//! no-op; `data_changed()` cancels the pending one and starts over, and a
//! result that arrives after being superseded is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::services::retriever::FallbackRetriever;
use crate::services::snapshot::SnapshotBuilder;
use crate::types::{CacheWarning, EsgError, InvoiceRecord, Result, RetrievalState, Snapshot};

/// Published state of the active data
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotView {
    /// Refresh generation that produced this view; 0 before the first
    pub generation: u64,
    pub state: RetrievalState,
    pub metrics_state: RetrievalState,
    pub snapshot: Snapshot,
    pub records: Vec<InvoiceRecord>,
    pub captured_at: Option<DateTime<Utc>>,
    pub cache_warning: Option<CacheWarning>,
}

impl SnapshotView {
    fn initial() -> Self {
        Self {
            generation: 0,
            state: RetrievalState::NoData,
            metrics_state: RetrievalState::NoData,
            snapshot: Snapshot::empty(),
            records: Vec::new(),
            captured_at: None,
            cache_warning: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Result published with the invoice retrieval state
    Applied(RetrievalState),
    /// Another refresh was pending; nothing started
    AlreadyInFlight,
    /// A newer refresh replaced this one; its result was dropped
    Superseded,
    /// Cancelled without a replacement
    Cancelled,
}

struct InFlight {
    generation: u64,
    token: CancellationToken,
}

pub struct RefreshCoordinator {
    retriever: Arc<FallbackRetriever>,
    builder: SnapshotBuilder,
    generation: AtomicU64,
    in_flight: Mutex<Option<InFlight>>,
    published: watch::Sender<Arc<SnapshotView>>,
}

impl RefreshCoordinator {
    pub fn new(retriever: Arc<FallbackRetriever>, builder: SnapshotBuilder) -> Self {
        let (published, _) = watch::channel(Arc::new(SnapshotView::initial()));
        Self {
            retriever,
            builder,
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
            published,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<SnapshotView>> {
        self.published.subscribe()
    }

    /// Latest published view
    pub fn current(&self) -> Arc<SnapshotView> {
        self.published.borrow().clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.lock().is_some()
    }

    /// Start a refresh unless one is already pending
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let started = {
            let mut slot = self.lock();
            if slot.is_some() {
                tracing::debug!("refresh already in flight, ignoring request");
                None
            } else {
                Some(self.start(&mut slot))
            }
        };

        match started {
            Some((generation, token)) => self.run(generation, token).await,
            None => Ok(RefreshOutcome::AlreadyInFlight),
        }
    }

    /// External "data changed" signal: cancel any pending refresh and start
    /// a new one.
    pub async fn data_changed(&self) -> Result<RefreshOutcome> {
        let (generation, token) = {
            let mut slot = self.lock();
            if let Some(previous) = slot.take() {
                tracing::debug!(generation = previous.generation, "superseding pending refresh");
                previous.token.cancel();
            }
            self.start(&mut slot)
        };
        self.run(generation, token).await
    }

    /// Cancel the pending refresh, if any, without starting another.
    ///
    /// The slot stays occupied until the cancelled run unwinds.
    pub fn cancel(&self) {
        if let Some(pending) = self.lock().as_ref() {
            pending.token.cancel();
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn start(&self, slot: &mut Option<InFlight>) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = CancellationToken::new();
        *slot = Some(InFlight {
            generation,
            token: token.clone(),
        });
        (generation, token)
    }

    async fn run(&self, generation: u64, token: CancellationToken) -> Result<RefreshOutcome> {
        let result = async {
            let invoices = self.retriever.retrieve_invoices(&token).await?;
            let metrics = self.retriever.retrieve_metrics(&token).await?;
            Ok::<_, EsgError>((invoices, metrics))
        }
        .await;

        // Check-and-publish happens under the lock so a newer refresh cannot
        // interleave between them.
        let mut slot = self.lock();
        let is_current = slot.as_ref().is_some_and(|f| f.generation == generation);
        if is_current {
            *slot = None;
        }

        match result {
            Err(EsgError::Cancelled) if is_current => Ok(RefreshOutcome::Cancelled),
            Err(EsgError::Cancelled) => Ok(RefreshOutcome::Superseded),
            Err(err) => Err(err),
            Ok(_) if !is_current => {
                tracing::debug!(generation, "discarding superseded refresh result");
                Ok(RefreshOutcome::Superseded)
            }
            Ok((invoices, metrics)) => {
                let metrics_payload =
                    (metrics.state != RetrievalState::NoData).then_some(&metrics.data);
                let snapshot = self.builder.build(&invoices.data, metrics_payload);
                let view = SnapshotView {
                    generation,
                    state: invoices.state,
                    metrics_state: metrics.state,
                    snapshot,
                    captured_at: invoices.captured_at,
                    cache_warning: invoices.cache_warning,
                    records: invoices.data,
                };
                tracing::info!(
                    generation,
                    state = view.state.as_str(),
                    invoices = view.records.len(),
                    "snapshot refreshed"
                );
                self.published.send_replace(Arc::new(view));
                Ok(RefreshOutcome::Applied(invoices.state))
            }
        }
    }
}
