//! Collaborator-facing waitlist operations.
//!
//! [`Waitlist`] is what the API layer holds: it wires the store, the
//! promotion engine and the reorder coordinator together and exposes one
//! method per external operation.

use std::sync::Arc;

use tracing::info;

use crate::clock::{Clock, SystemClock};
use crate::config::WaitlistConfig;
use crate::engine::{Cascade, DeclineOutcome, PromotionEngine};
use crate::error::{WaitlistError, WaitlistResult};
use crate::models::{CamperId, EntryId, EventId, Priority, WaitlistEntry, WaitlistSummary};
use crate::notify::{LogNotifier, Notifier};
use crate::reorder::{ReorderCoordinator, ReorderItem};
use crate::store::{EntryBackend, EntryStore, JsonFileBackend, MemoryBackend, RetryPolicy};

pub struct WaitlistBuilder {
    config: WaitlistConfig,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn Notifier>,
    backend: Option<Arc<dyn EntryBackend>>,
}

impl WaitlistBuilder {
    pub fn new(config: WaitlistConfig) -> Self {
        Self {
            config,
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
            backend: None,
        }
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Use `backend` instead of the one implied by `config.data_dir`.
    pub fn backend(mut self, backend: Arc<dyn EntryBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Open the store, start the engine and re-arm timers for any offers
    /// that were open when the process last stopped.
    pub async fn start(self) -> WaitlistResult<Waitlist> {
        let backend: Arc<dyn EntryBackend> = match (self.backend, &self.config.data_dir) {
            (Some(backend), _) => backend,
            (None, Some(dir)) => {
                let backend = JsonFileBackend::new(dir.clone()).map_err(|e| {
                    WaitlistError::PersistenceFailed {
                        attempts: 1,
                        message: format!("{:#}", e),
                    }
                })?;
                Arc::new(backend)
            }
            (None, None) => Arc::new(MemoryBackend::new()),
        };

        let store = Arc::new(EntryStore::open(backend, RetryPolicy::from_config(&self.config))?);
        let engine = PromotionEngine::start(
            Arc::clone(&store),
            self.notifier,
            self.clock,
            self.config.offer_window(),
        );
        let reorder = ReorderCoordinator::new(Arc::clone(&store));

        let armed = engine.recover().await;
        info!(
            offer_window_secs = self.config.offer_window_secs,
            data_dir = ?self.config.data_dir,
            recovered_offers = armed,
            "Waitlist started"
        );

        Ok(Waitlist {
            store,
            engine,
            reorder,
        })
    }
}

pub struct Waitlist {
    store: Arc<EntryStore>,
    engine: Arc<PromotionEngine>,
    reorder: ReorderCoordinator,
}

impl Waitlist {
    pub fn builder(config: WaitlistConfig) -> WaitlistBuilder {
        WaitlistBuilder::new(config)
    }

    pub fn engine(&self) -> &Arc<PromotionEngine> {
        &self.engine
    }

    pub async fn add_to_waitlist(
        &self,
        event_id: &EventId,
        camper_id: CamperId,
        priority: Priority,
        notes: Option<String>,
    ) -> WaitlistResult<WaitlistEntry> {
        self.engine.add(event_id, camper_id, priority, notes).await
    }

    /// The caller confirms a seat is free before calling this.
    pub async fn offer_spot(&self, entry_id: &EntryId) -> WaitlistResult<WaitlistEntry> {
        self.engine.offer(entry_id).await
    }

    pub async fn accept_spot(&self, entry_id: &EntryId) -> WaitlistResult<WaitlistEntry> {
        self.engine.accept(entry_id).await
    }

    pub async fn decline_spot(&self, entry_id: &EntryId) -> WaitlistResult<DeclineOutcome> {
        self.engine.decline(entry_id).await
    }

    pub async fn remove_from_waitlist(&self, entry_id: &EntryId) -> WaitlistResult<Cascade> {
        self.engine.remove(entry_id).await
    }

    pub async fn reorder_waiting(
        &self,
        event_id: &EventId,
        items: &[ReorderItem],
    ) -> WaitlistResult<Vec<WaitlistEntry>> {
        self.reorder.reorder(event_id, items).await
    }

    pub async fn reorder_waiting_ids(
        &self,
        event_id: &EventId,
        ordered: &[EntryId],
    ) -> WaitlistResult<Vec<WaitlistEntry>> {
        self.reorder.reorder_ids(event_id, ordered).await
    }

    /// Waiting entries in the order they will be offered seats.
    pub async fn list_waitlist(&self, event_id: &EventId) -> Vec<WaitlistEntry> {
        self.store.list_waiting(event_id).await
    }

    /// Every entry for the event, waiting ones first.
    pub async fn list_entries(&self, event_id: &EventId) -> Vec<WaitlistEntry> {
        self.store.list_all(event_id).await
    }

    pub async fn get_entry(&self, entry_id: &EntryId) -> WaitlistResult<WaitlistEntry> {
        self.store.get_by_id(entry_id).await
    }

    pub async fn summary(&self, event_id: &EventId) -> WaitlistSummary {
        self.store.summary(event_id).await
    }

    pub async fn events(&self) -> Vec<EventId> {
        self.store.event_ids().await
    }

    /// Re-scan open offers and re-arm their timers.
    pub async fn recover(&self) -> usize {
        self.engine.recover().await
    }
}
