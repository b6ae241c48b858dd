//! Offer lifecycle and cascading promotion.
//!
//! Every transition runs inside one event transaction: the entry changes,
//! any cascade it triggers, and the persistence write either all commit or
//! none do. Timer and notification side effects are collected while the
//! lock is held and applied once the transaction has committed.
//!
//! An offer ends in exactly one place, [`PromotionEngine::end_offer`],
//! whether staff declined it, the entrant let it lapse, or the timer fired.

use std::sync::{Arc, Weak};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::error::{WaitlistError, WaitlistResult};
use crate::models::{CamperId, EntryId, EntryStatus, EventId, Priority, WaitlistEntry};
use crate::notify::Notifier;
use crate::scheduler::{ExpiryNotice, OfferScheduler};
use crate::store::{EntryStore, EventTxn};

/// How long to wait before retrying an expiry the store refused.
const EXPIRY_RETRY_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// Shortest offer window the engine accepts.
const MIN_OFFER_WINDOW_SECS: i64 = 1;

/// What happened to the seat freed by a decline, expiry or removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entry", rename_all = "snake_case")]
pub enum Cascade {
    /// The next waiting entry now holds the offer.
    Offered(WaitlistEntry),
    /// The seat is free and nobody is waiting for it.
    NoOneWaiting,
    /// No seat was freed by this call.
    NotTriggered,
}

impl Cascade {
    pub fn offered(&self) -> Option<&WaitlistEntry> {
        match self {
            Cascade::Offered(entry) => Some(entry),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineOutcome {
    /// The entry as it stands after the call.
    pub entry: WaitlistEntry,
    pub cascade: Cascade,
}

impl DeclineOutcome {
    fn unchanged(entry: WaitlistEntry) -> Self {
        Self {
            entry,
            cascade: Cascade::NotTriggered,
        }
    }
}

/// How an offer is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OfferEnd {
    /// Entrant or staff said no.
    Declined,
    /// The timer armed for this deadline fired.
    TimedOut(DateTime<Utc>),
}

/// Side effects that must wait until the event lock is released.
#[derive(Debug)]
enum Effect {
    ArmTimer(EntryId, DateTime<Utc>),
    CancelTimer(EntryId),
    NotifyOffer(WaitlistEntry),
    NotifyExpired(WaitlistEntry),
}

pub struct PromotionEngine {
    store: Arc<EntryStore>,
    scheduler: OfferScheduler,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    offer_window: Duration,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PromotionEngine {
    /// Build the engine and start the task that turns timer firings into
    /// expiries. Must be called from within a Tokio runtime.
    ///
    /// A window that is zero or negative is raised to one second, so an
    /// offer never starts out already lapsed.
    pub fn start(
        store: Arc<EntryStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        offer_window: Duration,
    ) -> Arc<Self> {
        let offer_window = if offer_window > Duration::zero() {
            offer_window
        } else {
            warn!(
                offer_window_secs = offer_window.num_seconds(),
                "Offer window must be positive, using the minimum"
            );
            Duration::seconds(MIN_OFFER_WINDOW_SECS)
        };
        let (scheduler, rx) = OfferScheduler::new(Arc::clone(&clock));
        let engine = Arc::new(Self {
            store,
            scheduler,
            notifier,
            clock,
            offer_window,
            listener: std::sync::Mutex::new(None),
        });

        let handle = spawn_expiry_listener(Arc::downgrade(&engine), rx);
        if let Ok(mut slot) = engine.listener.lock() {
            *slot = Some(handle);
        }
        engine
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub fn scheduler(&self) -> &OfferScheduler {
        &self.scheduler
    }

    pub fn offer_window(&self) -> Duration {
        self.offer_window
    }

    // =========================================================================
    // Transitions
    // =========================================================================

    pub async fn add(
        &self,
        event_id: &EventId,
        camper_id: CamperId,
        priority: Priority,
        notes: Option<String>,
    ) -> WaitlistResult<WaitlistEntry> {
        let entry = WaitlistEntry::new(
            event_id.clone(),
            camper_id,
            priority,
            notes,
            self.clock.now(),
        );

        let mut txn = self.store.lock_event(event_id).await;
        let added = txn.add(entry)?;
        txn.commit().await?;

        info!(
            event_id = %added.event_id,
            entry_id = %added.id,
            camper_id = %added.camper_id,
            priority = %added.priority,
            position = added.position,
            "Added to waitlist"
        );
        Ok(added)
    }

    pub async fn offer(&self, entry_id: &EntryId) -> WaitlistResult<WaitlistEntry> {
        let mut effects = Vec::new();
        let mut txn = self.store.lock_entry(entry_id).await?;
        let offered = self.offer_in(&mut txn, entry_id, &mut effects)?;
        txn.commit().await?;

        info!(
            event_id = %offered.event_id,
            entry_id = %offered.id,
            expires_at = ?offered.expires_at,
            "Spot offered"
        );
        self.apply(effects);
        Ok(offered)
    }

    /// Accept an open offer.
    ///
    /// Terminal entries come back unchanged. An offer whose window has
    /// already run out is expired instead, cascading as usual.
    pub async fn accept(&self, entry_id: &EntryId) -> WaitlistResult<WaitlistEntry> {
        let mut effects = Vec::new();
        let mut txn = self.store.lock_entry(entry_id).await?;
        let entry = txn.get(entry_id)?.clone();
        let now = self.clock.now();

        if entry.status.is_terminal() {
            debug!(entry_id = %entry_id, status = %entry.status, "Accept on settled entry, nothing to do");
            return Ok(entry);
        }

        if entry.offer_lapsed(now) {
            drop(txn);
            let outcome = self.end_offer(entry_id, OfferEnd::Declined).await?;
            return Ok(outcome.entry);
        }

        let accepted = txn.update_status(entry_id, EntryStatus::Accepted, None)?;
        effects.push(Effect::CancelTimer(*entry_id));
        txn.commit().await?;

        info!(event_id = %accepted.event_id, entry_id = %entry_id, "Offer accepted");
        self.apply(effects);
        Ok(accepted)
    }

    pub async fn decline(&self, entry_id: &EntryId) -> WaitlistResult<DeclineOutcome> {
        self.end_offer(entry_id, OfferEnd::Declined).await
    }

    /// Entry point for timer firings; shares the decline path.
    async fn expire(&self, notice: ExpiryNotice) {
        match self
            .end_offer(&notice.entry_id, OfferEnd::TimedOut(notice.expires_at))
            .await
        {
            Ok(_) => {}
            Err(WaitlistError::NotFound(_)) => {
                debug!(entry_id = %notice.entry_id, "Expired entry no longer exists");
            }
            Err(e) => {
                // Leave the entry offered and try again once the store recovers.
                warn!(entry_id = %notice.entry_id, error = %e, "Failed to expire offer, re-arming");
                self.scheduler
                    .arm_in(notice.entry_id, notice.expires_at, EXPIRY_RETRY_DELAY);
            }
        }
    }

    /// Close an open offer and hand the seat to whoever is next.
    async fn end_offer(&self, entry_id: &EntryId, end: OfferEnd) -> WaitlistResult<DeclineOutcome> {
        let mut effects = Vec::new();
        let mut txn = self.store.lock_entry(entry_id).await?;
        let entry = txn.get(entry_id)?.clone();
        let now = self.clock.now();

        match (entry.status, end) {
            (EntryStatus::Offered, _) => {}
            (status, _) if status.is_terminal() => {
                debug!(entry_id = %entry_id, %status, "Offer already settled, nothing to do");
                return Ok(DeclineOutcome::unchanged(entry));
            }
            (status, OfferEnd::Declined) => {
                return Err(WaitlistError::InvalidTransition {
                    entry_id: *entry_id,
                    from: status,
                    to: EntryStatus::Declined,
                });
            }
            (_, OfferEnd::TimedOut(_)) => {
                warn!(entry_id = %entry_id, "Timer fired for an entry that holds no offer");
                return Ok(DeclineOutcome::unchanged(entry));
            }
        }

        if let OfferEnd::TimedOut(deadline) = end {
            if entry.expires_at != Some(deadline) {
                debug!(entry_id = %entry_id, %deadline, "Stale offer timer ignored");
                return Ok(DeclineOutcome::unchanged(entry));
            }
            if !entry.offer_lapsed(now) {
                // Timer woke before the clock reached the deadline.
                drop(txn);
                self.scheduler.arm(*entry_id, deadline);
                return Ok(DeclineOutcome::unchanged(entry));
            }
        }

        let status = if entry.offer_lapsed(now) {
            EntryStatus::Expired
        } else {
            EntryStatus::Declined
        };
        let closed = txn.update_status(entry_id, status, None)?;
        effects.push(Effect::CancelTimer(*entry_id));
        if status == EntryStatus::Expired {
            effects.push(Effect::NotifyExpired(closed.clone()));
        }
        let cascade = self.cascade(&mut txn, &mut effects)?;
        txn.commit().await?;

        info!(
            event_id = %closed.event_id,
            entry_id = %entry_id,
            status = %closed.status,
            next = ?cascade.offered().map(|e| e.id),
            "Offer closed"
        );
        self.apply(effects);
        Ok(DeclineOutcome {
            entry: closed,
            cascade,
        })
    }

    /// Delete an entry. Removing the holder of an open offer frees that seat
    /// and cascades; removing anyone else does not.
    pub async fn remove(&self, entry_id: &EntryId) -> WaitlistResult<Cascade> {
        let mut effects = Vec::new();
        let mut txn = self.store.lock_entry(entry_id).await?;
        let removed = txn.remove(entry_id)?;

        let cascade = if removed.is_offered() {
            effects.push(Effect::CancelTimer(*entry_id));
            self.cascade(&mut txn, &mut effects)?
        } else {
            Cascade::NotTriggered
        };
        txn.commit().await?;

        info!(
            event_id = %removed.event_id,
            entry_id = %entry_id,
            status = %removed.status,
            next = ?cascade.offered().map(|e| e.id),
            "Removed from waitlist"
        );
        self.apply(effects);
        Ok(cascade)
    }

    /// Re-arm timers for every open offer after a restart. Deadlines that
    /// passed while the process was down fire straight away.
    pub async fn recover(&self) -> usize {
        let offered = self.store.entries_with_status(EntryStatus::Offered).await;
        let mut armed = 0;
        for entry in offered {
            match entry.expires_at {
                Some(expires_at) => {
                    self.scheduler.arm(entry.id, expires_at);
                    armed += 1;
                }
                None => {
                    warn!(entry_id = %entry.id, "Offered entry has no deadline, skipping");
                }
            }
        }
        info!(armed, "Offer timers recovered");
        armed
    }

    // =========================================================================
    // Helpers (event lock held)
    // =========================================================================

    fn offer_in(
        &self,
        txn: &mut EventTxn<'_>,
        entry_id: &EntryId,
        effects: &mut Vec<Effect>,
    ) -> WaitlistResult<WaitlistEntry> {
        let expires_at = self.clock.now() + self.offer_window;
        let offered = txn.update_status(entry_id, EntryStatus::Offered, Some(expires_at))?;
        effects.push(Effect::ArmTimer(*entry_id, expires_at));
        effects.push(Effect::NotifyOffer(offered.clone()));
        Ok(offered)
    }

    /// Exactly one automatic offer per freed seat.
    fn cascade(&self, txn: &mut EventTxn<'_>, effects: &mut Vec<Effect>) -> WaitlistResult<Cascade> {
        let next = match txn.next_candidate() {
            Some(entry) => entry.id,
            None => {
                info!(event_id = %txn.event_id(), "Seat freed, no one waiting");
                return Ok(Cascade::NoOneWaiting);
            }
        };
        let offered = self.offer_in(txn, &next, effects)?;
        Ok(Cascade::Offered(offered))
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::ArmTimer(entry_id, expires_at) => self.scheduler.arm(entry_id, expires_at),
                Effect::CancelTimer(entry_id) => {
                    self.scheduler.cancel(&entry_id);
                }
                Effect::NotifyOffer(entry) => {
                    if let Err(e) = self.notifier.notify_offer(&entry) {
                        warn!(entry_id = %entry.id, error = %e, "Offer notification failed");
                    }
                }
                Effect::NotifyExpired(entry) => {
                    if let Err(e) = self.notifier.notify_expired(&entry) {
                        warn!(entry_id = %entry.id, error = %e, "Expiry notification failed");
                    }
                }
            }
        }
    }
}

impl Drop for PromotionEngine {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.listener.lock() {
            if let Some(handle) = slot.take() {
                handle.abort();
            }
        }
    }
}

fn spawn_expiry_listener(
    engine: Weak<PromotionEngine>,
    mut rx: mpsc::Receiver<ExpiryNotice>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notice) = rx.recv().await {
            let Some(engine) = engine.upgrade() else {
                break;
            };
            // Each expiry waits on its own event's lock and persistence
            // retries; other events must not queue behind it.
            tokio::spawn(async move { engine.expire(notice).await });
        }
        debug!("Expiry listener stopped");
    })
}
