//! Offer expiry timers.
//!
//! One timer per offered entry. A timer that runs out sends an
//! [`ExpiryNotice`] down the channel handed out by [`OfferScheduler::new`];
//! the promotion engine listens on the other end and feeds the notice
//! through the same path an explicit decline takes. The scheduler never
//! reads or writes entries itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::clock::Clock;
use crate::models::EntryId;

/// Buffer size for the expiry notice channel.
/// Notices are drained as fast as the engine can take event locks.
const EXPIRY_CHANNEL_BUFFER_SIZE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryNotice {
    pub entry_id: EntryId,
    /// Deadline the timer was armed for; lets the engine spot stale timers.
    pub expires_at: DateTime<Utc>,
}

struct ArmedTimer {
    generation: u64,
    expires_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct TimerTable {
    timers: HashMap<EntryId, ArmedTimer>,
    next_generation: u64,
}

pub struct OfferScheduler {
    table: Arc<Mutex<TimerTable>>,
    tx: mpsc::Sender<ExpiryNotice>,
    clock: Arc<dyn Clock>,
}

impl OfferScheduler {
    pub fn new(clock: Arc<dyn Clock>) -> (Self, mpsc::Receiver<ExpiryNotice>) {
        let (tx, rx) = mpsc::channel(EXPIRY_CHANNEL_BUFFER_SIZE);
        let scheduler = Self {
            table: Arc::new(Mutex::new(TimerTable::default())),
            tx,
            clock,
        };
        (scheduler, rx)
    }

    /// Arm (or re-arm) the timer for `entry_id`. A deadline already in the
    /// past fires immediately.
    pub fn arm(&self, entry_id: EntryId, expires_at: DateTime<Utc>) {
        let delay = (expires_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        self.arm_in(entry_id, expires_at, delay);
    }

    /// Arm a timer for the deadline `expires_at` that fires after `delay`
    /// regardless of the clock. Used to retry an expiry that could not be
    /// applied.
    pub fn arm_in(&self, entry_id: EntryId, expires_at: DateTime<Utc>, delay: Duration) {
        let mut table = lock(&self.table);
        table.next_generation += 1;
        let generation = table.next_generation;

        let shared = Arc::clone(&self.table);
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut table = lock(&shared);
                match table.timers.get(&entry_id) {
                    Some(armed) if armed.generation == generation => {
                        table.timers.remove(&entry_id);
                    }
                    // Replaced or cancelled while we slept.
                    _ => return,
                }
            }
            debug!(entry_id = %entry_id, %expires_at, "Offer timer fired");
            if tx.send(ExpiryNotice { entry_id, expires_at }).await.is_err() {
                debug!(entry_id = %entry_id, "Expiry listener gone, dropping notice");
            }
        });

        if let Some(previous) = table.timers.insert(
            entry_id,
            ArmedTimer {
                generation,
                expires_at,
                handle,
            },
        ) {
            previous.handle.abort();
        }
        debug!(entry_id = %entry_id, %expires_at, delay_ms = delay.as_millis() as u64, "Offer timer armed");
    }

    /// Cancel the timer for `entry_id`. Safe to call when no timer is armed
    /// or when it has already fired.
    pub fn cancel(&self, entry_id: &EntryId) -> bool {
        match lock(&self.table).timers.remove(entry_id) {
            Some(armed) => {
                armed.handle.abort();
                debug!(entry_id = %entry_id, "Offer timer cancelled");
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, entry_id: &EntryId) -> bool {
        lock(&self.table).timers.contains_key(entry_id)
    }

    pub fn armed_deadline(&self, entry_id: &EntryId) -> Option<DateTime<Utc>> {
        lock(&self.table).timers.get(entry_id).map(|t| t.expires_at)
    }

    pub fn armed_count(&self) -> usize {
        lock(&self.table).timers.len()
    }

    /// Abort every pending timer.
    pub fn shutdown(&self) {
        let mut table = lock(&self.table);
        for (_, armed) in table.timers.drain() {
            armed.handle.abort();
        }
    }
}

impl Drop for OfferScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn lock(table: &Mutex<TimerTable>) -> MutexGuard<'_, TimerTable> {
    table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
