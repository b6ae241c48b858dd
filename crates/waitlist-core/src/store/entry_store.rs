use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, warn};

use super::backend::{EntryBackend, MemoryBackend};
use crate::config::WaitlistConfig;
use crate::error::{WaitlistError, WaitlistResult};
use crate::models::{EntryId, EntryStatus, EventId, WaitlistEntry, WaitlistSummary};
use crate::ordering::PriorityOrderer;

/// Bounded retry for backend writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&WaitlistConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &WaitlistConfig) -> Self {
        Self {
            max_attempts: config.persist_max_retries.max(1),
            initial_backoff: config.persist_initial_backoff(),
        }
    }
}

#[derive(Debug, Default)]
struct EventQueue {
    entries: HashMap<EntryId, WaitlistEntry>,
}

/// Entries keyed by event, each event behind its own lock.
///
/// Unrelated events never contend: the outer map lock is only held long
/// enough to find (or create) an event's queue.
pub struct EntryStore {
    events: RwLock<HashMap<EventId, Arc<Mutex<EventQueue>>>>,
    index: RwLock<HashMap<EntryId, EventId>>,
    backend: Arc<dyn EntryBackend>,
    retry: RetryPolicy,
}

impl EntryStore {
    pub fn new(backend: Arc<dyn EntryBackend>, retry: RetryPolicy) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            index: RwLock::new(HashMap::new()),
            backend,
            retry,
        }
    }

    /// Store with a throwaway in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()), RetryPolicy::default())
    }

    /// Build a store from everything the backend has persisted.
    ///
    /// Waiting positions are renumbered on load so a snapshot written by an
    /// older build (or edited by hand) still satisfies the contiguity rule.
    pub fn open(backend: Arc<dyn EntryBackend>, retry: RetryPolicy) -> WaitlistResult<Self> {
        let loaded = backend.load_all().map_err(|e| WaitlistError::PersistenceFailed {
            attempts: 1,
            message: format!("{:#}", e),
        })?;

        let mut queues: HashMap<EventId, EventQueue> = HashMap::new();
        let mut index = HashMap::new();
        for entry in loaded {
            index.insert(entry.id, entry.event_id.clone());
            queues
                .entry(entry.event_id.clone())
                .or_default()
                .entries
                .insert(entry.id, entry);
        }

        let events = queues
            .into_iter()
            .map(|(event_id, mut queue)| {
                compact_positions(&mut queue.entries);
                (event_id, Arc::new(Mutex::new(queue)))
            })
            .collect::<HashMap<_, _>>();

        debug!(events = events.len(), entries = index.len(), "Entry store opened");

        Ok(Self {
            events: RwLock::new(events),
            index: RwLock::new(index),
            backend,
            retry,
        })
    }

    async fn queue(&self, event_id: &EventId) -> Arc<Mutex<EventQueue>> {
        if let Some(queue) = self.events.read().await.get(event_id) {
            return Arc::clone(queue);
        }
        let mut events = self.events.write().await;
        Arc::clone(events.entry(event_id.clone()).or_default())
    }

    /// Take the event's exclusive lock and open a transaction on it,
    /// creating the event's queue if this is its first entry. Only the add
    /// path should call this; everything else goes through
    /// [`lock_existing_event`](Self::lock_existing_event).
    pub async fn lock_event(&self, event_id: &EventId) -> EventTxn<'_> {
        let queue = self.queue(event_id).await;
        self.open_txn(event_id, queue).await
    }

    /// Lock an event that already holds entries.
    pub async fn lock_existing_event(&self, event_id: &EventId) -> WaitlistResult<EventTxn<'_>> {
        let queue = self
            .existing_queue(event_id)
            .await
            .ok_or_else(|| WaitlistError::event_not_found(event_id))?;
        let txn = self.open_txn(event_id, queue).await;
        // A queue left behind by an add whose commit failed holds nothing.
        if txn.staged.is_empty() {
            return Err(WaitlistError::event_not_found(event_id));
        }
        Ok(txn)
    }

    async fn open_txn(&self, event_id: &EventId, queue: Arc<Mutex<EventQueue>>) -> EventTxn<'_> {
        let guard = queue.lock_owned().await;
        let staged = guard.entries.clone();
        EventTxn {
            store: self,
            event_id: event_id.clone(),
            guard,
            staged,
            added: Vec::new(),
            removed: Vec::new(),
            dirty: false,
        }
    }

    /// Lock whichever event owns `entry_id`.
    pub async fn lock_entry(&self, entry_id: &EntryId) -> WaitlistResult<EventTxn<'_>> {
        let event_id = self.event_of(entry_id).await?;
        let queue = self
            .existing_queue(&event_id)
            .await
            .ok_or_else(|| WaitlistError::entry_not_found(entry_id))?;
        let txn = self.open_txn(&event_id, queue).await;
        // Removed between the index lookup and taking the lock.
        if !txn.contains(entry_id) {
            return Err(WaitlistError::entry_not_found(entry_id));
        }
        Ok(txn)
    }

    pub async fn event_of(&self, entry_id: &EntryId) -> WaitlistResult<EventId> {
        self.index
            .read()
            .await
            .get(entry_id)
            .cloned()
            .ok_or_else(|| WaitlistError::entry_not_found(entry_id))
    }

    pub async fn get(&self, event_id: &EventId, entry_id: &EntryId) -> WaitlistResult<WaitlistEntry> {
        let txn = self.lock_existing_event(event_id).await?;
        let entry = txn.get(entry_id)?.clone();
        Ok(entry)
    }

    pub async fn get_by_id(&self, entry_id: &EntryId) -> WaitlistResult<WaitlistEntry> {
        let txn = self.lock_entry(entry_id).await?;
        let entry = txn.get(entry_id)?.clone();
        Ok(entry)
    }

    /// Waiting entries in canonical order, computed fresh on every call.
    pub async fn list_waiting(&self, event_id: &EventId) -> Vec<WaitlistEntry> {
        match self.existing_queue(event_id).await {
            Some(queue) => {
                let queue = queue.lock().await;
                ordered_waiting(&queue.entries)
            }
            None => Vec::new(),
        }
    }

    pub async fn list_all(&self, event_id: &EventId) -> Vec<WaitlistEntry> {
        match self.existing_queue(event_id).await {
            Some(queue) => {
                let queue = queue.lock().await;
                staff_order(&queue.entries)
            }
            None => Vec::new(),
        }
    }

    pub async fn summary(&self, event_id: &EventId) -> WaitlistSummary {
        match self.existing_queue(event_id).await {
            Some(queue) => {
                let queue = queue.lock().await;
                WaitlistSummary::from_entries(event_id, queue.entries.values())
            }
            None => WaitlistSummary::from_entries(event_id, []),
        }
    }

    /// Events that hold at least one entry, sorted by id.
    pub async fn event_ids(&self) -> Vec<EventId> {
        let queues: Vec<(EventId, Arc<Mutex<EventQueue>>)> = self
            .events
            .read()
            .await
            .iter()
            .map(|(id, queue)| (id.clone(), Arc::clone(queue)))
            .collect();

        let mut ids = Vec::with_capacity(queues.len());
        for (id, queue) in queues {
            if !queue.lock().await.entries.is_empty() {
                ids.push(id);
            }
        }
        ids.sort();
        ids
    }

    /// Every entry in `status` across all events.
    pub async fn entries_with_status(&self, status: EntryStatus) -> Vec<WaitlistEntry> {
        let queues: Vec<Arc<Mutex<EventQueue>>> =
            self.events.read().await.values().cloned().collect();
        let mut found = Vec::new();
        for queue in queues {
            let queue = queue.lock().await;
            found.extend(queue.entries.values().filter(|e| e.status == status).cloned());
        }
        found
    }

    async fn existing_queue(&self, event_id: &EventId) -> Option<Arc<Mutex<EventQueue>>> {
        self.events.read().await.get(event_id).cloned()
    }

    async fn persist(&self, event_id: &EventId, snapshot: &[WaitlistEntry]) -> WaitlistResult<()> {
        let mut backoff = self.retry.initial_backoff;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.backend.save_event(event_id, snapshot) {
                Ok(()) => {
                    debug!(event_id = %event_id, entries = snapshot.len(), attempt, "Event snapshot persisted");
                    return Ok(());
                }
                Err(e) if attempt < self.retry.max_attempts => {
                    warn!(
                        event_id = %event_id,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Persisting event snapshot failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    return Err(WaitlistError::PersistenceFailed {
                        attempts: attempt,
                        message: format!("{:#}", e),
                    });
                }
            }
        }
    }
}

/// Exclusive access to one event's entries.
///
/// Reads see staged changes. Nothing is visible to other callers until
/// [`commit`](Self::commit) succeeds; dropping the transaction discards
/// every staged change.
pub struct EventTxn<'a> {
    store: &'a EntryStore,
    event_id: EventId,
    guard: OwnedMutexGuard<EventQueue>,
    staged: HashMap<EntryId, WaitlistEntry>,
    added: Vec<EntryId>,
    removed: Vec<EntryId>,
    dirty: bool,
}

impl EventTxn<'_> {
    pub fn event_id(&self) -> &EventId {
        &self.event_id
    }

    pub fn contains(&self, entry_id: &EntryId) -> bool {
        self.staged.contains_key(entry_id)
    }

    pub fn get(&self, entry_id: &EntryId) -> WaitlistResult<&WaitlistEntry> {
        self.staged
            .get(entry_id)
            .ok_or_else(|| WaitlistError::entry_not_found(entry_id))
    }

    pub fn entries(&self) -> impl Iterator<Item = &WaitlistEntry> {
        self.staged.values()
    }

    pub fn list_waiting(&self) -> Vec<WaitlistEntry> {
        ordered_waiting(&self.staged)
    }

    pub fn next_candidate(&self) -> Option<&WaitlistEntry> {
        PriorityOrderer::next_candidate(self.staged.values())
    }

    pub fn summary(&self) -> WaitlistSummary {
        WaitlistSummary::from_entries(&self.event_id, self.staged.values())
    }

    /// Insert a new waiting entry at the tail of the queue.
    pub fn add(&mut self, mut entry: WaitlistEntry) -> WaitlistResult<WaitlistEntry> {
        if let Some(existing) = self
            .staged
            .values()
            .find(|e| e.camper_id == entry.camper_id && e.status.is_active())
        {
            return Err(WaitlistError::DuplicateActiveEntry {
                event_id: self.event_id.clone(),
                camper_id: entry.camper_id.clone(),
                existing: existing.id,
            });
        }

        entry.event_id = self.event_id.clone();
        entry.status = EntryStatus::Waiting;
        entry.expires_at = None;
        entry.position = PriorityOrderer::next_position(self.staged.values());

        self.added.push(entry.id);
        self.staged.insert(entry.id, entry.clone());
        self.dirty = true;
        Ok(entry)
    }

    /// Move an entry along the lifecycle graph.
    ///
    /// `expires_at` must be given when moving to `offered` and is cleared for
    /// every other status. Leaving `waiting` closes the gap in positions.
    pub fn update_status(
        &mut self,
        entry_id: &EntryId,
        status: EntryStatus,
        expires_at: Option<DateTime<Utc>>,
    ) -> WaitlistResult<WaitlistEntry> {
        let entry = self
            .staged
            .get_mut(entry_id)
            .ok_or_else(|| WaitlistError::entry_not_found(entry_id))?;

        let from = entry.status;
        let offered_without_deadline = status == EntryStatus::Offered && expires_at.is_none();
        if !from.can_transition_to(status) || offered_without_deadline {
            return Err(WaitlistError::InvalidTransition {
                entry_id: *entry_id,
                from,
                to: status,
            });
        }

        entry.status = status;
        entry.expires_at = if status == EntryStatus::Offered {
            expires_at
        } else {
            None
        };
        let updated = entry.clone();

        if from == EntryStatus::Waiting {
            compact_positions(&mut self.staged);
        }
        self.dirty = true;
        Ok(updated)
    }

    /// Assign positions `1..N` to exactly the current waiting entries, in
    /// the order given.
    pub fn set_positions(&mut self, ordered_ids: &[EntryId]) -> WaitlistResult<()> {
        let waiting: HashSet<EntryId> = self
            .staged
            .values()
            .filter(|e| e.is_waiting())
            .map(|e| e.id)
            .collect();

        let mut seen = HashSet::with_capacity(ordered_ids.len());
        for id in ordered_ids {
            if !seen.insert(*id) {
                return Err(WaitlistError::mismatch(
                    &self.event_id,
                    format!("entry {} listed more than once", id),
                ));
            }
            if !waiting.contains(id) {
                return Err(WaitlistError::mismatch(
                    &self.event_id,
                    format!("entry {} is not waiting in this event", id),
                ));
            }
        }
        if seen.len() != waiting.len() {
            return Err(WaitlistError::mismatch(
                &self.event_id,
                format!(
                    "expected {} waiting entries, got {}",
                    waiting.len(),
                    seen.len()
                ),
            ));
        }

        for (index, id) in ordered_ids.iter().enumerate() {
            if let Some(entry) = self.staged.get_mut(id) {
                entry.position = index as u32 + 1;
            }
        }
        self.dirty = true;
        Ok(())
    }

    /// Delete an entry outright, whatever its status.
    pub fn remove(&mut self, entry_id: &EntryId) -> WaitlistResult<WaitlistEntry> {
        let entry = self
            .staged
            .remove(entry_id)
            .ok_or_else(|| WaitlistError::entry_not_found(entry_id))?;
        if entry.is_waiting() {
            compact_positions(&mut self.staged);
        }
        self.added.retain(|id| id != entry_id);
        self.removed.push(*entry_id);
        self.dirty = true;
        Ok(entry)
    }

    /// Persist the staged entries and publish them.
    ///
    /// On failure nothing changes: the event keeps its previous entries and
    /// the lock is released when the transaction drops.
    pub async fn commit(mut self) -> WaitlistResult<()> {
        if !self.dirty {
            return Ok(());
        }

        let snapshot = staff_order(&self.staged);
        self.store.persist(&self.event_id, &snapshot).await?;

        // Lock order is always event queue, then index.
        {
            let mut index = self.store.index.write().await;
            for id in &self.removed {
                index.remove(id);
            }
            for id in &self.added {
                index.insert(*id, self.event_id.clone());
            }
        }
        self.guard.entries = std::mem::take(&mut self.staged);
        Ok(())
    }
}

fn ordered_waiting(entries: &HashMap<EntryId, WaitlistEntry>) -> Vec<WaitlistEntry> {
    PriorityOrderer::order_refs(entries.values().filter(|e| e.is_waiting()))
        .into_iter()
        .cloned()
        .collect()
}

/// Waiting entries in queue order, then everything else oldest first.
fn staff_order(entries: &HashMap<EntryId, WaitlistEntry>) -> Vec<WaitlistEntry> {
    let mut rest: Vec<&WaitlistEntry> = entries.values().filter(|e| !e.is_waiting()).collect();
    rest.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    let mut all = ordered_waiting(entries);
    all.extend(rest.into_iter().cloned());
    all
}

fn compact_positions(entries: &mut HashMap<EntryId, WaitlistEntry>) {
    let order = PriorityOrderer::arrival_order(entries.values());
    for (index, id) in order.iter().enumerate() {
        if let Some(entry) = entries.get_mut(id) {
            entry.position = index as u32 + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CamperId, Priority};
    use anyhow::anyhow;
    use chrono::Duration as ChronoDuration;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn new_entry(event: &str, camper: &str, priority: Priority) -> WaitlistEntry {
        WaitlistEntry::new(
            EventId::new(event),
            CamperId::new(camper),
            priority,
            None,
            Utc::now(),
        )
    }

    fn positions(entries: &[WaitlistEntry]) -> Vec<u32> {
        let mut p: Vec<u32> = entries.iter().map(|e| e.position).collect();
        p.sort_unstable();
        p
    }

    /// Fails the first `failures` saves, then delegates to memory.
    struct FlakyBackend {
        failures: AtomicU32,
        calls: AtomicU32,
        inner: MemoryBackend,
    }

    impl FlakyBackend {
        fn new(failures: u32) -> Self {
            Self {
                failures: AtomicU32::new(failures),
                calls: AtomicU32::new(0),
                inner: MemoryBackend::new(),
            }
        }
    }

    impl EntryBackend for FlakyBackend {
        fn load_all(&self) -> anyhow::Result<Vec<WaitlistEntry>> {
            self.inner.load_all()
        }

        fn save_event(&self, event_id: &EventId, entries: &[WaitlistEntry]) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(anyhow!("disk unavailable"));
            }
            self.inner.save_event(event_id, entries)
        }
    }

    fn quick_retry(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_add_assigns_tail_positions() {
        let store = EntryStore::in_memory();
        let event = EventId::new("camp");

        let mut txn = store.lock_event(&event).await;
        let a = txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();
        let b = txn.add(new_entry("camp", "b", Priority::Vip)).unwrap();
        let c = txn.add(new_entry("camp", "c", Priority::Normal)).unwrap();
        txn.commit().await.unwrap();

        assert_eq!((a.position, b.position, c.position), (1, 2, 3));
        let waiting = store.list_waiting(&event).await;
        let campers: Vec<&str> = waiting.iter().map(|e| e.camper_id.as_str()).collect();
        assert_eq!(campers, vec!["b", "a", "c"]);
    }

    #[tokio::test]
    async fn test_add_rejects_duplicate_active_camper() {
        let store = EntryStore::in_memory();
        let event = EventId::new("camp");

        let mut txn = store.lock_event(&event).await;
        let first = txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();
        let err = txn.add(new_entry("camp", "a", Priority::Vip)).unwrap_err();
        assert!(matches!(err, WaitlistError::DuplicateActiveEntry { existing, .. } if existing == first.id));

        // Once terminal the camper may join again as a new entry
        txn.update_status(&first.id, EntryStatus::Offered, Some(Utc::now()))
            .unwrap();
        txn.update_status(&first.id, EntryStatus::Declined, None).unwrap();
        assert!(txn.add(new_entry("camp", "a", Priority::Normal)).is_ok());
    }

    #[tokio::test]
    async fn test_same_camper_in_two_events() {
        let store = EntryStore::in_memory();
        for event in ["camp", "hike"] {
            let mut txn = store.lock_event(&EventId::new(event)).await;
            txn.add(new_entry(event, "a", Priority::Normal)).unwrap();
            txn.commit().await.unwrap();
        }
        assert_eq!(store.event_ids().await.len(), 2);
    }

    #[tokio::test]
    async fn test_update_status_validates_transitions() {
        let store = EntryStore::in_memory();
        let mut txn = store.lock_event(&EventId::new("camp")).await;
        let a = txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();

        let err = txn.update_status(&a.id, EntryStatus::Accepted, None).unwrap_err();
        assert!(matches!(
            err,
            WaitlistError::InvalidTransition { from: EntryStatus::Waiting, to: EntryStatus::Accepted, .. }
        ));

        // Offered without a deadline is refused
        assert!(txn.update_status(&a.id, EntryStatus::Offered, None).is_err());

        let deadline = Utc::now() + ChronoDuration::hours(48);
        let offered = txn
            .update_status(&a.id, EntryStatus::Offered, Some(deadline))
            .unwrap();
        assert_eq!(offered.expires_at, Some(deadline));

        let accepted = txn
            .update_status(&a.id, EntryStatus::Accepted, Some(deadline))
            .unwrap();
        assert_eq!(accepted.expires_at, None);
    }

    #[tokio::test]
    async fn test_leaving_waiting_keeps_positions_contiguous() {
        let store = EntryStore::in_memory();
        let event = EventId::new("camp");
        let mut txn = store.lock_event(&event).await;
        let ids: Vec<EntryId> = ["a", "b", "c", "d"]
            .iter()
            .map(|c| txn.add(new_entry("camp", c, Priority::Normal)).unwrap().id)
            .collect();

        let offered = txn
            .update_status(&ids[1], EntryStatus::Offered, Some(Utc::now()))
            .unwrap();
        // Offered entry keeps its last position for audit
        assert_eq!(offered.position, 2);

        txn.remove(&ids[0]).unwrap();
        txn.commit().await.unwrap();

        let waiting = store.list_waiting(&event).await;
        assert_eq!(positions(&waiting), vec![1, 2]);
        assert_eq!(waiting[0].id, ids[2]);
        assert_eq!(waiting[1].id, ids[3]);
    }

    #[tokio::test]
    async fn test_set_positions() {
        let store = EntryStore::in_memory();
        let event = EventId::new("camp");
        let mut txn = store.lock_event(&event).await;
        let ids: Vec<EntryId> = ["a", "b", "c"]
            .iter()
            .map(|c| txn.add(new_entry("camp", c, Priority::Normal)).unwrap().id)
            .collect();

        let reversed: Vec<EntryId> = ids.iter().rev().copied().collect();
        txn.set_positions(&reversed).unwrap();
        txn.commit().await.unwrap();

        let waiting = store.list_waiting(&event).await;
        let got: Vec<EntryId> = waiting.iter().map(|e| e.id).collect();
        assert_eq!(got, reversed);
        assert_eq!(positions(&waiting), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_set_positions_mismatch() {
        let store = EntryStore::in_memory();
        let mut txn = store.lock_event(&EventId::new("camp")).await;
        let a = txn.add(new_entry("camp", "a", Priority::Normal)).unwrap().id;
        let b = txn.add(new_entry("camp", "b", Priority::Normal)).unwrap().id;

        let missing = txn.set_positions(&[a]).unwrap_err();
        assert!(matches!(missing, WaitlistError::PositionSetMismatch { .. }));

        let duplicate = txn.set_positions(&[a, a]).unwrap_err();
        assert!(matches!(duplicate, WaitlistError::PositionSetMismatch { .. }));

        let stranger = txn.set_positions(&[a, b, EntryId::new()]).unwrap_err();
        assert!(matches!(stranger, WaitlistError::PositionSetMismatch { .. }));

        txn.update_status(&b, EntryStatus::Offered, Some(Utc::now())).unwrap();
        let not_waiting = txn.set_positions(&[a, b]).unwrap_err();
        assert!(matches!(not_waiting, WaitlistError::PositionSetMismatch { .. }));
        assert!(txn.set_positions(&[a]).is_ok());
    }

    #[tokio::test]
    async fn test_dropped_txn_discards_changes() {
        let store = EntryStore::in_memory();
        let event = EventId::new("camp");
        {
            let mut txn = store.lock_event(&event).await;
            txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();
        }
        assert!(store.list_waiting(&event).await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_entry_and_index() {
        let store = EntryStore::in_memory();
        let event = EventId::new("camp");
        let mut txn = store.lock_event(&event).await;
        let a = txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();
        txn.commit().await.unwrap();

        assert_eq!(store.event_of(&a.id).await.unwrap(), event);
        assert_eq!(store.get(&event, &a.id).await.unwrap().id, a.id);
        assert!(store.get(&EventId::new("nope"), &a.id).await.is_err());

        let mut txn = store.lock_entry(&a.id).await.unwrap();
        txn.remove(&a.id).unwrap();
        txn.commit().await.unwrap();

        assert!(matches!(
            store.get_by_id(&a.id).await,
            Err(WaitlistError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_commit_retries_then_succeeds() {
        let backend = Arc::new(FlakyBackend::new(2));
        let store = EntryStore::new(backend.clone(), quick_retry(3));
        let event = EventId::new("camp");

        let mut txn = store.lock_event(&event).await;
        txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();
        txn.commit().await.unwrap();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.list_waiting(&event).await.len(), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_no_trace() {
        let backend = Arc::new(FlakyBackend::new(5));
        let store = EntryStore::new(backend.clone(), quick_retry(2));
        let event = EventId::new("camp");

        let mut txn = store.lock_event(&event).await;
        let a = txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();
        let err = txn.commit().await.unwrap_err();

        assert!(matches!(err, WaitlistError::PersistenceFailed { attempts: 2, .. }));
        assert!(store.list_waiting(&event).await.is_empty());
        assert!(store.event_of(&a.id).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_first_add_leaves_no_event() {
        let backend = Arc::new(FlakyBackend::new(5));
        let store = EntryStore::new(backend.clone(), quick_retry(2));
        let event = EventId::new("camp");

        let mut txn = store.lock_event(&event).await;
        let a = txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();
        assert!(txn.commit().await.is_err());

        assert!(store.event_ids().await.is_empty());
        assert!(matches!(
            store.lock_existing_event(&event).await,
            Err(WaitlistError::NotFound(_))
        ));
        assert!(matches!(store.get(&event, &a.id).await, Err(WaitlistError::NotFound(_))));
        assert!(backend.inner.snapshot(&event).is_none());
    }

    #[tokio::test]
    async fn test_lock_existing_event_requires_entries() {
        let store = EntryStore::in_memory();
        let event = EventId::new("camp");
        assert!(matches!(
            store.lock_existing_event(&event).await,
            Err(WaitlistError::NotFound(_))
        ));
        assert!(store.event_ids().await.is_empty());

        let mut txn = store.lock_event(&event).await;
        txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();
        txn.commit().await.unwrap();

        let txn = store.lock_existing_event(&event).await.unwrap();
        assert_eq!(txn.entries().count(), 1);
        drop(txn);
        assert_eq!(store.event_ids().await, vec![event]);
    }

    #[tokio::test]
    async fn test_open_rebuilds_queues() {
        let backend = Arc::new(MemoryBackend::new());
        let event = EventId::new("camp");
        let first_id = {
            let store = EntryStore::new(backend.clone(), RetryPolicy::default());
            let mut txn = store.lock_event(&event).await;
            let a = txn.add(new_entry("camp", "a", Priority::Normal)).unwrap();
            txn.add(new_entry("camp", "b", Priority::High)).unwrap();
            txn.commit().await.unwrap();
            a.id
        };

        let reopened = EntryStore::open(backend, RetryPolicy::default()).unwrap();
        let waiting = reopened.list_waiting(&event).await;
        assert_eq!(waiting.len(), 2);
        assert_eq!(waiting[0].camper_id.as_str(), "b");
        assert_eq!(reopened.event_of(&first_id).await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_open_repairs_position_gaps() {
        let backend = Arc::new(MemoryBackend::new());
        let event = EventId::new("camp");
        let mut a = new_entry("camp", "a", Priority::Normal);
        a.position = 4;
        let mut b = new_entry("camp", "b", Priority::Normal);
        b.position = 9;
        backend.save_event(&event, &[a, b]).unwrap();

        let store = EntryStore::open(backend, RetryPolicy::default()).unwrap();
        assert_eq!(positions(&store.list_waiting(&event).await), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_entries_with_status_spans_events() {
        let store = EntryStore::in_memory();
        for event in ["camp", "hike"] {
            let mut txn = store.lock_event(&EventId::new(event)).await;
            let e = txn.add(new_entry(event, "a", Priority::Normal)).unwrap();
            txn.update_status(&e.id, EntryStatus::Offered, Some(Utc::now()))
                .unwrap();
            txn.add(new_entry(event, "b", Priority::Normal)).unwrap();
            txn.commit().await.unwrap();
        }
        assert_eq!(store.entries_with_status(EntryStatus::Offered).await.len(), 2);
        assert_eq!(store.entries_with_status(EntryStatus::Waiting).await.len(), 2);
    }
}
