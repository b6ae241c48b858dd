//! Manual drag-to-reorder of waiting entries.
//!
//! A reorder may shuffle entries inside their priority tier but never
//! across tiers. The request must name every waiting entry of the event
//! exactly once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{WaitlistError, WaitlistResult};
use crate::models::{EntryId, EventId, WaitlistEntry};
use crate::ordering::PriorityOrderer;
use crate::store::EntryStore;

/// One row of a reorder payload: where the UI dropped `entry_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReorderItem {
    pub entry_id: EntryId,
    pub position: u32,
}

impl ReorderItem {
    pub fn new(entry_id: EntryId, position: u32) -> Self {
        Self { entry_id, position }
    }
}

pub struct ReorderCoordinator {
    store: Arc<EntryStore>,
}

impl ReorderCoordinator {
    pub fn new(store: Arc<EntryStore>) -> Self {
        Self { store }
    }

    /// Apply a `{entry_id, position}` payload. Positions only need to be
    /// distinct; entries are placed in ascending position order.
    pub async fn reorder(
        &self,
        event_id: &EventId,
        items: &[ReorderItem],
    ) -> WaitlistResult<Vec<WaitlistEntry>> {
        let ordered = ordered_ids(event_id, items)?;
        self.reorder_ids(event_id, &ordered).await
    }

    /// Apply the full intended order of waiting entries.
    pub async fn reorder_ids(
        &self,
        event_id: &EventId,
        ordered: &[EntryId],
    ) -> WaitlistResult<Vec<WaitlistEntry>> {
        let mut txn = self.store.lock_existing_event(event_id).await?;

        let waiting: HashMap<EntryId, &WaitlistEntry> = txn
            .entries()
            .filter(|e| e.is_waiting())
            .map(|e| (e.id, e))
            .collect();
        let requested: HashSet<&EntryId> = ordered.iter().collect();
        if requested.len() != ordered.len()
            || requested.len() != waiting.len()
            || !requested.iter().all(|id| waiting.contains_key(*id))
        {
            return Err(WaitlistError::mismatch(
                event_id,
                format!(
                    "request names {} entries, {} are waiting",
                    ordered.len(),
                    waiting.len()
                ),
            ));
        }

        let in_request_order = ordered.iter().filter_map(|id| waiting.get(id).copied());
        if let Some(moved) = PriorityOrderer::first_tier_violation(in_request_order) {
            return Err(WaitlistError::CrossTierReorder {
                event_id: event_id.clone(),
                entry_id: moved.id,
                tier: moved.priority,
            });
        }

        txn.set_positions(ordered)?;
        let reordered = txn.list_waiting();
        txn.commit().await?;

        info!(event_id = %event_id, entries = ordered.len(), "Waitlist reordered");
        Ok(reordered)
    }
}

fn ordered_ids(event_id: &EventId, items: &[ReorderItem]) -> WaitlistResult<Vec<EntryId>> {
    let mut sorted = items.to_vec();
    sorted.sort_by_key(|item| item.position);
    if let Some(pair) = sorted.windows(2).find(|w| w[0].position == w[1].position) {
        return Err(WaitlistError::mismatch(
            event_id,
            format!("position {} given twice", pair[0].position),
        ));
    }
    if let Some(zero) = sorted.iter().find(|item| item.position == 0) {
        return Err(WaitlistError::mismatch(
            event_id,
            format!("entry {} has position 0; positions start at 1", zero.entry_id),
        ));
    }
    Ok(sorted.into_iter().map(|item| item.entry_id).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CamperId, Priority};
    use crate::store::{MemoryBackend, RetryPolicy};
    use chrono::Utc;

    async fn seeded(tiers: &[(&str, Priority)]) -> (Arc<EntryStore>, EventId, Vec<EntryId>) {
        let store = Arc::new(EntryStore::in_memory());
        let event = EventId::new("camp");
        let mut txn = store.lock_event(&event).await;
        let mut ids = Vec::new();
        for (camper, priority) in tiers {
            let entry = WaitlistEntry::new(
                event.clone(),
                CamperId::new(*camper),
                *priority,
                None,
                Utc::now(),
            );
            ids.push(txn.add(entry).unwrap().id);
        }
        txn.commit().await.unwrap();
        (store, event, ids)
    }

    fn campers(entries: &[WaitlistEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.camper_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_reorder_within_tier() {
        let (store, event, ids) = seeded(&[
            ("a", Priority::Normal),
            ("b", Priority::Normal),
            ("c", Priority::Normal),
        ])
        .await;
        let coordinator = ReorderCoordinator::new(store.clone());

        let items = vec![
            ReorderItem::new(ids[2], 1),
            ReorderItem::new(ids[0], 2),
            ReorderItem::new(ids[1], 3),
        ];
        let result = coordinator.reorder(&event, &items).await.unwrap();
        assert_eq!(campers(&result), vec!["c", "a", "b"]);
        assert_eq!(campers(&store.list_waiting(&event).await), vec!["c", "a", "b"]);
    }

    #[tokio::test]
    async fn test_reorder_with_multiple_tiers() {
        let (store, event, ids) = seeded(&[
            ("n1", Priority::Normal),
            ("v1", Priority::Vip),
            ("n2", Priority::Normal),
            ("v2", Priority::Vip),
        ])
        .await;
        let coordinator = ReorderCoordinator::new(store);

        // Swap within both tiers, tiers stay in block order
        let result = coordinator
            .reorder_ids(&event, &[ids[3], ids[1], ids[2], ids[0]])
            .await
            .unwrap();
        assert_eq!(campers(&result), vec!["v2", "v1", "n2", "n1"]);
        let positions: Vec<u32> = result.iter().map(|e| e.position).collect();
        assert_eq!(positions, vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_reorder_across_tiers_rejected() {
        let (store, event, ids) = seeded(&[
            ("v", Priority::Vip),
            ("n1", Priority::Normal),
            ("n2", Priority::Normal),
        ])
        .await;
        let coordinator = ReorderCoordinator::new(store.clone());

        let err = coordinator
            .reorder_ids(&event, &[ids[1], ids[0], ids[2]])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WaitlistError::CrossTierReorder { tier: Priority::Vip, entry_id, .. } if entry_id == ids[0]
        ));
        // Nothing changed
        assert_eq!(campers(&store.list_waiting(&event).await), vec!["v", "n1", "n2"]);
    }

    #[tokio::test]
    async fn test_reorder_set_mismatch() {
        let (store, event, ids) = seeded(&[("a", Priority::Normal), ("b", Priority::Normal)]).await;
        let coordinator = ReorderCoordinator::new(store);

        let missing = coordinator.reorder_ids(&event, &[ids[0]]).await.unwrap_err();
        assert!(matches!(missing, WaitlistError::PositionSetMismatch { .. }));

        let doubled = coordinator
            .reorder_ids(&event, &[ids[0], ids[0]])
            .await
            .unwrap_err();
        assert!(matches!(doubled, WaitlistError::PositionSetMismatch { .. }));

        let stranger = coordinator
            .reorder_ids(&event, &[ids[0], EntryId::new()])
            .await
            .unwrap_err();
        assert!(matches!(stranger, WaitlistError::PositionSetMismatch { .. }));
    }

    #[tokio::test]
    async fn test_reorder_unknown_event_is_not_found() {
        let backend = Arc::new(MemoryBackend::new());
        let store = Arc::new(EntryStore::new(backend.clone(), RetryPolicy::default()));
        let coordinator = ReorderCoordinator::new(Arc::clone(&store));
        let event = EventId::new("nowhere");

        let err = coordinator.reorder(&event, &[]).await.unwrap_err();
        assert!(matches!(err, WaitlistError::NotFound(_)));
        assert!(backend.snapshot(&event).is_none());
        assert!(store.event_ids().await.is_empty());
    }

    #[test]
    fn test_ordered_ids_sorts_by_position() {
        let event = EventId::new("camp");
        let (a, b) = (EntryId::new(), EntryId::new());
        let ids = ordered_ids(&event, &[ReorderItem::new(a, 5), ReorderItem::new(b, 2)]).unwrap();
        assert_eq!(ids, vec![b, a]);
    }

    #[test]
    fn test_ordered_ids_rejects_duplicate_and_zero_positions() {
        let event = EventId::new("camp");
        let (a, b) = (EntryId::new(), EntryId::new());
        assert!(ordered_ids(&event, &[ReorderItem::new(a, 1), ReorderItem::new(b, 1)]).is_err());
        assert!(ordered_ids(&event, &[ReorderItem::new(a, 0)]).is_err());
    }
}
