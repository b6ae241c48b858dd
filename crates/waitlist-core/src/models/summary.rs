use serde::{Deserialize, Serialize};

use super::{EntryId, EntryStatus, EventId, WaitlistEntry};

/// Per-status counters for one event's waitlist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistSummary {
    pub event_id: Option<EventId>,
    pub waiting: usize,
    pub offered: usize,
    pub accepted: usize,
    pub declined: usize,
    pub expired: usize,
    /// Entries currently holding an open offer.
    pub offer_holders: Vec<EntryId>,
}

impl WaitlistSummary {
    pub fn from_entries<'a>(
        event_id: &EventId,
        entries: impl IntoIterator<Item = &'a WaitlistEntry>,
    ) -> Self {
        let mut summary = Self {
            event_id: Some(event_id.clone()),
            ..Self::default()
        };
        for entry in entries {
            match entry.status {
                EntryStatus::Waiting => summary.waiting += 1,
                EntryStatus::Offered => {
                    summary.offered += 1;
                    summary.offer_holders.push(entry.id);
                }
                EntryStatus::Accepted => summary.accepted += 1,
                EntryStatus::Declined => summary.declined += 1,
                EntryStatus::Expired => summary.expired += 1,
            }
        }
        summary
    }

    /// Entries still in play (waiting or offered).
    pub fn active(&self) -> usize {
        self.waiting + self.offered
    }

    pub fn total(&self) -> usize {
        self.active() + self.accepted + self.declined + self.expired
    }

    pub fn display(&self) -> String {
        format!(
            "Waiting: {} | Offered: {} | Accepted: {} | Declined: {} | Expired: {}",
            self.waiting, self.offered, self.accepted, self.declined, self.expired
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CamperId, Priority};
    use chrono::Utc;

    #[test]
    fn test_summary_counts() {
        let event = EventId::new("e1");
        let mut entries: Vec<WaitlistEntry> = (0..5)
            .map(|i| {
                WaitlistEntry::new(
                    event.clone(),
                    CamperId::new(format!("c{}", i)),
                    Priority::Normal,
                    None,
                    Utc::now(),
                )
            })
            .collect();
        entries[0].status = EntryStatus::Offered;
        entries[1].status = EntryStatus::Accepted;
        entries[2].status = EntryStatus::Expired;

        let summary = WaitlistSummary::from_entries(&event, &entries);
        assert_eq!(summary.waiting, 2);
        assert_eq!(summary.offered, 1);
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.expired, 1);
        assert_eq!(summary.active(), 3);
        assert_eq!(summary.total(), 5);
        assert_eq!(summary.offer_holders, vec![entries[0].id]);
        assert_eq!(
            summary.display(),
            "Waiting: 2 | Offered: 1 | Accepted: 1 | Declined: 0 | Expired: 1"
        );
    }
}
