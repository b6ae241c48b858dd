//! Canonical queue ordering.
//!
//! The queue is sorted by `(priority desc, position asc, created_at asc)`.
//! Everything here is pure so the promotion cascade can rely on the
//! same answer every time it asks "who is next".

use std::cmp::Ordering;

use crate::models::{EntryId, Priority, WaitlistEntry};

pub struct PriorityOrderer;

impl PriorityOrderer {
    /// Total order used for presentation and promotion.
    pub fn compare(a: &WaitlistEntry, b: &WaitlistEntry) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.created_at.cmp(&b.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    pub fn order(entries: &[WaitlistEntry]) -> Vec<WaitlistEntry> {
        let mut ordered = entries.to_vec();
        ordered.sort_by(Self::compare);
        ordered
    }

    /// Same as [`order`](Self::order) but over borrowed entries.
    pub fn order_refs<'a>(
        entries: impl IntoIterator<Item = &'a WaitlistEntry>,
    ) -> Vec<&'a WaitlistEntry> {
        let mut ordered: Vec<&WaitlistEntry> = entries.into_iter().collect();
        ordered.sort_by(|a, b| Self::compare(a, b));
        ordered
    }

    /// First waiting entry in canonical order.
    pub fn next_candidate<'a>(
        entries: impl IntoIterator<Item = &'a WaitlistEntry>,
    ) -> Option<&'a WaitlistEntry> {
        entries
            .into_iter()
            .filter(|e| e.is_waiting())
            .min_by(|a, b| Self::compare(a, b))
    }

    /// Position for a newly added entry: one past the current maximum.
    pub fn next_position<'a>(entries: impl IntoIterator<Item = &'a WaitlistEntry>) -> u32 {
        entries
            .into_iter()
            .filter(|e| e.is_waiting())
            .map(|e| e.position)
            .max()
            .unwrap_or(0)
            + 1
    }

    /// Waiting entries by position alone, ignoring tier. Used to renumber
    /// positions without changing anyone's relative place.
    pub fn arrival_order<'a>(
        entries: impl IntoIterator<Item = &'a WaitlistEntry>,
    ) -> Vec<EntryId> {
        let mut waiting: Vec<&WaitlistEntry> =
            entries.into_iter().filter(|e| e.is_waiting()).collect();
        waiting.sort_by(|a, b| {
            a.position
                .cmp(&b.position)
                .then_with(|| a.created_at.cmp(&b.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        waiting.into_iter().map(|e| e.id).collect()
    }

    /// Check that tiers appear as contiguous blocks in precedence order.
    /// Returns the first entry found out of its tier block.
    pub fn first_tier_violation<'a>(
        ordered: impl IntoIterator<Item = &'a WaitlistEntry>,
    ) -> Option<&'a WaitlistEntry> {
        let mut current: Option<Priority> = None;
        for entry in ordered {
            if let Some(tier) = current {
                if entry.priority > tier {
                    return Some(entry);
                }
            }
            current = Some(entry.priority);
        }
        None
    }
}
