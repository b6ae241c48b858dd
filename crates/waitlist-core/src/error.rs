use thiserror::Error;

use crate::models::{CamperId, EntryId, EntryStatus, EventId, Priority};

pub type WaitlistResult<T> = Result<T, WaitlistError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WaitlistError {
    #[error("Camper {camper_id} already has an active entry ({existing}) for event {event_id}")]
    DuplicateActiveEntry {
        event_id: EventId,
        camper_id: CamperId,
        existing: EntryId,
    },

    #[error("Entry {entry_id} cannot move from {from} to {to}")]
    InvalidTransition {
        entry_id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
    },

    #[error("Reorder for event {event_id} does not match the waiting set: {reason}")]
    PositionSetMismatch { event_id: EventId, reason: String },

    #[error("Reorder for event {event_id} moves {entry_id} ({tier}) across priority tiers")]
    CrossTierReorder {
        event_id: EventId,
        entry_id: EntryId,
        tier: Priority,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Persistence failed after {attempts} attempts: {message}")]
    PersistenceFailed { attempts: u32, message: String },
}

impl WaitlistError {
    pub fn entry_not_found(entry_id: &EntryId) -> Self {
        WaitlistError::NotFound(format!("entry {}", entry_id))
    }

    pub fn event_not_found(event_id: &EventId) -> Self {
        WaitlistError::NotFound(format!("event {}", event_id))
    }

    pub fn mismatch(event_id: &EventId, reason: impl Into<String>) -> Self {
        WaitlistError::PositionSetMismatch {
            event_id: event_id.clone(),
            reason: reason.into(),
        }
    }

    /// Every waitlist error is a per-request failure; none should stop the process.
    pub fn is_recoverable(&self) -> bool {
        true
    }

    /// Short message suitable for showing to staff.
    pub fn user_message(&self) -> String {
        match self {
            WaitlistError::DuplicateActiveEntry { camper_id, .. } => {
                format!("{} is already on this waitlist", camper_id)
            }
            WaitlistError::InvalidTransition { from, to, .. } => {
                format!("Cannot change an entry from {} to {}. Refresh and try again.", from, to)
            }
            WaitlistError::PositionSetMismatch { .. } => {
                "The waitlist changed while you were editing it. Refresh and try again.".to_string()
            }
            WaitlistError::CrossTierReorder { tier, .. } => {
                format!("A {} entry can only be moved within the {} tier", tier, tier)
            }
            WaitlistError::NotFound(what) => format!("Could not find {}", what),
            WaitlistError::PersistenceFailed { .. } => {
                "The change could not be saved. Nothing was modified; please retry.".to_string()
            }
        }
    }
}
