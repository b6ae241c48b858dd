//! Fire-and-forget hooks into the messaging collaborator.
//!
//! Hooks run after a transition has been committed and the event lock has
//! been released. A failing hook is logged and otherwise ignored.

use anyhow::Result;
use tracing::info;

use crate::models::WaitlistEntry;

pub trait Notifier: Send + Sync {
    /// A seat was offered to `entry`; `entry.expires_at` holds the deadline.
    fn notify_offer(&self, entry: &WaitlistEntry) -> Result<()>;

    /// The offer held by `entry` ran out without an answer.
    fn notify_expired(&self, entry: &WaitlistEntry) -> Result<()>;
}

/// Writes each notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify_offer(&self, entry: &WaitlistEntry) -> Result<()> {
        info!(
            event_id = %entry.event_id,
            entry_id = %entry.id,
            camper_id = %entry.camper_id,
            expires_at = ?entry.expires_at,
            "Offer notification"
        );
        Ok(())
    }

    fn notify_expired(&self, entry: &WaitlistEntry) -> Result<()> {
        info!(
            event_id = %entry.event_id,
            entry_id = %entry.id,
            camper_id = %entry.camper_id,
            "Expiry notification"
        );
        Ok(())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify_offer(&self, _entry: &WaitlistEntry) -> Result<()> {
        Ok(())
    }

    fn notify_expired(&self, _entry: &WaitlistEntry) -> Result<()> {
        Ok(())
    }
}
