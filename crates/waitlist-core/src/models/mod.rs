//! Data models for waitlist entities.
//!
//! This module contains the data structures used to represent
//! one event's waitlist:
//!
//! - `WaitlistEntry`: one camper's place in one event's queue
//! - `EntryStatus`: lifecycle state (waiting, offered, accepted, declined, expired)
//! - `Priority`: coarse precedence tier (vip > high > normal)
//! - `EntryId`, `EventId`, `CamperId`: identifier newtypes
//! - `WaitlistSummary`: per-status counts for event views

pub mod entry;
pub mod summary;

pub use entry::{CamperId, EntryId, EntryStatus, EventId, Priority, WaitlistEntry};
pub use summary::WaitlistSummary;
