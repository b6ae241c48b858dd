//! Authoritative storage of waitlist entries.
//!
//! This module provides the `EntryStore`, which keeps every event's queue
//! behind its own lock, and the persistence backends it writes through:
//!
//! - `MemoryBackend`: keeps the last snapshot of each event in memory
//! - `JsonFileBackend`: one JSON file per event under a data directory
//!
//! All mutations go through an `EventTxn`, which stages changes on a copy
//! of the event's entries and publishes them only after the backend has
//! accepted the new snapshot.

pub mod backend;
pub mod entry_store;

pub use backend::{EntryBackend, JsonFileBackend, MemoryBackend, StoredData};
pub use entry_store::{EntryStore, EventTxn, RetryPolicy};
