//! Waitlist core - capacity-constrained enrollment queues for events.
//!
//! When an event is full, registrants join an ordered queue. When a seat
//! frees up the next entrant is offered it and a countdown starts; a
//! decline or a lapsed countdown passes the seat on to whoever is next.
//!
//! - [`models`]: entries, statuses, priority tiers
//! - [`ordering`]: canonical queue order
//! - [`store`]: per-event locked storage and persistence backends
//! - [`scheduler`]: offer expiry timers
//! - [`engine`]: state machine and cascading promotion
//! - [`reorder`]: manual reordering within a tier
//! - [`service`]: the operations exposed to the API layer

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod notify;
pub mod ordering;
pub mod reorder;
pub mod scheduler;
pub mod service;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::WaitlistConfig;
pub use engine::{Cascade, DeclineOutcome, PromotionEngine};
pub use error::{WaitlistError, WaitlistResult};
pub use models::{
    CamperId, EntryId, EntryStatus, EventId, Priority, WaitlistEntry, WaitlistSummary,
};
pub use notify::{LogNotifier, NoopNotifier, Notifier};
pub use ordering::PriorityOrderer;
pub use reorder::{ReorderCoordinator, ReorderItem};
pub use scheduler::{ExpiryNotice, OfferScheduler};
pub use service::{Waitlist, WaitlistBuilder};
pub use store::{EntryBackend, EntryStore, JsonFileBackend, MemoryBackend};
