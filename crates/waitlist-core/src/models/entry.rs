use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a waitlist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Identifier of the event whose queue an entry belongs to.
/// Supplied by the events collaborator and opaque here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a camper profile held by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CamperId(String);

impl CamperId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CamperId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Priority tier. Variant order gives the precedence: `Vip > High > Normal`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Vip,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Vip => "vip",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "vip" => Ok(Priority::Vip),
            other => Err(format!("unknown priority tier: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Waiting,
    Offered,
    Accepted,
    Declined,
    Expired,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Waiting => "waiting",
            EntryStatus::Offered => "offered",
            EntryStatus::Accepted => "accepted",
            EntryStatus::Declined => "declined",
            EntryStatus::Expired => "expired",
        }
    }

    /// Accepted, declined and expired entries never move again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EntryStatus::Accepted | EntryStatus::Declined | EntryStatus::Expired
        )
    }

    /// Waiting and offered entries count toward the one-active-entry-per-camper rule.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// The lifecycle graph:
    /// `waiting -> offered -> {accepted, declined, expired}`.
    pub fn can_transition_to(&self, next: EntryStatus) -> bool {
        matches!(
            (self, next),
            (EntryStatus::Waiting, EntryStatus::Offered)
                | (EntryStatus::Offered, EntryStatus::Accepted)
                | (EntryStatus::Offered, EntryStatus::Declined)
                | (EntryStatus::Offered, EntryStatus::Expired)
        )
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitlistEntry {
    pub id: EntryId,
    pub event_id: EventId,
    pub camper_id: CamperId,
    pub priority: Priority,
    pub status: EntryStatus,
    /// Only meaningful while `waiting`; other statuses keep their last value.
    pub position: u32,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl WaitlistEntry {
    /// Build a fresh `waiting` entry. Position is assigned by the store.
    pub fn new(
        event_id: EventId,
        camper_id: CamperId,
        priority: Priority,
        notes: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::new(),
            event_id,
            camper_id,
            priority,
            status: EntryStatus::Waiting,
            position: 0,
            expires_at: None,
            created_at,
            notes,
        }
    }

    pub fn is_waiting(&self) -> bool {
        self.status == EntryStatus::Waiting
    }

    pub fn is_offered(&self) -> bool {
        self.status == EntryStatus::Offered
    }

    /// True when an offer's acceptance window has run out at `now`.
    pub fn offer_lapsed(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.expires_at) {
            (EntryStatus::Offered, Some(expires_at)) => now >= expires_at,
            _ => false,
        }
    }

    /// Time left on an offer: "1d 4h", "35m", "expired".
    pub fn time_remaining_display(&self, now: DateTime<Utc>) -> Option<String> {
        let expires_at = self.expires_at?;
        let minutes = (expires_at - now).num_minutes();
        let text = if expires_at <= now {
            "expired".to_string()
        } else if minutes < 60 {
            format!("{}m", minutes.max(1))
        } else if minutes < 1440 {
            format!("{}h {}m", minutes / 60, minutes % 60)
        } else {
            format!("{}d {}h", minutes / 1440, (minutes % 1440) / 60)
        };
        Some(text)
    }
}
