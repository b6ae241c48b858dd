use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

use crate::models::{EventId, WaitlistEntry};

/// File name prefix for per-event snapshots
const EVENT_FILE_PREFIX: &str = "event_";

/// Storage the entry store writes each committed event snapshot to.
///
/// `save_event` receives the complete set of entries for one event and is
/// called while that event's lock is held, so writes for one event are
/// never interleaved.
pub trait EntryBackend: Send + Sync {
    fn load_all(&self) -> Result<Vec<WaitlistEntry>>;

    fn save_event(&self, event_id: &EventId, entries: &[WaitlistEntry]) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredData<T> {
    pub data: T,
    pub saved_at: DateTime<Utc>,
}

impl<T> StoredData<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            saved_at: Utc::now(),
        }
    }
}

/// Keeps the last snapshot per event. Nothing survives the process, but a
/// second store opened on the same backend sees the same entries.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    snapshots: Mutex<HashMap<EventId, Vec<WaitlistEntry>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, event_id: &EventId) -> Option<Vec<WaitlistEntry>> {
        self.lock().get(event_id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<EventId, Vec<WaitlistEntry>>> {
        self.snapshots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl EntryBackend for MemoryBackend {
    fn load_all(&self) -> Result<Vec<WaitlistEntry>> {
        Ok(self.lock().values().flatten().cloned().collect())
    }

    fn save_event(&self, event_id: &EventId, entries: &[WaitlistEntry]) -> Result<()> {
        self.lock().insert(event_id.clone(), entries.to_vec());
        Ok(())
    }
}

pub struct JsonFileBackend {
    data_dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir).with_context(|| {
            format!("Failed to create data directory: {}", data_dir.display())
        })?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn event_path(&self, event_id: &EventId) -> PathBuf {
        self.data_dir
            .join(format!("{}{}.json", EVENT_FILE_PREFIX, file_stem(event_id)))
    }

    fn load<T: DeserializeOwned>(path: &Path) -> Result<StoredData<T>> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read data file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse data file: {}", path.display()))
    }

    fn save<T: Serialize>(path: &Path, data: &T) -> Result<()> {
        let stored = StoredData::new(data);
        let contents = serde_json::to_string_pretty(&stored)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write data file: {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("Failed to replace data file: {}", path.display()))?;
        Ok(())
    }
}

impl EntryBackend for JsonFileBackend {
    fn load_all(&self) -> Result<Vec<WaitlistEntry>> {
        let mut entries = Vec::new();
        let dir = std::fs::read_dir(&self.data_dir).with_context(|| {
            format!("Failed to list data directory: {}", self.data_dir.display())
        })?;

        for item in dir {
            let path = item?.path();
            let is_event_file = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(EVENT_FILE_PREFIX) && n.ends_with(".json"))
                .unwrap_or(false);
            if !is_event_file {
                continue;
            }
            let stored: StoredData<Vec<WaitlistEntry>> = Self::load(&path)?;
            debug!(path = %path.display(), count = stored.data.len(), "Loaded event snapshot");
            entries.extend(stored.data);
        }
        Ok(entries)
    }

    fn save_event(&self, event_id: &EventId, entries: &[WaitlistEntry]) -> Result<()> {
        Self::save(&self.event_path(event_id), &entries)
    }
}

/// Event ids are caller-supplied; keep file names portable.
fn file_stem(event_id: &EventId) -> String {
    let mut stem = String::with_capacity(event_id.as_str().len());
    for c in event_id.as_str().chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            stem.push(c);
        } else {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                stem.push_str(&format!("_{:02x}", byte));
            }
        }
    }
    stem
}
