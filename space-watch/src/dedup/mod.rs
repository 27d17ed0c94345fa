//! Durable record of recordings that were already handled.
//!
//! The record is a flat JSON object mapping `"<username>|<title>"` to `true`.
//! It is read once at startup and rewritten as a complete snapshot on every
//! [`DedupStore::persist`], so a crash can lose at most the insertions made
//! since the last persist and never corrupts earlier entries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::utils::fs;
use crate::{Error, Result};

/// Separator between username and title in the on-disk key.
const KEY_SEPARATOR: char = '|';

/// Identity of one handled recording.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DedupKey {
    username: String,
    title: String,
}

impl DedupKey {
    pub fn new(username: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            title: title.into(),
        }
    }

    /// The key as stored on disk.
    pub fn record_key(&self) -> String {
        format!("{}{}{}", self.username, KEY_SEPARATOR, self.title)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.username, KEY_SEPARATOR, self.title)
    }
}

/// Shared set of handled recordings, optionally backed by a file.
///
/// Membership checks and inserts only take a short synchronous lock;
/// [`persist`](Self::persist) is serialized by an async mutex so two
/// near-simultaneous snapshots can't overwrite each other out of order.
pub struct DedupStore {
    path: Option<PathBuf>,
    entries: RwLock<BTreeSet<String>>,
    persist_lock: Mutex<()>,
}

impl DedupStore {
    /// Store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            entries: RwLock::new(BTreeSet::new()),
            persist_lock: Mutex::new(()),
        }
    }

    /// Load the record at `path`, treating a missing file as empty.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = read_record(&path).await?.unwrap_or_default();

        debug!(path = %path.display(), entries = entries.len(), "Loaded dedup record");

        Ok(Self {
            path: Some(path),
            entries: RwLock::new(entries),
            persist_lock: Mutex::new(()),
        })
    }

    /// Load the record at `path`, writing an empty one first if it is missing.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let existed = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| fs::io_error("checking", &path, e))?;

        let store = Self::load(path).await?;
        if !existed {
            store.persist().await?;
            info!(path = ?store.path(), "Created empty dedup record");
        }
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn contains(&self, key: &DedupKey) -> bool {
        self.entries.read().contains(&key.record_key())
    }

    /// Insert `key`. Returns `false` if it was already present.
    pub fn insert(&self, key: &DedupKey) -> bool {
        self.entries.write().insert(key.record_key())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of the raw on-disk keys, sorted.
    pub fn record_keys(&self) -> Vec<String> {
        self.entries.read().iter().cloned().collect()
    }

    /// Write the complete current set to disk, replacing the previous snapshot.
    ///
    /// A no-op for in-memory stores.
    pub async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.persist_lock.lock().await;

        let snapshot: BTreeMap<String, bool> = self
            .entries
            .read()
            .iter()
            .map(|key| (key.clone(), true))
            .collect();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        fs::write_atomic(path, &json).await?;
        debug!(path = %path.display(), entries = snapshot.len(), "Persisted dedup record");
        Ok(())
    }
}

impl fmt::Debug for DedupStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DedupStore")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}

/// Read the record file. `Ok(None)` when it doesn't exist.
///
/// Every key present counts as handled, whatever marker value it carries.
async fn read_record(path: &Path) -> Result<Option<BTreeSet<String>>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(fs::io_error("reading", path, e)),
    };

    if contents.trim().is_empty() {
        return Ok(Some(BTreeSet::new()));
    }

    let map: serde_json::Map<String, serde_json::Value> =
        serde_json::from_str(&contents).map_err(|e| {
            Error::Other(format!(
                "Dedup record {} is not a JSON object: {e}",
                path.display()
            ))
        })?;

    Ok(Some(map.into_iter().map(|(key, _)| key).collect()))
}
