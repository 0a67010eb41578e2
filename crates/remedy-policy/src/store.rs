//! Durable `(state, action)` value estimates: the policy's memory.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type for value-store operations.
pub type StoreResult<T> = Result<T, PolicyStoreError>;

/// Errors returned by value-store and persistence implementations.
#[derive(Debug, Error)]
pub enum PolicyStoreError {
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Learned estimate and exploration evidence for one `(state, action)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueEntry {
    pub estimate: f64,
    pub visit_count: u64,
    pub last_updated: DateTime<Utc>,
}

impl Default for ValueEntry {
    fn default() -> Self {
        Self {
            estimate: 0.0,
            visit_count: 0,
            last_updated: DateTime::UNIX_EPOCH,
        }
    }
}

/// A keyed value entry as it appears in snapshots and durable storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueRecord {
    pub state: String,
    pub action: String,
    pub estimate: f64,
    pub visit_count: u64,
    pub last_updated: DateTime<Utc>,
}

/// Durable backend contract behind the in-memory table.
pub trait PolicyPersistence: Send + Sync {
    fn load(&self) -> StoreResult<Vec<ValueRecord>>;
    fn save_record(&self, record: &ValueRecord) -> StoreResult<()>;
    fn save_all(&self, records: &[ValueRecord]) -> StoreResult<()>;
}

/// Volatile backend for tests and local experimentation.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    rows: Mutex<Vec<ValueRecord>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PolicyPersistence for InMemoryPersistence {
    fn load(&self) -> StoreResult<Vec<ValueRecord>> {
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save_record(&self, record: &ValueRecord) -> StoreResult<()> {
        let mut rows = self
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match rows
            .iter_mut()
            .find(|row| row.state == record.state && row.action == record.action)
        {
            Some(row) => *row = record.clone(),
            None => rows.push(record.clone()),
        }
        Ok(())
    }

    fn save_all(&self, records: &[ValueRecord]) -> StoreResult<()> {
        let mut rows = self
            .rows
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *rows = records.to_vec();
        Ok(())
    }
}

/// Concurrent value table fronting a durable backend.
///
/// All access goes through `get`/`snapshot`/`best_estimate`/`total_visits`/
/// `commit`; the underlying map is never exposed. A `commit` mutates the
/// entry and persists it as one atomic unit while the write lock is held, so
/// snapshots never observe a torn update. When persistence fails the
/// in-memory update stays visible to subsequent selections and the error is
/// surfaced to the caller.
pub struct ValueStore {
    entries: RwLock<HashMap<(String, String), ValueEntry>>,
    persistence: Box<dyn PolicyPersistence>,
}

impl ValueStore {
    /// Opens a store over `persistence`, loading every previously saved row.
    pub fn open(persistence: Box<dyn PolicyPersistence>) -> StoreResult<Self> {
        let mut entries = HashMap::new();
        for record in persistence.load()? {
            entries.insert(
                (record.state, record.action),
                ValueEntry {
                    estimate: record.estimate,
                    visit_count: record.visit_count,
                    last_updated: record.last_updated,
                },
            );
        }
        tracing::debug!(pairs = entries.len(), "value store loaded");
        Ok(Self {
            entries: RwLock::new(entries),
            persistence,
        })
    }

    /// Store with a fresh in-memory backend; nothing survives the process.
    pub fn ephemeral() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            persistence: Box::new(InMemoryPersistence::new()),
        }
    }

    /// Current entry for `(state, action)`, zero-valued when never updated.
    pub fn get(&self, state: &str, action: &str) -> ValueEntry {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        entries
            .get(&(state.to_string(), action.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Best estimate among `candidates` for `state`; 0.0 when none exist.
    ///
    /// Unvisited candidates contribute their zero default, matching the
    /// lazily-created entry semantics.
    pub fn best_estimate(&self, state: &str, candidates: &[String]) -> f64 {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        candidates
            .iter()
            .map(|action| {
                entries
                    .get(&(state.to_string(), action.clone()))
                    .map(|entry| entry.estimate)
                    .unwrap_or(0.0)
            })
            .fold(None::<f64>, |best, estimate| {
                Some(best.map_or(estimate, |value| value.max(estimate)))
            })
            .unwrap_or(0.0)
    }

    /// Total visits across `candidates` for `state`; the UCB evidence base.
    pub fn total_visits(&self, state: &str, candidates: &[String]) -> u64 {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        candidates
            .iter()
            .map(|action| {
                entries
                    .get(&(state.to_string(), action.clone()))
                    .map(|entry| entry.visit_count)
                    .unwrap_or(0)
            })
            .sum()
    }

    /// Commits one learning step: sets the estimate, increments the visit
    /// count by exactly 1, stamps the update time, and synchronously
    /// persists the row before the lock is released.
    ///
    /// On persistence failure the in-memory entry keeps the new values and
    /// the error is returned for the caller to report.
    pub fn commit(&self, state: &str, action: &str, new_estimate: f64) -> StoreResult<ValueEntry> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let entry = entries
            .entry((state.to_string(), action.to_string()))
            .or_default();
        entry.estimate = new_estimate;
        entry.visit_count += 1;
        entry.last_updated = Utc::now();
        let committed = *entry;

        let record = ValueRecord {
            state: state.to_string(),
            action: action.to_string(),
            estimate: committed.estimate,
            visit_count: committed.visit_count,
            last_updated: committed.last_updated,
        };
        self.persistence.save_record(&record)?;
        Ok(committed)
    }

    /// Internally consistent snapshot of every entry, sorted by key.
    pub fn snapshot(&self) -> Vec<ValueRecord> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut records: Vec<ValueRecord> = entries
            .iter()
            .map(|((state, action), entry)| ValueRecord {
                state: state.clone(),
                action: action.clone(),
                estimate: entry.estimate,
                visit_count: entry.visit_count,
                last_updated: entry.last_updated,
            })
            .collect();
        records.sort_by(|left, right| {
            (left.state.as_str(), left.action.as_str())
                .cmp(&(right.state.as_str(), right.action.as_str()))
        });
        records
    }

    /// Writes the full table to the backend (used by bulk migrations).
    pub fn persist_all(&self) -> StoreResult<()> {
        let records = self.snapshot();
        self.persistence.save_all(&records)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ValueStore {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ValueStore")
            .field("pairs", &self.len())
            .finish()
    }
}
