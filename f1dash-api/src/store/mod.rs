//! Session cache store
//!
//! The store is the only shared mutable state in the service. Records are
//! immutable once written and inserts are insert-if-absent, so a key never
//! maps to more than one session record.

pub mod memory;
pub mod sqlite;

pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;

use f1dash_common::{LapRecord, Result, SessionKey, SessionRecord};
use uuid::Uuid;

/// Result of an insert-if-absent
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    /// The record and its laps were written
    Inserted(SessionRecord),
    /// The key was already cached; nothing was written
    Existing(SessionRecord),
}

impl InsertOutcome {
    /// The record now stored under the key
    pub fn into_record(self) -> SessionRecord {
        match self {
            InsertOutcome::Inserted(record) | InsertOutcome::Existing(record) => record,
        }
    }
}

/// Storage backend for cached sessions and their laps
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up the record cached under `key`
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>>;

    /// Store `record` and its `laps` unless the key is already cached
    ///
    /// Either both the record and all laps are written, or nothing is.
    async fn insert(&self, record: SessionRecord, laps: Vec<LapRecord>) -> Result<InsertOutcome>;

    /// Laps derived for a cached session
    async fn laps(&self, session_id: Uuid) -> Result<Vec<LapRecord>>;

    /// Number of cached sessions
    async fn session_count(&self) -> Result<usize>;
}
