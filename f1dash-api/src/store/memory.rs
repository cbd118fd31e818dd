//! In-process session store

use std::collections::HashMap;

use async_trait::async_trait;
use f1dash_common::{LapRecord, Result, SessionKey, SessionRecord};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{InsertOutcome, SessionStore};

#[derive(Debug, Default)]
struct Inner {
    sessions: HashMap<SessionKey, SessionRecord>,
    laps: HashMap<Uuid, Vec<LapRecord>>,
}

/// Session store held in memory for the lifetime of the process
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: RwLock<Inner>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>> {
        Ok(self.inner.read().await.sessions.get(key).cloned())
    }

    async fn insert(&self, record: SessionRecord, laps: Vec<LapRecord>) -> Result<InsertOutcome> {
        let mut inner = self.inner.write().await;

        if let Some(existing) = inner.sessions.get(&record.key) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        inner.laps.insert(record.id, laps);
        inner.sessions.insert(record.key.clone(), record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn laps(&self, session_id: Uuid) -> Result<Vec<LapRecord>> {
        Ok(self
            .inner
            .read()
            .await
            .laps
            .get(&session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn session_count(&self) -> Result<usize> {
        Ok(self.inner.read().await.sessions.len())
    }
}
