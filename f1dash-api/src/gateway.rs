//! Session cache gateway
//!
//! Single entry point for session data. A cache hit returns the stored
//! payload unchanged; a miss runs the analysis engine, caches the payload
//! together with its derived lap records, and returns it. Failed fetches
//! write nothing.
//!
//! Concurrent misses for the same key are coalesced: callers queue on a
//! per-key lock and re-check the store once they hold it, so only the first
//! caller spawns the analysis process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};

use f1dash_common::{LapRecord, SessionKey, SessionRecord};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::engine::{AnalysisEngine, EngineCommand, EngineError};
use crate::store::{InsertOutcome, SessionStore};
use crate::validation::key_args;

/// Session gateway failure
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Fetching from the analysis engine failed
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Reading or writing the cache failed
    #[error("Session store error: {0}")]
    Store(#[from] f1dash_common::Error),
}

/// Whether a lookup was served from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

/// Session payload plus how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct SessionLookup {
    pub payload: Value,
    pub status: CacheStatus,
}

type InflightMap = StdMutex<HashMap<SessionKey, Arc<Mutex<()>>>>;

/// Cache-or-fetch access to session data
pub struct SessionGateway {
    store: Arc<dyn SessionStore>,
    engine: Arc<dyn AnalysisEngine>,
    inflight: InflightMap,
}

impl SessionGateway {
    pub fn new(store: Arc<dyn SessionStore>, engine: Arc<dyn AnalysisEngine>) -> Self {
        Self {
            store,
            engine,
            inflight: StdMutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Return the session for `key`, fetching and caching it on a miss
    ///
    /// The full session is always what gets cached. When `drivers` is given,
    /// the returned payload is narrowed to those drivers.
    pub async fn get_or_fetch_session(
        &self,
        key: &SessionKey,
        drivers: Option<&[String]>,
    ) -> Result<SessionLookup, GatewayError> {
        if let Some(record) = self.store.get(key).await? {
            debug!(key = %key, "Session cache hit");
            return Ok(SessionLookup {
                payload: select_drivers(record.payload, drivers),
                status: CacheStatus::Hit,
            });
        }

        let _slot = InflightSlot::acquire(&self.inflight, key).await;

        // Another request may have filled the cache while we waited
        if let Some(record) = self.store.get(key).await? {
            debug!(key = %key, "Session cache hit after in-flight fetch");
            return Ok(SessionLookup {
                payload: select_drivers(record.payload, drivers),
                status: CacheStatus::Hit,
            });
        }

        info!(key = %key, "Session cache miss, fetching");
        let payload = self
            .engine
            .invoke(EngineCommand::Session, &key_args(key))
            .await?;

        let record = SessionRecord::new(key.clone(), payload);
        let laps = LapRecord::from_payload(record.id, &record.payload);
        let lap_count = laps.len();

        let record = match self.store.insert(record, laps).await? {
            InsertOutcome::Inserted(record) => {
                info!(key = %key, session_id = %record.id, laps = lap_count, "Session cached");
                record
            }
            InsertOutcome::Existing(record) => {
                debug!(key = %key, "Session was cached by another writer");
                record
            }
        };

        Ok(SessionLookup {
            payload: select_drivers(record.payload, drivers),
            status: CacheStatus::Miss,
        })
    }
}

/// Held while fetching one key; releases the map entry on drop
struct InflightSlot<'a> {
    map: &'a InflightMap,
    key: SessionKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<'a> InflightSlot<'a> {
    async fn acquire(map: &'a InflightMap, key: &SessionKey) -> InflightSlot<'a> {
        let lock = {
            let mut inflight = lock_map(map);
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };

        InflightSlot {
            map,
            key: key.clone(),
            guard: Some(lock.lock_owned().await),
        }
    }
}

impl Drop for InflightSlot<'_> {
    fn drop(&mut self) {
        // Release the key lock before inspecting the waiter count
        self.guard.take();

        let mut inflight = lock_map(self.map);
        let idle = inflight
            .get(&self.key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1);
        if idle {
            inflight.remove(&self.key);
        }
    }
}

fn lock_map(map: &InflightMap) -> std::sync::MutexGuard<'_, HashMap<SessionKey, Arc<Mutex<()>>>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Narrow a session payload to the given drivers
///
/// Only the `drivers` and `laps` arrays are filtered; everything else is
/// returned as cached.
fn select_drivers(mut payload: Value, drivers: Option<&[String]>) -> Value {
    let Some(wanted) = drivers.filter(|d| !d.is_empty()) else {
        return payload;
    };
    let is_wanted = |name: Option<&str>| name.is_some_and(|n| wanted.iter().any(|w| w == n));

    if let Some(list) = payload.get_mut("drivers").and_then(Value::as_array_mut) {
        list.retain(|d| is_wanted(d.as_str()));
    }
    if let Some(laps) = payload.get_mut("laps").and_then(Value::as_array_mut) {
        laps.retain(|lap| is_wanted(lap.get("driver").and_then(Value::as_str)));
    }

    payload
}
