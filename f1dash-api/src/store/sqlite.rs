//! SQLite-backed session store
//!
//! Schema is created by `f1dash_common::db`. A session row and its lap rows
//! are written in one transaction, so laps never exist without their session.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use f1dash_common::{Error, LapRecord, Result, SessionKey, SessionRecord};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use super::{InsertOutcome, SessionStore};

const SELECT_SESSION: &str = r#"
    SELECT id, payload, created_at
    FROM sessions
    WHERE year = ? AND grand_prix = ? AND session_type = ?
"#;

/// Session store persisted in the cache database
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn record_from_row(key: &SessionKey, row: &SqliteRow) -> Result<SessionRecord> {
    let id: String = row.try_get("id")?;
    let payload: String = row.try_get("payload")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(SessionRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid session id '{}': {}", id, e)))?,
        key: key.clone(),
        payload: serde_json::from_str(&payload)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| Error::Internal(format!("Failed to parse created_at: {}", e)))?
            .with_timezone(&Utc),
    })
}

fn lap_from_row(row: &SqliteRow) -> Result<LapRecord> {
    let session_id: String = row.try_get("session_id")?;
    let is_personal_best: i64 = row.try_get("is_personal_best")?;

    Ok(LapRecord {
        session_id: Uuid::parse_str(&session_id)
            .map_err(|e| Error::Internal(format!("Invalid session id '{}': {}", session_id, e)))?,
        driver: row.try_get("driver")?,
        lap_number: row.try_get("lap_number")?,
        lap_time: row.try_get("lap_time")?,
        sector1: row.try_get("sector1")?,
        sector2: row.try_get("sector2")?,
        sector3: row.try_get("sector3")?,
        compound: row.try_get("compound")?,
        is_personal_best: is_personal_best != 0,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get(&self, key: &SessionKey) -> Result<Option<SessionRecord>> {
        let row = sqlx::query(SELECT_SESSION)
            .bind(key.year())
            .bind(key.grand_prix())
            .bind(key.session_type().as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| record_from_row(key, &row)).transpose()
    }

    async fn insert(&self, record: SessionRecord, laps: Vec<LapRecord>) -> Result<InsertOutcome> {
        // Serialize before taking a connection
        let id = record.id.to_string();
        let payload = serde_json::to_string(&record.payload)?;
        let created_at = record.created_at.to_rfc3339();
        let key = &record.key;

        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO sessions (id, year, grand_prix, session_type, payload, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (year, grand_prix, session_type) DO NOTHING
            "#,
        )
        .bind(&id)
        .bind(key.year())
        .bind(key.grand_prix())
        .bind(key.session_type().as_str())
        .bind(&payload)
        .bind(&created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let row = sqlx::query(SELECT_SESSION)
                .bind(key.year())
                .bind(key.grand_prix())
                .bind(key.session_type().as_str())
                .fetch_one(&mut *tx)
                .await?;
            let existing = record_from_row(key, &row)?;
            tx.rollback().await?;
            debug!(key = %key, "Session already cached, insert skipped");
            return Ok(InsertOutcome::Existing(existing));
        }

        for lap in &laps {
            sqlx::query(
                r#"
                INSERT INTO laps (
                    session_id, driver, lap_number, lap_time,
                    sector1, sector2, sector3, compound, is_personal_best
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&lap.driver)
            .bind(lap.lap_number)
            .bind(lap.lap_time)
            .bind(lap.sector1)
            .bind(lap.sector2)
            .bind(lap.sector3)
            .bind(&lap.compound)
            .bind(lap.is_personal_best as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(key = %key, laps = laps.len(), "Session cached");

        Ok(InsertOutcome::Inserted(record))
    }

    async fn laps(&self, session_id: Uuid) -> Result<Vec<LapRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, driver, lap_number, lap_time,
                   sector1, sector2, sector3, compound, is_personal_best
            FROM laps
            WHERE session_id = ?
            ORDER BY id
            "#,
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(lap_from_row).collect()
    }

    async fn session_count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use f1dash_common::db::{init_database, init_in_memory_database};
    use f1dash_common::SessionType;
    use serde_json::json;

    fn monza() -> SessionKey {
        SessionKey::new(2023, "Monza", SessionType::R)
    }

    fn payload() -> serde_json::Value {
        json!({
            "drivers": ["VER", "SAI"],
            "laps": [
                { "driver": "VER", "lapNumber": 1, "lapTime": 86.123, "sector1": 28.001,
                  "sector2": 29.5, "sector3": 28.622, "compound": "MEDIUM", "isPersonalBest": true },
                { "driver": "SAI", "lapNumber": 1, "lapTime": 86.9, "sector1": null,
                  "sector2": 29.7, "sector3": 28.9, "compound": "HARD", "isPersonalBest": false }
            ],
            "statistics": { "fastestLap": { "time": 86.123, "driver": "VER" } }
        })
    }

    #[tokio::test]
    async fn test_insert_and_reload_record_and_laps() {
        let store = SqliteSessionStore::new(init_in_memory_database().await.unwrap());
        let record = SessionRecord::new(monza(), payload());
        let laps = LapRecord::from_payload(record.id, &record.payload);

        let outcome = store.insert(record.clone(), laps.clone()).await.unwrap();
        assert!(matches!(outcome, InsertOutcome::Inserted(_)));

        let cached = store.get(&monza()).await.unwrap().expect("record cached");
        assert_eq!(cached.id, record.id);
        assert_eq!(cached.payload, record.payload);
        assert_eq!(cached.created_at.timestamp(), record.created_at.timestamp());

        assert_eq!(store.laps(record.id).await.unwrap(), laps);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let store = SqliteSessionStore::new(init_in_memory_database().await.unwrap());
        assert!(store.get(&monza()).await.unwrap().is_none());

        let other = SessionKey::new(2023, "Monza", SessionType::Q);
        let record = SessionRecord::new(other, payload());
        store.insert(record, Vec::new()).await.unwrap();
        assert!(store.get(&monza()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_returns_existing() {
        let store = SqliteSessionStore::new(init_in_memory_database().await.unwrap());
        let first = SessionRecord::new(monza(), payload());
        let second = SessionRecord::new(monza(), json!({ "drivers": [], "laps": [] }));

        let first_laps = LapRecord::from_payload(first.id, &first.payload);
        store.insert(first.clone(), first_laps).await.unwrap();

        let second_laps = LapRecord::from_payload(second.id, &payload());
        let outcome = store.insert(second.clone(), second_laps).await.unwrap();

        match outcome {
            InsertOutcome::Existing(existing) => assert_eq!(existing.id, first.id),
            other => panic!("expected Existing, got {:?}", other),
        }
        assert_eq!(store.session_count().await.unwrap(), 1);
        assert!(store.laps(second.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_precision_floats_survive_storage() {
        let store = SqliteSessionStore::new(init_in_memory_database().await.unwrap());
        let payload = json!({
            "laps": [
                { "driver": "VER", "lapNumber": 1, "lapTime": 124.52738143973751,
                  "sector1": 31.208000000000002, "sector2": 41.7, "sector3": 51.61938143973751,
                  "compound": "SOFT", "isPersonalBest": true }
            ],
            "statistics": { "averageLapTime": 91.43257142857143, "stdDev": 0.30000000000000004 }
        });
        let record = SessionRecord::new(monza(), payload.clone());
        let laps = LapRecord::from_payload(record.id, &record.payload);
        store.insert(record.clone(), laps).await.unwrap();

        let cached = store.get(&monza()).await.unwrap().expect("record cached");
        assert_eq!(cached.payload, payload);
        assert_eq!(
            serde_json::to_string(&cached.payload).unwrap(),
            serde_json::to_string(&payload).unwrap()
        );

        let lap_time = cached.payload["laps"][0]["lapTime"].as_f64().unwrap();
        assert_eq!(lap_time.to_bits(), 124.52738143973751_f64.to_bits());
        assert_eq!(store.laps(record.id).await.unwrap()[0].lap_time, 124.52738143973751);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("cache.db");

        let record = SessionRecord::new(monza(), payload());
        {
            let store = SqliteSessionStore::new(init_database(&db_path).await.unwrap());
            let laps = LapRecord::from_payload(record.id, &record.payload);
            store.insert(record.clone(), laps).await.unwrap();
            store.pool().close().await;
        }

        let store = SqliteSessionStore::new(init_database(&db_path).await.unwrap());
        let cached = store.get(&monza()).await.unwrap().expect("record persisted");
        assert_eq!(cached.payload, record.payload);
        assert_eq!(store.laps(record.id).await.unwrap().len(), 2);
    }
}
