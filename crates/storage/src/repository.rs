//! Repository Implementation

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::{AlarmEvent, AlarmRecord, AlarmStatus, StorageError};

const SELECT_COLUMNS: &str = "SELECT id, device_id, alarm_type, severity, description, confidence, \
     region, evidence_path, status, occurred_at, handled_at FROM alarm_records";

/// SQLite-backed alarm repository
#[derive(Debug, Clone)]
pub struct AlarmRepository {
    pool: SqlitePool,
}

impl AlarmRepository {
    /// Connect to (or create) the database and initialize the schema
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await?;

        info!("Connected alarm repository at {}", url);
        let repo = Self { pool };
        repo.initialize_schema().await?;
        Ok(repo)
    }

    /// Private in-memory database (tests and dry runs).
    ///
    /// A single connection that never expires, since every SQLite memory
    /// connection is its own database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let repo = Self { pool };
        repo.initialize_schema().await?;
        Ok(repo)
    }

    async fn initialize_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS alarm_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                device_id TEXT NOT NULL,
                alarm_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                description TEXT NOT NULL,
                confidence REAL NOT NULL,
                region TEXT,
                evidence_path TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                occurred_at TEXT NOT NULL,
                handled_at TEXT
            );
            "#,
            r#"CREATE INDEX IF NOT EXISTS alarm_records_device ON alarm_records(device_id, occurred_at DESC);"#,
            r#"CREATE INDEX IF NOT EXISTS alarm_records_occurred ON alarm_records(occurred_at DESC);"#,
        ];

        for stmt in statements {
            sqlx::query(stmt).execute(&self.pool).await?;
        }

        Ok(())
    }

    /// Insert an alarm in its own transaction and return the row id.
    ///
    /// The transaction rolls back on drop, so every early return leaves no
    /// partial row behind.
    pub async fn insert(
        &self,
        event: &AlarmEvent,
        evidence_path: Option<&str>,
    ) -> Result<i64, StorageError> {
        let region = event
            .region
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            INSERT INTO alarm_records
                (device_id, alarm_type, severity, description, confidence, region,
                 evidence_path, status, occurred_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&event.device_id)
        .bind(event.kind.as_str())
        .bind(event.severity.as_str())
        .bind(&event.message)
        .bind(event.confidence as f64)
        .bind(region)
        .bind(evidence_path)
        .bind(AlarmStatus::Pending.as_str())
        .bind(event.occurred_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        let id = result.last_insert_rowid();
        debug!("Inserted alarm with ID {}", id);
        Ok(id)
    }

    /// Most recent alarms first
    pub async fn recent(&self, limit: u32) -> Result<Vec<AlarmRecord>, StorageError> {
        let sql = format!("{} ORDER BY occurred_at DESC, id DESC LIMIT ?", SELECT_COLUMNS);
        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::to_record).collect()
    }

    /// Most recent alarms of one device
    pub async fn by_device(&self, device_id: &str, limit: u32) -> Result<Vec<AlarmRecord>, StorageError> {
        let sql = format!(
            "{} WHERE device_id = ? ORDER BY occurred_at DESC, id DESC LIMIT ?",
            SELECT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(device_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(Self::to_record).collect()
    }

    pub async fn get(&self, id: i64) -> Result<AlarmRecord, StorageError> {
        let sql = format!("{} WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        Self::to_record(&row)
    }

    /// Change the handling status; leaving `pending` stamps `handled_at`
    pub async fn update_status(&self, id: i64, status: AlarmStatus) -> Result<(), StorageError> {
        let handled_at = match status {
            AlarmStatus::Pending => None,
            _ => Some(Utc::now().to_rfc3339()),
        };

        let result = sqlx::query("UPDATE alarm_records SET status = ?, handled_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(handled_at)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        info!("Alarm {} marked {}", id, status);
        Ok(())
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM alarm_records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<i64, _>("n")?)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn to_record(row: &SqliteRow) -> Result<AlarmRecord, StorageError> {
        let region = row
            .try_get::<Option<String>, _>("region")?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        let status: String = row.try_get("status")?;
        let occurred_at: String = row.try_get("occurred_at")?;
        let handled_at: Option<String> = row.try_get("handled_at")?;

        Ok(AlarmRecord {
            id: row.try_get("id")?,
            device_id: row.try_get("device_id")?,
            alarm_type: row.try_get("alarm_type")?,
            severity: row.try_get("severity")?,
            description: row.try_get("description")?,
            confidence: row.try_get("confidence")?,
            region,
            evidence_path: row.try_get("evidence_path")?,
            status: status.parse()?,
            occurred_at: parse_timestamp(&occurred_at)?,
            handled_at: handled_at.as_deref().map(parse_timestamp).transpose()?,
        })
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::SerializationError(format!("bad timestamp {}: {}", raw, e)))
}
