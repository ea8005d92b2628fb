//! Append-only event log backed by SQLite.
//!
//! Records instance lifecycle events, upload attempts, and recipe changes.
//! Writes are best-effort from the caller's point of view: handlers log a
//! warning on failure and carry on.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{migrate::Migrator, sqlite::SqlitePoolOptions, FromRow, Pool, Sqlite};
use tokio::fs;

use crate::LudocoreResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

static MIGRATOR: Migrator = sqlx::migrate!("lib/history/migrations");

/// Event type recorded when an instance starts.
pub const EVENT_TYPE_START: &str = "start";

/// Event type recorded when an instance stops.
pub const EVENT_TYPE_STOP: &str = "stop";

/// Default bound for history reads.
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// One instance lifecycle event.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ServerEvent {
    /// Monotonically increasing record ID.
    pub id: i64,

    /// Name of the instance the event belongs to.
    pub container_name: String,

    /// `start` or `stop`.
    pub event_type: String,

    /// External port the instance held.
    pub port: Option<u16>,

    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,

    /// Seconds between the paired start and this stop; present on `stop` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

/// One build-upload attempt.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UploadRecord {
    /// Monotonically increasing record ID.
    pub id: i64,

    /// Client-supplied archive filename.
    pub filename: String,

    /// Archive size in bytes.
    pub file_size: i64,

    /// When the upload was recorded.
    pub timestamp: DateTime<Utc>,

    /// Whether ingestion and rebuild succeeded.
    pub success: bool,

    /// Failure reason or success note.
    pub notes: Option<String>,
}

/// One change of the active recipe.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct RecipeChangeRecord {
    /// Monotonically increasing record ID.
    pub id: i64,

    /// Preset name or uploaded filename.
    pub name: String,

    /// `preset:<name>` or `custom`.
    pub source: String,

    /// When the change was recorded.
    pub timestamp: DateTime<Utc>,

    /// Where the change came from.
    pub notes: Option<String>,
}

/// Handle to the event-log database.
#[derive(Debug, Clone)]
pub struct EventLog {
    pool: Pool<Sqlite>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl EventLog {
    /// Opens (creating if necessary) the event log at `db_path` and applies
    /// pending migrations.
    pub async fn open(db_path: &Path) -> LudocoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&format!("sqlite://{}?mode=rwc", db_path.display()))
            .await?;

        MIGRATOR.run(&pool).await.map_err(sqlx::Error::from)?;
        Ok(Self { pool })
    }

    /// Opens an in-memory event log. Used by tests.
    pub async fn open_in_memory() -> LudocoreResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        MIGRATOR.run(&pool).await.map_err(sqlx::Error::from)?;
        Ok(Self { pool })
    }

    /// Records an instance start.
    pub async fn record_server_start(&self, name: &str, port: Option<u16>) -> LudocoreResult<()> {
        sqlx::query(
            "INSERT INTO server_events (container_name, event_type, port, timestamp) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(EVENT_TYPE_START)
        .bind(port)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records an instance stop, with the wall-clock seconds since the paired
    /// start.
    pub async fn record_server_stop(
        &self,
        name: &str,
        port: Option<u16>,
        started_at: DateTime<Utc>,
    ) -> LudocoreResult<()> {
        let duration = (Utc::now() - started_at).num_seconds();
        sqlx::query(
            "INSERT INTO server_events (container_name, event_type, port, timestamp, duration) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(name)
        .bind(EVENT_TYPE_STOP)
        .bind(port)
        .bind(Utc::now())
        .bind(duration)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records an upload attempt.
    pub async fn record_upload(
        &self,
        filename: &str,
        file_size: i64,
        success: bool,
        notes: &str,
    ) -> LudocoreResult<()> {
        sqlx::query(
            "INSERT INTO upload_history (filename, file_size, timestamp, success, notes) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(filename)
        .bind(file_size)
        .bind(Utc::now())
        .bind(success)
        .bind(notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Records a change of the active recipe.
    pub async fn record_recipe_change(
        &self,
        name: &str,
        source: &str,
        notes: &str,
    ) -> LudocoreResult<()> {
        sqlx::query(
            "INSERT INTO dockerfile_history (name, source, timestamp, notes) VALUES (?, ?, ?, ?)",
        )
        .bind(name)
        .bind(source)
        .bind(Utc::now())
        .bind(notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns lifecycle events newest-first, optionally filtered by instance
    /// name, bounded by `limit`.
    pub async fn server_events(
        &self,
        container_name: Option<&str>,
        limit: i64,
    ) -> LudocoreResult<Vec<ServerEvent>> {
        let events = match container_name {
            Some(name) => {
                sqlx::query_as::<_, ServerEvent>(
                    "SELECT id, container_name, event_type, port, timestamp, duration \
                     FROM server_events WHERE container_name = ? \
                     ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(name)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ServerEvent>(
                    "SELECT id, container_name, event_type, port, timestamp, duration \
                     FROM server_events ORDER BY timestamp DESC, id DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(events)
    }

    /// Returns upload records newest-first, bounded by `limit`.
    pub async fn upload_history(&self, limit: i64) -> LudocoreResult<Vec<UploadRecord>> {
        let uploads = sqlx::query_as::<_, UploadRecord>(
            "SELECT id, filename, file_size, timestamp, success, notes \
             FROM upload_history ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(uploads)
    }

    /// Returns recipe changes newest-first, bounded by `limit`.
    pub async fn recipe_history(&self, limit: i64) -> LudocoreResult<Vec<RecipeChangeRecord>> {
        let changes = sqlx::query_as::<_, RecipeChangeRecord>(
            "SELECT id, name, source, timestamp, notes \
             FROM dockerfile_history ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(changes)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_server_events_round_trip() {
        let log = EventLog::open_in_memory().await.unwrap();
        let started_at = Utc::now() - chrono::Duration::seconds(90);

        log.record_server_start("shadow-dragon", Some(7777))
            .await
            .unwrap();
        log.record_server_stop("shadow-dragon", Some(7777), started_at)
            .await
            .unwrap();

        let events = log.server_events(None, DEFAULT_HISTORY_LIMIT).await.unwrap();
        assert_eq!(events.len(), 2);

        // Newest first: the stop comes back before the start.
        assert_eq!(events[0].event_type, EVENT_TYPE_STOP);
        assert_eq!(events[1].event_type, EVENT_TYPE_START);
        assert_eq!(events[0].port, Some(7777));
        assert!(events[0].duration.unwrap_or(0) >= 90);
        assert!(events[1].duration.is_none());
    }

    #[tokio::test]
    async fn test_server_events_filter_and_limit() {
        let log = EventLog::open_in_memory().await.unwrap();
        log.record_server_start("shadow-dragon", Some(7777))
            .await
            .unwrap();
        log.record_server_start("iron-golem", Some(7778))
            .await
            .unwrap();
        log.record_server_start("iron-golem", Some(7779))
            .await
            .unwrap();

        let filtered = log
            .server_events(Some("iron-golem"), DEFAULT_HISTORY_LIMIT)
            .await
            .unwrap();
        assert_eq!(filtered.len(), 2);
        assert!(filtered.iter().all(|e| e.container_name == "iron-golem"));

        let bounded = log.server_events(None, 1).await.unwrap();
        assert_eq!(bounded.len(), 1);
    }

    #[tokio::test]
    async fn test_upload_history_records_failures() {
        let log = EventLog::open_in_memory().await.unwrap();
        log.record_upload("build.zip", 1024, false, "zip validation failed")
            .await
            .unwrap();
        log.record_upload("build.zip", 2048, true, "upload and image rebuild successful")
            .await
            .unwrap();

        let uploads = log.upload_history(DEFAULT_HISTORY_LIMIT).await.unwrap();
        assert_eq!(uploads.len(), 2);
        assert!(uploads[0].success);
        assert!(!uploads[1].success);
        assert_eq!(uploads[1].notes.as_deref(), Some("zip validation failed"));
    }

    #[tokio::test]
    async fn test_recipe_history() {
        let log = EventLog::open_in_memory().await.unwrap();
        log.record_recipe_change("unity", "preset:unity", "set via API")
            .await
            .unwrap();

        let changes = log.recipe_history(DEFAULT_HISTORY_LIMIT).await.unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].name, "unity");
        assert_eq!(changes[0].source, "preset:unity");
    }
}
