//! SQLite-backed persistence for session checkpoints.
//!
//! Each checkpoint stores the full snapshot JSON; the latest row per session is
//! the authoritative state for scoring.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::session::{Checkpoint, SessionSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("corrupt row {id}: {message}")]
    Corrupt { id: i64, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredCheckpoint {
    pub id: i64,
    pub checkpoint: Checkpoint,
    pub snapshot_hash: String,
    pub created_at: DateTime<Utc>,
    pub snapshot: SessionSnapshot,
}

/// One line per session in `list_sessions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRow {
    pub session_id: Uuid,
    pub checkpoints: usize,
    pub last_checkpoint: Checkpoint,
    pub updated_at: DateTime<Utc>,
}

pub trait SessionStore {
    /// Persist `snapshot` at `checkpoint`. Returns the row id.
    fn save_checkpoint(
        &self,
        snapshot: &SessionSnapshot,
        checkpoint: Checkpoint,
    ) -> Result<i64, StoreError>;

    fn load_latest(&self, session_id: Uuid) -> Result<Option<StoredCheckpoint>, StoreError>;

    fn list_sessions(&self) -> Result<Vec<SessionRow>, StoreError>;
}

#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA synchronous=NORMAL;\
             CREATE TABLE IF NOT EXISTS session_checkpoints (\
               id INTEGER PRIMARY KEY AUTOINCREMENT,\
               session_id TEXT NOT NULL,\
               checkpoint TEXT NOT NULL,\
               snapshot_hash TEXT NOT NULL,\
               snapshot_json TEXT NOT NULL,\
               created_at INTEGER NOT NULL \
             );\
             CREATE INDEX IF NOT EXISTS idx_session_checkpoints_session \
               ON session_checkpoints(session_id, id);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard)
    }
}

impl SessionStore for SqliteSessionStore {
    fn save_checkpoint(
        &self,
        snapshot: &SessionSnapshot,
        checkpoint: Checkpoint,
    ) -> Result<i64, StoreError> {
        let json = serde_json::to_string(snapshot)?;
        let hash = snapshot.content_hash();
        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO session_checkpoints (\
                    session_id, checkpoint, snapshot_hash, snapshot_json, created_at \
                 ) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    snapshot.session_id.to_string(),
                    checkpoint.as_str(),
                    hash,
                    json,
                    Utc::now().timestamp_millis(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        info!(
            session_id = %snapshot.session_id,
            checkpoint = checkpoint.as_str(),
            row_id = id,
            "checkpoint saved"
        );
        Ok(id)
    }

    fn load_latest(&self, session_id: Uuid) -> Result<Option<StoredCheckpoint>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, checkpoint, snapshot_hash, snapshot_json, created_at \
                 FROM session_checkpoints WHERE session_id = ?1 \
                 ORDER BY id DESC LIMIT 1",
            )?;
            let mut rows = stmt.query(params![session_id.to_string()])?;
            let Some(row) = rows.next()? else {
                return Ok(None);
            };
            let id: i64 = row.get(0)?;
            let checkpoint_raw: String = row.get(1)?;
            let snapshot_hash: String = row.get(2)?;
            let snapshot_json: String = row.get(3)?;
            let created_ms: i64 = row.get(4)?;

            let checkpoint = parse_checkpoint(id, &checkpoint_raw)?;
            let snapshot: SessionSnapshot = serde_json::from_str(&snapshot_json)?;
            Ok(Some(StoredCheckpoint {
                id,
                checkpoint,
                snapshot_hash,
                created_at: from_millis(id, created_ms)?,
                snapshot,
            }))
        })
    }

    fn list_sessions(&self) -> Result<Vec<SessionRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.session_id, counts.n, c.checkpoint, c.created_at, c.id \
                 FROM session_checkpoints c \
                 JOIN (SELECT session_id, COUNT(*) AS n, MAX(id) AS last_id \
                       FROM session_checkpoints GROUP BY session_id) counts \
                   ON c.id = counts.last_id \
                 ORDER BY c.id",
            )?;
            let mut rows = stmt.query([])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let raw_id: String = row.get(0)?;
                let n: i64 = row.get(1)?;
                let checkpoint_raw: String = row.get(2)?;
                let created_ms: i64 = row.get(3)?;
                let id: i64 = row.get(4)?;
                let session_id = Uuid::parse_str(&raw_id).map_err(|e| StoreError::Corrupt {
                    id,
                    message: e.to_string(),
                })?;
                out.push(SessionRow {
                    session_id,
                    checkpoints: n as usize,
                    last_checkpoint: parse_checkpoint(id, &checkpoint_raw)?,
                    updated_at: from_millis(id, created_ms)?,
                });
            }
            Ok(out)
        })
    }
}

fn parse_checkpoint(id: i64, raw: &str) -> Result<Checkpoint, StoreError> {
    Checkpoint::parse(raw).ok_or_else(|| StoreError::Corrupt {
        id,
        message: format!("unknown checkpoint {raw}"),
    })
}

fn from_millis(id: i64, ms: i64) -> Result<DateTime<Utc>, StoreError> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt {
            id,
            message: format!("bad timestamp {ms}"),
        })
}
