//! Session store adapter
//!
//! One opaque snapshot document per session; the whole snapshot is the
//! unit of write, so there are no partial-field updates to corrupt.
//! Replacement is guarded by an optimistic version token: a writer that
//! loaded a stale snapshot gets a conflict instead of last-writer-wins.

mod schema;

pub use schema::*;

use crate::survey::Snapshot;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Stale write for session {0}: another transition committed first")]
    Conflict(String),
    #[error("Corrupt snapshot for session {id}: {source}")]
    CorruptSnapshot {
        id: String,
        source: serde_json::Error,
    },
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Session Operations ====================

    /// Persist a freshly started session at version 1.
    pub fn create_session(&self, snapshot: &Snapshot) -> DbResult<StoredSnapshot> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let document =
            serde_json::to_string(snapshot).map_err(|source| DbError::CorruptSnapshot {
                id: snapshot.session_id.clone(),
                source,
            })?;

        conn.execute(
            "INSERT INTO sessions (id, user_id, item_id, phase, snapshot, version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)",
            params![
                snapshot.session_id,
                snapshot.user_id,
                snapshot.item_id,
                snapshot.phase.as_str(),
                document,
                now.to_rfc3339(),
            ],
        )?;

        Ok(StoredSnapshot {
            snapshot: snapshot.clone(),
            version: 1,
        })
    }

    /// Load a session snapshot together with its current version token.
    pub fn load_session(&self, id: &str) -> DbResult<StoredSnapshot> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT snapshot, version FROM sessions WHERE id = ?1")?;

        let row = stmt
            .query_row(params![id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => DbError::SessionNotFound(id.to_string()),
                other => DbError::Sqlite(other),
            })?;

        let snapshot: Snapshot =
            serde_json::from_str(&row.0).map_err(|source| DbError::CorruptSnapshot {
                id: id.to_string(),
                source,
            })?;

        Ok(StoredSnapshot {
            snapshot,
            version: row.1,
        })
    }

    /// Replace the whole snapshot, compare-and-swap style.
    ///
    /// Succeeds only if the stored version still equals `expected_version`;
    /// a concurrent transition that committed in between produces
    /// `DbError::Conflict` and the caller must reload before retrying.
    /// Returns the new version token.
    pub fn replace_session(&self, snapshot: &Snapshot, expected_version: i64) -> DbResult<i64> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let document =
            serde_json::to_string(snapshot).map_err(|source| DbError::CorruptSnapshot {
                id: snapshot.session_id.clone(),
                source,
            })?;

        let affected = conn.execute(
            "UPDATE sessions
             SET snapshot = ?1, phase = ?2, version = version + 1, updated_at = ?3
             WHERE id = ?4 AND version = ?5",
            params![
                document,
                snapshot.phase.as_str(),
                now.to_rfc3339(),
                snapshot.session_id,
                expected_version,
            ],
        )?;

        if affected == 1 {
            return Ok(expected_version + 1);
        }

        // Zero rows: either the session vanished or the token is stale.
        let exists = conn
            .query_row(
                "SELECT 1 FROM sessions WHERE id = ?1",
                params![snapshot.session_id],
                |_| Ok(()),
            )
            .is_ok();
        if exists {
            Err(DbError::Conflict(snapshot.session_id.clone()))
        } else {
            Err(DbError::SessionNotFound(snapshot.session_id.clone()))
        }
    }

    // ==================== Audit Log ====================

    /// Append one resolved turn to the audit log. The log is write-only
    /// from the engine's perspective.
    pub fn append_turn(&self, turn: &TurnRow) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO turn_log (session_id, question_index, question_text, outcome, answer_text, logged_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                turn.session_id,
                turn.question_index,
                turn.question_text,
                turn.outcome.as_str(),
                turn.answer_text,
                turn.logged_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ==================== Selected Reviews ====================

    /// Persist the review the user selected.
    pub fn save_review(&self, review: &ReviewRow) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO reviews (id, session_id, user_id, item_id, review_text, rating, tone, sentiment_band, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                review.id,
                review.session_id,
                review.user_id,
                review.item_id,
                review.review_text,
                review.rating,
                review.tone,
                review.sentiment_band.map(crate::survey::SentimentBand::as_str),
                review.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::survey::{Question, TurnOutcome, UpstreamContext};
    use chrono::DateTime;

    fn sample_snapshot(id: &str) -> Snapshot {
        Snapshot::new(
            id,
            "user-1",
            "item-1",
            vec![Question {
                text: "How satisfied are you?".to_string(),
                options: vec!["Very".to_string(), "Not at all".to_string()],
                allow_multiple: false,
                rationale: String::new(),
            }],
            UpstreamContext::default(),
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )
    }

    #[test]
    fn create_load_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let snapshot = sample_snapshot("sess-1");

        let stored = db.create_session(&snapshot).unwrap();
        assert_eq!(stored.version, 1);

        let loaded = db.load_session("sess-1").unwrap();
        assert_eq!(loaded.version, 1);
        assert_eq!(loaded.snapshot, snapshot);
    }

    #[test]
    fn load_missing_session_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.load_session("nope"),
            Err(DbError::SessionNotFound(_))
        ));
    }

    #[test]
    fn replace_bumps_version() {
        let db = Database::open_in_memory().unwrap();
        let snapshot = sample_snapshot("sess-1");
        db.create_session(&snapshot).unwrap();

        let version = db.replace_session(&snapshot, 1).unwrap();
        assert_eq!(version, 2);
        assert_eq!(db.load_session("sess-1").unwrap().version, 2);
    }

    #[test]
    fn stale_replace_is_a_conflict() {
        let db = Database::open_in_memory().unwrap();
        let snapshot = sample_snapshot("sess-1");
        db.create_session(&snapshot).unwrap();

        db.replace_session(&snapshot, 1).unwrap();
        // A second writer that also loaded version 1 must lose.
        assert!(matches!(
            db.replace_session(&snapshot, 1),
            Err(DbError::Conflict(_))
        ));
    }

    #[test]
    fn replace_of_missing_session_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let snapshot = sample_snapshot("ghost");
        assert!(matches!(
            db.replace_session(&snapshot, 1),
            Err(DbError::SessionNotFound(_))
        ));
    }

    #[test]
    fn turn_log_appends() {
        let db = Database::open_in_memory().unwrap();
        let snapshot = sample_snapshot("sess-1");
        db.create_session(&snapshot).unwrap();

        db.append_turn(&TurnRow {
            session_id: "sess-1".to_string(),
            question_index: 0,
            question_text: "How satisfied are you?".to_string(),
            outcome: TurnOutcome::Answered,
            answer_text: Some("Very".to_string()),
            logged_at: Utc::now(),
        })
        .unwrap();

        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM turn_log WHERE session_id = 'sess-1'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sensei.db");

        {
            let db = Database::open(&path).unwrap();
            db.create_session(&sample_snapshot("sess-1")).unwrap();
        }

        let db = Database::open(&path).unwrap();
        assert!(db.load_session("sess-1").is_ok());
    }
}
