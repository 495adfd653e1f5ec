//! Database schema and row types

use crate::survey::{SentimentBand, Snapshot, TurnOutcome};
use chrono::{DateTime, Utc};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    phase TEXT NOT NULL,
    snapshot TEXT NOT NULL,
    version INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);
CREATE INDEX IF NOT EXISTS idx_sessions_updated ON sessions(updated_at DESC);

CREATE TABLE IF NOT EXISTS turn_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    question_index INTEGER NOT NULL,
    question_text TEXT NOT NULL,
    outcome TEXT NOT NULL,
    answer_text TEXT,
    logged_at TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_turn_log_session ON turn_log(session_id, id);

CREATE TABLE IF NOT EXISTS reviews (
    id TEXT PRIMARY KEY,
    session_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    review_text TEXT NOT NULL,
    rating INTEGER NOT NULL,
    tone TEXT NOT NULL,
    sentiment_band TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (session_id) REFERENCES sessions(id)
);

CREATE INDEX IF NOT EXISTS idx_reviews_item ON reviews(item_id);
";

/// A snapshot paired with the version token its load observed. The token
/// must be handed back on replace so stale writers are rejected.
#[derive(Debug, Clone)]
pub struct StoredSnapshot {
    pub snapshot: Snapshot,
    pub version: i64,
}

/// One append-only audit row per resolved turn. Written after the snapshot
/// commits; never read back for state reconstruction.
#[derive(Debug, Clone)]
pub struct TurnRow {
    pub session_id: String,
    pub question_index: usize,
    pub question_text: String,
    pub outcome: TurnOutcome,
    pub answer_text: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// The review the user finally selected, persisted as its own record.
#[derive(Debug, Clone)]
pub struct ReviewRow {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub item_id: String,
    pub review_text: String,
    pub rating: u8,
    pub tone: String,
    pub sentiment_band: Option<SentimentBand>,
    pub created_at: DateTime<Utc>,
}
