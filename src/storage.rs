//! SQLite-backed scores, attempt history and the corrections glossary.
//!
//! A single long-lived connection sits behind a mutex; every public method is
//! async and hops onto the blocking pool for the actual SQLite work, so the
//! bot's event loop never blocks on disk.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage task did not complete")]
    Cancelled,
}

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub user_id: String,
    pub points: i64,
    pub highest_streak: i64,
    pub total_correct: i64,
    pub last_active: Option<DateTime<Utc>>,
}

/// A saved terminology correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub wrong: String,
    pub correct: String,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS leaderboard (
    user_id TEXT PRIMARY KEY,
    points INTEGER DEFAULT 0,
    highest_streak INTEGER DEFAULT 0,
    total_correct INTEGER DEFAULT 0,
    last_active TEXT
);
CREATE TABLE IF NOT EXISTS question_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT,
    question TEXT,
    answer TEXT,
    was_correct BOOLEAN,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE TABLE IF NOT EXISTS corrections (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    wrong TEXT UNIQUE,
    correct TEXT,
    added_by TEXT,
    timestamp DATETIME DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_corrections_wrong_lower ON corrections (LOWER(wrong));
";

/// Handle to the score database. Cheap to clone; clones share the
/// underlying connection.
#[derive(Clone)]
pub struct ScoreStore {
    conn: Arc<Mutex<Connection>>,
}

impl ScoreStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(10))?;
        // journal_mode returns a row, so it cannot go through execute
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch(SCHEMA)?;
        Ok(ScoreStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn call<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut guard)
        })
        .await
        .map_err(|_| StoreError::Cancelled)?;
        result.map_err(StoreError::from)
    }

    /// Applies a grading outcome to the leaderboard inside one transaction.
    /// Points never drop below zero; the highest streak only ever grows.
    pub async fn apply_outcome(
        &self,
        user_id: &str,
        points_delta: i64,
        was_correct: bool,
        streak: i64,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        self.call(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<(i64, i64, i64)> = tx
                .query_row(
                    "SELECT points, highest_streak, total_correct FROM leaderboard WHERE user_id = ?1",
                    params![user_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            let (points, highest_streak, total_correct) = existing.unwrap_or((0, 0, 0));
            tx.execute(
                "INSERT INTO leaderboard (user_id, points, highest_streak, total_correct, last_active)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(user_id) DO UPDATE SET
                     points = excluded.points,
                     highest_streak = excluded.highest_streak,
                     total_correct = excluded.total_correct,
                     last_active = excluded.last_active",
                params![
                    user_id,
                    (points + points_delta).max(0),
                    highest_streak.max(streak),
                    total_correct + i64::from(was_correct),
                    at.to_rfc3339(),
                ],
            )?;
            tx.commit()
        })
        .await
    }

    /// Appends one attempt to the history table.
    pub async fn append_attempt(
        &self,
        user_id: &str,
        question: &str,
        answer: &str,
        was_correct: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let user_id = user_id.to_string();
        let question = question.to_string();
        let answer = answer.to_string();
        self.call(move |conn| {
            conn.execute(
                "INSERT INTO question_history (user_id, question, answer, was_correct, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![user_id, question, answer, was_correct, at.to_rfc3339()],
            )
            .map(|_| ())
        })
        .await
    }

    pub async fn record(&self, user_id: &str) -> Result<Option<ScoreRecord>, StoreError> {
        let user_id = user_id.to_string();
        self.call(move |conn| {
            conn.query_row(
                "SELECT user_id, points, highest_streak, total_correct, last_active
                 FROM leaderboard WHERE user_id = ?1",
                params![user_id],
                row_to_record,
            )
            .optional()
        })
        .await
    }

    /// The leaderboard: positive scores only, best first.
    pub async fn top_records(&self, limit: u32) -> Result<Vec<ScoreRecord>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id, points, highest_streak, total_correct, last_active
                 FROM leaderboard
                 WHERE points > 0
                 ORDER BY points DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], row_to_record)?;
            rows.collect()
        })
        .await
    }

    pub async fn attempt_count(&self, user_id: &str) -> Result<i64, StoreError> {
        let user_id = user_id.to_string();
        self.call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM question_history WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
        })
        .await
    }

    /// Saves a correction. Returns `false` when the term is already known;
    /// matching is case-insensitive, like lookups.
    pub async fn learn_correction(
        &self,
        wrong: &str,
        correct: &str,
        added_by: &str,
    ) -> Result<bool, StoreError> {
        let wrong = wrong.to_string();
        let correct = correct.to_string();
        let added_by = added_by.to_string();
        self.call(move |conn| {
            let known: i64 = conn.query_row(
                "SELECT COUNT(*) FROM corrections WHERE LOWER(wrong) = ?1",
                params![wrong.to_lowercase()],
                |row| row.get(0),
            )?;
            if known > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO corrections (wrong, correct, added_by) VALUES (?1, ?2, ?3)",
                params![wrong, correct, added_by],
            )?;
            Ok(true)
        })
        .await
    }

    pub async fn lookup_correction(&self, wrong: &str) -> Result<Option<String>, StoreError> {
        let needle = wrong.to_lowercase();
        self.call(move |conn| {
            conn.query_row(
                "SELECT correct FROM corrections WHERE LOWER(wrong) = ?1",
                params![needle],
                |row| row.get(0),
            )
            .optional()
        })
        .await
    }

    pub async fn recent_corrections(&self, limit: u32) -> Result<Vec<Correction>, StoreError> {
        self.call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT wrong, correct FROM corrections ORDER BY timestamp DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok(Correction {
                    wrong: row.get(0)?,
                    correct: row.get(1)?,
                })
            })?;
            rows.collect()
        })
        .await
    }

    // Drops every table so failure paths can be exercised.
    #[cfg(test)]
    pub(crate) async fn break_storage(&self) {
        self.call(|conn| {
            conn.execute_batch(
                "DROP TABLE leaderboard; DROP TABLE question_history; DROP TABLE corrections;",
            )
        })
        .await
        .expect("dropping tables should succeed");
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoreRecord> {
    let last_active: Option<String> = row.get(4)?;
    Ok(ScoreRecord {
        user_id: row.get(0)?,
        points: row.get(1)?,
        highest_streak: row.get(2)?,
        total_correct: row.get(3)?,
        last_active: last_active
            .and_then(|text| DateTime::parse_from_rfc3339(&text).ok())
            .map(|parsed| parsed.with_timezone(&Utc)),
    })
}
