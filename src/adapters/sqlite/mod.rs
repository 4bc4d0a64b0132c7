//! SQLite adapter: Implementation of CredentialStore and EvaluationLog.
//!
//! Provides local persistence for logins and the prediction history.
//!
//! # Mutex Behavior
//!
//! The connection is protected by a `Mutex`. Every operation takes the lock
//! for the duration of a single statement (or a single scan batch) and never
//! across an await point. A poisoned mutex surfaces as
//! [`StorageError::LockPoisoned`] instead of a panic.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{Credential, Evaluation, FeaturePayload, Role};
use crate::ports::{CredentialStore, EvaluationLog, EvaluationPage, EvaluationScan};

/// Rows fetched per lock acquisition during a scan.
const SCAN_BATCH_SIZE: usize = 256;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// SQLite storage adapter.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database at `path`.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.lock()?;

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS credentials (
                username TEXT PRIMARY KEY,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS evaluations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                payload TEXT NOT NULL,
                creditworthy INTEGER NOT NULL,
                probability REAL NOT NULL,
                credit_score REAL NOT NULL,
                model_version TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    /// Fetch up to `limit` rows with `after < seq <= ceiling`, in seq order.
    fn fetch_batch(
        &self,
        after: i64,
        ceiling: i64,
        limit: usize,
    ) -> Result<Vec<(i64, EvaluationRow)>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r"
            SELECT seq, id, payload, creditworthy, probability, credit_score,
                   model_version, created_at
            FROM evaluations
            WHERE seq > ?1 AND seq <= ?2
            ORDER BY seq ASC
            LIMIT ?3
            ",
        )?;

        let rows = stmt
            .query_map(params![after, ceiling, limit as i64], |row| {
                Ok((row.get(0)?, EvaluationRow::from_row(row, 1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn max_seq(&self) -> Result<i64, StorageError> {
        let conn = self.lock()?;
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM evaluations",
            [],
            |row| row.get(0),
        )?;
        Ok(max)
    }
}

/// Raw columns of one `evaluations` row, decoded outside the lock.
struct EvaluationRow {
    id: String,
    payload: String,
    creditworthy: bool,
    probability: f64,
    credit_score: f64,
    model_version: String,
    created_at: String,
}

impl EvaluationRow {
    fn from_row(row: &rusqlite::Row<'_>, start: usize) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(start)?,
            payload: row.get(start + 1)?,
            creditworthy: row.get::<_, i64>(start + 2)? != 0,
            probability: row.get(start + 3)?,
            credit_score: row.get(start + 4)?,
            model_version: row.get(start + 5)?,
            created_at: row.get(start + 6)?,
        })
    }

    fn into_evaluation(self) -> Result<Evaluation, StorageError> {
        let payload: FeaturePayload = serde_json::from_str(&self.payload)
            .map_err(|e| StorageError::Serialization(format!("evaluation {}: {e}", self.id)))?;
        let created_at = chrono::DateTime::parse_from_rfc3339(&self.created_at)
            .map(|dt| dt.with_timezone(&chrono::Utc))
            .map_err(|e| StorageError::Serialization(format!("evaluation {}: {e}", self.id)))?;

        Ok(Evaluation {
            id: self.id,
            payload,
            creditworthy: self.creditworthy,
            probability: self.probability,
            credit_score: self.credit_score,
            model_version: self.model_version,
            created_at,
        })
    }
}

/// Batched pass over the log up to a pinned sequence number.
struct Scan<'a> {
    storage: &'a SqliteStorage,
    last_seq: i64,
    ceiling: i64,
    buffer: VecDeque<EvaluationRow>,
    exhausted: bool,
}

impl Iterator for Scan<'_> {
    type Item = Result<Evaluation, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self
                .storage
                .fetch_batch(self.last_seq, self.ceiling, SCAN_BATCH_SIZE)
            {
                Ok(rows) => {
                    if rows.len() < SCAN_BATCH_SIZE {
                        self.exhausted = true;
                    }
                    if let Some((seq, _)) = rows.last() {
                        self.last_seq = *seq;
                    }
                    self.buffer.extend(rows.into_iter().map(|(_, row)| row));
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }
        self.buffer.pop_front().map(EvaluationRow::into_evaluation)
    }
}

impl EvaluationLog for SqliteStorage {
    type Error = StorageError;

    fn append(&self, evaluation: &Evaluation) -> Result<String, Self::Error> {
        let payload = serde_json::to_string(&evaluation.payload)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        let conn = self.lock()?;

        conn.execute(
            r"
            INSERT INTO evaluations (
                id, payload, creditworthy, probability, credit_score,
                model_version, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                evaluation.id,
                payload,
                i64::from(evaluation.creditworthy),
                evaluation.probability,
                evaluation.credit_score,
                evaluation.model_version,
                evaluation.created_at.to_rfc3339(),
            ],
        )?;

        tracing::debug!("Appended evaluation {} to log", evaluation.id);
        Ok(evaluation.id.clone())
    }

    fn scan(&self) -> EvaluationScan<'_, Self::Error> {
        match self.max_seq() {
            Ok(ceiling) => Box::new(Scan {
                storage: self,
                last_seq: 0,
                ceiling,
                buffer: VecDeque::new(),
                exhausted: ceiling == 0,
            }),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn count(&self) -> Result<usize, Self::Error> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM evaluations", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn page(&self, offset: usize, limit: usize) -> Result<EvaluationPage, Self::Error> {
        // Offsets past i64::MAX are past the end of any table.
        let Ok(sql_offset) = i64::try_from(offset) else {
            return Ok(EvaluationPage::new(Vec::new(), self.count()?, offset, limit));
        };
        let sql_limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let (total_count, rows) = {
            let conn = self.lock()?;
            let total_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM evaluations", [], |row| row.get(0))?;

            let mut stmt = conn.prepare(
                r"
                SELECT id, payload, creditworthy, probability, credit_score,
                       model_version, created_at
                FROM evaluations
                ORDER BY seq DESC
                LIMIT ?1 OFFSET ?2
                ",
            )?;
            let rows = stmt
                .query_map(params![sql_limit, sql_offset], |row| {
                    EvaluationRow::from_row(row, 0)
                })?
                .collect::<Result<Vec<_>, _>>()?;
            (total_count, rows)
        };

        let items = rows
            .into_iter()
            .map(EvaluationRow::into_evaluation)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EvaluationPage::new(items, total_count as usize, offset, limit))
    }
}

impl CredentialStore for SqliteStorage {
    type Error = StorageError;

    fn find_credential(&self, username: &str) -> Result<Option<Credential>, Self::Error> {
        let conn = self.lock()?;
        let row: Option<(String, String, String)> = conn
            .query_row(
                "SELECT username, password_hash, role FROM credentials WHERE username = ?1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(username, password_hash, role)| {
            let role: Role = role
                .parse()
                .map_err(|e| StorageError::Serialization(format!("credential {username}: {e}")))?;
            Ok(Credential {
                username,
                password_hash,
                role,
            })
        })
        .transpose()
    }

    fn insert_credential(&self, credential: &Credential) -> Result<(), Self::Error> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            r"
            INSERT OR IGNORE INTO credentials (username, password_hash, role, created_at)
            VALUES (?1, ?2, ?3, ?4)
            ",
            params![
                credential.username,
                credential.password_hash,
                credential.role.as_str(),
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;

        if inserted == 0 {
            return Err(StorageError::AlreadyExists(credential.username.clone()));
        }
        tracing::info!("Stored credential for {} ({})", credential.username, credential.role);
        Ok(())
    }

    fn delete_credential(&self, username: &str) -> Result<bool, Self::Error> {
        let conn = self.lock()?;
        let removed = conn.execute("DELETE FROM credentials WHERE username = ?1", params![username])?;
        if removed > 0 {
            tracing::info!("Removed credential for {username}");
        }
        Ok(removed > 0)
    }
}
