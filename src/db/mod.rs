mod columns;
mod projects;
mod schema;
mod tasks;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{Connection, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

use crate::config::{BoardConfig, RetryPolicy};
use crate::error::{BoardError, Result};

pub use columns::ColumnSpace;
pub use tasks::TaskSpace;

/// Handle to the board store.
///
/// Cloning shares the underlying connection. Separate handles opened on the
/// same file (other threads or processes) are coordinated by SQLite's write
/// lock: every mutating operation runs in a `BEGIN IMMEDIATE` transaction and
/// is retried according to the handle's [`RetryPolicy`].
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    retry: RetryPolicy,
}

impl Database {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        Self::open_with_policy(path, RetryPolicy::default())
    }

    pub fn open_with_policy(path: PathBuf, retry: RetryPolicy) -> anyhow::Result<Self> {
        let parent = path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Database path has no parent directory"))?;
        std::fs::create_dir_all(parent)?;
        let conn = Connection::open(&path)?;
        // Another handle may be converting a fresh file to WAL right now
        conn.busy_timeout(retry.busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::configure(conn, retry)
    }

    pub fn open_with_config(config: &BoardConfig) -> anyhow::Result<Self> {
        Self::open_with_policy(config.database_path()?, config.retry_policy())
    }

    pub fn open_default() -> anyhow::Result<Self> {
        Self::open_with_config(&BoardConfig::default())
    }

    pub fn open_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::configure(conn, RetryPolicy::default())
    }

    fn configure(conn: Connection, retry: RetryPolicy) -> anyhow::Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(retry.busy_timeout)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            retry,
        })
    }

    /// Bring the schema up to date. Safe to call from several handles on the
    /// same file at once.
    pub fn migrate(&self) -> anyhow::Result<()> {
        let mut conn = self.lock();
        schema::run_migrations(&mut conn)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database lock poisoned")
    }

    /// Run `op` as one atomic write.
    ///
    /// The transaction takes the write lock before `op` reads anything, so the
    /// read-plan-write sequence of an ordering operation cannot interleave with
    /// another writer. Any error rolls the whole transaction back. Busy, locked
    /// and uniqueness failures re-run `op` from scratch until the policy's
    /// attempts are used up.
    pub(crate) fn write<T>(&self, op: impl Fn(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            let outcome = {
                let mut conn = self.lock();
                run_in_transaction(&mut conn, TransactionBehavior::Immediate, &op)
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => {
                    if attempt >= self.retry.max_attempts {
                        tracing::error!(attempts = attempt, "Giving up after conflict: {}", e);
                        return Err(BoardError::ConcurrencyConflict { attempts: attempt });
                    }
                    tracing::warn!(attempt, "Write conflicted, retrying: {}", e);
                    std::thread::sleep(self.retry.backoff * attempt);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Run `op` against a consistent snapshot.
    pub(crate) fn read<T>(&self, op: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock();
        run_in_transaction(&mut conn, TransactionBehavior::Deferred, op)
    }
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            retry: self.retry,
        }
    }
}

fn run_in_transaction<T>(
    conn: &mut Connection,
    behavior: TransactionBehavior,
    op: impl FnOnce(&Transaction<'_>) -> Result<T>,
) -> Result<T> {
    let tx = conn.transaction_with_behavior(behavior)?;
    let value = op(&tx)?;
    tx.commit()?;
    Ok(value)
}

/// Read a text id column. A malformed id is a conversion failure, which aborts
/// whatever transaction is reading it.
pub(crate) fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let raw: String = row.get(idx)?;
    Uuid::parse_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_datetime(s: String) -> chrono::DateTime<Utc> {
    chrono::DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn require_name(field: &str, value: &str, max_len: usize) -> Result<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(BoardError::invalid(format!("{field} must not be empty")));
    }
    if trimmed.chars().count() > max_len {
        return Err(BoardError::invalid(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(())
}
