//! SQLite storage.
//!
//! Every operation opens its own connection with foreign keys enforced and a bounded busy
//! timeout. Writes run inside `BEGIN IMMEDIATE` transactions so that validation reads, derived
//! fields, the row write and its audit entry commit together or not at all.

mod schema;

use crate::config::CoreConfig;
use crate::error::{FieldErrors, NON_FIELD_ERRORS};
use crate::{CoreError, CoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{ffi, Connection, ErrorCode, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub use schema::SCHEMA_VERSION;

/// Handle to the relational store.
///
/// Cheap to clone; holds only the database location and connection policy.
#[derive(Clone, Debug)]
pub struct Database {
    path: Arc<PathBuf>,
    busy_timeout: Duration,
}

impl Database {
    /// Open the database described by `cfg`, creating and migrating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the schema cannot be applied.
    pub fn open(cfg: &CoreConfig) -> CoreResult<Self> {
        let db = Self {
            path: Arc::new(cfg.database_path().to_path_buf()),
            busy_timeout: cfg.busy_timeout(),
        };

        let mut conn = db.connect()?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("opened {} (journal_mode={})", db.path.display(), mode);
        schema::migrate(&mut conn)?;

        Ok(db)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection with the store's pragmas applied.
    pub fn connect(&self) -> CoreResult<Connection> {
        let conn = Connection::open(self.path.as_path())?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        Ok(conn)
    }

    /// Run `f` inside a read transaction so multi-statement reads see one snapshot.
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> CoreResult<T>) -> CoreResult<T> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Run `f` inside an immediate write transaction.
    ///
    /// The transaction commits only if `f` succeeds; any error rolls everything back.
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> CoreResult<T>) -> CoreResult<T> {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    /// Check that the store answers queries. Used by health checks and the CLI.
    pub fn ping(&self) -> CoreResult<()> {
        let conn = self.connect()?;
        let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if version != i64::from(SCHEMA_VERSION) {
            return Err(CoreError::Config(format!(
                "database schema version {} does not match expected {}",
                version, SCHEMA_VERSION
            )));
        }
        Ok(())
    }
}

/// Timestamp text as stored in real columns.
///
/// Fixed microsecond precision keeps lexical and chronological order identical.
pub fn timestamp_text(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

const FOREIGN_KEY_FAILED: &str = "FOREIGN KEY constraint failed";
const UNIQUE_FAILED: &str = "UNIQUE constraint failed";

/// Which rule a constraint failure broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Constraint {
    Unique,
    ForeignKey,
    Other,
}

/// Classify a constraint failure.
///
/// Restricted deletes report a bare `SQLITE_CONSTRAINT` on some builds, so the message is
/// consulted as well as the extended code.
fn constraint_kind(extended_code: i32, message: Option<&str>) -> Constraint {
    let message = message.unwrap_or_default();
    match extended_code {
        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => Constraint::Unique,
        ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Constraint::ForeignKey,
        _ if message.starts_with(UNIQUE_FAILED) => Constraint::Unique,
        _ if message.contains(FOREIGN_KEY_FAILED) => Constraint::ForeignKey,
        _ => Constraint::Other,
    }
}

/// True when `err` is a foreign key violation.
pub(crate) fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, message) => {
            e.code == ErrorCode::ConstraintViolation
                && constraint_kind(e.extended_code, message.as_deref()) == Constraint::ForeignKey
        }
        _ => false,
    }
}

/// Translate a storage error into the crate's error model.
///
/// Constraint failures become `Conflict` or `Validation`; lock timeouts become `Busy`.
/// Anything else stays an opaque `Database` error. Raw SQLite messages are only logged.
pub(crate) fn translate(err: rusqlite::Error) -> CoreError {
    if let rusqlite::Error::SqliteFailure(e, message) = &err {
        match e.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => return CoreError::Busy,
            ErrorCode::ConstraintViolation => {
                let detail = message.as_deref().unwrap_or_default();
                return match constraint_kind(e.extended_code, message.as_deref()) {
                    Constraint::Unique => CoreError::Conflict(unique_violation_message(detail)),
                    Constraint::ForeignKey => CoreError::Validation(FieldErrors::single(
                        NON_FIELD_ERRORS,
                        "A referenced record does not exist.",
                    )),
                    Constraint::Other => {
                        tracing::warn!("constraint failure: {}", detail);
                        CoreError::Validation(FieldErrors::single(
                            NON_FIELD_ERRORS,
                            "The record breaks a storage constraint.",
                        ))
                    }
                };
            }
            _ => {}
        }
    }
    CoreError::Database(err)
}

fn unique_violation_message(detail: &str) -> String {
    let target = detail
        .strip_prefix(UNIQUE_FAILED)
        .map(|rest| rest.trim_start_matches(':'))
        .unwrap_or(detail)
        .trim();
    if target.is_empty() {
        "A record with the same unique values already exists.".into()
    } else {
        format!("A record with the same unique values already exists ({}).", target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_db(temp_dir: &TempDir) -> Database {
        let cfg = CoreConfig::for_database(temp_dir.path().join("test.db"))
            .expect("CoreConfig::for_database should succeed");
        Database::open(&cfg).expect("Database::open should succeed")
    }

    #[test]
    fn test_open_applies_schema_and_ping_succeeds() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = test_db(&temp_dir);
        db.ping().expect("ping should succeed");

        // Re-opening an existing database must be a no-op migration.
        let cfg = CoreConfig::for_database(db.path()).expect("config");
        Database::open(&cfg).expect("second open should succeed");
    }

    #[test]
    fn test_unique_violation_translates_to_conflict() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = test_db(&temp_dir);
        let insert = |tx: &Transaction<'_>| -> CoreResult<()> {
            tx.execute(
                "INSERT INTO system_configurations (id, created_at, updated_at, key, is_public, body)
                 VALUES (lower(hex(randomblob(16))), '', '', 'site_name', 0, '{}')",
                [],
            )?;
            Ok(())
        };
        db.write(insert).expect("first insert should succeed");
        let err = db.write(insert).expect_err("duplicate key should fail");
        assert!(matches!(err, CoreError::Conflict(msg) if msg.contains("system_configurations.key")));
    }

    #[test]
    fn test_failed_write_rolls_back() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = test_db(&temp_dir);
        let result: CoreResult<()> = db.write(|tx| {
            tx.execute(
                "INSERT INTO system_configurations (id, created_at, updated_at, key, is_public, body)
                 VALUES ('a', '', '', 'k', 0, '{}')",
                [],
            )?;
            Err(CoreError::Conflict("forced".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .read(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM system_configurations", [], |r| {
                    r.get(0)
                })?)
            })
            .expect("count should succeed");
        assert_eq!(count, 0);
    }

    #[test]
    fn test_constraint_kind_falls_back_to_message() {
        assert_eq!(
            constraint_kind(ffi::SQLITE_CONSTRAINT, Some("FOREIGN KEY constraint failed")),
            Constraint::ForeignKey
        );
        assert_eq!(
            constraint_kind(ffi::SQLITE_CONSTRAINT_FOREIGNKEY, None),
            Constraint::ForeignKey
        );
        assert_eq!(
            constraint_kind(ffi::SQLITE_CONSTRAINT, Some("UNIQUE constraint failed: t.key")),
            Constraint::Unique
        );
        assert_eq!(
            constraint_kind(ffi::SQLITE_CONSTRAINT_CHECK, Some("CHECK constraint failed: x")),
            Constraint::Other
        );
    }

    #[test]
    fn test_restricted_delete_is_foreign_key_violation() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = test_db(&temp_dir);
        let result = db.write(|tx| {
            tx.execute_batch(
                "CREATE TABLE parents (id TEXT PRIMARY KEY);
                 CREATE TABLE children (
                     id TEXT PRIMARY KEY,
                     parent_id TEXT NOT NULL REFERENCES parents(id) ON DELETE RESTRICT
                 );
                 INSERT INTO parents (id) VALUES ('p');
                 INSERT INTO children (id, parent_id) VALUES ('c', 'p');",
            )?;
            match tx.execute("DELETE FROM parents WHERE id = 'p'", []) {
                Err(err) => Ok(is_foreign_key_violation(&err)),
                Ok(_) => Ok(false),
            }
        });
        assert_eq!(result.ok(), Some(true));
    }

    #[test]
    fn test_constraint_detail_is_not_exposed() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db = test_db(&temp_dir);
        let err = db
            .write(|tx| {
                tx.execute_batch(
                    "CREATE TABLE checked (n INTEGER CHECK (n > 0));
                     INSERT INTO checked (n) VALUES (-1);",
                )?;
                Ok(())
            })
            .expect_err("check constraint should fail");
        assert!(
            matches!(&err, CoreError::Validation(e) if !e.to_string().contains("CHECK constraint"))
        );
    }

    #[test]
    fn test_lock_timeout_is_busy() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let cfg = CoreConfig::new(
            temp_dir.path().join("busy.db"),
            Duration::from_millis(10),
            20,
            100,
        )
        .expect("config");
        let db = Database::open(&cfg).expect("open");

        let mut holder = db.connect().expect("connect");
        let _lock = holder
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .expect("first writer takes the lock");

        let err = db.write(|_| Ok(())).expect_err("second writer should time out");
        assert!(err.is_retryable());
    }
}
