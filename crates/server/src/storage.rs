use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thirdlogin_api::db::Built;
use thirdlogin_api::db::migrations::MIGRATIONS;

/// Shared database state
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    data_dir: PathBuf,
}

impl Db {
    /// Lock the connection. A poisoned lock is recovered: SQLite rolls back
    /// any transaction the panicking holder left open when it is dropped.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Root directory for uploaded files (avatars).
    pub fn files_dir(&self) -> PathBuf {
        self.data_dir.join("files")
    }
}

/// Initialize the database: open connection, enable WAL, run migrations
pub fn init_db(data_dir: &Path) -> Result<Db> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("thirdlogin.db");
    let conn = Connection::open(&db_path).context("opening SQLite database")?;

    // Enable WAL mode for better concurrent read performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
        data_dir: data_dir.to_path_buf(),
    })
}

fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// sea-query → rusqlite glue
// ---------------------------------------------------------------------------

fn bind_values(values: &sea_query::Values) -> Vec<SqlValue> {
    use sea_query::Value;

    values
        .0
        .iter()
        .map(|v| match v {
            Value::Bool(b) => b.map_or(SqlValue::Null, |b| SqlValue::Integer(i64::from(b))),
            Value::TinyInt(n) => n.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
            Value::SmallInt(n) => n.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
            Value::Int(n) => n.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
            Value::BigInt(n) => n.map_or(SqlValue::Null, SqlValue::Integer),
            Value::TinyUnsigned(n) => n.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
            Value::SmallUnsigned(n) => n.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
            Value::Unsigned(n) => n.map_or(SqlValue::Null, |n| SqlValue::Integer(n.into())),
            Value::BigUnsigned(n) => n.map_or(SqlValue::Null, |n| {
                SqlValue::Integer(i64::try_from(n).unwrap_or(i64::MAX))
            }),
            Value::Float(f) => f.map_or(SqlValue::Null, |f| SqlValue::Real(f.into())),
            Value::Double(f) => f.map_or(SqlValue::Null, SqlValue::Real),
            Value::String(s) => s
                .as_ref()
                .map_or(SqlValue::Null, |s| SqlValue::Text(s.to_string())),
            Value::Char(c) => c.map_or(SqlValue::Null, |c| SqlValue::Text(c.to_string())),
            Value::Bytes(b) => b
                .as_ref()
                .map_or(SqlValue::Null, |b| SqlValue::Blob(b.to_vec())),
            #[allow(unreachable_patterns)]
            _ => SqlValue::Null,
        })
        .collect()
}

/// Execute a built statement, returning the number of affected rows.
pub fn sq_execute(conn: &Connection, (sql, values): Built) -> rusqlite::Result<usize> {
    conn.execute(&sql, rusqlite::params_from_iter(bind_values(&values)))
}

/// Run a built query expected to return exactly one row.
pub fn sq_query_row<T, F>(conn: &Connection, (sql, values): Built, f: F) -> rusqlite::Result<T>
where
    F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
{
    conn.query_row(&sql, rusqlite::params_from_iter(bind_values(&values)), f)
}

/// Whether an error is a UNIQUE/PRIMARY KEY violation.
pub fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
    )
}


#[cfg(test)]
mod tests {
    use super::test_support::test_db;
    use super::*;
    use thirdlogin_api::db::users;

    #[test]
    fn migrations_are_idempotent() {
        let t = test_db();
        let conn = t.db.conn();
        run_migrations(&conn).unwrap();
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }

    #[test]
    fn unique_violation_is_detected() {
        let t = test_db();
        let conn = t.db.conn();
        let account = users::NewAccount {
            uid: "u1",
            name: "a",
            username: "a",
            email: None,
            device_flag: 0,
            has_avatar: false,
        };
        sq_execute(&conn, users::insert_account(&account)).unwrap();
        let err = sq_execute(&conn, users::insert_account(&account)).unwrap_err();
        assert!(is_unique_violation(&err));

        let count: i64 = sq_query_row(&conn, users::count(), |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }
}
