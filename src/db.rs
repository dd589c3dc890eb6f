//! Read-only access to the metadata database.
//!
//! [`ReadOnlyDb`] is a connection factory: every query opens its own
//! read-only SQLite connection, so handlers share nothing mutable.
//! Results carry the column names in statement order and the values as
//! `serde_json::Value`, which both the HTML and JSON renderers consume.

use std::path::PathBuf;
use std::time::Duration;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;

use crate::credentials::DbReaderAuth;
use crate::errors::GatewayError;

/// Positional query parameter.
pub type SqlParam = rusqlite::types::Value;

/// Column names plus rows, in database order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// Read-only connection factory for the metadata database.
#[derive(Debug, Clone)]
pub struct ReadOnlyDb {
    path: PathBuf,
    busy_timeout: Duration,
}

impl ReadOnlyDb {
    /// Factory for the database named by `auth`.
    pub fn from_auth(auth: &DbReaderAuth) -> Self {
        Self {
            path: PathBuf::from(&auth.database),
            busy_timeout: Duration::from_millis(auth.busy_timeout_ms),
        }
    }

    /// Open a fresh read-only connection.
    pub fn open(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(self.busy_timeout)?;
        Ok(conn)
    }

    /// Run `sql` with positional `params` and collect every row.
    pub fn query(&self, sql: &str, params: &[SqlParam]) -> rusqlite::Result<QueryResult> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();

        let mut rows_out = Vec::new();
        let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(width);
            for idx in 0..width {
                values.push(read_column(row.get_ref(idx)?));
            }
            rows_out.push(values);
        }

        Ok(QueryResult {
            columns,
            rows: rows_out,
        })
    }

    /// Run `f` against this database on the blocking thread pool.
    pub async fn run<T, F>(&self, f: F) -> Result<T, GatewayError>
    where
        F: FnOnce(&ReadOnlyDb) -> Result<T, GatewayError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| GatewayError::Internal(anyhow::anyhow!("database task failed: {e}")))?
    }
}

/// Convert one SQLite value to JSON.  Text that is not UTF-8 is decoded
/// lossily; blobs become lowercase hex.
fn read_column(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Number(v.into()),
        ValueRef::Real(v) => serde_json::Number::from_f64(v)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(v.to_string())),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(hex::encode(bytes)),
    }
}

/// Display form of a value for TSV and HTML cells.  NULL is empty.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Shared fixture database for unit tests.
#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use rusqlite::params;

    /// Schema and rows mirroring the production `downloadable` and
    /// `downloads` tables.
    pub fn create_fixture_db(path: &std::path::Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "
            CREATE TABLE downloadable (
                id       INTEGER PRIMARY KEY,
                s3key    TEXT NOT NULL,
                bytes    INTEGER NOT NULL,
                mtime    TEXT NOT NULL,
                tags     TEXT,
                present  INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE downloads (
                id         INTEGER PRIMARY KEY,
                did        INTEGER NOT NULL,
                bytes_sent INTEGER NOT NULL,
                dtime      TEXT NOT NULL
            );
            ",
        )
        .unwrap();

        let files: &[(i64, &str, i64, Option<&str>, i64)] = &[
            (1, "corpora/files/CC-MAIN-2021/0001.zip", 1000, Some("safedocs"), 1),
            (2, "corpora/files/CC-MAIN-2021/0002.zip", 2000, None, 1),
            (3, "corpora/drives/nps-2009-foo/disk.E01", 4096, Some("disk"), 1),
            (4, "corpora/drives/foo-removed.E01", 10, None, 0),
            (5, "downloads/foo\tbar.txt", 7, None, 1),
            (6, "corpora/scenarios/readme.txt", 300, Some("doc"), 1),
        ];
        for (id, key, bytes, tags, present) in files {
            conn.execute(
                "INSERT INTO downloadable (id, s3key, bytes, mtime, tags, present)
                 VALUES (?1, ?2, ?3, datetime('now', '-' || ?1 || ' days'), ?4, ?5)",
                params![id, key, bytes, tags, present],
            )
            .unwrap();
        }

        let downloads: &[(i64, i64, &str)] = &[
            (1, 1000, "-1 hours"),
            (1, 1000, "-2 days"),
            (2, 500, "-3 hours"),
            (3, 4096, "-10 days"),
            (6, 300, "-5 hours"),
        ];
        for (did, sent, age) in downloads {
            conn.execute(
                "INSERT INTO downloads (did, bytes_sent, dtime) VALUES (?1, ?2, datetime('now', ?3))",
                params![did, sent, age],
            )
            .unwrap();
        }
    }

    /// Temp directory plus a factory for a freshly created fixture database.
    pub fn fixture_db() -> (tempfile::TempDir, ReadOnlyDb) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metadata.db");
        create_fixture_db(&path);
        let db = ReadOnlyDb::from_auth(&DbReaderAuth {
            database: path.to_string_lossy().into_owned(),
            busy_timeout_ms: 1000,
        });
        (dir, db)
    }
}
