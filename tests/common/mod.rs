#![allow(dead_code)]

use dbmods::execution::{ColumnInfo, Connection, ConnectionError, DbValue, SqliteConnection};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn create_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Write `content` to `dir/name`, creating parent directories.
pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("Failed to create parent dir");
    }
    fs::write(&path, content).expect("Failed to write test file");
    path
}

/// An in-memory SQLite database with `sql` already run.
pub fn sqlite_with(sql: &str) -> SqliteConnection {
    let mut conn = SqliteConnection::open_in_memory().expect("Failed to open SQLite");
    if !sql.trim().is_empty() {
        conn.execute(sql).expect("Failed to run setup SQL");
    }
    conn
}

/// First column of every row, as text.
pub fn column_texts(conn: &mut dyn Connection, sql: &str) -> Vec<String> {
    conn.query(sql)
        .expect("Query should succeed")
        .into_iter()
        .map(|row| {
            row.into_iter()
                .next()
                .and_then(|v| v.to_text())
                .unwrap_or_else(|| "NULL".to_string())
        })
        .collect()
}

/// Every row with its columns joined by `|`.
pub fn row_texts(conn: &mut dyn Connection, sql: &str) -> Vec<String> {
    conn.query(sql)
        .expect("Query should succeed")
        .into_iter()
        .map(|row| {
            row.iter()
                .map(|v| v.to_text().unwrap_or_else(|| "NULL".to_string()))
                .collect::<Vec<_>>()
                .join("|")
        })
        .collect()
}

pub fn count_rows(conn: &mut dyn Connection, table: &str) -> i64 {
    match conn
        .query_scalar(&format!("SELECT count(*) FROM {}", table))
        .expect("Count should succeed")
    {
        Some(DbValue::Integer(n)) => n,
        other => panic!("Unexpected count result: {:?}", other),
    }
}

/// Shared record of what a [`FakeConnection`] was asked to do.
///
/// Statements are recorded as written; transaction control is recorded as
/// `BEGIN`, `COMMIT` and `ROLLBACK`.
#[derive(Debug, Clone, Default)]
pub struct ConnectionLog(Arc<Mutex<Vec<String>>>);

impl ConnectionLog {
    pub fn entries(&self) -> Vec<String> {
        self.0.lock().expect("log lock").clone()
    }

    fn push(&self, entry: &str) {
        self.0.lock().expect("log lock").push(entry.to_string());
    }
}

/// A scripted connection for exercising the engines without a database.
#[derive(Default)]
pub struct FakeConnection {
    log: ConnectionLog,
    fail_on: Option<String>,
    deadlock_on: Option<String>,
    tables: HashMap<String, Vec<ColumnInfo>>,
    in_transaction: bool,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log(mut self, log: ConnectionLog) -> Self {
        self.log = log;
        self
    }

    /// Statements containing `pattern` fail with a SQL error.
    pub fn fail_on(mut self, pattern: &str) -> Self {
        self.fail_on = Some(pattern.to_string());
        self
    }

    /// Statements containing `pattern` lose a deadlock.
    pub fn deadlock_on(mut self, pattern: &str) -> Self {
        self.deadlock_on = Some(pattern.to_string());
        self
    }

    pub fn with_table(mut self, table: &str, columns: &[&str]) -> Self {
        let columns = columns
            .iter()
            .map(|c| ColumnInfo::new(*c, "varchar(64)", false))
            .collect();
        self.tables.insert(table.to_lowercase(), columns);
        self
    }

    pub fn log(&self) -> ConnectionLog {
        self.log.clone()
    }
}

impl Connection for FakeConnection {
    fn execute(&mut self, sql: &str) -> Result<usize, ConnectionError> {
        if self.deadlock_on.as_deref().is_some_and(|p| sql.contains(p)) {
            return Err(ConnectionError::Deadlock("chosen as deadlock victim".to_string()));
        }
        if self.fail_on.as_deref().is_some_and(|p| sql.contains(p)) {
            return Err(ConnectionError::Sql(format!("cannot run: {}", sql)));
        }
        self.log.push(sql);
        Ok(1)
    }

    fn query(&mut self, _sql: &str) -> Result<Vec<Vec<DbValue>>, ConnectionError> {
        Ok(Vec::new())
    }

    fn begin_transaction(&mut self) -> Result<(), ConnectionError> {
        self.in_transaction = true;
        self.log.push("BEGIN");
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        if !self.in_transaction {
            return Err(ConnectionError::NoTransaction);
        }
        self.in_transaction = false;
        self.log.push("COMMIT");
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        if !self.in_transaction {
            return Err(ConnectionError::NoTransaction);
        }
        self.in_transaction = false;
        self.log.push("ROLLBACK");
        Ok(())
    }

    fn table_exists(&mut self, table: &str) -> Result<bool, ConnectionError> {
        Ok(self.tables.contains_key(&table.to_lowercase()))
    }

    fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, ConnectionError> {
        Ok(self
            .tables
            .get(&table.to_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}
