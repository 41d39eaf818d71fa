//! The database surface the engines run against.

use std::fmt;
use thiserror::Error;

/// Error types for database operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("SQL error: {0}")]
    Sql(String),

    /// The database chose this connection as a deadlock (or lock timeout)
    /// victim. The work can be retried on a fresh connection.
    #[error("Deadlock: {0}")]
    Deadlock(String),

    #[error("No open transaction")]
    NoTransaction,
}

impl ConnectionError {
    pub fn is_deadlock(&self) -> bool {
        matches!(self, ConnectionError::Deadlock(_))
    }
}

/// A single value read from a result set.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// Text form of the value, `None` for NULL. Blobs are decoded lossily.
    pub fn to_text(&self) -> Option<String> {
        match self {
            DbValue::Null => None,
            DbValue::Integer(i) => Some(i.to_string()),
            DbValue::Real(r) => Some(r.to_string()),
            DbValue::Text(s) => Some(s.clone()),
            DbValue::Blob(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Whether the stored value looks like a number.
    pub fn is_numeric(&self) -> bool {
        match self {
            DbValue::Integer(_) | DbValue::Real(_) => true,
            DbValue::Text(s) => s.trim().parse::<f64>().is_ok(),
            DbValue::Null | DbValue::Blob(_) => false,
        }
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_text() {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "NULL"),
        }
    }
}

/// Column metadata of a live table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type as reported by the database, e.g. `varchar(64)`.
    pub type_name: String,
    pub primary_key: bool,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>, primary_key: bool) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            primary_key,
        }
    }
}

/// A connection to the database being migrated.
///
/// Implementations are driver adapters; the engines only need statement
/// execution, row reads, explicit transactions and schema probes.
pub trait Connection {
    /// Run a statement that returns no rows. Returns the affected row count.
    fn execute(&mut self, sql: &str) -> Result<usize, ConnectionError>;

    /// Run a query and return every row.
    fn query(&mut self, sql: &str) -> Result<Vec<Vec<DbValue>>, ConnectionError>;

    /// First column of the first row, if any.
    fn query_scalar(&mut self, sql: &str) -> Result<Option<DbValue>, ConnectionError> {
        Ok(self
            .query(sql)?
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next()))
    }

    fn begin_transaction(&mut self) -> Result<(), ConnectionError>;

    fn commit(&mut self) -> Result<(), ConnectionError>;

    fn rollback(&mut self) -> Result<(), ConnectionError>;

    fn table_exists(&mut self, table: &str) -> Result<bool, ConnectionError>;

    fn column_exists(&mut self, table: &str, column: &str) -> Result<bool, ConnectionError> {
        Ok(self
            .table_columns(table)?
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(column)))
    }

    /// Columns of `table` in declaration order. Empty if the table is absent.
    fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, ConnectionError>;
}
