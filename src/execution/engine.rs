//! The execution engine contract.

use super::connection::ConnectionError;
use thiserror::Error;

/// A failed SQL batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Statement failed: {error}\n{statement}")]
    Statement {
        statement: String,
        error: ConnectionError,
    },

    #[error("Transaction error: {0}")]
    Transaction(ConnectionError),
}

impl ExecutionError {
    pub fn connection_error(&self) -> &ConnectionError {
        match self {
            ExecutionError::Statement { error, .. } => error,
            ExecutionError::Transaction(error) => error,
        }
    }

    /// Whether the batch can be retried on a fresh connection.
    pub fn is_deadlock(&self) -> bool {
        self.connection_error().is_deadlock()
    }

    /// The statement that failed, if the failure came from one.
    pub fn statement(&self) -> Option<&str> {
        match self {
            ExecutionError::Statement { statement, .. } => Some(statement),
            ExecutionError::Transaction(_) => None,
        }
    }
}

/// Executes SQL content against a database.
///
/// Failures never propagate past this boundary: `execute_sql` reports
/// `false` and keeps the error for [`last_error`](Self::last_error). The
/// caller decides whether to abort.
pub trait ExecutionEngine {
    /// Run a batch of statements. Returns `false` on the first failure.
    fn execute_sql(&mut self, content: &str) -> bool;

    /// The newest version recorded in the version table, or `0.0`.
    fn db_version(&mut self) -> String;

    /// Record `version` as applied now.
    fn set_db_version(&mut self, version: &str) -> bool;

    /// Whether `table` exists, or when `column` is non-empty, whether the
    /// column exists on it. Probe failures count as "does not exist".
    fn does_table_exist(&mut self, table: &str, column: &str) -> bool;

    /// The error of the most recent failed batch.
    fn last_error(&self) -> Option<&ExecutionError>;
}
