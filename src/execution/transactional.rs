//! Execution inside explicit transactions.

use super::connection::Connection;
use super::engine::{ExecutionEngine, ExecutionError};
use super::simple::SimpleExecutionEngine;
use crate::utils::now_timestamp;
use tracing::{debug, warn};

/// Runs each batch inside a transaction.
///
/// A transaction is opened lazily. A successful batch is committed unless
/// transactions are merged, in which case the transaction stays open for
/// the next batch and the caller must finish with
/// [`commit_existing_transaction`](Self::commit_existing_transaction). A
/// failed batch rolls back whatever the open transaction holds.
pub struct TransactionalExecutionEngine {
    inner: SimpleExecutionEngine,
    merge_transactions: bool,
    in_transaction: bool,
}

impl TransactionalExecutionEngine {
    pub fn new(connection: Box<dyn Connection>, merge_transactions: bool) -> Self {
        Self::from_simple(SimpleExecutionEngine::new(connection), merge_transactions)
    }

    pub fn from_simple(inner: SimpleExecutionEngine, merge_transactions: bool) -> Self {
        Self {
            inner,
            merge_transactions,
            in_transaction: false,
        }
    }

    pub fn merge_transactions(&self) -> bool {
        self.merge_transactions
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn connection(&mut self) -> &mut dyn Connection {
        self.inner.connection()
    }

    /// Commit the transaction left open by merged batches, if any.
    pub fn commit_existing_transaction(&mut self) -> Result<(), ExecutionError> {
        if !self.in_transaction {
            return Ok(());
        }
        if let Err(e) = self.inner.connection().commit() {
            self.rollback_open_transaction();
            return Err(ExecutionError::Transaction(e));
        }
        self.in_transaction = false;
        debug!("Committed transaction");
        Ok(())
    }

    /// Switch to a fresh connection. An open transaction on the old
    /// connection is rolled back first.
    pub fn new_connection(&mut self, connection: Box<dyn Connection>) {
        self.rollback_open_transaction();
        self.inner.replace_connection(connection);
        debug!("Switched to a new connection");
    }

    fn rollback_open_transaction(&mut self) {
        if !self.in_transaction {
            return;
        }
        self.in_transaction = false;
        if let Err(e) = self.inner.connection().rollback() {
            warn!(error = %e, "Rollback failed");
        }
    }

    fn begin_if_needed(&mut self) -> Result<(), ExecutionError> {
        if self.in_transaction {
            return Ok(());
        }
        self.inner
            .connection()
            .begin_transaction()
            .map_err(ExecutionError::Transaction)?;
        self.in_transaction = true;
        Ok(())
    }
}

impl ExecutionEngine for TransactionalExecutionEngine {
    fn execute_sql(&mut self, content: &str) -> bool {
        if let Err(e) = self.begin_if_needed() {
            self.inner.record_error(e);
            return false;
        }

        let result = if content.trim().is_empty() {
            Ok(())
        } else {
            self.inner.run_statements(content)
        };

        match result {
            Ok(()) if self.merge_transactions => true,
            Ok(()) => match self.commit_existing_transaction() {
                Ok(()) => true,
                Err(e) => {
                    self.inner.record_error(e);
                    false
                }
            },
            Err(e) => {
                self.rollback_open_transaction();
                self.inner.record_error(e);
                false
            }
        }
    }

    fn db_version(&mut self) -> String {
        self.inner.db_version()
    }

    fn set_db_version(&mut self, version: &str) -> bool {
        let sql = self.inner.version_insert_sql(version, &now_timestamp());
        self.execute_sql(&sql)
    }

    fn does_table_exist(&mut self, table: &str, column: &str) -> bool {
        self.inner.does_table_exist(table, column)
    }

    fn last_error(&self) -> Option<&ExecutionError> {
        self.inner.last_error()
    }
}

impl Drop for TransactionalExecutionEngine {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!("Rolling back uncommitted transaction");
            self.rollback_open_transaction();
        }
    }
}
