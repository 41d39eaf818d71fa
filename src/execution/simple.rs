//! Statement-at-a-time execution without transaction management.

use super::connection::{Connection, ConnectionError};
use super::engine::{ExecutionEngine, ExecutionError};
use crate::utils::{now_timestamp, VERSION_TABLE};
use crate::version::{split_revision, NO_DB_VERSION};
use tracing::{debug, warn};

/// Split SQL content into statements.
///
/// Statements are separated by `;` or by a line holding only `GO`. `\;`
/// keeps a literal `;` inside a statement. Every other backslash pair is
/// left untouched for the driver. Blank statements are dropped.
pub fn split_statements(content: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();

    for line in content.split_inclusive('\n') {
        if line.trim().eq_ignore_ascii_case("GO") {
            push_statement(&mut statements, &mut current);
            continue;
        }
        let mut chars = line.chars();
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some(';') => current.push(';'),
                    Some(next) => {
                        current.push('\\');
                        current.push(next);
                    }
                    None => current.push('\\'),
                },
                ';' => push_statement(&mut statements, &mut current),
                _ => current.push(c),
            }
        }
    }
    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let statement = current.trim();
    if !statement.is_empty() {
        statements.push(statement.to_string());
    }
    current.clear();
}

/// Runs each statement of a batch directly on the connection.
pub struct SimpleExecutionEngine {
    connection: Box<dyn Connection>,
    version_table: String,
    last_error: Option<ExecutionError>,
}

impl SimpleExecutionEngine {
    pub fn new(connection: Box<dyn Connection>) -> Self {
        Self {
            connection,
            version_table: VERSION_TABLE.to_string(),
            last_error: None,
        }
    }

    pub fn with_version_table(mut self, table: impl Into<String>) -> Self {
        self.version_table = table.into();
        self
    }

    pub fn version_table(&self) -> &str {
        &self.version_table
    }

    pub fn connection(&mut self) -> &mut dyn Connection {
        self.connection.as_mut()
    }

    /// Swap in a new connection, returning the old one.
    pub fn replace_connection(&mut self, connection: Box<dyn Connection>) -> Box<dyn Connection> {
        std::mem::replace(&mut self.connection, connection)
    }

    pub(crate) fn record_error(&mut self, error: ExecutionError) {
        warn!(error = %error, "SQL execution failed");
        self.last_error = Some(error);
    }

    /// Run every statement of `content`, stopping at the first failure.
    pub fn run_statements(&mut self, content: &str) -> Result<(), ExecutionError> {
        for statement in split_statements(content) {
            debug!(statement = %statement, "Executing statement");
            self.connection
                .execute(&statement)
                .map_err(|error| ExecutionError::Statement {
                    statement: statement.clone(),
                    error,
                })?;
        }
        Ok(())
    }

    /// SQL recording `version` in the version table.
    ///
    /// The `_revision` suffix goes into its own column when present and
    /// non-zero.
    pub fn version_insert_sql(&self, version: &str, applied: &str) -> String {
        let (dotted, revision) = split_revision(version);
        match revision.filter(|r| !r.is_empty() && *r != "0") {
            Some(revision) => format!(
                "INSERT INTO {}(version, revision, applied) VALUES('{}', '{}', '{}')",
                self.version_table, dotted, revision, applied
            ),
            None => format!(
                "INSERT INTO {}(version, applied) VALUES('{}', '{}')",
                self.version_table, dotted, applied
            ),
        }
    }

    fn read_db_version(&mut self) -> Result<Option<String>, ConnectionError> {
        let sql = format!(
            "SELECT version, revision FROM {} ORDER BY versionid DESC LIMIT 1",
            self.version_table
        );
        let Some(row) = self.connection.query(&sql)?.into_iter().next() else {
            return Ok(None);
        };

        let version = row.first().and_then(|v| v.to_text());
        let revision = row
            .get(1)
            .and_then(|v| v.to_text())
            .filter(|r| !r.trim().is_empty() && r.trim() != "0");

        Ok(version.map(|v| match revision {
            Some(r) => format!("{}_{}", v.trim(), r.trim()),
            None => v.trim().to_string(),
        }))
    }
}

impl ExecutionEngine for SimpleExecutionEngine {
    fn execute_sql(&mut self, content: &str) -> bool {
        match self.run_statements(content) {
            Ok(()) => true,
            Err(e) => {
                self.record_error(e);
                false
            }
        }
    }

    fn db_version(&mut self) -> String {
        match self.read_db_version() {
            Ok(Some(version)) if !version.is_empty() => version,
            Ok(_) => NO_DB_VERSION.to_string(),
            Err(e) => {
                debug!(error = %e, "Could not read database version");
                NO_DB_VERSION.to_string()
            }
        }
    }

    fn set_db_version(&mut self, version: &str) -> bool {
        let sql = self.version_insert_sql(version, &now_timestamp());
        self.execute_sql(&sql)
    }

    fn does_table_exist(&mut self, table: &str, column: &str) -> bool {
        if table.is_empty() {
            return false;
        }
        let result = if column.is_empty() {
            self.connection.table_exists(table)
        } else {
            self.connection.column_exists(table, column)
        };
        result.unwrap_or_else(|e| {
            debug!(table = %table, column = %column, error = %e, "Existence probe failed");
            false
        })
    }

    fn last_error(&self) -> Option<&ExecutionError> {
        self.last_error.as_ref()
    }
}
