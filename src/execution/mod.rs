//! SQL execution against a live database.
//!
//! [`Connection`] is the driver surface; [`ExecutionEngine`] turns SQL
//! content into statements and decides how they are grouped into
//! transactions. Engines convert failures into a `false` return and keep the
//! error, so callers such as the migration engine decide whether to abort.

mod connection;
mod engine;
mod retry;
mod simple;
mod sqlite;
mod transactional;

pub use connection::{ColumnInfo, Connection, ConnectionError, DbValue};
pub use engine::{ExecutionEngine, ExecutionError};
pub use retry::{with_deadlock_retry, MAX_DEADLOCK_RETRIES};
pub use simple::{split_statements, SimpleExecutionEngine};
pub use sqlite::SqliteConnection;
pub use transactional::TransactionalExecutionEngine;
