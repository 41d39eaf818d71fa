//! Table content reconciliation.
//!
//! Declared rows (usually read from an XML content file) are compared with
//! the live rows of a table by unique key. The result is a plan of
//! additions, updates and removals that renders to SQL.

mod column;
mod plan;
mod reconciler;
mod rows;
mod schema;
mod types;
mod value;

pub use column::{ColumnElement, ColumnKind, DbColumnType, TableColumnName, XmlColumnAlias};
pub use plan::{ChangeType, ChangedRow, ReconciliationPlan};
pub use reconciler::{RowAction, RowHook, RowHooks, TableReconciler};
pub use rows::{read_xml_rows, TableRow, XmlRow};
pub use schema::{TableDefinition, TableSchema};
pub use types::ReconcileError;
pub use value::{escape_sql_value, parse_decimal, KeyOrder, TableValue, DB_NULL};
