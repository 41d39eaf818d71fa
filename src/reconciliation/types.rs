use crate::execution::ConnectionError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("XML error: {0}")]
    XmlError(#[from] roxmltree::Error),

    #[error("Database error: {0}")]
    ConnectionError(#[from] ConnectionError),

    #[error("Unknown column '{column}' with value '{value}' in content for table {table}")]
    UnknownColumn {
        table: String,
        column: String,
        value: String,
    },

    #[error("Invalid value for column `{column}` in table `{table}`: '{value}' is not {expected}")]
    InvalidValue {
        table: String,
        column: String,
        value: String,
        expected: &'static str,
    },

    #[error("Row in content for table {table} has no value for unique column {column}")]
    MissingKey { table: String, column: String },

    #[error("Key '{key}' is declared more than once in content for table {table}")]
    DuplicateKey { table: String, key: String },

    #[error("Cannot compare values of {expected} and {found} elements")]
    ArityMismatch { expected: usize, found: usize },

    #[error("Unrecognized column type: {0}")]
    InvalidColumnType(String),
}
