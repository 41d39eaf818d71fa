pub mod config;
pub mod content;
pub mod execution;
pub mod graph;
pub mod migration;
pub mod mods;
pub mod reconciliation;
pub mod utils;
pub mod version;

// Re-export commonly used types
pub use config::{read_config, write_config, ConfigError, DbModsConfig};
pub use content::{ContentError, ContentGenerator};
pub use execution::{
    Connection, ConnectionError, ExecutionEngine, ExecutionError, SimpleExecutionEngine,
    SqliteConnection, TransactionalExecutionEngine,
};
pub use graph::WeightedGraph;
pub use migration::{
    LoggingListener, MigrationEngine, MigrationError, MigrationEvent, MigrationListener,
    MigrationLock, StepError,
};
pub use mods::{CatalogError, Mod, ModCatalog, ModTransition, Step, StepType};
pub use reconciliation::{
    ChangeType, ChangedRow, ReconcileError, ReconciliationPlan, RowAction, RowHooks,
    TableDefinition, TableReconciler, TableValue, XmlColumnAlias, XmlRow,
};
pub use version::{DbVersion, VersionError};
