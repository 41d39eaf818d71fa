//! Migration engine for versioned database schemas.
//!
//! # Overview
//!
//! - Mods come from a [`ModCatalog`](crate::mods::ModCatalog)
//! - The `MigrationEngine` resolves the cheapest version path and applies
//!   each mod's steps through an [`ExecutionEngine`](crate::execution::ExecutionEngine)
//! - Progress is reported as [`MigrationEvent`]s to registered listeners
//! - A step failure stops the path; the database stays at the last
//!   version reached
//! - A shared `MigrationLock` keeps updates from overlapping
//!
//! # Usage
//!
//! ```ignore
//! let catalog = ModCatalog::load(Path::new("mods.xml"))?;
//! let mut migration = MigrationEngine::new(catalog).with_parameter("DB", "main");
//! migration.add_listener(Box::new(LoggingListener));
//! let reached = migration.update_db(&mut engine, &current, None)?;
//! ```

mod executor;
mod guard;
mod types;

pub use executor::{does_mod_apply, MigrationEngine, MAX_CHAIN_DEPTH};
pub use guard::{MigrationLock, RunGuard};
pub use types::{
    LoggingListener, MigrationError, MigrationEvent, MigrationListener, ModSnapshot, StepError,
    StepSnapshot,
};
