//! Mods: versioned schema transitions and the catalog that holds them.
//!
//! A mod moves the database from one version to another by running its
//! steps in order. The catalog indexes mods by `(from, to, schema)` and turns
//! each schema partition into a [`WeightedGraph`](crate::graph::WeightedGraph)
//! whose cheapest path is the sequence of mods to apply.

mod catalog;
mod parser;
mod types;

pub use catalog::{ModCatalog, ResolvedPath};
pub use parser::{escape_xml, load_mods, mods_to_xml, parse_mods};
pub use types::{CatalogError, Mod, ModChain, ModGuard, ModTransition, Step, StepType};
