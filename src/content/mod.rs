//! Content synchronization for the built-in tables.
//!
//! Each document in the content directory declares the rows one or more
//! tables should hold. The generator reconciles every table and joins the
//! resulting SQL into one batch.

mod generator;
pub mod tables;

pub use generator::{ContentError, ContentGenerator};
