//! Version management for database schema versions.
//!
//! Versions are carried around as the exact strings used in the mod
//! catalog (they are graph vertices); `DbVersion` is only used where
//! versions have to be ordered.

mod types;

pub use types::{DbVersion, VersionError};

use tracing::{debug, warn};

/// The version reported for a database with no version history.
pub const NO_DB_VERSION: &str = "0.0";

/// Split `"1.2_3"` into `("1.2", Some("3"))`.
pub fn split_revision(version: &str) -> (&str, Option<&str>) {
    match version.split_once('_') {
        Some((dotted, revision)) => (dotted, Some(revision)),
        None => (version, None),
    }
}

/// Pick the highest version among `candidates`.
///
/// Blank candidates are ignored, as are candidates that do not parse (with a
/// warning). Returns the candidate string exactly as given so it can be
/// looked up in the version graph.
pub fn latest_version<'a, I>(candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut latest: Option<(DbVersion, &str)> = None;

    for candidate in candidates {
        if candidate.trim().is_empty() {
            continue;
        }
        let parsed = match DbVersion::parse(candidate) {
            Ok(v) => v,
            Err(e) => {
                warn!(version = %candidate, error = %e, "Ignoring unparsable version");
                continue;
            }
        };
        let is_newer = latest
            .as_ref()
            .map(|(current, _)| parsed > *current)
            .unwrap_or(true);
        if is_newer {
            latest = Some((parsed, candidate));
        }
    }

    let latest = latest.map(|(_, raw)| raw.to_string());
    debug!(latest = ?latest, "Resolved latest version");
    latest
}
