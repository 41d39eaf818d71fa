//! Version types for database schema versions.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Error types for version operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {0}")]
    InvalidFormat(String),
}

/// A database version: `major.minor[.build[.revision]]` with an optional
/// `_<revision>` suffix.
///
/// The suffix is an independent counter, not the fourth dotted component.
/// Missing dotted components compare as zero, so `1.2` and `1.2.0` are
/// equal; the suffix only breaks ties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbVersion {
    pub components: Vec<u32>,
    pub revision: u32,
}

impl DbVersion {
    /// Create a version from its dotted components and suffix revision.
    pub fn new(components: Vec<u32>, revision: u32) -> Self {
        Self {
            components,
            revision,
        }
    }

    /// Parse a version string (e.g., "2.24", "2.24.1_3").
    pub fn parse(s: &str) -> Result<Self, VersionError> {
        let (dotted, revision) = super::split_revision(s.trim());

        let components = dotted
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VersionError::InvalidFormat(s.to_string()))?;

        if components.len() < 2 || components.len() > 4 {
            return Err(VersionError::InvalidFormat(s.to_string()));
        }

        let revision = match revision {
            Some(r) => r
                .parse::<u32>()
                .map_err(|_| VersionError::InvalidFormat(s.to_string()))?,
            None => 0,
        };

        Ok(Self {
            components,
            revision,
        })
    }

    fn component(&self, index: usize) -> u32 {
        self.components.get(index).copied().unwrap_or(0)
    }
}

impl fmt::Display for DbVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dotted: Vec<String> = self.components.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", dotted.join("."))?;
        if self.revision != 0 {
            write!(f, "_{}", self.revision)?;
        }
        Ok(())
    }
}

impl Ord for DbVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (0..4)
            .map(|i| self.component(i).cmp(&other.component(i)))
            .find(|ordering| *ordering != Ordering::Equal)
            .unwrap_or_else(|| self.revision.cmp(&other.revision))
    }
}

impl PartialOrd for DbVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DbVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DbVersion {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_components() {
        let v = DbVersion::parse("2.24").unwrap();
        assert_eq!(v.components, vec![2, 24]);
        assert_eq!(v.revision, 0);
    }

    #[test]
    fn test_parse_with_revision_suffix() {
        let v = DbVersion::parse("1.2.3.4_7").unwrap();
        assert_eq!(v.components, vec![1, 2, 3, 4]);
        assert_eq!(v.revision, 7);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(DbVersion::parse("").is_err());
        assert!(DbVersion::parse("1").is_err());
        assert!(DbVersion::parse("1.2.3.4.5").is_err());
        assert!(DbVersion::parse("1.x").is_err());
        assert!(DbVersion::parse("1.2_b").is_err());
    }

    #[test]
    fn test_display_round_trip() {
        assert_eq!(DbVersion::parse("3.1").unwrap().to_string(), "3.1");
        assert_eq!(DbVersion::parse("3.1.0_2").unwrap().to_string(), "3.1.0_2");
    }

    #[test]
    fn test_missing_components_compare_as_zero() {
        assert_eq!(
            DbVersion::parse("1.2").unwrap(),
            DbVersion::parse("1.2.0.0").unwrap()
        );
        assert!(DbVersion::parse("1.2").unwrap() < DbVersion::parse("1.2.0.1").unwrap());
    }

    #[test]
    fn test_numeric_not_lexical_ordering() {
        assert!(DbVersion::parse("1.9").unwrap() < DbVersion::parse("1.10").unwrap());
        assert!(DbVersion::parse("2.0").unwrap() > DbVersion::parse("1.99.99").unwrap());
    }

    #[test]
    fn test_revision_breaks_ties() {
        assert!(DbVersion::parse("1.5_1").unwrap() < DbVersion::parse("1.5_2").unwrap());
        assert!(DbVersion::parse("1.5_9").unwrap() < DbVersion::parse("1.6").unwrap());
    }
}
