//! Types for the mod catalog.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error types for loading and querying the mod catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("XML error: {0}")]
    XmlError(#[from] roxmltree::Error),

    #[error("Mods document has no <mods> root element")]
    MissingRoot,

    #[error("Mods document contains no <mod> elements")]
    NoMods,

    #[error("Invalid schema '{0}' on mod {1}")]
    InvalidSchema(String, String),

    #[error("Invalid mod chain '{0}', expected <from>,<to>[-<final>]")]
    InvalidChain(String),

    #[error("Duplicate mod definition: {0}")]
    DuplicateMod(String),

    #[error("Current version {0} does not exist")]
    CurrentVersionMissing(String),

    #[error("Requested version {0} does not exist")]
    RequestedVersionMissing(String),

    #[error("No rules to get from version {0} to version {1}")]
    NoPath(String, String),

    #[error("No target version could be determined from the catalog")]
    NoLatestVersion,
}

/// What a step does when applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    /// SQL carried in the step body.
    InlineSql,
    /// Name of a SQL file in the external SQL directory.
    ExternalSql,
    /// A nested chain directive, see [`ModChain`].
    Mod,
    /// A step kind this engine does not execute (embedded scripts, processes).
    Unsupported(String),
}

impl StepType {
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "inline_sql" => StepType::InlineSql,
            "external_sql" => StepType::ExternalSql,
            "mod" => StepType::Mod,
            other => StepType::Unsupported(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StepType::InlineSql => "inline_sql",
            StepType::ExternalSql => "external_sql",
            StepType::Mod => "mod",
            StepType::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One executable unit inside a mod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub step_type: StepType,
    pub content: String,
}

impl Step {
    pub fn new(step_type: StepType, content: impl Into<String>) -> Self {
        Self {
            step_type,
            content: content.into(),
        }
    }
}

/// A parsed `mod` step directive: `<from>,<to>[-<final>]`.
///
/// Applies the mod `from -> to`, then follows the cheapest path from `to`
/// to `final_version` (which defaults to `to`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModChain {
    pub from: String,
    pub to: String,
    pub final_version: String,
}

impl ModChain {
    pub fn parse(directive: &str) -> Result<Self, CatalogError> {
        let invalid = || CatalogError::InvalidChain(directive.to_string());
        let directive = directive.trim();

        let (source, dest) = match directive.split_once('-') {
            Some((source, dest)) => (source.trim(), Some(dest.trim())),
            None => (directive, None),
        };
        let (from, to) = source.split_once(',').ok_or_else(invalid)?;
        let (from, to) = (from.trim(), to.trim());
        if from.is_empty() || to.is_empty() || to.contains(',') {
            return Err(invalid());
        }

        let final_version = match dest {
            Some("") => return Err(invalid()),
            Some(dest) => dest,
            None => to,
        };

        Ok(Self {
            from: from.to_string(),
            to: to.to_string(),
            final_version: final_version.to_string(),
        })
    }
}

/// Existence checks that decide whether a mod's steps run at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModGuard {
    pub if_table_exists: Option<String>,
    pub if_column_exists: Option<String>,
    pub if_table_not_exists: Option<String>,
    pub if_column_not_exists: Option<String>,
}

/// One atomic schema transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mod {
    pub author: String,
    pub from: String,
    pub from_minor: String,
    pub to: String,
    pub to_minor: String,
    pub date: String,
    pub comment: String,
    /// Schema partition; 0 applies to any schema.
    pub schema: u32,
    pub guard: ModGuard,
    pub steps: Vec<Step>,
}

impl Mod {
    /// Source version vertex, e.g. `1.2` or `1.2_3`.
    pub fn from_concat(&self) -> String {
        concat_version(&self.from, &self.from_minor)
    }

    /// Target version vertex.
    pub fn to_concat(&self) -> String {
        concat_version(&self.to, &self.to_minor)
    }

    pub fn transition(&self) -> ModTransition {
        ModTransition::new(self.from_concat(), self.to_concat(), self.schema)
    }

    /// Graph edge weight: the number of steps.
    pub fn weight(&self) -> u32 {
        u32::try_from(self.steps.len()).unwrap_or(u32::MAX)
    }
}

fn concat_version(version: &str, minor: &str) -> String {
    let minor = minor.trim();
    if minor.is_empty() || minor == "0" {
        version.to_string()
    } else {
        format!("{}_{}", version, minor)
    }
}

/// The identity key of a mod.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModTransition {
    pub from: String,
    pub to: String,
    pub schema: u32,
}

impl ModTransition {
    pub fn new(from: impl Into<String>, to: impl Into<String>, schema: u32) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            schema,
        }
    }

    /// Wildcard-aware match: schema 0 on either side matches any schema.
    pub fn matches(&self, other: &ModTransition) -> bool {
        self.from == other.from
            && self.to == other.to
            && (self.schema == 0 || other.schema == 0 || self.schema == other.schema)
    }
}

impl fmt::Display for ModTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {} (schema {})", self.from, self.to, self.schema)
    }
}
