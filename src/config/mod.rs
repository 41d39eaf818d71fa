use crate::utils::{CONFIG_FILE, VERSION_TABLE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

fn default_version_table() -> String {
    VERSION_TABLE.to_string()
}

/// dbmods configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbModsConfig {
    /// SQLite database file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mods_file: Option<PathBuf>,
    /// Directory of `external_sql` step files. Defaults to `ExternalSql`
    /// next to the mods file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_sql_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<PathBuf>,
    /// Schema partition. 0 matches every mod.
    #[serde(default)]
    pub schema: u32,
    /// Keep one transaction open across mods instead of committing each.
    #[serde(default)]
    pub merge_transactions: bool,
    /// Values for `%KEY%` placeholders in SQL steps.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    #[serde(default = "default_version_table")]
    pub version_table: String,
}

impl Default for DbModsConfig {
    fn default() -> Self {
        Self {
            database: None,
            mods_file: None,
            external_sql_dir: None,
            content_dir: None,
            schema: 0,
            merge_transactions: false,
            parameters: BTreeMap::new(),
            version_table: default_version_table(),
        }
    }
}

/// Read the configuration file
pub fn read_config(config_path: &Path) -> Result<Option<DbModsConfig>, ConfigError> {
    if !config_path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(config_path)?;
    let config: DbModsConfig = serde_json::from_str(&content)?;
    Ok(Some(config))
}

/// Write the configuration file
pub fn write_config(config_path: &Path, config: &DbModsConfig) -> Result<(), ConfigError> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_path, content)?;
    Ok(())
}

/// The configuration file in `dir`.
pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}
