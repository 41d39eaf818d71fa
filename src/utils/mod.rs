use std::path::{Path, PathBuf};

/// Default name of the directory holding `external_sql` step files,
/// resolved next to the mods file.
pub const EXTERNAL_SQL_DIR: &str = "ExternalSql";

/// Default name of the version-tracking table
pub const VERSION_TABLE: &str = "versions";

/// Default configuration file name
pub const CONFIG_FILE: &str = "dbmods.json";

/// Get current UTC timestamp in the format stored in the version table
pub fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Resolve `path` against the directory containing `anchor_file`.
///
/// Absolute paths are returned unchanged.
pub fn resolve_support_path(anchor_file: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match anchor_file.parent() {
        Some(dir) => dir.join(path),
        None => path.to_path_buf(),
    }
}

/// Default external SQL directory for a mods file
pub fn default_external_sql_dir(mods_file: &Path) -> PathBuf {
    resolve_support_path(mods_file, Path::new(EXTERNAL_SQL_DIR))
}
