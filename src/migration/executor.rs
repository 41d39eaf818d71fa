//! Migration engine: resolves version paths and applies mods.

use super::guard::MigrationLock;
use super::types::{
    MigrationError, MigrationEvent, MigrationListener, ModSnapshot, StepError, StepSnapshot,
};
use crate::execution::ExecutionEngine;
use crate::mods::{CatalogError, Mod, ModCatalog, ModChain, ResolvedPath, Step, StepType};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mod chains may nest at most this deep.
pub const MAX_CHAIN_DEPTH: usize = 16;

/// Applies mods from a catalog to a database.
///
/// The engine owns the catalog, the active schema partition and the
/// `%KEY%` parameters. SQL runs through the [`ExecutionEngine`] passed to
/// each call, so the caller decides on transaction policy.
pub struct MigrationEngine {
    catalog: Arc<ModCatalog>,
    schema: u32,
    parameters: BTreeMap<String, String>,
    external_sql_dir: PathBuf,
    listeners: Vec<Box<dyn MigrationListener>>,
    lock: Arc<MigrationLock>,
}

impl MigrationEngine {
    pub fn new(catalog: ModCatalog) -> Self {
        Self {
            catalog: Arc::new(catalog),
            schema: 0,
            parameters: BTreeMap::new(),
            external_sql_dir: PathBuf::from(crate::utils::EXTERNAL_SQL_DIR),
            listeners: Vec::new(),
            lock: Arc::new(MigrationLock::new()),
        }
    }

    /// Start resolution in a concrete schema instead of the wildcard.
    pub fn with_schema(mut self, schema: u32) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Directory `external_sql` step files are read from.
    pub fn with_external_sql_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.external_sql_dir = dir.into();
        self
    }

    /// Share a run guard with other engines.
    pub fn with_lock(mut self, lock: Arc<MigrationLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn MigrationListener>) {
        self.listeners.push(listener);
    }

    pub fn catalog(&self) -> &ModCatalog {
        &self.catalog
    }

    /// The active schema partition; changes when a schema is adopted.
    pub fn schema(&self) -> u32 {
        self.schema
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    /// Bring the database from `current` to `requested` (the latest
    /// catalog version when `None`).
    ///
    /// Returns the version the database actually reached. A failing step
    /// stops the path, so this can be short of `requested`. Catalog problems
    /// are reported before any SQL runs.
    pub fn update_db(
        &mut self,
        engine: &mut dyn ExecutionEngine,
        current: &str,
        requested: Option<&str>,
    ) -> Result<String, MigrationError> {
        let lock = Arc::clone(&self.lock);
        let _guard = lock.try_begin()?;

        let requested = self.resolve_requested(requested)?;
        info!(from = %current, to = %requested, schema = self.schema, "Starting database update");

        let catalog = Arc::clone(&self.catalog);
        let path = catalog.resolve_path(self.schema, current, &requested)?;
        if path.schema != self.schema {
            let old_schema = self.schema;
            self.schema = path.schema;
            self.emit(MigrationEvent::SchemaChanged {
                old_schema,
                new_schema: path.schema,
            });
        }

        let mut reached = current.to_string();
        match self.apply_path(engine, &catalog, &path, true, 0, &mut reached) {
            Ok(()) => info!(
                from = %current,
                to = %reached,
                mods = path.hops(),
                "Database update completed"
            ),
            Err(e) => error!(
                reached = %reached,
                requested = %requested,
                error = %e,
                "Database update stopped"
            ),
        }
        Ok(reached)
    }

    /// Number of mods on the path from `current` to `requested`.
    pub fn get_num_mods(&self, current: &str, requested: Option<&str>) -> Result<usize, MigrationError> {
        let requested = self.resolve_requested(requested)?;
        let path = self.catalog.resolve_path(self.schema, current, &requested)?;
        Ok(path.hops())
    }

    /// The whole catalog as a `<mods>` document.
    pub fn list_mods(&self) -> String {
        self.catalog.to_xml()
    }

    /// Replace every `%KEY%` with its parameter value.
    ///
    /// Keys are case-sensitive and unknown keys are left as written.
    pub fn replace_parameters(&self, content: &str) -> String {
        let mut out = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find('%') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('%') else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            match self.parameters.get(&after[..end]) {
                Some(value) => {
                    out.push_str(value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('%');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn resolve_requested(&self, requested: Option<&str>) -> Result<String, CatalogError> {
        match requested.map(str::trim).filter(|r| !r.is_empty()) {
            Some(requested) => Ok(requested.to_string()),
            None => self
                .catalog
                .latest_version(self.schema)
                .ok_or(CatalogError::NoLatestVersion),
        }
    }

    fn emit(&mut self, event: MigrationEvent) {
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
    }

    /// Apply every mod on `path`, tracking the last version reached.
    fn apply_path(
        &mut self,
        engine: &mut dyn ExecutionEngine,
        catalog: &ModCatalog,
        path: &ResolvedPath,
        record_versions: bool,
        depth: usize,
        reached: &mut String,
    ) -> Result<(), StepError> {
        for (from, to) in path.transitions() {
            let m = catalog
                .find(from, to, path.schema)
                .ok_or_else(|| StepError::ModNotFound {
                    from: from.to_string(),
                    to: to.to_string(),
                })?;

            self.apply_mod(engine, catalog, m, path.schema, depth)
                .map_err(|e| StepError::ModFailed {
                    from: from.to_string(),
                    to: to.to_string(),
                    source: Box::new(e),
                })?;

            *reached = to.to_string();
            if record_versions && !engine.set_db_version(to) {
                warn!(
                    version = %to,
                    error = ?engine.last_error().map(|e| e.to_string()),
                    "Failed to record database version"
                );
            }
        }
        Ok(())
    }

    /// Apply one mod. Returns the error of the failing step, if any.
    ///
    /// A mod whose guard does not apply runs no steps and counts as applied.
    fn apply_mod(
        &mut self,
        engine: &mut dyn ExecutionEngine,
        catalog: &ModCatalog,
        m: &Mod,
        schema: u32,
        depth: usize,
    ) -> Result<(), StepError> {
        let mod_info = ModSnapshot::from(m);
        self.emit(MigrationEvent::StartingApplyMod {
            mod_info: mod_info.clone(),
        });

        let applies = does_mod_apply(m, engine);
        let mut failure: Option<(StepSnapshot, StepError)> = None;

        if applies {
            for (index, step) in m.steps.iter().enumerate() {
                let snapshot = StepSnapshot::new(m, index + 1, step);
                self.emit(MigrationEvent::StartingApplyStep {
                    step: snapshot.clone(),
                });

                let result = self.apply_step(engine, catalog, step, schema, depth);

                self.emit(MigrationEvent::FinishedApplyStep {
                    step: snapshot.clone(),
                    success: result.is_ok(),
                    error: result.as_ref().err().map(|e| e.to_string()),
                });

                if let Err(e) = result {
                    failure = Some((snapshot, e));
                    break;
                }
            }
        } else {
            debug!(from = %mod_info.from, to = %mod_info.to, "Mod guard does not apply, skipping");
        }

        let (failed_step, error) = match &failure {
            Some((step, e)) => (Some(step.clone()), Some(e.to_string())),
            None => (None, None),
        };
        self.emit(MigrationEvent::FinishedApplyMod {
            mod_info,
            success: failure.is_none(),
            skipped: !applies,
            failed_step,
            error,
        });

        match failure {
            Some((_, e)) => Err(e),
            None => Ok(()),
        }
    }

    fn apply_step(
        &mut self,
        engine: &mut dyn ExecutionEngine,
        catalog: &ModCatalog,
        step: &Step,
        schema: u32,
        depth: usize,
    ) -> Result<(), StepError> {
        match &step.step_type {
            StepType::InlineSql => {
                let sql = self.replace_parameters(&step.content);
                run_sql(engine, &sql)
            }
            StepType::ExternalSql => {
                let path = self.external_sql_dir.join(step.content.trim());
                let content = fs::read_to_string(&path).map_err(|e| StepError::ExternalSql {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?;
                let sql = self.replace_parameters(&content);
                run_sql(engine, &sql)
            }
            StepType::Mod => self.apply_chain(engine, catalog, &step.content, schema, depth + 1),
            StepType::Unsupported(kind) => Err(StepError::Unsupported(kind.clone())),
        }
    }

    /// Apply a `<from>,<to>[-<final>]` chain: the mod `from -> to`, then the
    /// cheapest path on to `final`. Chained mods do not record versions.
    fn apply_chain(
        &mut self,
        engine: &mut dyn ExecutionEngine,
        catalog: &ModCatalog,
        directive: &str,
        schema: u32,
        depth: usize,
    ) -> Result<(), StepError> {
        if depth > MAX_CHAIN_DEPTH {
            return Err(StepError::ChainTooDeep(MAX_CHAIN_DEPTH));
        }

        let chain = ModChain::parse(directive)?;
        let tail = catalog.resolve_path(schema, &chain.to, &chain.final_version)?;
        let mut versions = vec![chain.from.clone()];
        versions.extend(tail.versions);
        let path = ResolvedPath {
            versions,
            schema: tail.schema,
        };

        debug!(chain = %directive, mods = path.hops(), "Applying mod chain");
        let mut reached = chain.from;
        self.apply_path(engine, catalog, &path, false, depth, &mut reached)
    }
}

/// Whether a mod's guard lets its steps run.
///
/// A mod without steps never applies. Otherwise the table-exists guard
/// takes priority (combined with a column guard if present), then the
/// table-not-exists guard; with no guard the mod always applies.
pub fn does_mod_apply(m: &Mod, engine: &mut dyn ExecutionEngine) -> bool {
    if m.steps.is_empty() {
        return false;
    }
    let guard = &m.guard;

    if let Some(table) = &guard.if_table_exists {
        if let Some(column) = &guard.if_column_exists {
            return engine.does_table_exist(table, "") && engine.does_table_exist(table, column);
        }
        if let Some(column) = &guard.if_column_not_exists {
            return engine.does_table_exist(table, "") && !engine.does_table_exist(table, column);
        }
        return engine.does_table_exist(table, "");
    }
    if let Some(table) = &guard.if_table_not_exists {
        return !engine.does_table_exist(table, "");
    }
    true
}

fn run_sql(engine: &mut dyn ExecutionEngine, sql: &str) -> Result<(), StepError> {
    if engine.execute_sql(sql) {
        return Ok(());
    }
    Err(engine
        .last_error()
        .cloned()
        .map(StepError::Execution)
        .unwrap_or(StepError::ExecutionFailed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{ConnectionError, ExecutionError};
    use crate::mods::ModGuard;
    use std::collections::HashSet;
    use std::sync::mpsc;

    /// Records executed SQL; fails any batch containing "FAIL".
    #[derive(Default)]
    struct MockEngine {
        executed: Vec<String>,
        versions: Vec<String>,
        tables: HashSet<String>,
        columns: HashSet<(String, String)>,
        last_error: Option<ExecutionError>,
    }

    impl ExecutionEngine for MockEngine {
        fn execute_sql(&mut self, content: &str) -> bool {
            if content.contains("FAIL") {
                self.last_error = Some(ExecutionError::Statement {
                    statement: content.to_string(),
                    error: ConnectionError::Sql("forced failure".to_string()),
                });
                return false;
            }
            self.executed.push(content.to_string());
            true
        }

        fn db_version(&mut self) -> String {
            self.versions.last().cloned().unwrap_or_else(|| "0.0".to_string())
        }

        fn set_db_version(&mut self, version: &str) -> bool {
            self.versions.push(version.to_string());
            true
        }

        fn does_table_exist(&mut self, table: &str, column: &str) -> bool {
            if column.is_empty() {
                self.tables.contains(table)
            } else {
                self.columns.contains(&(table.to_string(), column.to_string()))
            }
        }

        fn last_error(&self) -> Option<&ExecutionError> {
            self.last_error.as_ref()
        }
    }

    fn m(from: &str, to: &str, schema: u32, steps: &[&str]) -> Mod {
        Mod {
            author: "test".to_string(),
            from: from.to_string(),
            from_minor: String::new(),
            to: to.to_string(),
            to_minor: String::new(),
            date: String::new(),
            comment: String::new(),
            schema,
            guard: ModGuard::default(),
            steps: steps
                .iter()
                .map(|s| Step::new(StepType::InlineSql, *s))
                .collect(),
        }
    }

    fn engine(mods: Vec<Mod>) -> MigrationEngine {
        MigrationEngine::new(ModCatalog::new(mods).unwrap())
    }

    #[test]
    fn test_replace_parameters() {
        let engine = engine(vec![m("1.0", "1.1", 0, &["x"])])
            .with_parameter("DB", "main")
            .with_parameter("user", "bob");

        assert_eq!(
            engine.replace_parameters("USE %DB%; GRANT ALL TO %user%"),
            "USE main; GRANT ALL TO bob"
        );
        assert_eq!(engine.replace_parameters("%db% stays"), "%db% stays");
        assert_eq!(engine.replace_parameters("100% of %DB%"), "100% of main");
        assert_eq!(engine.replace_parameters("trailing %"), "trailing %");
        assert_eq!(engine.replace_parameters("%%DB%"), "%main");
    }

    #[test]
    fn test_update_applies_cheapest_path_and_records_versions() {
        let mut migration = engine(vec![
            m("1.0", "1.1", 0, &["A1", "A2"]),
            m("1.1", "1.2", 0, &["B1"]),
            m("1.0", "1.2", 0, &["C1", "C2", "C3", "C4", "C5"]),
        ]);
        let mut db = MockEngine::default();

        let reached = migration.update_db(&mut db, "1.0", Some("1.2")).unwrap();
        assert_eq!(reached, "1.2");
        assert_eq!(db.executed, vec!["A1", "A2", "B1"]);
        assert_eq!(db.versions, vec!["1.1", "1.2"]);
    }

    #[test]
    fn test_update_defaults_to_latest() {
        let mut migration = engine(vec![m("1.0", "1.1", 0, &["A"]), m("1.1", "1.2", 0, &["B"])]);
        let mut db = MockEngine::default();
        assert_eq!(migration.update_db(&mut db, "1.0", None).unwrap(), "1.2");
    }

    #[test]
    fn test_failing_step_stops_at_last_reached_version() {
        let mut migration = engine(vec![
            m("1.0", "1.1", 0, &["A"]),
            m("1.1", "1.2", 0, &["B", "FAIL", "C"]),
            m("1.2", "1.3", 0, &["D"]),
        ]);
        let (tx, rx) = mpsc::channel();
        migration.add_listener(Box::new(tx));
        let mut db = MockEngine::default();

        let reached = migration.update_db(&mut db, "1.0", Some("1.3")).unwrap();
        assert_eq!(reached, "1.1");
        assert_eq!(db.executed, vec!["A", "B"]);
        assert_eq!(db.versions, vec!["1.1"]);

        let failed = rx
            .try_iter()
            .find_map(|event| match event {
                MigrationEvent::FinishedApplyMod {
                    success: false,
                    failed_step,
                    error,
                    ..
                } => Some((failed_step, error)),
                _ => None,
            })
            .unwrap();
        let step = failed.0.unwrap();
        assert_eq!(step.step_number, 2);
        assert_eq!(step.step_content, "FAIL");
        assert!(failed.1.unwrap().contains("forced failure"));
    }

    #[test]
    fn test_guard_skip_advances_version() {
        let mut guarded = m("1.0", "1.1", 0, &["A"]);
        guarded.guard.if_table_exists = Some("foo".to_string());
        let mut migration = engine(vec![guarded]);
        let (tx, rx) = mpsc::channel();
        migration.add_listener(Box::new(tx));
        let mut db = MockEngine::default();

        assert_eq!(migration.update_db(&mut db, "1.0", Some("1.1")).unwrap(), "1.1");
        assert!(db.executed.is_empty());
        assert_eq!(db.versions, vec!["1.1"]);

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(
            e,
            MigrationEvent::FinishedApplyMod {
                success: true,
                skipped: true,
                ..
            }
        )));
        assert!(!events
            .iter()
            .any(|e| matches!(e, MigrationEvent::StartingApplyStep { .. })));
    }

    #[test]
    fn test_guard_priority() {
        let mut db = MockEngine::default();
        db.tables.insert("users".to_string());
        db.columns.insert(("users".to_string(), "email".to_string()));

        let mut m1 = m("1.0", "1.1", 0, &["A"]);
        m1.guard.if_table_exists = Some("users".to_string());
        m1.guard.if_column_exists = Some("email".to_string());
        assert!(does_mod_apply(&m1, &mut db));

        m1.guard.if_column_exists = None;
        m1.guard.if_column_not_exists = Some("email".to_string());
        assert!(!does_mod_apply(&m1, &mut db));

        m1.guard.if_column_not_exists = Some("phone".to_string());
        assert!(does_mod_apply(&m1, &mut db));

        // ifTableExists wins over ifTableNotExists
        m1.guard.if_column_not_exists = None;
        m1.guard.if_table_not_exists = Some("users".to_string());
        assert!(does_mod_apply(&m1, &mut db));

        let mut m2 = m("1.0", "1.1", 0, &["A"]);
        m2.guard.if_table_not_exists = Some("users".to_string());
        assert!(!does_mod_apply(&m2, &mut db));

        let empty = m("1.0", "1.1", 0, &[]);
        assert!(!does_mod_apply(&empty, &mut db));
    }

    #[test]
    fn test_event_order() {
        let mut migration = engine(vec![m("1.0", "1.1", 0, &["A", "B"])]);
        let (tx, rx) = mpsc::channel();
        migration.add_listener(Box::new(tx));
        let mut db = MockEngine::default();
        migration.update_db(&mut db, "1.0", Some("1.1")).unwrap();

        let kinds: Vec<&str> = rx
            .try_iter()
            .map(|e| match e {
                MigrationEvent::StartingApplyMod { .. } => "start-mod",
                MigrationEvent::StartingApplyStep { .. } => "start-step",
                MigrationEvent::FinishedApplyStep { .. } => "end-step",
                MigrationEvent::FinishedApplyMod { .. } => "end-mod",
                MigrationEvent::SchemaChanged { .. } => "schema",
            })
            .collect();
        assert_eq!(
            kinds,
            vec!["start-mod", "start-step", "end-step", "start-step", "end-step", "end-mod"]
        );
    }

    #[test]
    fn test_schema_adoption_emits_event() {
        let mut migration = engine(vec![m("1.0", "1.1", 7, &["A"])]);
        let (tx, rx) = mpsc::channel();
        migration.add_listener(Box::new(tx));
        let mut db = MockEngine::default();

        migration.update_db(&mut db, "1.0", Some("1.1")).unwrap();
        assert_eq!(migration.schema(), 7);
        assert_eq!(
            rx.try_iter().next(),
            Some(MigrationEvent::SchemaChanged {
                old_schema: 0,
                new_schema: 7
            })
        );
    }

    #[test]
    fn test_catalog_errors_run_no_sql() {
        let mut migration = engine(vec![m("1.0", "1.1", 0, &["A"])]);
        let mut db = MockEngine::default();

        let err = migration.update_db(&mut db, "0.9", Some("1.1")).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::CatalogError(CatalogError::CurrentVersionMissing(_))
        ));
        assert!(db.executed.is_empty());
    }

    #[test]
    fn test_concurrent_update_rejected() {
        let lock = Arc::new(MigrationLock::new());
        let mut migration = engine(vec![m("1.0", "1.1", 0, &["A"])]).with_lock(Arc::clone(&lock));
        let mut db = MockEngine::default();

        let held = lock.try_begin().unwrap();
        assert!(matches!(
            migration.update_db(&mut db, "1.0", Some("1.1")),
            Err(MigrationError::AlreadyRunning)
        ));
        assert!(db.executed.is_empty());

        drop(held);
        assert_eq!(migration.update_db(&mut db, "1.0", Some("1.1")).unwrap(), "1.1");
        assert!(!lock.is_running());
    }

    #[test]
    fn test_nested_chain() {
        let mut outer = m("2.0", "2.1", 0, &[]);
        outer.steps.push(Step::new(StepType::Mod, "1.0,1.1-1.2"));
        let mut migration = engine(vec![
            m("1.0", "1.1", 0, &["A"]),
            m("1.1", "1.2", 0, &["B"]),
            outer,
        ]);
        let mut db = MockEngine::default();

        assert_eq!(migration.update_db(&mut db, "2.0", Some("2.1")).unwrap(), "2.1");
        assert_eq!(db.executed, vec!["A", "B"]);
        // Chained mods do not record versions
        assert_eq!(db.versions, vec!["2.1"]);
    }

    #[test]
    fn test_nested_chain_missing_transition_fails_step() {
        let mut outer = m("2.0", "2.1", 0, &[]);
        outer.steps.push(Step::new(StepType::Mod, "1.0,1.5"));
        let mut migration = engine(vec![m("1.0", "1.1", 0, &["A"]), outer]);
        let mut db = MockEngine::default();

        assert_eq!(migration.update_db(&mut db, "2.0", Some("2.1")).unwrap(), "2.0");
        assert!(db.versions.is_empty());
    }

    #[test]
    fn test_unsupported_step_fails() {
        let mut scripted = m("1.0", "1.1", 0, &[]);
        scripted
            .steps
            .push(Step::new(StepType::Unsupported("inline_js".into()), "x()"));
        let mut migration = engine(vec![scripted]);
        let mut db = MockEngine::default();
        assert_eq!(migration.update_db(&mut db, "1.0", Some("1.1")).unwrap(), "1.0");
    }

    #[test]
    fn test_get_num_mods_and_list() {
        let migration = engine(vec![
            m("1.0", "1.1", 0, &["A"]),
            m("1.1", "1.2", 0, &["B"]),
        ]);
        assert_eq!(migration.get_num_mods("1.0", None).unwrap(), 2);
        assert_eq!(migration.get_num_mods("1.1", Some("1.2")).unwrap(), 1);
        assert_eq!(migration.get_num_mods("1.2", Some("1.2")).unwrap(), 0);

        let xml = migration.list_mods();
        assert!(xml.starts_with("<mods>"));
        assert_eq!(xml.matches("<mod ").count(), 2);
    }
}
