mod common;

use common::{count_rows, create_test_dir, sqlite_with, write_file};
use dbmods::execution::{ExecutionEngine, TransactionalExecutionEngine};
use dbmods::migration::{MigrationEngine, MigrationError, MigrationEvent};
use dbmods::mods::{CatalogError, ModCatalog};
use dbmods::utils::default_external_sql_dir;
use std::path::Path;
use std::sync::mpsc;

const MODS_XML: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<mods>
  <mod author="alice" from="0.0" to="1.0" date="2024-01-10">
    <comment>Version table and items</comment>
    <steps>
      <step type="inline_sql">
        CREATE TABLE versions (versionid INTEGER PRIMARY KEY AUTOINCREMENT,
            version varchar(32), revision varchar(32), applied varchar(32))
      </step>
      <step type="inline_sql">CREATE TABLE items (id INTEGER PRIMARY KEY, name varchar(64))</step>
    </steps>
  </mod>
  <mod author="bob" from="1.0" to="1.1" date="2024-02-01">
    <comment>Seed items</comment>
    <steps>
      <step type="external_sql">seed_items.sql</step>
    </steps>
  </mod>
  <mod author="bob" from="1.1" to="1.2" ifTableNotExists="items">
    <steps>
      <step type="inline_sql">CREATE TABLE items (id INTEGER)</step>
    </steps>
  </mod>
</mods>"#;

const SEED_SQL: &str = "INSERT INTO %TABLE% (name) VALUES ('first');
GO
INSERT INTO %TABLE% (name) VALUES ('second')";

const FAILING_MODS_XML: &str = r#"<mods>
  <mod author="alice" from="0.0" to="1.0">
    <steps>
      <step type="inline_sql">
        CREATE TABLE versions (versionid INTEGER PRIMARY KEY AUTOINCREMENT,
            version varchar(32), revision varchar(32), applied varchar(32))
      </step>
    </steps>
  </mod>
  <mod author="dave" from="1.0" to="1.1">
    <steps>
      <step type="inline_sql">CREATE TABLE audit (x int)</step>
      <step type="inline_sql">INSERT INTO nowhere VALUES (1)</step>
    </steps>
  </mod>
</mods>"#;

fn load_engine(mods_file: &Path) -> MigrationEngine {
    let catalog = ModCatalog::load(mods_file).expect("Should load mods");
    MigrationEngine::new(catalog).with_external_sql_dir(default_external_sql_dir(mods_file))
}

fn sqlite_engine(merge: bool) -> TransactionalExecutionEngine {
    TransactionalExecutionEngine::new(Box::new(sqlite_with("")), merge)
}

fn finished_mods(events: &[MigrationEvent]) -> Vec<(String, bool, bool)> {
    events
        .iter()
        .filter_map(|e| match e {
            MigrationEvent::FinishedApplyMod {
                mod_info,
                success,
                skipped,
                ..
            } => Some((mod_info.to.clone(), *success, *skipped)),
            _ => None,
        })
        .collect()
}

#[test]
fn test_update_from_empty_database() {
    let temp_dir = create_test_dir();
    let mods_file = write_file(temp_dir.path(), "mods.xml", MODS_XML);
    write_file(temp_dir.path(), "ExternalSql/seed_items.sql", SEED_SQL);

    let mut migration = load_engine(&mods_file).with_parameter("TABLE", "items");
    let (tx, rx) = mpsc::channel();
    migration.add_listener(Box::new(tx));

    let mut engine = sqlite_engine(false);
    let current = engine.db_version();
    assert_eq!(current, "0.0");

    let reached = migration
        .update_db(&mut engine, &current, None)
        .expect("Should update");
    assert_eq!(reached, "1.2");
    assert_eq!(engine.db_version(), "1.2");

    let conn = engine.connection();
    assert_eq!(count_rows(conn, "versions"), 3);
    assert_eq!(count_rows(conn, "items"), 2);

    // The items table already exists, so the last mod is skipped
    let events: Vec<MigrationEvent> = rx.try_iter().collect();
    assert_eq!(
        finished_mods(&events),
        vec![
            ("1.0".to_string(), true, false),
            ("1.1".to_string(), true, false),
            ("1.2".to_string(), true, true),
        ]
    );
}

#[test]
fn test_update_to_requested_version_only() {
    let temp_dir = create_test_dir();
    let mods_file = write_file(temp_dir.path(), "mods.xml", MODS_XML);
    write_file(temp_dir.path(), "ExternalSql/seed_items.sql", SEED_SQL);

    let mut migration = load_engine(&mods_file).with_parameter("TABLE", "items");
    let mut engine = sqlite_engine(false);

    let reached = migration
        .update_db(&mut engine, "0.0", Some("1.0"))
        .expect("Should update");
    assert_eq!(reached, "1.0");
    assert_eq!(engine.db_version(), "1.0");
    assert_eq!(count_rows(engine.connection(), "items"), 0);

    // A second run picks up where the first stopped
    let current = engine.db_version();
    let reached = migration
        .update_db(&mut engine, &current, None)
        .expect("Should update");
    assert_eq!(reached, "1.2");
    assert_eq!(count_rows(engine.connection(), "items"), 2);
}

#[test]
fn test_failed_step_stops_at_last_reached_version() {
    let temp_dir = create_test_dir();
    let mods_file = write_file(temp_dir.path(), "mods.xml", FAILING_MODS_XML);

    let mut migration = load_engine(&mods_file);
    let (tx, rx) = mpsc::channel();
    migration.add_listener(Box::new(tx));
    let mut engine = sqlite_engine(false);

    let reached = migration
        .update_db(&mut engine, "0.0", None)
        .expect("Catalog is valid");
    assert_eq!(reached, "1.0");
    assert_eq!(engine.db_version(), "1.0");

    // Without merged transactions every step commits on its own
    assert!(engine.does_table_exist("audit", ""));

    let events: Vec<MigrationEvent> = rx.try_iter().collect();
    let failure = events.iter().find_map(|e| match e {
        MigrationEvent::FinishedApplyMod {
            success: false,
            failed_step,
            error,
            ..
        } => Some((failed_step.clone(), error.clone())),
        _ => None,
    });
    let (failed_step, error) = failure.expect("Should report the failed mod");
    let failed_step = failed_step.expect("Should name the failed step");
    assert_eq!(failed_step.author, "dave");
    assert_eq!(failed_step.step_number, 2);
    assert_eq!(failed_step.step_type, "inline_sql");
    assert_eq!(failed_step.step_content, "INSERT INTO nowhere VALUES (1)");
    assert!(error.expect("Should carry the error").contains("nowhere"));
}

#[test]
fn test_merged_failure_rolls_back_the_open_transaction() {
    let temp_dir = create_test_dir();
    let mods_file = write_file(temp_dir.path(), "mods.xml", FAILING_MODS_XML);

    let mut migration = load_engine(&mods_file);
    let mut engine = sqlite_engine(true);

    let reached = migration
        .update_db(&mut engine, "0.0", None)
        .expect("Catalog is valid");
    assert_eq!(reached, "1.0");

    // The failure rolled back everything the shared transaction held,
    // including the version table created by the first mod
    assert!(!engine.in_transaction());
    assert!(!engine.does_table_exist("versions", ""));
    assert!(!engine.does_table_exist("audit", ""));
    assert_eq!(engine.db_version(), "0.0");
    engine
        .commit_existing_transaction()
        .expect("Nothing left to commit");
}

#[test]
fn test_merged_success_needs_final_commit() {
    let temp_dir = create_test_dir();
    let mods_file = write_file(temp_dir.path(), "mods.xml", MODS_XML);
    write_file(temp_dir.path(), "ExternalSql/seed_items.sql", SEED_SQL);

    let mut migration = load_engine(&mods_file).with_parameter("TABLE", "items");
    let mut engine = sqlite_engine(true);

    migration
        .update_db(&mut engine, "0.0", None)
        .expect("Should update");
    assert!(engine.in_transaction());
    engine
        .commit_existing_transaction()
        .expect("Should commit");
    assert!(!engine.in_transaction());
    assert_eq!(engine.db_version(), "1.2");
}

#[test]
fn test_missing_external_sql_file_fails_the_mod() {
    let temp_dir = create_test_dir();
    let mods_file = write_file(temp_dir.path(), "mods.xml", MODS_XML);

    let mut migration = load_engine(&mods_file).with_parameter("TABLE", "items");
    let (tx, rx) = mpsc::channel();
    migration.add_listener(Box::new(tx));
    let mut engine = sqlite_engine(false);

    let reached = migration
        .update_db(&mut engine, "0.0", None)
        .expect("Catalog is valid");
    assert_eq!(reached, "1.0");

    let error = rx.try_iter().find_map(|e| match e {
        MigrationEvent::FinishedApplyStep {
            success: false,
            error,
            ..
        } => error,
        _ => None,
    });
    assert!(error
        .expect("Should report the step error")
        .contains("Could not read external SQL file"));
}

#[test]
fn test_unknown_versions_are_catalog_errors() {
    let temp_dir = create_test_dir();
    let mods_file = write_file(temp_dir.path(), "mods.xml", MODS_XML);
    let mut migration = load_engine(&mods_file);
    let mut engine = sqlite_engine(false);

    let result = migration.update_db(&mut engine, "9.9", None);
    assert!(matches!(
        result,
        Err(MigrationError::CatalogError(CatalogError::CurrentVersionMissing(_)))
    ));

    let result = migration.get_num_mods("0.0", Some("3.0"));
    assert!(matches!(
        result,
        Err(MigrationError::CatalogError(CatalogError::RequestedVersionMissing(_)))
    ));

    // No SQL ran
    assert!(!engine.does_table_exist("versions", ""));
}

#[test]
fn test_num_mods_and_listing() {
    let temp_dir = create_test_dir();
    let mods_file = write_file(temp_dir.path(), "mods.xml", MODS_XML);
    let migration = load_engine(&mods_file);

    assert_eq!(migration.get_num_mods("0.0", None).expect("Should resolve"), 3);
    assert_eq!(
        migration
            .get_num_mods("1.0", Some("1.2"))
            .expect("Should resolve"),
        2
    );
    assert_eq!(migration.get_num_mods("1.2", None).expect("Should resolve"), 0);

    // The listing loads back as the same catalog
    let listed = ModCatalog::from_xml(&migration.list_mods()).expect("Listing should parse");
    assert_eq!(listed.len(), 3);
    let guarded = listed.find("1.1", "1.2", 0).expect("Should keep the mod");
    assert_eq!(guarded.guard.if_table_not_exists.as_deref(), Some("items"));
    let seeded = listed.find("1.0", "1.1", 0).expect("Should keep the mod");
    assert_eq!(seeded.comment, "Seed items");
    assert_eq!(seeded.steps[0].content, "seed_items.sql");
}
