use super::tables::{
    health_alert_types, schedules, scopes, setting_categories, setting_definitions,
    setting_group_settings, setting_groups, settings, DEFAULT_SCHEDULE_TIME,
    HEALTH_ALERT_TYPES_XML, LICENSE_VALUE_COLUMN, SCHEDULES_XML, SCOPES_XML,
    SETTING_CATEGORIES_XML, SETTING_DEFINITIONS_XML, SETTING_GROUPS_XML,
    USER_DEFINED_SCOPE_TYPE,
};
use crate::execution::{
    Connection, ConnectionError, DbValue, ExecutionEngine, TransactionalExecutionEngine,
};
use crate::reconciliation::{
    read_xml_rows, ChangeType, ReconcileError, RowAction, RowHooks, TableDefinition,
    TableReconciler, TableValue, XmlRow, DB_NULL,
};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("XML error: {0}")]
    XmlError(#[from] roxmltree::Error),

    #[error("Reconciliation error: {0}")]
    ReconcileError(#[from] ReconcileError),

    #[error("Database error: {0}")]
    ConnectionError(#[from] ConnectionError),

    #[error("No attribute 'name' in {0} row")]
    MissingName(String),

    #[error("Setting '{0}' has a definition but is not declared in any category")]
    UnknownSetting(String),

    #[error("Content update failed: {0}")]
    ExecutionFailed(String),
}

/// Brings the built-in content tables in line with the documents of a
/// content directory.
///
/// A document that is missing leaves its tables alone.
#[derive(Debug, Clone)]
pub struct ContentGenerator {
    content_dir: PathBuf,
}

impl ContentGenerator {
    pub fn new(content_dir: impl Into<PathBuf>) -> Self {
        Self {
            content_dir: content_dir.into(),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    fn read_document(&self, file: &str) -> Result<Option<String>, ContentError> {
        let path = self.content_dir.join(file);
        if !path.exists() {
            debug!(path = %path.display(), "Content document not found, skipping");
            return Ok(None);
        }
        Ok(Some(fs::read_to_string(&path)?))
    }

    /// Build the full content batch.
    ///
    /// Inserts and updates run parents first, deletes run children first.
    pub fn generate_sql(&self, conn: &mut dyn Connection) -> Result<String, ContentError> {
        let (category_rows, setting_rows) = match self.read_document(SETTING_CATEGORIES_XML)? {
            Some(xml) => {
                let (parents, children) =
                    nested_rows(&xml, "settingcategories", "settings", "category", true)?;
                (Some(parents), Some(children))
            }
            None => (None, None),
        };
        let known_settings: Option<Vec<String>> = setting_rows.as_ref().map(|rows| {
            rows.iter()
                .filter_map(|r| r.get("name"))
                .map(|n| n.trim().to_lowercase())
                .collect()
        });
        let scope_rows = self.read_rows(SCOPES_XML, &scopes())?;
        let (group_rows, group_setting_rows) = match self.read_document(SETTING_GROUPS_XML)? {
            Some(xml) => {
                let (parents, children) =
                    nested_rows(&xml, "settinggroups", "settinggroupsettings", "group", false)?;
                (Some(parents), Some(children))
            }
            None => (None, None),
        };
        let schedule_rows = self.read_rows(SCHEDULES_XML, &schedules())?;
        let alert_rows = self.read_rows(HEALTH_ALERT_TYPES_XML, &health_alert_types())?;
        let definition_rows =
            match self.read_rows(SETTING_DEFINITIONS_XML, &setting_definitions())? {
                Some(rows) => Some(prepare_definitions(conn, rows, known_settings.as_deref())?),
                None => None,
            };

        let categories = reconcile(conn, &setting_categories(), category_rows, RowHooks::new())?;

        let scope_hooks = RowHooks::new().on_db_row(|schema, row| {
            if row.text(schema, "type") == Some(USER_DEFINED_SCOPE_TYPE) {
                RowAction::Ignore
            } else {
                RowAction::Keep
            }
        });
        let scopes = reconcile(conn, &scopes(), scope_rows, scope_hooks)?;

        // Settings of user-defined scopes belong to the user as well, and so
        // do their definitions
        let ignored_scopes: Vec<String> = scopes
            .iter()
            .flat_map(|r| r.ignored_keys())
            .filter_map(|k| k.element(0).map(str::to_string))
            .collect();
        let setting_hooks = RowHooks::new().on_db_row(move |schema, row| {
            match row.text(schema, "scope") {
                Some(scope) if ignored_scopes.iter().any(|s| s == scope) => RowAction::Ignore,
                _ => RowAction::Keep,
            }
        });
        let settings = reconcile(conn, &settings(), setting_rows, setting_hooks)?;
        let ignored_settings: Vec<String> = settings
            .iter()
            .flat_map(|r| r.ignored_keys())
            .filter_map(|k| k.element(0).map(str::to_lowercase))
            .collect();
        let definition_hooks = RowHooks::new().on_db_row(move |schema, row| {
            match row.text(schema, "name") {
                Some(name) if ignored_settings.contains(&name.to_lowercase()) => RowAction::Skip,
                _ => RowAction::Keep,
            }
        });

        let groups = reconcile(conn, &setting_groups(), group_rows, RowHooks::new())?;
        let group_settings = reconcile(
            conn,
            &setting_group_settings(),
            group_setting_rows,
            RowHooks::new(),
        )?;
        let definitions = reconcile(
            conn,
            &setting_definitions(),
            definition_rows,
            definition_hooks,
        )?;
        let alerts = reconcile(conn, &health_alert_types(), alert_rows, RowHooks::new())?;
        let schedule_reconciler =
            reconcile(conn, &schedules(), schedule_rows.clone(), RowHooks::new())?;

        let mut sql = String::new();
        let ordered = [
            &categories,
            &scopes,
            &settings,
            &groups,
            &group_settings,
            &definitions,
        ];
        for reconciler in ordered.iter().copied().flatten() {
            sql.push_str(&reconciler.insert_sql()?);
            sql.push_str(&reconciler.update_sql()?);
        }
        for reconciler in ordered.iter().rev().copied().flatten() {
            sql.push_str(&reconciler.delete_sql()?);
        }

        if let Some(alerts) = &alerts {
            sql.push_str(&alerts.insert_sql()?);
            sql.push_str(&alerts.update_sql()?);
            sql.push_str(&alerts.delete_sql()?);
        }

        if let (Some(reconciler), Some(rows)) = (&schedule_reconciler, &schedule_rows) {
            sql.push_str(&missing_valuesets_sql(conn, rows)?);
            sql.push_str(&reconciler.insert_sql()?);
            let with_times = conn.table_exists("scheduletimes")?;
            if with_times {
                sql.push_str(&new_schedule_times_sql(reconciler));
            }
            sql.push_str(&reconciler.update_sql()?);
            sql.push_str(&reconciler.delete_sql()?);
            if with_times {
                sql.push_str(&default_schedule_times_sql(conn, reconciler)?);
            }
        }

        Ok(sql)
    }

    /// Generate the content batch and run it. Returns whether anything ran.
    pub fn update_content(
        &self,
        engine: &mut TransactionalExecutionEngine,
    ) -> Result<bool, ContentError> {
        let sql = self.generate_sql(engine.connection())?;
        if sql.trim().is_empty() {
            info!("Content is up to date");
            return Ok(false);
        }

        info!(dir = %self.content_dir.display(), "Updating content");
        if engine.execute_sql(&sql) {
            Ok(true)
        } else {
            let message = engine
                .last_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string());
            Err(ContentError::ExecutionFailed(message))
        }
    }

    fn read_rows(
        &self,
        file: &str,
        definition: &TableDefinition,
    ) -> Result<Option<Vec<XmlRow>>, ContentError> {
        match self.read_document(file)? {
            Some(xml) => Ok(Some(read_xml_rows(&xml, &definition.row_path)?)),
            None => Ok(None),
        }
    }
}

fn reconcile(
    conn: &mut dyn Connection,
    definition: &TableDefinition,
    rows: Option<Vec<XmlRow>>,
    hooks: RowHooks,
) -> Result<Option<TableReconciler>, ContentError> {
    match rows {
        Some(rows) => Ok(Some(TableReconciler::with_hooks(
            conn, definition, &rows, &hooks,
        )?)),
        None => Ok(None),
    }
}

/// Check every definition names a declared setting, and give it an empty
/// license value when the table has that column and content leaves it out.
fn prepare_definitions(
    conn: &mut dyn Connection,
    mut rows: Vec<XmlRow>,
    known_settings: Option<&[String]>,
) -> Result<Vec<XmlRow>, ContentError> {
    let with_license = conn.column_exists("settingdefinitions", LICENSE_VALUE_COLUMN)?;
    for row in &mut rows {
        let name = row
            .get("name")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ContentError::MissingName("settingdefinitions".to_string()))?;
        if let Some(known) = known_settings {
            if !known.contains(&name.to_lowercase()) {
                return Err(ContentError::UnknownSetting(name.to_string()));
            }
        }
        if with_license && row.get(LICENSE_VALUE_COLUMN).is_none() {
            row.set(LICENSE_VALUE_COLUMN, "");
        }
    }
    Ok(rows)
}

/// Split a document of `<root><row>` parents, each holding
/// `<container><row>` children, into parent rows and child rows.
///
/// Children carry their parent's name under `parent_field`. With `ordered`,
/// parents and the children of each parent get a `screenOrder` counting from
/// zero in document order.
fn nested_rows(
    xml: &str,
    root: &str,
    container: &str,
    parent_field: &str,
    ordered: bool,
) -> Result<(Vec<XmlRow>, Vec<XmlRow>), ContentError> {
    let doc = roxmltree::Document::parse(xml)?;
    let mut parents = Vec::new();
    let mut children = Vec::new();
    if !doc.root_element().has_tag_name(root) {
        return Ok((parents, children));
    }

    for (index, node) in doc
        .root_element()
        .children()
        .filter(|n| n.has_tag_name("row"))
        .enumerate()
    {
        let name = node
            .attribute("name")
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ContentError::MissingName(root.to_string()))?;
        let mut parent = XmlRow::from_node(node);
        if ordered {
            parent.set("screenOrder", &index.to_string());
        }
        parents.push(parent);

        let rows = node
            .children()
            .filter(|n| n.has_tag_name(container))
            .flat_map(|c| c.children().filter(|n| n.has_tag_name("row")));
        for (child_index, child_node) in rows.enumerate() {
            let mut child = XmlRow::from_node(child_node);
            child.set(parent_field, name);
            if ordered {
                child.set("screenOrder", &child_index.to_string());
            }
            children.push(child);
        }
    }
    Ok((parents, children))
}

/// Valuesets named by schedules that the database does not have yet.
fn missing_valuesets_sql(
    conn: &mut dyn Connection,
    rows: &[XmlRow],
) -> Result<String, ContentError> {
    if !conn.table_exists("valuesets")? {
        return Ok(String::new());
    }
    let mut names: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.get("valueset"))
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != DB_NULL)
        .collect();
    names.sort_unstable();
    names.dedup();

    let mut sql = String::new();
    for name in names {
        let literal = TableValue::text(name).sql_literal(0);
        let count = conn.query_scalar(&format!(
            "SELECT count(*) FROM valuesets WHERE name={};",
            literal
        ))?;
        if matches!(count, Some(DbValue::Integer(0))) {
            sql.push_str(&format!("INSERT INTO valuesets (name) VALUES ({});\n", literal));
        }
    }
    Ok(sql)
}

/// Every schedule being added gets one schedule time spanning the week.
fn new_schedule_times_sql(reconciler: &TableReconciler) -> String {
    let (start, end) = DEFAULT_SCHEDULE_TIME;
    reconciler
        .plan()
        .of_type(ChangeType::Add)
        .filter_map(|row| row.key.element(0))
        .map(|name| {
            format!(
                "INSERT INTO scheduletimes (scheduleid, starttime, endtime) VALUES \
                 ((SELECT scheduleid FROM schedules WHERE schedules.name={}), '{}', '{}');\n",
                TableValue::text(name).sql_literal(0),
                start,
                end
            )
        })
        .collect()
}

/// Existing schedules without any schedule time, except ones being removed.
fn default_schedule_times_sql(
    conn: &mut dyn Connection,
    reconciler: &TableReconciler,
) -> Result<String, ContentError> {
    let (start, end) = DEFAULT_SCHEDULE_TIME;
    let removed: Vec<&str> = reconciler
        .plan()
        .of_type(ChangeType::Remove)
        .filter_map(|row| row.key.element(0))
        .collect();

    let mut sql = String::new();
    let rows = conn.query(
        "SELECT scheduleid, name FROM schedules \
         WHERE scheduleid NOT IN (SELECT scheduleid FROM scheduletimes);",
    )?;
    for row in rows {
        let (Some(id), name) = (row.first().and_then(DbValue::to_text), row.get(1)) else {
            continue;
        };
        let name = name.and_then(DbValue::to_text).unwrap_or_default();
        if removed.iter().any(|r| r.eq_ignore_ascii_case(&name)) {
            continue;
        }
        sql.push_str(&format!(
            "INSERT INTO scheduletimes (scheduleid, starttime, endtime) VALUES ({}, '{}', '{}');\n",
            id, start, end
        ));
    }
    Ok(sql)
}
