use super::plan::{
    merge_rows, reject_duplicate_keys, sort_rows, ChangeType, ChangedRow, ReconciliationPlan,
};
use super::rows::{db_row, xml_row, TableRow, XmlRow};
use super::schema::{TableDefinition, TableSchema};
use super::types::ReconcileError;
use super::value::{KeyOrder, TableValue};
use crate::execution::Connection;
use tracing::{debug, info};

/// What a row hook decides for one parsed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowAction {
    /// Reconcile the row normally.
    Keep,
    /// Drop the row as if it were not there.
    Skip,
    /// Drop the row and record its key in the plan.
    Ignore,
    /// Keep the row, but never delete it. Only meaningful for stored rows.
    Protect,
}

pub type RowHook = Box<dyn Fn(&TableSchema, &TableRow) -> RowAction>;

/// Per-row callbacks run after parsing, one for each side.
#[derive(Default)]
pub struct RowHooks {
    pub db_row: Option<RowHook>,
    pub xml_row: Option<RowHook>,
}

impl RowHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_db_row(
        mut self,
        hook: impl Fn(&TableSchema, &TableRow) -> RowAction + 'static,
    ) -> Self {
        self.db_row = Some(Box::new(hook));
        self
    }

    pub fn on_xml_row(
        mut self,
        hook: impl Fn(&TableSchema, &TableRow) -> RowAction + 'static,
    ) -> Self {
        self.xml_row = Some(Box::new(hook));
        self
    }
}

/// Compares the declared rows of one table with its live contents.
///
/// The comparison runs once, on construction. A table that is missing, or
/// lacks a declared unique column, yields an empty plan.
#[derive(Debug)]
pub struct TableReconciler {
    table: String,
    schema: Option<TableSchema>,
    plan: ReconciliationPlan,
}

impl TableReconciler {
    pub fn new(
        conn: &mut dyn Connection,
        definition: &TableDefinition,
        rows: &[XmlRow],
    ) -> Result<Self, ReconcileError> {
        Self::with_hooks(conn, definition, rows, &RowHooks::default())
    }

    pub fn with_hooks(
        conn: &mut dyn Connection,
        definition: &TableDefinition,
        rows: &[XmlRow],
        hooks: &RowHooks,
    ) -> Result<Self, ReconcileError> {
        let mut reconciler = Self {
            table: definition.table.clone(),
            schema: None,
            plan: ReconciliationPlan::default(),
        };

        let info = conn.table_columns(&definition.table)?;
        let Some(schema) = TableSchema::build(definition, &info)? else {
            return Ok(reconciler);
        };

        let orders = probe_key_orders(conn, &schema)?;
        let mut ignored = Vec::new();

        let mut db_rows = Vec::new();
        for values in conn.query(&schema.values_select_sql())? {
            let mut row = db_row(&schema, values);
            if apply_hook(&schema, hooks.db_row.as_ref(), &mut row, &mut ignored) {
                db_rows.push(row);
            }
        }

        let mut xml_rows = Vec::new();
        for source in rows {
            let mut row = xml_row(&schema, definition, source)?;
            if apply_hook(&schema, hooks.xml_row.as_ref(), &mut row, &mut ignored) {
                xml_rows.push(row);
            }
        }

        sort_rows(&schema, &mut db_rows, &orders)?;
        sort_rows(&schema, &mut xml_rows, &orders)?;
        reject_duplicate_keys(&schema, &xml_rows, &orders)?;
        let changes = merge_rows(&schema, &db_rows, &xml_rows, &orders)?;

        reconciler.plan = ReconciliationPlan {
            rows: changes,
            ignored,
        };
        info!(
            table = %definition.table,
            add = reconciler.plan.count(ChangeType::Add),
            update = reconciler.plan.count(ChangeType::Update),
            remove = reconciler.plan.count(ChangeType::Remove),
            "Compared table with content"
        );
        reconciler.schema = Some(schema);
        Ok(reconciler)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn schema(&self) -> Option<&TableSchema> {
        self.schema.as_ref()
    }

    pub fn plan(&self) -> &ReconciliationPlan {
        &self.plan
    }

    pub fn changed_rows(&self) -> &[ChangedRow] {
        &self.plan.rows
    }

    pub fn ignored_keys(&self) -> &[TableValue] {
        &self.plan.ignored
    }

    /// SQL for all changes of one type, empty when there are none.
    pub fn sql(&self, change_type: ChangeType) -> Result<String, ReconcileError> {
        match &self.schema {
            Some(schema) => self.plan.sql(schema, change_type),
            None => Ok(String::new()),
        }
    }

    pub fn insert_sql(&self) -> Result<String, ReconcileError> {
        self.sql(ChangeType::Add)
    }

    pub fn update_sql(&self) -> Result<String, ReconcileError> {
        self.sql(ChangeType::Update)
    }

    pub fn delete_sql(&self) -> Result<String, ReconcileError> {
        self.sql(ChangeType::Remove)
    }
}

/// Look at one stored key to decide how keys order: elements that hold
/// numbers order numerically, everything else as text.
fn probe_key_orders(
    conn: &mut dyn Connection,
    schema: &TableSchema,
) -> Result<Vec<KeyOrder>, ReconcileError> {
    let width = schema.unique_column().len();
    let probe = conn.query(&schema.unique_probe_sql())?;
    let orders = match probe.first() {
        Some(values) => (0..width)
            .map(|i| match values.get(i) {
                Some(v) if v.is_numeric() => KeyOrder::Number,
                _ => KeyOrder::Text,
            })
            .collect(),
        None => vec![KeyOrder::Text; width],
    };
    debug!(table = %schema.table(), ?orders, "Probed key ordering");
    Ok(orders)
}

/// Returns whether the row takes part in the comparison.
fn apply_hook(
    schema: &TableSchema,
    hook: Option<&RowHook>,
    row: &mut TableRow,
    ignored: &mut Vec<TableValue>,
) -> bool {
    let action = hook.map_or(RowAction::Keep, |h| h(schema, row));
    match action {
        RowAction::Keep => true,
        RowAction::Skip => false,
        RowAction::Ignore => {
            if let Some(key) = row.key(schema) {
                ignored.push(key.clone());
            }
            false
        }
        RowAction::Protect => {
            row.protect();
            true
        }
    }
}
