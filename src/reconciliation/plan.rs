use super::rows::TableRow;
use super::schema::TableSchema;
use super::types::ReconcileError;
use super::value::{KeyOrder, TableValue};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Add,
    Remove,
    Update,
    Nothing,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeType::Add => "ADD",
            ChangeType::Remove => "REMOVE",
            ChangeType::Update => "UPDATE",
            ChangeType::Nothing => "NOTHING",
        };
        write!(f, "{}", name)
    }
}

/// One row-level difference between content and the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedRow {
    pub change_type: ChangeType,
    /// Unique key as stored in the database, or as declared for additions.
    pub key: TableValue,
    /// Values to write: the whole declared row for additions, the changed
    /// columns for updates, the stored row for removals.
    pub values: BTreeMap<usize, TableValue>,
}

impl ChangedRow {
    /// The SQL statement for this change, terminated by `;\n`.
    pub fn generate_sql(&self, schema: &TableSchema) -> Result<String, ReconcileError> {
        let table = schema.table();
        let unique = schema.unique_column();
        match self.change_type {
            ChangeType::Add => {
                let mut columns = Vec::new();
                let mut values = Vec::new();
                for (c, value) in &self.values {
                    let column = &schema.columns()[*c];
                    columns.push(column.select_list());
                    values.push(column.insert_values(value)?);
                }
                Ok(format!(
                    "INSERT INTO {} ({}) VALUES ({});\n",
                    table,
                    columns.join(","),
                    values.join(",")
                ))
            }
            ChangeType::Update => {
                let mut sets = Vec::new();
                for (c, value) in &self.values {
                    sets.push(schema.columns()[*c].set_clause(value)?);
                }
                Ok(format!(
                    "UPDATE {} SET {} WHERE {};\n",
                    table,
                    sets.join(","),
                    unique.where_equal(table, &self.key)?
                ))
            }
            ChangeType::Remove => Ok(format!(
                "DELETE FROM {} WHERE {};\n",
                table,
                unique.where_equal(table, &self.key)?
            )),
            ChangeType::Nothing => Ok(String::new()),
        }
    }
}

/// The outcome of comparing one table.
#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    /// Differences in key order.
    pub rows: Vec<ChangedRow>,

    /// Keys of rows a hook asked to leave out of reconciliation.
    pub ignored: Vec<TableValue>,
}

impl ReconciliationPlan {
    /// Check if anything would be written
    pub fn has_changes(&self) -> bool {
        self.rows.iter().any(|r| r.change_type != ChangeType::Nothing)
    }

    pub fn of_type(&self, change_type: ChangeType) -> impl Iterator<Item = &ChangedRow> {
        self.rows.iter().filter(move |r| r.change_type == change_type)
    }

    pub fn count(&self, change_type: ChangeType) -> usize {
        self.of_type(change_type).count()
    }

    /// SQL for every change of one type, in key order.
    pub fn sql(&self, schema: &TableSchema, change_type: ChangeType) -> Result<String, ReconcileError> {
        let mut sql = String::new();
        for row in self.of_type(change_type) {
            sql.push_str(&row.generate_sql(schema)?);
        }
        Ok(sql)
    }
}

fn key_of<'a>(schema: &TableSchema, row: &'a TableRow) -> Result<&'a TableValue, ReconcileError> {
    row.key(schema).ok_or_else(|| ReconcileError::MissingKey {
        table: schema.table().to_string(),
        column: schema.unique_column().select_list(),
    })
}

/// Sort rows by unique key. Rows with equal keys keep their order.
pub(crate) fn sort_rows(
    schema: &TableSchema,
    rows: &mut [TableRow],
    orders: &[KeyOrder],
) -> Result<(), ReconcileError> {
    for row in rows.iter() {
        key_of(schema, row)?;
    }
    let mut failure = None;
    rows.sort_by(|a, b| match (a.key(schema), b.key(schema)) {
        (Some(a), Some(b)) => a.compare_key(b, orders).unwrap_or_else(|e| {
            failure.get_or_insert(e);
            Ordering::Equal
        }),
        _ => Ordering::Equal,
    });
    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Reject declared rows whose keys repeat. `rows` must already be sorted.
///
/// Stored rows are not checked: a repeated stored key is matched once and
/// the rest fall through the merge as removals.
pub(crate) fn reject_duplicate_keys(
    schema: &TableSchema,
    rows: &[TableRow],
    orders: &[KeyOrder],
) -> Result<(), ReconcileError> {
    for pair in rows.windows(2) {
        let (a, b) = (key_of(schema, &pair[0])?, key_of(schema, &pair[1])?);
        if a.compare_key(b, orders)? == Ordering::Equal {
            return Err(ReconcileError::DuplicateKey {
                table: schema.table().to_string(),
                key: b.to_string(),
            });
        }
    }
    Ok(())
}

/// Walk both key-ordered row lists in step and classify every key.
///
/// Only columns present in the declared row are compared, and the unique
/// key itself is never a difference: keys that match ignoring case are the
/// same row.
pub(crate) fn merge_rows(
    schema: &TableSchema,
    db_rows: &[TableRow],
    xml_rows: &[TableRow],
    orders: &[KeyOrder],
) -> Result<Vec<ChangedRow>, ReconcileError> {
    let unique_index = schema.unique_index();
    let mut changes = Vec::new();
    let (mut d, mut x) = (0, 0);

    loop {
        let ordering = match (db_rows.get(d), xml_rows.get(x)) {
            (None, None) => break,
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(db), Some(xml)) => key_of(schema, db)?.compare_key(key_of(schema, xml)?, orders)?,
        };

        match ordering {
            Ordering::Less => {
                let db = &db_rows[d];
                let change_type = if db.is_protected() {
                    ChangeType::Nothing
                } else {
                    ChangeType::Remove
                };
                changes.push(ChangedRow {
                    change_type,
                    key: key_of(schema, db)?.clone(),
                    values: db.values().clone(),
                });
                d += 1;
            }
            Ordering::Greater => {
                let xml = &xml_rows[x];
                changes.push(ChangedRow {
                    change_type: ChangeType::Add,
                    key: key_of(schema, xml)?.clone(),
                    values: xml.values().clone(),
                });
                x += 1;
            }
            Ordering::Equal => {
                let (db, xml) = (&db_rows[d], &xml_rows[x]);
                let mut changed = BTreeMap::new();
                for (c, value) in xml.values() {
                    if *c == unique_index {
                        continue;
                    }
                    let differs = match db.get(*c) {
                        Some(stored) => !stored.same_as(value)?,
                        None => true,
                    };
                    if differs {
                        changed.insert(*c, value.clone());
                    }
                }
                let change_type = if changed.is_empty() {
                    ChangeType::Nothing
                } else {
                    ChangeType::Update
                };
                changes.push(ChangedRow {
                    change_type,
                    key: key_of(schema, db)?.clone(),
                    values: changed,
                });
                d += 1;
                x += 1;
            }
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconciliation::column::{DbColumnType, TableColumnName};

    // Columns: 0 = value, 1 = name (unique)
    fn schema() -> TableSchema {
        TableSchema::new(
            "t",
            None,
            vec![
                TableColumnName::single("value", DbColumnType::text(), None),
                TableColumnName::single("name", DbColumnType::text(), None),
            ],
        )
    }

    fn row(name: &str, value: &str) -> TableRow {
        let mut row = TableRow::new();
        row.insert(0, TableValue::text(value));
        row.insert(1, TableValue::text(name));
        row
    }

    const TEXT: [KeyOrder; 1] = [KeyOrder::Text];

    #[test]
    fn test_merge_classifies_rows() {
        let schema = schema();
        let db = vec![row("A", "1"), row("B", "2")];
        let xml = vec![row("A", "1"), row("C", "3")];
        let changes = merge_rows(&schema, &db, &xml, &TEXT).unwrap();

        let kinds: Vec<_> = changes.iter().map(|c| (c.change_type, c.key.to_string())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeType::Nothing, "A".to_string()),
                (ChangeType::Remove, "B".to_string()),
                (ChangeType::Add, "C".to_string()),
            ]
        );
    }

    #[test]
    fn test_update_carries_only_changed_columns() {
        let schema = schema();
        let db = vec![row("A", "1")];
        let xml = vec![row("a", "2")];
        let changes = merge_rows(&schema, &db, &xml, &TEXT).unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].change_type, ChangeType::Update);
        assert_eq!(changes[0].key, TableValue::text("A"));
        assert_eq!(changes[0].values.len(), 1);
        assert_eq!(
            changes[0].generate_sql(&schema).unwrap(),
            "UPDATE t SET value='2' WHERE t.name='A';\n"
        );
    }

    #[test]
    fn test_key_case_alone_is_not_an_update() {
        let schema = schema();
        let db = vec![row("Foo", "1")];
        let xml = vec![row("foo", "1")];
        let changes = merge_rows(&schema, &db, &xml, &TEXT).unwrap();
        assert_eq!(changes[0].change_type, ChangeType::Nothing);
    }

    #[test]
    fn test_protected_rows_are_kept() {
        let schema = schema();
        let mut kept = row("B", "2");
        kept.protect();
        let changes = merge_rows(&schema, &[kept], &[], &TEXT).unwrap();
        assert_eq!(changes[0].change_type, ChangeType::Nothing);
    }

    #[test]
    fn test_sort_orders_by_key() {
        let schema = schema();
        let mut rows = vec![row("c", "1"), row("A", "2"), row("b", "3")];
        sort_rows(&schema, &mut rows, &TEXT).unwrap();
        let keys: Vec<_> = rows.iter().map(|r| r.key(&schema).unwrap().to_string()).collect();
        assert_eq!(keys, vec!["A", "b", "c"]);
    }

    #[test]
    fn test_declared_duplicates_are_rejected() {
        let schema = schema();
        let mut rows = vec![row("b", "1"), row("A", "2"), row("B", "3")];
        sort_rows(&schema, &mut rows, &TEXT).unwrap();
        assert!(matches!(
            reject_duplicate_keys(&schema, &rows, &TEXT),
            Err(ReconcileError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_repeated_stored_key_is_removed() {
        let schema = schema();
        let db = vec![row("Foo", "1"), row("foo", "2")];
        let xml = vec![row("foo", "1")];
        let changes = merge_rows(&schema, &db, &xml, &TEXT).unwrap();

        let kinds: Vec<_> = changes.iter().map(|c| (c.change_type, c.key.to_string())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeType::Nothing, "Foo".to_string()),
                (ChangeType::Remove, "foo".to_string()),
            ]
        );
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let schema = schema();
        let mut keyless = TableRow::new();
        keyless.insert(0, TableValue::text("x"));
        assert!(matches!(
            sort_rows(&schema, &mut [keyless], &TEXT),
            Err(ReconcileError::MissingKey { .. })
        ));
    }

    #[test]
    fn test_generate_sql() {
        let schema = schema();
        let add = ChangedRow {
            change_type: ChangeType::Add,
            key: TableValue::text("C"),
            values: row("C", "dbnull").values().clone(),
        };
        assert_eq!(
            add.generate_sql(&schema).unwrap(),
            "INSERT INTO t (value,name) VALUES (null,'C');\n"
        );

        let remove = ChangedRow {
            change_type: ChangeType::Remove,
            key: TableValue::text("B"),
            values: BTreeMap::new(),
        };
        assert_eq!(
            remove.generate_sql(&schema).unwrap(),
            "DELETE FROM t WHERE t.name='B';\n"
        );

        let nothing = ChangedRow {
            change_type: ChangeType::Nothing,
            key: TableValue::text("A"),
            values: BTreeMap::new(),
        };
        assert_eq!(nothing.generate_sql(&schema).unwrap(), "");
    }

    #[test]
    fn test_plan_sql_by_type() {
        let schema = schema();
        let db = vec![row("B", "2")];
        let xml = vec![row("A", "1"), row("C", "3")];
        let plan = ReconciliationPlan {
            rows: merge_rows(&schema, &db, &xml, &TEXT).unwrap(),
            ignored: Vec::new(),
        };
        assert!(plan.has_changes());
        assert_eq!(plan.count(ChangeType::Add), 2);
        assert_eq!(
            plan.sql(&schema, ChangeType::Add).unwrap(),
            "INSERT INTO t (value,name) VALUES ('1','A');\nINSERT INTO t (value,name) VALUES ('3','C');\n"
        );
        assert_eq!(plan.sql(&schema, ChangeType::Update).unwrap(), "");
    }
}
