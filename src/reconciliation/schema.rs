//! Table layout as seen by the reconciler.

use super::column::{ColumnElement, DbColumnType, TableColumnName, XmlColumnAlias};
use super::types::ReconcileError;
use crate::execution::ColumnInfo;
use tracing::warn;

/// Declares how one table is driven from content.
#[derive(Debug, Clone, Default)]
pub struct TableDefinition {
    pub table: String,
    /// Slash separated element path of the rows, starting at the root.
    pub row_path: String,
    /// Content names of the unique key, in key order.
    pub unique_columns: Vec<String>,
    /// Content name to foreign-key lookup.
    pub aliases: Vec<(String, XmlColumnAlias)>,
    /// Content names that are not table columns.
    pub ignored: Vec<String>,
}

impl TableDefinition {
    pub fn new(table: &str, row_path: &str) -> Self {
        Self {
            table: table.to_string(),
            row_path: row_path.to_string(),
            ..Default::default()
        }
    }

    pub fn unique(mut self, columns: &[&str]) -> Self {
        self.unique_columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn alias(mut self, name: &str, alias: XmlColumnAlias) -> Self {
        self.aliases.push((name.to_string(), alias));
        self
    }

    pub fn ignore(mut self, name: &str) -> Self {
        self.ignored.push(name.to_string());
        self
    }

    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignored.iter().any(|i| i.eq_ignore_ascii_case(name))
    }

    fn alias_for_db_column(&self, column: &str) -> Option<(&str, &XmlColumnAlias)> {
        self.aliases
            .iter()
            .find(|(_, a)| a.db_column_name.eq_ignore_ascii_case(column))
            .map(|(name, a)| (name.as_str(), a))
    }
}

/// The column groups of a live table, unique key last.
#[derive(Debug, Clone)]
pub struct TableSchema {
    table: String,
    primary_key: Option<String>,
    columns: Vec<TableColumnName>,
    /// Flat element index to (column index, element index within the column).
    positions: Vec<(usize, usize)>,
}

impl TableSchema {
    /// Build the schema from a column list whose last entry is the unique key.
    pub fn new(table: &str, primary_key: Option<String>, columns: Vec<TableColumnName>) -> Self {
        let positions = columns
            .iter()
            .enumerate()
            .flat_map(|(c, column)| (0..column.len()).map(move |e| (c, e)))
            .collect();
        Self {
            table: table.to_string(),
            primary_key,
            columns,
            positions,
        }
    }

    /// Combine live column metadata with a definition.
    ///
    /// Returns `None` when the table has no columns or a declared unique
    /// column is not among them.
    pub fn build(
        definition: &TableDefinition,
        info: &[ColumnInfo],
    ) -> Result<Option<Self>, ReconcileError> {
        let mut columns = Vec::new();
        let mut unique: Vec<Option<ColumnElement>> = vec![None; definition.unique_columns.len()];
        let mut primary_key = None;

        for column in info {
            let column_type = DbColumnType::parse(&column.type_name)?;
            if column.primary_key {
                primary_key = Some(column.name.to_lowercase());
            }
            let (name, alias) = match definition.alias_for_db_column(&column.name) {
                Some((name, alias)) => (name, Some(alias.clone())),
                None => (column.name.as_str(), None),
            };
            let key_position = definition
                .unique_columns
                .iter()
                .position(|u| u.eq_ignore_ascii_case(&column.name) || u.eq_ignore_ascii_case(name));
            match key_position {
                Some(pos) => unique[pos] = Some(ColumnElement::new(name, column_type, alias)),
                None => columns.push(TableColumnName::single(name, column_type, alias)),
            }
        }

        if info.is_empty() || unique.is_empty() {
            warn!(table = %definition.table, "Table has no columns or no unique key, skipping");
            return Ok(None);
        }
        let unique: Option<Vec<ColumnElement>> = unique.into_iter().collect();
        let Some(unique) = unique else {
            warn!(
                table = %definition.table,
                unique = ?definition.unique_columns,
                "Unique column missing from table, skipping"
            );
            return Ok(None);
        };

        columns.push(TableColumnName::new(unique));
        Ok(Some(Self::new(&definition.table, primary_key, columns)))
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn columns(&self) -> &[TableColumnName] {
        &self.columns
    }

    pub fn unique_index(&self) -> usize {
        self.columns.len() - 1
    }

    pub fn unique_column(&self) -> &TableColumnName {
        &self.columns[self.unique_index()]
    }

    /// Total number of elements across all columns.
    pub fn element_count(&self) -> usize {
        self.positions.len()
    }

    /// Column and element index of a flat element index.
    pub fn position(&self, flat: usize) -> Option<(usize, usize)> {
        self.positions.get(flat).copied()
    }

    pub fn element(&self, flat: usize) -> Option<&ColumnElement> {
        let (c, e) = self.position(flat)?;
        self.columns[c].elements().get(e)
    }

    /// Column and element index of a content name, ignoring case.
    pub fn find_by_element_name(&self, name: &str) -> Option<(usize, usize)> {
        self.columns
            .iter()
            .enumerate()
            .find_map(|(c, column)| column.index_of(name).map(|e| (c, e)))
    }

    fn select_expressions(&self) -> Vec<(String, Option<String>)> {
        (0..self.element_count())
            .filter_map(|flat| self.element(flat).map(|e| (flat, e)))
            .map(|(flat, e)| match &e.alias {
                Some(a) => {
                    let name = format!("alias{}", flat);
                    (
                        format!("{}.{}", name, a.db_column_equal),
                        Some(format!(
                            " LEFT JOIN {} AS {} ON ({}.{} = {}.{})",
                            a.db_table_equal, name, name, a.db_column_name2, self.table, a.db_column_name
                        )),
                    )
                }
                None => (format!("{}.{}", self.table, e.name), None),
            })
            .collect()
    }

    fn unique_range(&self) -> std::ops::Range<usize> {
        let start = self.element_count() - self.unique_column().len();
        start..self.element_count()
    }

    /// Select every element, aliases resolved to their content names,
    /// ordered by the unique key.
    pub fn values_select_sql(&self) -> String {
        let expressions = self.select_expressions();
        let select: Vec<&str> = expressions.iter().map(|(s, _)| s.as_str()).collect();
        let joins: String = expressions.iter().filter_map(|(_, j)| j.as_deref()).collect();
        let order = select[self.unique_range()].join(",");
        format!(
            "SELECT {} FROM {}{} ORDER BY {};",
            select.join(","),
            self.table,
            joins,
            order
        )
    }

    /// Select the unique key of one row, to see how the stored keys look.
    pub fn unique_probe_sql(&self) -> String {
        let expressions = self.select_expressions();
        let unique = &expressions[self.unique_range()];
        let select: Vec<&str> = unique.iter().map(|(s, _)| s.as_str()).collect();
        let joins: String = unique.iter().filter_map(|(_, j)| j.as_deref()).collect();
        format!(
            "SELECT {} FROM {}{} LIMIT 1;",
            select.join(","),
            self.table,
            joins
        )
    }
}
