//! Column groups and their SQL fragments.

use super::types::ReconcileError;
use super::value::TableValue;
use once_cell::sync::Lazy;
use regex::Regex;

static COLUMN_TYPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([A-Za-z]+)(?:\((\d+)\))?").expect("valid column type pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Numeric,
    Binary,
}

/// A database column type, reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbColumnType {
    pub kind: ColumnKind,
    /// Declared length, 0 when none was given.
    pub length: usize,
}

impl DbColumnType {
    pub fn text() -> Self {
        Self {
            kind: ColumnKind::Text,
            length: 0,
        }
    }

    /// Parse a declared type such as `varchar(64)`, `int` or `varbinary(16)`.
    ///
    /// An empty declaration (allowed by SQLite) is text.
    pub fn parse(declared: &str) -> Result<Self, ReconcileError> {
        if declared.trim().is_empty() {
            return Ok(Self::text());
        }
        let caps = COLUMN_TYPE_RE
            .captures(declared)
            .ok_or_else(|| ReconcileError::InvalidColumnType(declared.to_string()))?;
        let word = caps
            .get(1)
            .map(|m| m.as_str().to_lowercase())
            .unwrap_or_default();
        let length = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);

        let kind = if word.contains("binary") || word.contains("blob") {
            ColumnKind::Binary
        } else if ["int", "decimal", "double", "float", "real", "numeric"]
            .iter()
            .any(|n| word.contains(n))
        {
            ColumnKind::Numeric
        } else {
            ColumnKind::Text
        };
        Ok(Self { kind, length })
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnKind::Numeric
    }

    pub fn is_binary(&self) -> bool {
        self.kind == ColumnKind::Binary
    }
}

/// Declared content names a row in another table; the stored column holds
/// that row's id.
///
/// The stored value of `db_column_name` is `db_column_name2` from the row of
/// `db_table_equal` whose `db_column_equal` equals the declared value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlColumnAlias {
    pub db_column_name: String,
    pub db_column_equal: String,
    pub db_table_equal: String,
    pub db_column_name2: String,
}

impl XmlColumnAlias {
    pub fn new(
        db_column_name: impl Into<String>,
        db_column_equal: impl Into<String>,
        db_table_equal: impl Into<String>,
        db_column_name2: impl Into<String>,
    ) -> Self {
        Self {
            db_column_name: db_column_name.into(),
            db_column_equal: db_column_equal.into(),
            db_table_equal: db_table_equal.into(),
            db_column_name2: db_column_name2.into(),
        }
    }

    fn lookup_sql(&self, literal: &str, spaced: bool) -> String {
        let eq = if spaced { " = " } else { "=" };
        format!(
            "(SELECT {} FROM {} WHERE {}{}{})",
            self.db_column_name2, self.db_table_equal, self.db_column_equal, eq, literal
        )
    }
}

/// One element of a column group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnElement {
    /// Lower-cased name as it appears in declared content.
    pub name: String,
    pub column_type: DbColumnType,
    pub alias: Option<XmlColumnAlias>,
}

impl ColumnElement {
    pub fn new(name: &str, column_type: DbColumnType, alias: Option<XmlColumnAlias>) -> Self {
        Self {
            name: name.to_lowercase(),
            column_type,
            alias,
        }
    }

    /// The column actually stored in the table.
    pub fn db_column(&self) -> &str {
        match &self.alias {
            Some(alias) => &alias.db_column_name,
            None => &self.name,
        }
    }
}

/// An ordered group of columns compared as one value.
///
/// Plain columns are groups of one; the unique key may span several.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumnName {
    elements: Vec<ColumnElement>,
}

impl TableColumnName {
    pub fn new(elements: Vec<ColumnElement>) -> Self {
        Self { elements }
    }

    pub fn single(name: &str, column_type: DbColumnType, alias: Option<XmlColumnAlias>) -> Self {
        Self::new(vec![ColumnElement::new(name, column_type, alias)])
    }

    pub fn elements(&self) -> &[ColumnElement] {
        &self.elements
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        let name = name.to_lowercase();
        self.elements.iter().position(|e| e.name == name)
    }

    /// Stored column names, comma separated.
    pub fn select_list(&self) -> String {
        self.elements
            .iter()
            .map(|e| e.db_column())
            .collect::<Vec<_>>()
            .join(",")
    }

    fn check(&self, value: &TableValue) -> Result<(), ReconcileError> {
        if value.len() != self.len() {
            return Err(ReconcileError::ArityMismatch {
                expected: self.len(),
                found: value.len(),
            });
        }
        Ok(())
    }

    /// The value list of an `INSERT`.
    pub fn insert_values(&self, value: &TableValue) -> Result<String, ReconcileError> {
        self.check(value)?;
        let parts: Vec<String> = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| match (&e.alias, value.element(i)) {
                (_, None) => "null".to_string(),
                (Some(alias), Some(_)) => alias.lookup_sql(&value.sql_literal(i), false),
                (None, Some(_)) => value.sql_literal(i),
            })
            .collect();
        Ok(parts.join(","))
    }

    /// `column=value` assignments of an `UPDATE`.
    pub fn set_clause(&self, value: &TableValue) -> Result<String, ReconcileError> {
        self.check(value)?;
        let parts: Vec<String> = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| {
                let rhs = match (&e.alias, value.element(i)) {
                    (_, None) => "null".to_string(),
                    (Some(alias), Some(_)) => alias.lookup_sql(&value.sql_literal(i), true),
                    (None, Some(_)) => value.sql_literal(i),
                };
                format!("{}={}", e.db_column(), rhs)
            })
            .collect();
        Ok(parts.join(","))
    }

    /// A predicate matching rows of `table` that hold `value`.
    pub fn where_equal(&self, table: &str, value: &TableValue) -> Result<String, ReconcileError> {
        self.check(value)?;
        let parts: Vec<String> = self
            .elements
            .iter()
            .enumerate()
            .map(|(i, e)| match (&e.alias, value.element(i)) {
                (_, None) => format!("{}.{} is null", table, e.db_column()),
                (Some(alias), Some(_)) => format!(
                    "{}.{}={}",
                    table,
                    alias.db_column_name,
                    alias.lookup_sql(&value.sql_literal(i), false)
                ),
                (None, Some(_)) => format!("{}.{}={}", table, e.name, value.sql_literal(i)),
            })
            .collect();
        Ok(parts.join(" AND "))
    }
}
