//! Rows read from the database and from declared content.

use super::column::ColumnKind;
use super::schema::{TableDefinition, TableSchema};
use super::types::ReconcileError;
use super::value::{parse_decimal, parse_hex_literal, parse_null, TableValue};
use crate::execution::DbValue;
use std::collections::BTreeMap;

/// Values of one row keyed by column index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRow {
    values: BTreeMap<usize, TableValue>,
    protected: bool,
}

impl TableRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn values(&self) -> &BTreeMap<usize, TableValue> {
        &self.values
    }

    pub fn get(&self, column: usize) -> Option<&TableValue> {
        self.values.get(&column)
    }

    pub fn insert(&mut self, column: usize, value: TableValue) {
        self.values.insert(column, value);
    }

    /// Text of a named element, `None` when absent or NULL.
    pub fn text<'a>(&'a self, schema: &TableSchema, name: &str) -> Option<&'a str> {
        let (c, e) = schema.find_by_element_name(name)?;
        self.values.get(&c)?.element(e)
    }

    pub fn key(&self, schema: &TableSchema) -> Option<&TableValue> {
        self.values.get(&schema.unique_index())
    }

    /// A protected row is never deleted.
    pub fn is_protected(&self) -> bool {
        self.protected
    }

    pub(crate) fn protect(&mut self) {
        self.protected = true;
    }
}

/// One row of declared content: name/value pairs in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlRow {
    pub fields: Vec<(String, String)>,
}

impl XmlRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: &str) {
        self.fields.push((name.to_string(), value.to_string()));
    }

    /// Replace the value of `name`, or add it.
    pub fn set(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(name)) {
            Some((_, v)) => *v = value.to_string(),
            None => self.push(name, value),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Attributes of `node` followed by its child elements, each child
    /// valued by its text.
    pub fn from_node(node: roxmltree::Node) -> Self {
        let mut row = Self::new();
        for attribute in node.attributes() {
            row.push(attribute.name(), attribute.value());
        }
        for child in node.children().filter(|c| c.is_element()) {
            let text: String = child
                .descendants()
                .filter(|d| d.is_text())
                .filter_map(|d| d.text())
                .collect();
            row.push(child.tag_name().name(), &text);
        }
        row
    }
}

/// Collect the rows at `row_path` from a content document.
///
/// Values are trimmed later, when the row is checked against the table.
pub fn read_xml_rows(xml: &str, row_path: &str) -> Result<Vec<XmlRow>, ReconcileError> {
    let doc = roxmltree::Document::parse(xml)?;
    let mut segments = row_path.split('/').filter(|s| !s.is_empty());

    let root = doc.root_element();
    let mut nodes = match segments.next() {
        Some(first) if root.tag_name().name() == first => vec![root],
        _ => return Ok(Vec::new()),
    };
    for segment in segments {
        nodes = nodes
            .into_iter()
            .flat_map(|n| n.children().filter(|c| c.has_tag_name(segment)))
            .collect();
    }

    Ok(nodes.into_iter().map(XmlRow::from_node).collect())
}

/// Turn one result row of [`TableSchema::values_select_sql`] into a row.
pub(crate) fn db_row(schema: &TableSchema, values: Vec<DbValue>) -> TableRow {
    let mut row = TableRow::new();
    for (flat, value) in values.into_iter().enumerate() {
        let (Some((c, e)), Some(element)) = (schema.position(flat), schema.element(flat)) else {
            continue;
        };
        let column_len = schema.columns()[c].len();
        let entry = row
            .values
            .entry(c)
            .or_insert_with(|| TableValue::null(column_len));

        if element.column_type.kind == ColumnKind::Binary && element.alias.is_none() {
            let bytes = match value {
                DbValue::Null => None,
                DbValue::Blob(bytes) => Some(bytes),
                other => other.to_text().map(String::into_bytes),
            };
            if let Some(mut bytes) = bytes {
                let length = element.column_type.length;
                if length > 0 && bytes.len() < length {
                    bytes.resize(length, b' ');
                }
                *entry = TableValue::binary(&bytes);
            } else {
                entry.set_binary(true);
            }
        } else {
            entry.set_element(e, value.to_text());
        }
    }
    row
}

/// Validate one content row against the schema.
///
/// Names the definition ignores are skipped. When a name repeats, its
/// first value wins.
pub(crate) fn xml_row(
    schema: &TableSchema,
    definition: &TableDefinition,
    source: &XmlRow,
) -> Result<TableRow, ReconcileError> {
    let mut row = TableRow::new();
    let mut seen = Vec::new();

    for (name, raw) in &source.fields {
        if definition.is_ignored(name) {
            continue;
        }
        let value = raw.trim();
        let (c, e) = schema
            .find_by_element_name(name)
            .ok_or_else(|| ReconcileError::UnknownColumn {
                table: schema.table().to_string(),
                column: name.clone(),
                value: value.to_string(),
            })?;
        if seen.contains(&(c, e)) {
            continue;
        }
        seen.push((c, e));

        let column = &schema.columns()[c];
        let element = &column.elements()[e];
        let invalid = |expected: &'static str| ReconcileError::InvalidValue {
            table: schema.table().to_string(),
            column: name.clone(),
            value: value.to_string(),
            expected,
        };
        let parsed = parse_null(value);
        let entry = row
            .values
            .entry(c)
            .or_insert_with(|| TableValue::null(column.len()));

        match (&parsed, element.column_type.kind, &element.alias) {
            (Some(text), ColumnKind::Numeric, None) if parse_decimal(text).is_none() => {
                return Err(invalid("a number"));
            }
            (Some(text), ColumnKind::Binary, None) => {
                let bytes = parse_hex_literal(text).ok_or_else(|| invalid("hex encoded"))?;
                *entry = TableValue::binary(&bytes);
                continue;
            }
            (None, ColumnKind::Binary, None) => entry.set_binary(true),
            _ => {}
        }
        entry.set_element(e, parsed);
    }
    Ok(row)
}
