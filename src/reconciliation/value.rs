//! Row values compared and rendered by the reconciler.

use super::types::ReconcileError;
use std::cmp::Ordering;
use std::fmt;

/// Text standing for SQL NULL in declared content.
pub const DB_NULL: &str = "dbnull";

/// How one element of the unique key is ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrder {
    /// Case-insensitive text.
    Text,
    /// Numbers by value, ahead of any non-numeric text.
    Number,
}

/// An ordered tuple of element values for one column group.
///
/// `None` elements are SQL NULL and order before every real value. Binary
/// values hold one `0x`-prefixed upper-case hex element and render unquoted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableValue {
    elements: Vec<Option<String>>,
    binary: bool,
}

impl TableValue {
    pub fn new(elements: Vec<Option<String>>) -> Self {
        Self {
            elements,
            binary: false,
        }
    }

    /// A single text element; [`DB_NULL`] becomes NULL.
    pub fn text(value: &str) -> Self {
        Self::new(vec![parse_null(value)])
    }

    pub fn binary(bytes: &[u8]) -> Self {
        Self {
            elements: vec![Some(to_hex_literal(bytes))],
            binary: true,
        }
    }

    pub fn null(len: usize) -> Self {
        Self::new(vec![None; len])
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    pub fn elements(&self) -> &[Option<String>] {
        &self.elements
    }

    pub fn element(&self, index: usize) -> Option<&str> {
        self.elements.get(index).and_then(|e| e.as_deref())
    }

    pub(crate) fn set_element(&mut self, index: usize, value: Option<String>) {
        if let Some(slot) = self.elements.get_mut(index) {
            *slot = value;
        }
    }

    pub(crate) fn set_binary(&mut self, binary: bool) {
        self.binary = binary;
    }

    /// The element as it appears in SQL: `null`, a hex literal, or a quoted
    /// and escaped string.
    pub fn sql_literal(&self, index: usize) -> String {
        match self.element(index) {
            None => "null".to_string(),
            Some("") if self.binary => "''".to_string(),
            Some(hex) if self.binary => hex.to_string(),
            Some(text) => format!("'{}'", escape_sql_value(text)),
        }
    }

    fn check_arity(&self, other: &TableValue) -> Result<(), ReconcileError> {
        if self.len() != other.len() {
            return Err(ReconcileError::ArityMismatch {
                expected: self.len(),
                found: other.len(),
            });
        }
        Ok(())
    }

    /// Whether two values hold the same data.
    ///
    /// Elements that both read as decimal numbers compare by value, so `1`
    /// and `1.0` are the same; other text compares exactly.
    pub fn same_as(&self, other: &TableValue) -> Result<bool, ReconcileError> {
        self.check_arity(other)?;
        Ok(self
            .elements
            .iter()
            .zip(&other.elements)
            .all(|(a, b)| match (a, b) {
                (None, None) => true,
                (Some(a), Some(b)) => match (parse_decimal(a), parse_decimal(b)) {
                    (Some(x), Some(y)) => x == y,
                    _ => a == b,
                },
                _ => false,
            }))
    }

    /// Order two unique keys element by element.
    pub fn compare_key(
        &self,
        other: &TableValue,
        orders: &[KeyOrder],
    ) -> Result<Ordering, ReconcileError> {
        self.check_arity(other)?;
        for (i, (a, b)) in self.elements.iter().zip(&other.elements).enumerate() {
            let order = orders.get(i).copied().unwrap_or(KeyOrder::Text);
            let ordering = match (a, b) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => compare_element(a, b, order),
            };
            if ordering != Ordering::Equal {
                return Ok(ordering);
            }
        }
        Ok(Ordering::Equal)
    }
}

impl fmt::Display for TableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = self
            .elements
            .iter()
            .map(|e| e.as_deref().unwrap_or(DB_NULL))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

fn compare_element(a: &str, b: &str, order: KeyOrder) -> Ordering {
    let text = || a.to_lowercase().cmp(&b.to_lowercase());
    match order {
        KeyOrder::Text => text(),
        KeyOrder::Number => match (parse_decimal(a), parse_decimal(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => text(),
        },
    }
}

/// Map the declared-content NULL marker to `None`.
pub fn parse_null(value: &str) -> Option<String> {
    if value == DB_NULL {
        None
    } else {
        Some(value.to_string())
    }
}

/// Parse an optionally signed decimal number without exponent.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    let mut seen_digit = false;
    let mut seen_point = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_point => seen_point = true,
            _ => return None,
        }
    }
    if !seen_digit {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Escape text for embedding in a quoted SQL literal.
///
/// Quotes become `\'` and semicolons `\;`, which the statement splitter
/// turns back into a literal `;`. Backslashes are doubled so a value ending
/// in `\` cannot swallow its closing quote.
pub fn escape_sql_value(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('\'', "\\'")
        .replace(';', "\\;")
}

/// `0x` followed by upper-case hex, or empty for no bytes.
pub fn to_hex_literal(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return String::new();
    }
    format!("0x{}", hex::encode_upper(bytes))
}

/// Parse declared binary content: hex digits with an optional `0x` prefix.
pub fn parse_hex_literal(text: &str) -> Option<Vec<u8>> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    hex::decode(digits).ok()
}
