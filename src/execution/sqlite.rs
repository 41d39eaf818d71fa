//! SQLite connection adapter.

use super::connection::{ColumnInfo, Connection, ConnectionError, DbValue};
use rusqlite::types::ValueRef;
use rusqlite::{params, ErrorCode};
use std::borrow::Cow;
use std::path::Path;

/// A [`Connection`] backed by a SQLite database.
pub struct SqliteConnection {
    conn: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn open(path: &Path) -> Result<Self, ConnectionError> {
        Ok(Self {
            conn: rusqlite::Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, ConnectionError> {
        Ok(Self {
            conn: rusqlite::Connection::open_in_memory()?,
        })
    }

    pub fn from_connection(conn: rusqlite::Connection) -> Self {
        Self { conn }
    }

    pub fn inner(&self) -> &rusqlite::Connection {
        &self.conn
    }
}

impl From<rusqlite::Error> for ConnectionError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(failure, _)
                if matches!(
                    failure.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                ) =>
            {
                ConnectionError::Deadlock(e.to_string())
            }
            _ => ConnectionError::Sql(e.to_string()),
        }
    }
}

impl From<ValueRef<'_>> for DbValue {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => DbValue::Null,
            ValueRef::Integer(i) => DbValue::Integer(i),
            ValueRef::Real(r) => DbValue::Real(r),
            ValueRef::Text(t) => DbValue::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => DbValue::Blob(b.to_vec()),
        }
    }
}

/// Rewrite backslash escapes inside string literals into SQLite's syntax.
///
/// Generated SQL escapes `'` as `\'`, `;` as `\;` and `\` as `\\`. SQLite
/// only knows `''`, so those three pairs are rewritten within single-quoted
/// literals. Other backslashes, and text outside literals, are left alone.
pub fn sqlite_literals(sql: &str) -> Cow<'_, str> {
    if !sql.contains('\\') {
        return Cow::Borrowed(sql);
    }

    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;
    while let Some(c) = chars.next() {
        if in_literal {
            match c {
                '\\' => match chars.peek().copied() {
                    Some('\'') => {
                        chars.next();
                        out.push_str("''");
                    }
                    Some(escaped @ ('\\' | ';')) => {
                        chars.next();
                        out.push(escaped);
                    }
                    _ => out.push('\\'),
                },
                '\'' if chars.peek() == Some(&'\'') => {
                    chars.next();
                    out.push_str("''");
                }
                '\'' => {
                    in_literal = false;
                    out.push(c);
                }
                _ => out.push(c),
            }
            continue;
        }
        match c {
            '\'' => {
                in_literal = true;
                out.push(c);
            }
            '-' if chars.peek() == Some(&'-') => {
                out.push(c);
                for next in chars.by_ref() {
                    out.push(next);
                    if next == '\n' {
                        break;
                    }
                }
            }
            _ => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl Connection for SqliteConnection {
    fn execute(&mut self, sql: &str) -> Result<usize, ConnectionError> {
        self.conn.execute_batch(&sqlite_literals(sql))?;
        Ok(usize::try_from(self.conn.changes()).unwrap_or(usize::MAX))
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Vec<DbValue>>, ConnectionError> {
        let mut stmt = self.conn.prepare(&sqlite_literals(sql))?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query([])?;

        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                values.push(DbValue::from(row.get_ref(i)?));
            }
            result.push(values);
        }
        Ok(result)
    }

    fn begin_transaction(&mut self) -> Result<(), ConnectionError> {
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ConnectionError> {
        if self.conn.is_autocommit() {
            return Err(ConnectionError::NoTransaction);
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&mut self) -> Result<(), ConnectionError> {
        if self.conn.is_autocommit() {
            return Err(ConnectionError::NoTransaction);
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn table_exists(&mut self, table: &str) -> Result<bool, ConnectionError> {
        let mut stmt = self
            .conn
            .prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE")?;
        Ok(stmt.exists(params![table])?)
    }

    fn table_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>, ConnectionError> {
        let sql = format!("PRAGMA table_info({})", quote_identifier(table));
        let mut stmt = self.conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    type_name: row.get(2)?,
                    primary_key: row.get::<_, i64>(5)? > 0,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(columns)
    }
}
