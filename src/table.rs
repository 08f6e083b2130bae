use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A single cell of a table snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Identity of the cell for distinct-value checks; nulls, numbers and text never collide.
    pub fn identity(&self) -> String {
        match self {
            Value::Null => "n:".to_string(),
            Value::Integer(i) => format!("i:{i}"),
            Value::Real(r) => format!("r:{}", r.to_bits()),
            Value::Text(s) => format!("t:{s}"),
        }
    }

    /// Column affinity used when the snapshot is materialized in SQL
    pub fn sql_type(&self) -> Option<&'static str> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some("INTEGER"),
            Value::Real(_) => Some("REAL"),
            Value::Text(_) => Some("TEXT"),
        }
    }
}

/// Renders the cell the way it appears in the exported TSV: nulls are empty,
/// reals always carry a fractional part.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) if r.is_finite() && r.fract() == 0.0 => write!(f, "{r:.1}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<rusqlite::types::Value> for Value {
    fn from(v: rusqlite::types::Value) -> Self {
        use rusqlite::types::Value as Sql;
        match v {
            Sql::Null => Value::Null,
            Sql::Integer(i) => Value::Integer(i),
            Sql::Real(r) => Value::Real(r),
            Sql::Text(s) => Value::Text(s),
            Sql::Blob(b) => Value::Text(String::from_utf8_lossy(&b).into_owned()),
        }
    }
}

impl From<&Value> for rusqlite::types::Value {
    fn from(v: &Value) -> Self {
        use rusqlite::types::Value as Sql;
        match v {
            Value::Null => Sql::Null,
            Value::Integer(i) => Sql::Integer(*i),
            Value::Real(r) => Sql::Real(*r),
            Value::Text(s) => Sql::Text(s.clone()),
        }
    }
}

/// An in-memory table snapshot: named columns and positional rows.
/// Every row has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row, padding missing trailing cells with nulls and dropping extras.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [Vec<Value>] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row` for the column `name`
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let idx = self.column_index(name)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }

    /// All cells of one column, in row order
    pub fn column(&self, name: &str) -> Option<Vec<&Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|r| &r[idx]).collect())
    }

    pub fn distinct_count(&self, name: &str) -> Option<usize> {
        let idx = self.column_index(name)?;
        let distinct: HashSet<String> = self
            .rows
            .iter()
            .map(|r| r[idx].identity())
            .collect();
        Some(distinct.len())
    }

    /// Keep only the rows for which `keep` returns true, preserving order.
    pub fn retain_rows<F>(&mut self, keep: F)
    where
        F: FnMut(&Vec<Value>) -> bool,
    {
        self.rows.retain(keep);
    }

    /// SQL column type per column, inferred from the first non-null cell.
    /// Columns with no values at all fall back to TEXT.
    pub fn column_types(&self) -> Vec<&'static str> {
        (0..self.columns.len())
            .map(|idx| {
                self.rows
                    .iter()
                    .find_map(|r| r[idx].sql_type())
                    .unwrap_or("TEXT")
            })
            .collect()
    }
}
