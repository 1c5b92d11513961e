//! Value, column and row types shared by every format.

use crate::error::{FlatDbError, FlatDbResult};
use crate::format::guess;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Date-time text layout used when values are persisted as text.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Semantic type of a column, inferred on load or declared by DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    String,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    /// Opaque payload (nested JSON, binary Parquet columns)
    Raw,
}

impl ColumnType {
    /// Type name reported through `INFORMATION_SCHEMA.COLUMNS`.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::String => "String",
            ColumnType::Integer => "Int64",
            ColumnType::Decimal => "Decimal",
            ColumnType::Boolean => "Boolean",
            ColumnType::DateTime => "DateTime",
            ColumnType::Raw => "Raw",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Decimal)
    }

    /// Map a declared SQL type (`INT`, `VARCHAR(20)`, `DECIMAL(10,2)`, ...).
    pub fn from_sql_type(sql_type: &str) -> ColumnType {
        let upper = sql_type.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnType::Integer
        } else if ["DEC", "NUMERIC", "REAL", "FLOAT", "DOUBLE", "MONEY"]
            .iter()
            .any(|t| upper.contains(t))
        {
            ColumnType::Decimal
        } else if upper.starts_with("BOOL") || upper == "BIT" {
            ColumnType::Boolean
        } else if upper.contains("DATE") || upper.contains("TIME") {
            ColumnType::DateTime
        } else if upper.contains("BLOB") || upper.contains("BINARY") || upper == "BYTEA" {
            ColumnType::Raw
        } else {
            ColumnType::String
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Decimal(f64),
    Boolean(bool),
    DateTime(NaiveDateTime),
    String(String),
    Raw(Vec<u8>),
}

/// One row; always `columns.len()` values in column order.
pub type Row = Vec<Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Runtime kind of the value, `None` for null.
    pub fn kind(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Decimal(_) => Some(ColumnType::Decimal),
            Value::Boolean(_) => Some(ColumnType::Boolean),
            Value::DateTime(_) => Some(ColumnType::DateTime),
            Value::String(_) => Some(ColumnType::String),
            Value::Raw(_) => Some(ColumnType::Raw),
        }
    }

    /// Convert to the representation required by a column of type `ty`.
    pub fn coerce(self, ty: ColumnType) -> FlatDbResult<Value> {
        self.convert(ty).map_err(|v| FlatDbError::TypeMismatch {
            expected: ty.name().to_string(),
            actual: v.to_text(),
        })
    }

    /// Coercion for values read back from storage: a value that does not fit
    /// `ty` is kept as read instead of failing the load.
    pub fn coerce_or_keep(self, ty: ColumnType) -> Value {
        self.convert(ty).unwrap_or_else(std::convert::identity)
    }

    /// `Err` hands back the unconverted value.
    fn convert(self, ty: ColumnType) -> Result<Value, Value> {
        let coerced = match (ty, self) {
            (_, Value::Null) => Value::Null,
            (ColumnType::String, v) => Value::String(v.to_text()),
            (ColumnType::Raw, Value::Raw(b)) => Value::Raw(b),
            (ColumnType::Raw, v) => Value::Raw(v.to_text().into_bytes()),

            (ColumnType::Integer, Value::Integer(i)) => Value::Integer(i),
            (ColumnType::Integer, Value::Decimal(d)) if d.fract() == 0.0 => Value::Integer(d as i64),
            (ColumnType::Integer, Value::Boolean(b)) => Value::Integer(i64::from(b)),
            (ColumnType::Integer, Value::String(s)) if s.trim().is_empty() => Value::Null,
            (ColumnType::Integer, Value::String(s)) => match s.trim().parse::<i64>() {
                Ok(i) => Value::Integer(i),
                Err(_) => return Err(Value::String(s)),
            },

            (ColumnType::Decimal, Value::Decimal(d)) => Value::Decimal(d),
            (ColumnType::Decimal, Value::Integer(i)) => Value::Decimal(i as f64),
            (ColumnType::Decimal, Value::String(s)) if s.trim().is_empty() => Value::Null,
            (ColumnType::Decimal, Value::String(s)) => match s.trim().parse::<f64>() {
                Ok(d) => Value::Decimal(d),
                Err(_) => return Err(Value::String(s)),
            },

            (ColumnType::Boolean, Value::Boolean(b)) => Value::Boolean(b),
            (ColumnType::Boolean, Value::Integer(i)) if i == 0 || i == 1 => Value::Boolean(i == 1),
            (ColumnType::Boolean, Value::String(s)) if s.trim().is_empty() => Value::Null,
            (ColumnType::Boolean, Value::String(s)) => match guess::parse_bool(&s) {
                Some(b) => Value::Boolean(b),
                None => return Err(Value::String(s)),
            },

            (ColumnType::DateTime, Value::DateTime(dt)) => Value::DateTime(dt),
            (ColumnType::DateTime, Value::String(s)) if s.trim().is_empty() => Value::Null,
            (ColumnType::DateTime, Value::String(s)) => match guess::parse_datetime(&s) {
                Some(dt) => Value::DateTime(dt),
                None => return Err(Value::String(s)),
            },

            (_, other) => return Err(other),
        };
        Ok(coerced)
    }

    /// Text form used by text formats and by string columns.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Integer(i) => i.to_string(),
            Value::Decimal(d) => format_decimal(*d),
            Value::Boolean(b) => b.to_string(),
            Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Value::String(s) => s.clone(),
            Value::Raw(b) => String::from_utf8_lossy(b).into_owned(),
        }
    }

    /// Literal form used in rendered predicate text.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(_) | Value::Decimal(_) => self.to_text(),
            Value::Boolean(true) => "TRUE".to_string(),
            Value::Boolean(false) => "FALSE".to_string(),
            other => format!("'{}'", other.to_text().replace('\'', "''")),
        }
    }

    /// SQL-style comparison; `None` when either side is null or the kinds
    /// cannot be ordered against each other.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Decimal(b)) => (*a as f64).partial_cmp(b),
            (Value::Decimal(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
            (Value::Boolean(a), Value::Boolean(b)) => Some(a.cmp(b)),
            (Value::DateTime(a), Value::DateTime(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Raw(a), Value::Raw(b)) => Some(a.cmp(b)),
            // literal text against a typed column: coerce the text side
            (typed, Value::String(s)) if typed.kind().is_some() => {
                let ty = typed.kind()?;
                let rhs = Value::String(s.clone()).coerce(ty).ok()?;
                typed.compare(&rhs)
            }
            (Value::String(s), typed) => {
                let ty = typed.kind()?;
                let lhs = Value::String(s.clone()).coerce(ty).ok()?;
                lhs.compare(typed)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            other => f.write_str(&other.to_text()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Decimal(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

/// Decimals keep a fractional digit so text formats reload them as decimals.
/// Shortest round-trip text that still reads back as a decimal.
fn format_decimal(d: f64) -> String {
    let text = d.to_string();
    if d.is_finite() && !text.contains(['.', 'e', 'E']) {
        format!("{text}.0")
    } else {
        text
    }
}

/// A table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub read_only: bool,
    /// Type was guessed without any sample value; the first insert decides it
    pub provisional: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            read_only: false,
            provisional: false,
        }
    }

    /// Column whose type is not backed by any stored value yet.
    pub fn provisional(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            provisional: true,
            ..Self::new(name, column_type)
        }
    }

    /// `Id` in any case, or any name ending in `Id` (`EmployeeId`).
    pub fn is_identity(&self) -> bool {
        self.name.eq_ignore_ascii_case("id") || self.name.ends_with("Id")
    }
}

/// Table/column name matching honoring the session's case sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameComparer {
    pub case_sensitive: bool,
}

impl NameComparer {
    pub fn new(case_sensitive: bool) -> Self {
        Self { case_sensitive }
    }

    pub fn eq(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.eq_ignore_ascii_case(b)
        }
    }

    /// Map key for a name.
    pub fn key(&self, name: &str) -> String {
        if self.case_sensitive {
            name.to_string()
        } else {
            name.to_ascii_lowercase()
        }
    }

    /// Position of `name` in `columns`; ambiguous matches are an error.
    pub fn position(&self, table: &str, columns: &[Column], name: &str) -> FlatDbResult<usize> {
        let mut found = None;
        for (idx, col) in columns.iter().enumerate() {
            if col.name == name {
                return Ok(idx);
            }
            if self.eq(&col.name, name) {
                if found.is_some() {
                    return Err(FlatDbError::AmbiguousColumn {
                        table: table.to_string(),
                        column: name.to_string(),
                    });
                }
                found = Some(idx);
            }
        }
        found.ok_or_else(|| FlatDbError::ColumnNotFound {
            table: table.to_string(),
            column: name.to_string(),
        })
    }
}
