//! Parsed statement model consumed by the table cache and the writers.

use crate::filter::Filter;
use crate::types::{ColumnType, Value};
use std::collections::HashMap;

/// Catalog schema name (case-insensitive).
pub const INFORMATION_SCHEMA: &str = "INFORMATION_SCHEMA";

/// Values bound to named placeholders.
///
/// Lookups accept the name with or without its sigil, so `@id`, `:id` and
/// `id` all find a value bound as `@id`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Parameters {
    values: HashMap<String, Value>,
}

fn bare(name: &str) -> &str {
    name.trim_start_matches(['@', ':', '$'])
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let name = name.into();
        self.values.insert(bare(&name).to_string(), value.into());
        self
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.bind(name, value);
        self
    }

    /// Values for `?` placeholders, in order of appearance.
    pub fn positional<V: Into<Value>>(values: impl IntoIterator<Item = V>) -> Self {
        let mut params = Self::new();
        for (i, value) in values.into_iter().enumerate() {
            params.bind(format!("?{}", i + 1), value);
        }
        params
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(bare(name))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Outcome of the last mutation, consulted by scalar functions such as
/// `changes()` and `last_insert_rowid()`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    pub affected_rows: usize,
    /// Identity value of the last inserted row, if one was generated or given
    pub last_identity: Option<Value>,
}

/// A table reference, optionally schema-qualified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

/// Synthesized catalog tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogTable {
    Tables,
    Columns,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// `INFORMATION_SCHEMA.TABLES` / `INFORMATION_SCHEMA.COLUMNS`.
    pub fn catalog(&self) -> Option<CatalogTable> {
        let schema = self.schema.as_deref()?;
        if !schema.eq_ignore_ascii_case(INFORMATION_SCHEMA) {
            return None;
        }
        if self.name.eq_ignore_ascii_case("TABLES") {
            Some(CatalogTable::Tables)
        } else if self.name.eq_ignore_ascii_case("COLUMNS") {
            Some(CatalogTable::Columns)
        } else {
            None
        }
    }
}

/// Value position in INSERT/UPDATE: literal or placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Literal(Value),
    Parameter(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    Wildcard,
    Column { name: String, alias: Option<String> },
    CountAll { alias: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub from: TableRef,
    pub projection: Vec<Projection>,
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<usize>,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: TableRef,
    /// Declared column names; empty means positional
    pub columns: Vec<String>,
    pub rows: Vec<Vec<ValueExpr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: TableRef,
    pub assignments: Vec<(String, ValueExpr)>,
    pub filter: Option<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: TableRef,
    pub filter: Option<Filter>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable {
        table: TableRef,
        columns: Vec<ColumnDef>,
        if_not_exists: bool,
    },
    AddColumn {
        table: TableRef,
        column: ColumnDef,
    },
    DropColumn {
        table: TableRef,
        column: String,
    },
    DropTable {
        table: TableRef,
        if_exists: bool,
    },
    Begin,
    Commit,
    Rollback,
}

impl Statement {
    /// Table the statement reads or writes.
    pub fn table(&self) -> Option<&TableRef> {
        match self {
            Statement::Select(s) => Some(&s.from),
            Statement::Insert(s) => Some(&s.table),
            Statement::Update(s) => Some(&s.table),
            Statement::Delete(s) => Some(&s.table),
            Statement::CreateTable { table, .. }
            | Statement::AddColumn { table, .. }
            | Statement::DropColumn { table, .. }
            | Statement::DropTable { table, .. } => Some(table),
            Statement::Begin | Statement::Commit | Statement::Rollback => None,
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        match self {
            Statement::Select(s) => s.filter.as_ref(),
            Statement::Update(s) => s.filter.as_ref(),
            Statement::Delete(s) => s.filter.as_ref(),
            _ => None,
        }
    }

    pub fn is_query(&self) -> bool {
        matches!(self, Statement::Select(_))
    }

    pub fn is_transaction_control(&self) -> bool {
        matches!(self, Statement::Begin | Statement::Commit | Statement::Rollback)
    }
}
