//! Virtual tables: fixed schema over a lazily paged row sequence.
//!
//! A format fixes the column list first (from a bounded sample), then hands
//! the table a [`PageSource`] that re-reads storage from the start and parses
//! records against that schema. Rows are pulled one page at a time and kept
//! once pulled, so every consumer within a session shares one
//! materialization. The underlying sequence is forward-only: re-reading
//! storage means building a new `VirtualTable` (a reload).

use crate::error::{FlatDbError, FlatDbResult};
use crate::types::{Column, NameComparer, Row, Value};
use std::collections::VecDeque;

/// One fetch from storage.
#[derive(Debug, Default)]
pub struct Page {
    pub rows: Vec<Row>,
    /// Raw records consumed, including ones that produced no row
    pub records_read: usize,
}

/// Produces rows in pages against a schema fixed at construction.
pub trait PageSource: Send {
    /// Fetch up to `page_size` records. A page that read fewer records
    /// than requested marks the end of data.
    fn next_page(&mut self, page_size: usize) -> FlatDbResult<Page>;
}

/// Pages over rows that are already decoded (tree formats parse the whole
/// document, but still convert values page by page).
pub struct IterPages<I> {
    iter: I,
}

impl<I> IterPages<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I> PageSource for IterPages<I>
where
    I: Iterator<Item = FlatDbResult<Row>> + Send,
{
    fn next_page(&mut self, page_size: usize) -> FlatDbResult<Page> {
        let mut rows = Vec::with_capacity(page_size);
        for row in self.iter.by_ref().take(page_size) {
            rows.push(row?);
        }
        Ok(Page {
            records_read: rows.len(),
            rows,
        })
    }
}

/// Forward-only row sequence with one-row lookahead.
///
/// A page error ends the stream for good; the error text is kept so the
/// owner can tell a short read from a complete one.
pub struct RowStream {
    source: Option<Box<dyn PageSource>>,
    page: VecDeque<Row>,
    page_size: usize,
    failure: Option<String>,
}

impl RowStream {
    pub fn new(source: Box<dyn PageSource>, page_size: usize) -> Self {
        Self {
            source: Some(source),
            page: VecDeque::new(),
            page_size: page_size.max(1),
            failure: None,
        }
    }

    pub fn empty() -> Self {
        Self {
            source: None,
            page: VecDeque::new(),
            page_size: 1,
            failure: None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.source.is_none() && self.page.is_empty() && self.failure.is_none()
    }

    /// Message of the page error that ended the stream early.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    fn fill(&mut self) -> FlatDbResult<()> {
        while self.page.is_empty() {
            let Some(source) = self.source.as_mut() else {
                return Ok(());
            };
            let result = source.next_page(self.page_size);
            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    self.source = None;
                    self.failure = Some(e.to_string());
                    return Err(e);
                }
            };
            if page.records_read < self.page_size {
                // releases the underlying stream
                self.source = None;
            }
            self.page.extend(page.rows);
        }
        Ok(())
    }

    /// Look at the next row without consuming it.
    pub fn peek(&mut self) -> FlatDbResult<Option<&Row>> {
        self.fill()?;
        Ok(self.page.front())
    }
}

impl Iterator for RowStream {
    type Item = FlatDbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fill() {
            return Some(Err(e));
        }
        self.page.pop_front().map(Ok)
    }
}

/// A table whose schema is fixed and whose rows are streamed on demand.
pub struct VirtualTable {
    name: String,
    columns: Vec<Column>,
    rows: Vec<Row>,
    stream: RowStream,
}

impl std::fmt::Debug for VirtualTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualTable")
            .field("name", &self.name)
            .field("columns", &self.columns)
            .field("rows_loaded", &self.rows.len())
            .field("fully_loaded", &self.stream.is_exhausted())
            .field("failed", &self.stream.failure().is_some())
            .finish()
    }
}

impl VirtualTable {
    pub fn new(name: impl Into<String>, columns: Vec<Column>, stream: RowStream) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
            stream,
        }
    }

    /// A table with no stored rows.
    pub fn empty(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self::new(name, columns, RowStream::empty())
    }

    /// A table over rows already in memory (catalog tables, tests).
    pub fn from_rows(name: impl Into<String>, columns: Vec<Column>, rows: Vec<Row>) -> Self {
        let mut table = Self::empty(name, columns);
        let width = table.columns.len();
        table.rows = rows
            .into_iter()
            .map(|mut r| {
                r.resize(width, Value::Null);
                r
            })
            .collect();
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn is_fully_loaded(&self) -> bool {
        self.stream.is_exhausted()
    }

    /// Storage could not be read to the end; the loaded rows are partial.
    pub fn is_failed(&self) -> bool {
        self.stream.failure().is_some()
    }

    /// Rows pulled from storage so far.
    pub fn loaded_rows(&self) -> &[Row] {
        &self.rows
    }

    /// Pull the next row from storage into the loaded set.
    fn pull(&mut self) -> FlatDbResult<bool> {
        if let Some(message) = self.stream.failure() {
            return Err(FlatDbError::IncompleteLoad {
                table: self.name.clone(),
                message: message.to_string(),
            });
        }
        match self.stream.next() {
            Some(row) => {
                let mut row = row?;
                row.resize(self.columns.len(), Value::Null);
                self.rows.push(row);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Row at `index`, pulling pages as needed.
    pub fn row(&mut self, index: usize) -> FlatDbResult<Option<&Row>> {
        while self.rows.len() <= index {
            if !self.pull()? {
                return Ok(None);
            }
        }
        Ok(self.rows.get(index))
    }

    /// Lazy iteration in row order.
    pub fn cursor(&mut self) -> RowCursor<'_> {
        RowCursor {
            table: self,
            next: 0,
        }
    }

    /// Pull every remaining row.
    pub fn materialize(&mut self) -> FlatDbResult<()> {
        while self.pull()? {}
        Ok(())
    }

    pub fn rows(&mut self) -> FlatDbResult<&[Row]> {
        self.materialize()?;
        Ok(&self.rows)
    }

    pub fn rows_mut(&mut self) -> FlatDbResult<&mut Vec<Row>> {
        self.materialize()?;
        Ok(&mut self.rows)
    }

    pub fn push_row(&mut self, mut row: Row) -> FlatDbResult<()> {
        self.materialize()?;
        if row.len() > self.columns.len() {
            return Err(FlatDbError::RowArity {
                table: self.name.clone(),
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        row.resize(self.columns.len(), Value::Null);
        self.rows.push(row);
        Ok(())
    }

    pub fn column_index(&self, names: NameComparer, column: &str) -> FlatDbResult<usize> {
        names.position(&self.name, &self.columns, column)
    }

    /// Column metadata (types, flags); the column count cannot change here.
    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    /// Replace the column list of a table that has no rows yet.
    pub fn define_columns(&mut self, columns: Vec<Column>) -> FlatDbResult<()> {
        self.materialize()?;
        let width = columns.len();
        self.columns = columns;
        for row in &mut self.rows {
            row.resize(width, Value::Null);
        }
        Ok(())
    }

    pub fn add_column(&mut self, names: NameComparer, column: Column) -> FlatDbResult<()> {
        if self.columns.iter().any(|c| names.eq(&c.name, &column.name)) {
            return Err(FlatDbError::DuplicateColumn {
                table: self.name.clone(),
                column: column.name,
            });
        }
        self.materialize()?;
        self.columns.push(column);
        for row in &mut self.rows {
            row.push(Value::Null);
        }
        Ok(())
    }

    pub fn drop_column(&mut self, names: NameComparer, column: &str) -> FlatDbResult<()> {
        let index = self.column_index(names, column)?;
        self.materialize()?;
        self.columns.remove(index);
        for row in &mut self.rows {
            row.remove(index);
        }
        Ok(())
    }
}

/// Iterator over a table's rows that pulls from storage lazily.
pub struct RowCursor<'a> {
    table: &'a mut VirtualTable,
    next: usize,
}

impl Iterator for RowCursor<'_> {
    type Item = FlatDbResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.table.row(self.next) {
            Ok(Some(row)) => {
                let row = row.clone();
                self.next += 1;
                Some(Ok(row))
            }
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}
