//! Table cache: the in-memory view of one logical database.
//!
//! Tables are loaded on first reference and kept for the lifetime of the
//! session. External edits reported by the provider arrive on a channel and
//! only mark tables dirty; the next access drains the channel and swaps in a
//! freshly loaded table, so a reload never happens behind a caller's back.
//!
//! Writers flush the whole cache through the format after every mutation.
//! A table whose storage could not be read to the end is never written back,
//! and is dropped from the cache so the next access reloads it.

pub mod catalog;

use crate::error::{FlatDbError, FlatDbResult};
use crate::format::{LoadOptions, SaveOptions, TableFormat};
use crate::provider::{ChangeEvent, SourceProvider};
use crate::sql::select::{QueryResult, shape};
use crate::sql::{MatchAll, RowMatcher, RowPredicate, SelectStatement, Statement};
use crate::table::VirtualTable;
use crate::transaction::{ScopedRow, overlay};
use crate::types::{Column, NameComparer, Row};
use ahash::AHashMap;
use rayon::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use tracing::{debug, info, warn};

/// Result of [`TableCache::read`].
pub enum ReadOutcome<'a> {
    /// Shaped rows of a SELECT
    Rows(QueryResult),
    /// The live table a mutation targets
    Live(&'a mut VirtualTable),
}

pub struct TableCache {
    provider: Arc<dyn SourceProvider>,
    format: Arc<dyn TableFormat>,
    options: LoadOptions,
    names: NameComparer,
    catalog: String,
    tables: AHashMap<String, VirtualTable>,
    changes: Receiver<ChangeEvent>,
    pending: HashSet<String>,
    /// Storage names of tables dropped since the last flush
    removed: Vec<String>,
}

impl TableCache {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        format: Arc<dyn TableFormat>,
        options: LoadOptions,
        names: NameComparer,
        catalog: impl Into<String>,
    ) -> Self {
        let changes = provider.subscribe();
        Self {
            provider,
            format,
            options,
            names,
            catalog: catalog.into(),
            tables: AHashMap::new(),
            changes,
            pending: HashSet::new(),
            removed: Vec::new(),
        }
    }

    pub fn names(&self) -> NameComparer {
        self.names
    }

    /// Map key of a table name.
    pub fn key(&self, table: &str) -> String {
        self.names.key(table)
    }

    /// Storage location of `table`, for error messages.
    pub fn identifier(&self, table: &str) -> String {
        self.provider.identifier(table)
    }

    pub fn is_loaded(&self, table: &str) -> bool {
        self.tables.contains_key(&self.key(table))
    }

    /// Mark a table for reload on next access.
    pub fn mark_dirty(&mut self, table: &str) {
        let key = self.key(table);
        self.pending.insert(key);
    }

    /// Apply change notifications received since the last access.
    ///
    /// A table that fails to reload is evicted; the error surfaces on its
    /// next access while the other pending tables are still reloaded.
    pub fn drain_changes(&mut self) -> FlatDbResult<()> {
        while let Ok(event) = self.changes.try_recv() {
            match event {
                ChangeEvent::Table(name) => {
                    let key = self.key(&name);
                    self.pending.insert(key);
                }
                ChangeEvent::All => self.pending.extend(self.tables.keys().cloned()),
            }
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        for key in std::mem::take(&mut self.pending) {
            let Some(name) = self.tables.get(&key).map(|t| t.name().to_string()) else {
                continue;
            };
            // the replacement is fully built before the old table goes away
            match self.reload(&name) {
                Ok(Some(table)) => {
                    debug!(table = %name, "reloaded after external change");
                    self.tables.insert(key, table);
                }
                Ok(None) => {
                    debug!(table = %name, "table removed externally");
                    self.tables.remove(&key);
                }
                Err(e) => {
                    warn!(table = %name, error = %e, "reload failed, table evicted");
                    self.tables.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn reload(&self, name: &str) -> FlatDbResult<Option<VirtualTable>> {
        let provider = self.provider.as_ref();
        if !self.format.table_exists(provider, name)? {
            return Ok(None);
        }
        self.format.load(provider, name, &self.options).map(Some)
    }

    /// Storage spelling of `table`, if it exists.
    fn storage_name(&self, table: &str) -> FlatDbResult<Option<String>> {
        if let Some(loaded) = self.tables.get(&self.key(table)) {
            return Ok(Some(loaded.name().to_string()));
        }
        let names = self.format.table_names(self.provider.as_ref())?;
        if let Some(exact) = names.iter().find(|n| n.as_str() == table) {
            return Ok(Some(exact.clone()));
        }
        Ok(names.into_iter().find(|n| self.names.eq(n, table)))
    }

    pub fn table_exists(&mut self, table: &str) -> FlatDbResult<bool> {
        self.drain_changes()?;
        Ok(self.storage_name(table)?.is_some())
    }

    /// Loaded table for `table`, loading it from storage on first use.
    pub fn ensure_loaded(&mut self, table: &str) -> FlatDbResult<&mut VirtualTable> {
        let key = self.key(table);
        if self.tables.get(&key).is_some_and(VirtualTable::is_failed) {
            debug!(table, "discarding partially read table");
            self.tables.remove(&key);
        }
        if !self.tables.contains_key(&key) {
            let name = self
                .storage_name(table)?
                .ok_or_else(|| FlatDbError::TableNotFound {
                    table: table.to_string(),
                    path: self.provider.identifier(table),
                })?;
            let loaded = self
                .format
                .load(self.provider.as_ref(), &name, &self.options)?;
            debug!(table = %name, columns = loaded.columns().len(), "loaded table");
            self.tables.insert(key.clone(), loaded);
        }
        self.tables
            .get_mut(&key)
            .ok_or_else(|| FlatDbError::TableNotFound {
                table: table.to_string(),
                path: self.provider.identifier(table),
            })
    }

    /// Add a table created in this session.
    pub fn register(&mut self, table: VirtualTable) {
        let key = self.key(table.name());
        self.removed.retain(|n| !self.names.eq(n, table.name()));
        self.pending.remove(&key);
        self.tables.insert(key, table);
    }

    /// Drop a table; storage is removed on the next flush.
    pub fn remove(&mut self, table: &str) -> FlatDbResult<()> {
        let name = self
            .storage_name(table)?
            .ok_or_else(|| FlatDbError::TableNotFound {
                table: table.to_string(),
                path: self.provider.identifier(table),
            })?;
        let key = self.key(&name);
        self.tables.remove(&key);
        self.pending.remove(&key);
        self.removed.push(name);
        Ok(())
    }

    /// Resolve a statement against the cache.
    ///
    /// SELECTs are answered here, with `scoped` rows overlaid on a private
    /// copy of the table; any other statement gets the live target table.
    pub fn read(
        &mut self,
        statement: &Statement,
        predicate: Option<&str>,
        matcher: &dyn RowMatcher,
        scoped: &[ScopedRow],
    ) -> FlatDbResult<ReadOutcome<'_>> {
        self.drain_changes()?;
        match statement {
            Statement::Select(select) => Ok(ReadOutcome::Rows(
                self.select(select, predicate, matcher, scoped)?,
            )),
            other => {
                let table = other.table().ok_or_else(|| FlatDbError::SqlNotSupported {
                    feature: "statement without a target table".to_string(),
                    hint: "only table statements read through the cache".to_string(),
                })?;
                Ok(ReadOutcome::Live(self.ensure_loaded(&table.name)?))
            }
        }
    }

    fn select(
        &mut self,
        select: &SelectStatement,
        predicate: Option<&str>,
        matcher: &dyn RowMatcher,
        scoped: &[ScopedRow],
    ) -> FlatDbResult<QueryResult> {
        let names = self.names;
        if let Some(kind) = select.from.catalog() {
            let mut table = self.catalog_table(catalog::is_columns(Some(kind)))?;
            let name = table.name().to_string();
            let columns = table.columns().to_vec();
            let rows = table.rows()?.to_vec();
            let rows = filter_rows(&name, &columns, rows, predicate, matcher, names)?;
            return shape(&name, &columns, rows, select, names);
        }

        let table = self.ensure_loaded(&select.from.name)?;
        let name = table.name().to_string();
        let columns = table.columns().to_vec();
        let test = compile(&name, &columns, predicate, matcher, names)?;

        let rows = if scoped.is_empty() {
            let counting = select
                .projection
                .iter()
                .any(|p| matches!(p, crate::sql::Projection::CountAll { .. }));
            // without ORDER BY a LIMIT stops paging early
            let wanted = match (select.order_by.is_empty() && !counting, select.limit) {
                (true, Some(limit)) => limit.saturating_add(select.offset),
                _ => usize::MAX,
            };
            let mut rows = Vec::new();
            if wanted > 0 {
                for row in table.cursor() {
                    let row = row?;
                    if test.matches(&row) {
                        rows.push(row);
                        if rows.len() >= wanted {
                            break;
                        }
                    }
                }
            }
            rows
        } else {
            overlay(table.rows()?, scoped)
                .into_iter()
                .map(|(_, row)| row)
                .filter(|row| test.matches(row))
                .collect()
        };
        shape(&name, &columns, rows, select, names)
    }

    fn catalog_table(&mut self, with_columns: bool) -> FlatDbResult<VirtualTable> {
        let mut names: Vec<String> = self.format.table_names(self.provider.as_ref())?;
        for table in self.tables.values() {
            if !names.iter().any(|n| self.names.eq(n, table.name())) {
                names.push(table.name().to_string());
            }
        }
        if !with_columns {
            return Ok(catalog::tables(&self.catalog, &names));
        }

        let missing: Vec<&String> = names
            .iter()
            .filter(|n| !self.tables.contains_key(&self.names.key(n)))
            .collect();
        let provider = self.provider.as_ref();
        let format = self.format.as_ref();
        let options = self.options;
        let loaded = missing
            .par_iter()
            .map(|name| format.load(provider, name, &options))
            .collect::<FlatDbResult<Vec<_>>>()?;
        for table in loaded {
            let key = self.key(table.name());
            self.tables.insert(key, table);
        }
        let schemas: Vec<(String, Vec<Column>)> = self
            .tables
            .values()
            .map(|t| (t.name().to_string(), t.columns().to_vec()))
            .collect();
        Ok(catalog::columns(&self.catalog, &schemas))
    }

    /// Write every cached table back to storage.
    ///
    /// Tables that cannot be read completely keep their stored contents.
    pub fn flush(&mut self, options: &SaveOptions) -> FlatDbResult<()> {
        for table in self.tables.values_mut() {
            if let Err(e) = table.materialize() {
                warn!(table = table.name(), error = %e, "skipping unreadable table on flush");
            }
        }
        self.tables.retain(|_, t| !t.is_failed());
        let mut tables: Vec<&VirtualTable> = self.tables.values().collect();
        tables.sort_by(|a, b| a.name().cmp(b.name()));
        self.format
            .serialize_database(self.provider.as_ref(), &tables, &self.removed, options)?;
        info!(
            tables = tables.len(),
            removed = self.removed.len(),
            "flushed database"
        );
        self.removed.clear();
        Ok(())
    }
}

impl std::fmt::Debug for TableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCache")
            .field("format", &self.format.name())
            .field("tables", &self.tables.len())
            .field("pending", &self.pending)
            .finish()
    }
}

/// Compile `predicate` or match everything.
pub fn compile(
    table: &str,
    columns: &[Column],
    predicate: Option<&str>,
    matcher: &dyn RowMatcher,
    names: NameComparer,
) -> FlatDbResult<Box<dyn RowPredicate>> {
    match predicate {
        Some(text) => matcher.compile(text, table, columns, names),
        None => Ok(Box::new(MatchAll)),
    }
}

fn filter_rows(
    table: &str,
    columns: &[Column],
    rows: Vec<Row>,
    predicate: Option<&str>,
    matcher: &dyn RowMatcher,
    names: NameComparer,
) -> FlatDbResult<Vec<Row>> {
    let test = compile(table, columns, predicate, matcher, names)?;
    Ok(rows.into_iter().filter(|r| test.matches(r)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageMode;
    use crate::format::CsvFormat;
    use crate::provider::MemoryProvider;
    use crate::sql::{PredicateMatcher, SqlParser};
    use crate::types::Value;

    fn cache_with(provider: Arc<MemoryProvider>) -> TableCache {
        TableCache::new(
            provider,
            Arc::new(CsvFormat::default()),
            LoadOptions::default(),
            NameComparer::new(false),
            "db",
        )
    }

    fn query(cache: &mut TableCache, sql: &str, predicate: Option<&str>) -> QueryResult {
        let statement = SqlParser::new().parse_one(sql).unwrap();
        match cache
            .read(&statement, predicate, &PredicateMatcher, &[])
            .unwrap()
        {
            ReadOutcome::Rows(rows) => rows,
            ReadOutcome::Live(_) => panic!("expected rows"),
        }
    }

    #[test]
    fn test_lazy_load_and_case_insensitive_lookup() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        provider.put("Employees", "Id,Name\n1,Ann\n2,Bo\n");
        let mut cache = cache_with(provider);
        assert!(!cache.is_loaded("employees"));
        let result = query(&mut cache, "SELECT Name FROM employees", Some("Id = 2"));
        assert_eq!(result.rows, vec![vec![Value::String("Bo".into())]]);
        assert!(cache.is_loaded("EMPLOYEES"));
    }

    #[test]
    fn test_missing_table() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        let mut cache = cache_with(provider);
        let statement = SqlParser::new().parse_one("SELECT * FROM nope").unwrap();
        assert!(matches!(
            cache.read(&statement, None, &PredicateMatcher, &[]),
            Err(FlatDbError::TableNotFound { .. })
        ));
        assert!(!cache.table_exists("nope").unwrap());
    }

    #[test]
    fn test_external_change_reloads_on_next_access() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        provider.put("t", "A\n1\n");
        provider.start_watching().unwrap();
        let mut cache = cache_with(Arc::clone(&provider));
        assert_eq!(query(&mut cache, "SELECT * FROM t", None).len(), 1);

        provider.put("t", "A\n1\n2\n");
        assert_eq!(query(&mut cache, "SELECT * FROM t", None).len(), 2);
    }

    #[test]
    fn test_scoped_rows_are_overlaid() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        provider.put("t", "A\n1\n");
        let mut cache = cache_with(provider);
        let statement = SqlParser::new().parse_one("SELECT * FROM t").unwrap();
        let scoped = vec![ScopedRow::inserted(vec![Value::Integer(2)])];
        let rows = match cache
            .read(&statement, None, &PredicateMatcher, &scoped)
            .unwrap()
        {
            ReadOutcome::Rows(rows) => rows,
            ReadOutcome::Live(_) => panic!("expected rows"),
        };
        assert_eq!(rows.len(), 2);
        match cache
            .read(&statement, None, &PredicateMatcher, &[])
            .unwrap()
        {
            ReadOutcome::Rows(rows) => assert_eq!(rows.len(), 1),
            ReadOutcome::Live(_) => panic!("expected rows"),
        }
    }

    #[test]
    fn test_limit_without_order_stops_early() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        let mut text = String::from("A\n");
        for i in 0..50 {
            text.push_str(&format!("{i}\n"));
        }
        provider.put("t", text);
        let mut cache = TableCache::new(
            provider,
            Arc::new(CsvFormat::default()),
            LoadOptions {
                page_size: 5,
                ..LoadOptions::default()
            },
            NameComparer::new(false),
            "db",
        );
        let result = query(&mut cache, "SELECT * FROM t LIMIT 3", None);
        assert_eq!(result.len(), 3);
        let table = cache.ensure_loaded("t").unwrap();
        assert!(!table.is_fully_loaded());
        assert!(table.loaded_rows().len() < 50);
    }

    #[test]
    fn test_catalog_lists_tables() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        provider.put("b", "X\n1\n");
        provider.put("a", "Y,Z\n1,x\n");
        let mut cache = cache_with(provider);
        let tables = query(&mut cache, "SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES", None);
        assert_eq!(
            tables.rows,
            vec![
                vec![Value::String("a".into())],
                vec![Value::String("b".into())]
            ]
        );
        let columns = query(
            &mut cache,
            "SELECT TABLE_NAME, COLUMN_NAME, DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS",
            None,
        );
        assert_eq!(columns.len(), 3);
        assert_eq!(columns.get(0, "COLUMN_NAME"), Some(&Value::String("Y".into())));
        assert_eq!(columns.get(2, "DATA_TYPE"), Some(&Value::String("Int64".into())));
    }

    fn paged_cache(provider: Arc<MemoryProvider>) -> TableCache {
        TableCache::new(
            provider,
            Arc::new(CsvFormat::default()),
            LoadOptions {
                page_size: 1,
                sample_size: 1,
                ..LoadOptions::default()
            },
            NameComparer::new(false),
            "db",
        )
    }

    #[test]
    fn test_flush_leaves_partially_read_table_untouched() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        let broken = b"A\n1\n2\n\xff\xfe\n4\n".to_vec();
        provider.put("broken", broken.clone());
        provider.put("other", "B\n1\n");
        let mut cache = paged_cache(Arc::clone(&provider));

        let first = query(&mut cache, "SELECT * FROM broken LIMIT 1", None);
        assert_eq!(first.len(), 1);
        let statement = SqlParser::new().parse_one("SELECT * FROM broken").unwrap();
        assert!(cache.read(&statement, None, &PredicateMatcher, &[]).is_err());

        cache
            .ensure_loaded("other")
            .unwrap()
            .push_row(vec![Value::Integer(2)])
            .unwrap();
        cache.flush(&SaveOptions::default()).unwrap();

        assert_eq!(provider.get("broken").unwrap(), broken);
        assert_eq!(provider.get_string("other").unwrap(), "B\n1\n2\n");
        assert!(!cache.is_loaded("broken"));
    }

    #[test]
    fn test_failed_table_reloads_on_next_access() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        provider.put("t", b"A\n1\n\xff\n".to_vec());
        let mut cache = paged_cache(Arc::clone(&provider));
        assert!(cache.ensure_loaded("t").unwrap().materialize().is_err());

        provider.put("t", "A\n1\n2\n");
        let table = cache.ensure_loaded("t").unwrap();
        assert!(!table.is_failed());
        assert_eq!(table.rows().unwrap().len(), 2);
    }

    #[test]
    fn test_failed_reload_does_not_drop_other_changes() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        provider.put("good", "A\n1\n");
        provider.put("bad", "A\n1\n");
        provider.start_watching().unwrap();
        let mut cache = cache_with(Arc::clone(&provider));
        assert_eq!(query(&mut cache, "SELECT * FROM good", None).len(), 1);
        assert_eq!(query(&mut cache, "SELECT * FROM bad", None).len(), 1);

        // the header itself is unreadable, so the reload fails outright
        provider.put("bad", b"\xff\xfe\n".to_vec());
        provider.put("good", "A\n1\n2\n");
        assert_eq!(query(&mut cache, "SELECT * FROM good", None).len(), 2);
        assert!(!cache.is_loaded("bad"));

        let statement = SqlParser::new().parse_one("SELECT * FROM bad").unwrap();
        assert!(cache.read(&statement, None, &PredicateMatcher, &[]).is_err());
    }

    #[test]
    fn test_flush_writes_loaded_tables_and_removals() {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        provider.put("keep", "A\n1\n");
        provider.put("gone", "A\n1\n");
        let mut cache = cache_with(Arc::clone(&provider));
        cache
            .ensure_loaded("keep")
            .unwrap()
            .push_row(vec![Value::Integer(2)])
            .unwrap();
        cache.remove("gone").unwrap();
        cache.flush(&SaveOptions::default()).unwrap();
        assert_eq!(provider.get_string("keep").unwrap(), "A\n1\n2\n");
        assert!(!provider.exists("gone"));
    }
}
