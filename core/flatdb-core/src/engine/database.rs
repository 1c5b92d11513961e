//! Database struct definition: the session over one logical database

use crate::cache::TableCache;
use crate::config::ConnectionConfig;
use crate::filter::FunctionEvaluator;
use crate::format::{SaveOptions, SharedLock, TableFormat};
use crate::provider::SourceProvider;
use crate::sql::{RowMatcher, SqlParser, StatementResult};
use crate::transaction::Transaction;
use crate::types::NameComparer;
use crate::writer::WriteContext;
use parking_lot::Mutex;
use std::sync::Arc;

/// A connection to a directory of table files, or to a single file holding
/// every table.
///
/// # Data flow
///
/// - **SELECT**: shared family lock → cache drains external changes → table
///   loaded lazily → rows matched and shaped
/// - **INSERT/UPDATE/DELETE/DDL**: exclusive family lock → watcher suspended
///   → mutation applied to the cached table → whole database flushed
/// - **Inside a transaction**: mutations are staged and replayed at commit
///
/// # Example
///
/// ```no_run
/// use flatdb_core::{ConnectionConfig, Database, FormatKind};
///
/// # fn main() -> flatdb_core::FlatDbResult<()> {
/// let db = Database::open(ConnectionConfig::new("./data", FormatKind::Csv))?;
/// db.execute("INSERT INTO Employees (Name, Salary) VALUES ('Ann', 50000)")?;
/// let rows = db.query("SELECT Id, Name FROM Employees WHERE Salary > 40000")?;
/// println!("{} rows", rows.len());
/// # Ok(())
/// # }
/// ```
pub struct Database {
    pub(crate) config: ConnectionConfig,

    /// Storage backend (file system or memory)
    pub(crate) provider: Arc<dyn SourceProvider>,

    /// Table encoding
    pub(crate) format: Arc<dyn TableFormat>,

    /// Family lock: exclusive for writers, shared for readers
    pub(crate) lock: SharedLock,

    /// Loaded tables
    pub(crate) cache: Mutex<TableCache>,

    /// Open transaction and previous statement result
    pub(crate) session: Mutex<SessionState>,

    pub(crate) names: NameComparer,

    /// SQL parser (cached)
    pub(crate) sql_parser: SqlParser,

    pub(crate) matcher: Arc<dyn RowMatcher>,

    pub(crate) functions: Arc<dyn FunctionEvaluator>,
}

/// Per-session mutable state.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) transaction: Option<Transaction>,
    pub(crate) previous: StatementResult,
}

impl Database {
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Result of the last mutating statement.
    pub fn previous_result(&self) -> StatementResult {
        self.session.lock().previous.clone()
    }

    pub fn in_transaction(&self) -> bool {
        self.session.lock().transaction.is_some()
    }

    /// Whether `table` exists, honoring external changes.
    pub fn table_exists(&self, table: &str) -> crate::error::FlatDbResult<bool> {
        let _shared = self.lock.read();
        self.cache.lock().table_exists(table)
    }

    pub(crate) fn write_context(&self) -> WriteContext<'_> {
        WriteContext {
            provider: self.provider.as_ref(),
            format: self.format.as_ref(),
            lock: self.lock.as_ref(),
            cache: &self.cache,
            matcher: self.matcher.as_ref(),
            save: SaveOptions {
                pretty_print: self.config.pretty_print,
            },
            flush_on_error: self.config.flush_on_error,
        }
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("data_source", &self.config.data_source)
            .field("format", &self.format.name())
            .field("mode", &self.provider.mode())
            .finish()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        self.provider.stop_watching();
    }
}
