//! Database Constructors: factory methods for creating Database instances

use crate::cache::TableCache;
use crate::config::{ConnectionConfig, StorageMode};
use crate::engine::Database;
use crate::engine::database::SessionState;
use crate::error::{FlatDbError, FlatDbResult};
use crate::filter::FunctionEvaluator;
use crate::format::{LoadOptions, SharedLock, format_for};
use crate::provider::{FileSystemProvider, SourceProvider};
use crate::sql::{BuiltinFunctions, PredicateMatcher, RowMatcher, SqlParser};
use crate::types::NameComparer;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, instrument, warn};

impl Database {
    /// Open the data source described by `config`.
    ///
    /// Directory mode maps each table to `<table>.<ext>` inside the data
    /// source folder; file mode keeps every table in the data source file.
    /// External edits to the files are picked up on the next statement.
    #[instrument(skip(config), fields(source = %config.data_source.display()))]
    pub fn open(config: ConnectionConfig) -> FlatDbResult<Self> {
        DatabaseBuilder::new(config).build()
    }

    /// Open from a connection string such as
    /// `Data Source=./data;Format=json;Mode=file`.
    pub fn open_connection_string(text: &str) -> FlatDbResult<Self> {
        Self::open(ConnectionConfig::from_connection_string(text)?)
    }
}

/// Builder for a [`Database`] with injected collaborators.
///
/// ```no_run
/// use flatdb_core::{ConnectionConfig, DatabaseBuilder, StorageMode};
/// use flatdb_core::provider::MemoryProvider;
/// use std::sync::Arc;
///
/// # fn main() -> flatdb_core::FlatDbResult<()> {
/// let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
/// let db = DatabaseBuilder::new(ConnectionConfig::default())
///     .provider(provider)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct DatabaseBuilder {
    config: ConnectionConfig,
    provider: Option<Arc<dyn SourceProvider>>,
    lock: Option<SharedLock>,
    matcher: Option<Arc<dyn RowMatcher>>,
    functions: Option<Arc<dyn FunctionEvaluator>>,
    watch: bool,
}

impl DatabaseBuilder {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            provider: None,
            lock: None,
            matcher: None,
            functions: None,
            watch: true,
        }
    }

    /// Use `provider` instead of the file system.
    pub fn provider(mut self, provider: Arc<dyn SourceProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Serialize writers on `lock` instead of the process-wide format lock.
    pub fn lock(mut self, lock: SharedLock) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn matcher(mut self, matcher: Arc<dyn RowMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn functions(mut self, functions: Arc<dyn FunctionEvaluator>) -> Self {
        self.functions = Some(functions);
        self
    }

    /// Start watching storage for external edits (default on).
    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    pub fn build(self) -> FlatDbResult<Database> {
        let config = self.config;
        config.validate()?;
        let format = format_for(&config);

        let provider: Arc<dyn SourceProvider> = match self.provider {
            Some(provider) => provider,
            None => {
                let mode = config.resolve_mode()?;
                if mode == StorageMode::File && !format.capabilities().file_mode {
                    return Err(FlatDbError::not_supported(
                        "file-as-database mode",
                        format.name(),
                    ));
                }
                Arc::new(FileSystemProvider::open(
                    &config.data_source,
                    mode,
                    config.extension(),
                    config.create,
                )?)
            }
        };
        if provider.mode() == StorageMode::File && !format.capabilities().file_mode {
            return Err(FlatDbError::not_supported(
                "file-as-database mode",
                format.name(),
            ));
        }

        let names = NameComparer::new(config.case_sensitive);
        let catalog = config
            .data_source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "flatdb".to_string());
        let cache = TableCache::new(
            Arc::clone(&provider),
            Arc::clone(&format),
            LoadOptions::from_config(&config),
            names,
            catalog,
        );
        if self.watch {
            if let Err(e) = provider.start_watching() {
                warn!(error = %e, "external changes will not be detected");
            }
        }

        info!(
            format = format.name(),
            mode = ?provider.mode(),
            "opened database"
        );
        Ok(Database {
            lock: self.lock.unwrap_or_else(|| format.family_lock()),
            config,
            provider,
            format,
            cache: Mutex::new(cache),
            session: Mutex::new(SessionState::default()),
            names,
            sql_parser: SqlParser::new(),
            matcher: self.matcher.unwrap_or_else(|| Arc::new(PredicateMatcher)),
            functions: self.functions.unwrap_or_else(|| Arc::new(BuiltinFunctions)),
        })
    }
}
