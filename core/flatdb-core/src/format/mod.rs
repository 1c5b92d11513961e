//! Table formats: how a table is encoded in its backing stream.
//!
//! Every format implements [`TableFormat`]: it fixes a table's schema on load
//! (intrinsic types for JSON/Parquet, sampled guesses for CSV), hands back a
//! lazily paged [`VirtualTable`], and writes whole tables back. Formats also
//! declare which optional features they support through
//! [`FormatCapabilities`]; the engine checks these before doing any work.

pub mod csv;
pub mod guess;
pub mod json;
pub mod parquet;

pub use csv::CsvFormat;
pub use guess::TypeGuesser;
pub use json::JsonFormat;
pub use parquet::ParquetFormat;

use crate::config::{ConnectionConfig, FormatKind, StorageMode};
use crate::error::{FlatDbError, FlatDbResult};
use crate::provider::SourceProvider;
use crate::table::VirtualTable;
use crate::types::{Column, ColumnType, Value};
use parking_lot::RwLock;
use std::io::Write;
use std::sync::{Arc, LazyLock};
use uuid::Uuid;

/// Lock shared by every writer of one format family.
pub type SharedLock = Arc<RwLock<()>>;

static CSV_LOCK: LazyLock<SharedLock> = LazyLock::new(|| Arc::new(RwLock::new(())));
static JSON_LOCK: LazyLock<SharedLock> = LazyLock::new(|| Arc::new(RwLock::new(())));
static PARQUET_LOCK: LazyLock<SharedLock> = LazyLock::new(|| Arc::new(RwLock::new(())));

/// Process-wide lock for a format family.
pub fn family_lock(kind: FormatKind) -> SharedLock {
    match kind {
        FormatKind::Csv => Arc::clone(&CSV_LOCK),
        FormatKind::Json => Arc::clone(&JSON_LOCK),
        FormatKind::Parquet => Arc::clone(&PARQUET_LOCK),
    }
}

/// Optional features of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCapabilities {
    /// Every table can live in a single shared file
    pub file_mode: bool,
    /// An insert may define the columns of a table that has none
    pub schema_on_first_write: bool,
    /// `ALTER TABLE ADD/DROP COLUMN`
    pub alter_schema: bool,
}

/// Knobs for loading a table.
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions {
    pub page_size: usize,
    pub sample_size: usize,
    pub guesser: TypeGuesser,
}

impl LoadOptions {
    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            sample_size: config.sample_size.max(1),
            guesser: TypeGuesser::new(config.numbers),
        }
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self::from_config(&ConnectionConfig::default())
    }
}

/// Knobs for writing tables back.
#[derive(Debug, Clone, Copy, Default)]
pub struct SaveOptions {
    pub pretty_print: bool,
}

/// Encoding of tables in provider streams.
///
/// # Contract
///
/// - `load` returns a table whose schema is fixed; rows are read lazily.
/// - `serialize_database` receives fully materialized tables. In directory
///   mode each one is written to its own stream; in file mode the format
///   rewrites the shared file, keeping tables it was not given and removing
///   the `removed` ones.
pub trait TableFormat: Send + Sync {
    fn kind(&self) -> FormatKind;

    fn capabilities(&self) -> FormatCapabilities;

    fn name(&self) -> &'static str {
        self.kind().default_extension()
    }

    /// Names of the tables present in storage.
    fn table_names(&self, provider: &dyn SourceProvider) -> FlatDbResult<Vec<String>> {
        provider.list_tables()
    }

    fn table_exists(&self, provider: &dyn SourceProvider, table: &str) -> FlatDbResult<bool> {
        Ok(provider.exists(table))
    }

    fn load(
        &self,
        provider: &dyn SourceProvider,
        table: &str,
        options: &LoadOptions,
    ) -> FlatDbResult<VirtualTable>;

    /// Encode one materialized table.
    fn write_table(
        &self,
        out: &mut (dyn Write + Send),
        table: &VirtualTable,
        options: &SaveOptions,
    ) -> FlatDbResult<()>;

    fn serialize_database(
        &self,
        provider: &dyn SourceProvider,
        tables: &[&VirtualTable],
        removed: &[String],
        options: &SaveOptions,
    ) -> FlatDbResult<()> {
        if provider.mode() == StorageMode::File {
            return Err(FlatDbError::not_supported(
                "file-as-database mode",
                self.name(),
            ));
        }
        for name in removed {
            provider.remove(name)?;
        }
        for table in tables {
            let mut out = provider.open_write(table.name())?;
            self.write_table(&mut out, table, options)?;
            out.flush()?;
        }
        Ok(())
    }

    /// Identity assigned to the first row of an empty table.
    fn default_identity(&self, column: &Column) -> Value {
        match column.column_type {
            ColumnType::String if !column.provisional => Value::String(Uuid::new_v4().to_string()),
            ColumnType::Raw => Value::Raw(Uuid::new_v4().as_bytes().to_vec()),
            ColumnType::Decimal => Value::Decimal(1.0),
            _ => Value::Integer(1),
        }
    }

    /// Lock serializing writers of this format.
    fn family_lock(&self) -> SharedLock {
        family_lock(self.kind())
    }
}

/// Format implementation for a configured kind.
pub fn format_for(config: &ConnectionConfig) -> Arc<dyn TableFormat> {
    match config.format {
        FormatKind::Csv => Arc::new(CsvFormat::default()),
        FormatKind::Json => Arc::new(JsonFormat::new()),
        FormatKind::Parquet => Arc::new(ParquetFormat::new()),
    }
}
