//! Connection configuration.
//!
//! A `ConnectionConfig` is built programmatically, parsed from a connection
//! string (`Data Source=./data;Format=json;Mode=file;Pretty=true`), or
//! deserialized from JSON.

use crate::error::{FlatDbError, FlatDbResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default number of raw records pulled per page.
pub const DEFAULT_PAGE_SIZE: usize = 1000;
/// Default number of rows sampled for type inference.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Supported file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Csv,
    Json,
    Parquet,
}

impl FormatKind {
    pub fn parse(text: &str) -> FlatDbResult<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "csv" | "text" | "delimited" => Ok(FormatKind::Csv),
            "json" => Ok(FormatKind::Json),
            "parquet" => Ok(FormatKind::Parquet),
            other => Err(FlatDbError::Config(format!("unknown format '{other}'"))),
        }
    }

    pub fn default_extension(&self) -> &'static str {
        match self {
            FormatKind::Csv => "csv",
            FormatKind::Json => "json",
            FormatKind::Parquet => "parquet",
        }
    }
}

/// How tables map onto storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// One `<table>.<ext>` file per table inside a folder
    Directory,
    /// One file holds every table
    File,
}

/// Numeric widening target for inferred columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberPreference {
    /// Integer when every sample is integral, decimal otherwise
    #[default]
    Auto,
    /// Every numeric column is decimal
    Decimal,
}

/// Options consumed from connection setup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub data_source: PathBuf,
    pub format: FormatKind,
    /// `None` detects the mode from the data source
    pub mode: Option<StorageMode>,
    /// Overrides the format's file extension (without the dot)
    pub extension: Option<String>,
    pub numbers: NumberPreference,
    pub pretty_print: bool,
    pub case_sensitive: bool,
    pub page_size: usize,
    pub sample_size: usize,
    /// Persist the cache even when a mutation failed half-way
    pub flush_on_error: bool,
    /// Create a missing data source instead of failing
    pub create: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            data_source: PathBuf::from("."),
            format: FormatKind::Csv,
            mode: None,
            extension: None,
            numbers: NumberPreference::Auto,
            pretty_print: false,
            case_sensitive: false,
            page_size: DEFAULT_PAGE_SIZE,
            sample_size: DEFAULT_SAMPLE_SIZE,
            flush_on_error: true,
            create: false,
        }
    }
}

impl ConnectionConfig {
    pub fn new(data_source: impl Into<PathBuf>, format: FormatKind) -> Self {
        Self {
            data_source: data_source.into(),
            format,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: StorageMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_pretty_print(mut self, pretty: bool) -> Self {
        self.pretty_print = pretty;
        self
    }

    pub fn with_case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn with_numbers(mut self, numbers: NumberPreference) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_flush_on_error(mut self, flush: bool) -> Self {
        self.flush_on_error = flush;
        self
    }

    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn extension(&self) -> &str {
        self.extension
            .as_deref()
            .unwrap_or_else(|| self.format.default_extension())
    }

    /// Parse `key=value` pairs separated by `;`. Keys are case-insensitive and
    /// spaces inside keys are ignored (`Data Source` == `DataSource`).
    pub fn from_connection_string(text: &str) -> FlatDbResult<Self> {
        let mut config = Self::default();
        let mut has_source = false;
        for part in text.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                FlatDbError::Config(format!("expected key=value, found '{part}'"))
            })?;
            let key: String = key
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_ascii_lowercase();
            let value = value.trim();
            match key.as_str() {
                "datasource" | "source" | "path" => {
                    config.data_source = PathBuf::from(value);
                    has_source = true;
                }
                "format" => config.format = FormatKind::parse(value)?,
                "mode" => {
                    config.mode = Some(match value.to_ascii_lowercase().as_str() {
                        "directory" | "folder" => StorageMode::Directory,
                        "file" => StorageMode::File,
                        other => {
                            return Err(FlatDbError::Config(format!("unknown mode '{other}'")));
                        }
                    })
                }
                "extension" => config.extension = Some(value.trim_start_matches('.').to_string()),
                "numbers" | "precision" => {
                    config.numbers = match value.to_ascii_lowercase().as_str() {
                        "auto" => NumberPreference::Auto,
                        "decimal" => NumberPreference::Decimal,
                        other => {
                            return Err(FlatDbError::Config(format!(
                                "unknown number preference '{other}'"
                            )));
                        }
                    }
                }
                "pretty" | "prettyprint" => config.pretty_print = parse_flag(&key, value)?,
                "casesensitive" => config.case_sensitive = parse_flag(&key, value)?,
                "flushonerror" => config.flush_on_error = parse_flag(&key, value)?,
                "create" => config.create = parse_flag(&key, value)?,
                "pagesize" => config.page_size = parse_size(&key, value)?,
                "samplesize" => config.sample_size = parse_size(&key, value)?,
                other => {
                    return Err(FlatDbError::Config(format!("unknown option '{other}'")));
                }
            }
        }
        if !has_source {
            return Err(FlatDbError::Config("missing 'Data Source'".to_string()));
        }
        config.validate()?;
        Ok(config)
    }

    /// Deserialize from a JSON document.
    pub fn from_json(text: &str) -> FlatDbResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> FlatDbResult<()> {
        if self.page_size == 0 {
            return Err(FlatDbError::Config("page size must be > 0".to_string()));
        }
        if self.sample_size == 0 {
            return Err(FlatDbError::Config("sample size must be > 0".to_string()));
        }
        Ok(())
    }

    /// Resolve the storage mode: explicit, else detected from the path.
    pub fn resolve_mode(&self) -> FlatDbResult<StorageMode> {
        if let Some(mode) = self.mode {
            return Ok(mode);
        }
        detect_mode(&self.data_source, self.extension(), self.create)
    }
}

fn detect_mode(path: &Path, extension: &str, create: bool) -> FlatDbResult<StorageMode> {
    if path.is_dir() {
        Ok(StorageMode::Directory)
    } else if path.is_file() {
        Ok(StorageMode::File)
    } else if create {
        let has_ext = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        Ok(if has_ext {
            StorageMode::File
        } else {
            StorageMode::Directory
        })
    } else {
        Err(FlatDbError::StorageNotFound(path.display().to_string()))
    }
}

fn parse_flag(key: &str, value: &str) -> FlatDbResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(FlatDbError::Config(format!(
            "option '{key}' expects true/false, found '{other}'"
        ))),
    }
}

fn parse_size(key: &str, value: &str) -> FlatDbResult<usize> {
    value
        .parse::<usize>()
        .map_err(|_| FlatDbError::Config(format!("option '{key}' expects a number, found '{value}'")))
}
