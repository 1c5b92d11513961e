// Shared fixtures for the integration tests

#![allow(dead_code)]

use flatdb_core::{ConnectionConfig, Database, DatabaseBuilder, FlatDbResult, FormatKind};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Empty database directory with the watcher off.
pub fn temp_db(format: FormatKind) -> FlatDbResult<(TempDir, Database)> {
    flatdb_core::logging::init_test();
    let dir = TempDir::new()?;
    let db = open_dir(dir.path(), format)?;
    Ok((dir, db))
}

pub fn open_dir(path: &Path, format: FormatKind) -> FlatDbResult<Database> {
    DatabaseBuilder::new(ConnectionConfig::new(path, format))
        .watch(false)
        .build()
}

pub fn write_table(dir: &TempDir, file: &str, contents: &str) -> FlatDbResult<()> {
    fs::write(dir.path().join(file), contents)?;
    Ok(())
}

pub fn read_table(dir: &TempDir, file: &str) -> FlatDbResult<String> {
    Ok(fs::read_to_string(dir.path().join(file))?)
}
