// Catalog tables and external-change reloads

mod common;

use common::{temp_db, write_table};
use flatdb_core::provider::MemoryProvider;
use flatdb_core::{
    ConnectionConfig, Database, DatabaseBuilder, FlatDbResult, FormatKind, SourceProvider,
    StorageMode, Value,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn strings(rows: &flatdb_core::QueryResult, column: &str) -> Vec<String> {
    (0..rows.len())
        .filter_map(|i| rows.get(i, column))
        .map(Value::to_text)
        .collect()
}

#[test]
fn test_catalog_tables_sorted_case_insensitively() -> FlatDbResult<()> {
    let (dir, db) = temp_db(FormatKind::Csv)?;
    write_table(&dir, "beta.csv", "X\n1\n")?;
    write_table(&dir, "Alpha.csv", "Id,Name\n1,Ann\n")?;
    write_table(&dir, "gamma.csv", "Y\n")?;
    write_table(&dir, "notes.txt", "not a table")?;

    let tables = db.query("SELECT TABLE_NAME, TABLE_TYPE FROM INFORMATION_SCHEMA.TABLES")?;
    assert_eq!(strings(&tables, "TABLE_NAME"), vec!["Alpha", "beta", "gamma"]);
    assert_eq!(tables.get(0, "TABLE_TYPE"), Some(&Value::from("BASE TABLE")));

    let columns = db.query(
        "SELECT COLUMN_NAME, DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS WHERE TABLE_NAME = 'Alpha'",
    )?;
    assert_eq!(strings(&columns, "COLUMN_NAME"), vec!["Id", "Name"]);
    assert_eq!(strings(&columns, "DATA_TYPE"), vec!["Int64", "String"]);
    Ok(())
}

#[test]
fn test_catalog_rejects_writes() -> FlatDbResult<()> {
    let (_dir, db) = temp_db(FormatKind::Csv)?;
    let err = db
        .execute("DELETE FROM INFORMATION_SCHEMA.TABLES")
        .unwrap_err();
    assert!(matches!(err, flatdb_core::FlatDbError::SqlNotSupported { .. }));
    Ok(())
}

#[test]
fn test_table_names_ignore_case_by_default() -> FlatDbResult<()> {
    let (dir, db) = temp_db(FormatKind::Csv)?;
    write_table(&dir, "Employees.csv", "Id,Name\n1,Ann\n")?;
    let rows = db.query("SELECT name FROM EMPLOYEES WHERE ID = 1")?;
    assert_eq!(rows.scalar(), Some(&Value::from("Ann")));
    Ok(())
}

#[test]
fn test_memory_edit_is_reloaded_on_next_statement() -> FlatDbResult<()> {
    let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
    provider.put("Employees", "Id,Name\n1,Ann\n");
    let db = DatabaseBuilder::new(ConnectionConfig::default())
        .provider(provider.clone())
        .build()?;
    assert_eq!(db.query("SELECT * FROM Employees")?.len(), 1);

    provider.put("Employees", "Id,Name\n1,Ann\n2,Bo\n");
    assert_eq!(db.query("SELECT * FROM Employees")?.len(), 2);

    provider.put("Projects", "Id\n");
    assert!(db.table_exists("Projects")?);
    Ok(())
}

#[test]
fn test_own_writes_keep_cached_rows() -> FlatDbResult<()> {
    let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
    provider.put("Employees", "Id,Name\n1,Ann\n");
    let db = DatabaseBuilder::new(ConnectionConfig::default())
        .provider(provider.clone())
        .build()?;

    db.execute("INSERT INTO Employees (Name) VALUES ('Bo')")?;
    assert!(provider.is_watching());
    let rows = db.query("SELECT Name FROM Employees ORDER BY Id")?;
    assert_eq!(strings(&rows, "Name"), vec!["Ann", "Bo"]);
    Ok(())
}

#[test]
fn test_file_edit_is_detected_by_the_watcher() -> FlatDbResult<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("Employees.csv"), "Id,Name\n1,Ann\n")?;
    let db = Database::open(ConnectionConfig::new(dir.path(), FormatKind::Csv))?;
    assert_eq!(db.query("SELECT * FROM Employees")?.len(), 1);

    // let the watcher settle before editing behind its back
    thread::sleep(Duration::from_millis(100));
    std::fs::write(dir.path().join("Employees.csv"), "Id,Name\n1,Ann\n2,Bo\n3,Cy\n")?;

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let seen = db.query("SELECT * FROM Employees")?.len();
        if seen == 3 {
            break;
        }
        assert!(Instant::now() < deadline, "external edit never observed");
        thread::sleep(Duration::from_millis(50));
    }
    Ok(())
}
