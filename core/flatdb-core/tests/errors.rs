// Error reporting and failure-path persistence

mod common;

use common::{read_table, temp_db, write_table};
use flatdb_core::{
    ConnectionConfig, Database, DatabaseBuilder, FlatDbError, FlatDbResult, FormatKind, Value,
};
use tempfile::TempDir;

#[test]
fn test_csv_cannot_hold_a_whole_database_in_one_file() -> FlatDbResult<()> {
    let dir = TempDir::new()?;
    let config = ConnectionConfig::new(dir.path().join("store.csv"), FormatKind::Csv)
        .with_create(true);
    let err = Database::open(config).unwrap_err();
    assert!(matches!(err, FlatDbError::NotSupported { .. }), "{err}");
    Ok(())
}

#[test]
fn test_missing_data_source() -> FlatDbResult<()> {
    let dir = TempDir::new()?;
    let err = Database::open(ConnectionConfig::new(dir.path().join("absent"), FormatKind::Csv))
        .unwrap_err();
    assert!(matches!(err, FlatDbError::StorageNotFound(_)));
    Ok(())
}

#[test]
fn test_partial_insert_is_persisted_when_flushing_on_error() -> FlatDbResult<()> {
    let (dir, db) = temp_db(FormatKind::Csv)?;
    write_table(&dir, "t.csv", "Id,N\n1,1\n")?;

    let err = db.execute("INSERT INTO t (N) VALUES (2), ('x')").unwrap_err();
    assert!(matches!(err, FlatDbError::TypeMismatch { .. }), "{err}");
    assert_eq!(read_table(&dir, "t.csv")?, "Id,N\n1,1\n2,2\n");
    assert_eq!(db.query("SELECT * FROM t")?.len(), 2);
    Ok(())
}

#[test]
fn test_failed_insert_is_discarded_without_flush_on_error() -> FlatDbResult<()> {
    let dir = TempDir::new()?;
    std::fs::write(dir.path().join("t.csv"), "Id,N\n1,1\n")?;
    let db = DatabaseBuilder::new(
        ConnectionConfig::new(dir.path(), FormatKind::Csv).with_flush_on_error(false),
    )
    .watch(false)
    .build()?;

    assert!(db.execute("INSERT INTO t (N) VALUES (2), ('x')").is_err());
    assert_eq!(std::fs::read_to_string(dir.path().join("t.csv"))?, "Id,N\n1,1\n");
    assert_eq!(db.query("SELECT * FROM t")?.len(), 1);
    Ok(())
}

#[test]
fn test_transaction_control_out_of_order() -> FlatDbResult<()> {
    let (_dir, db) = temp_db(FormatKind::Csv)?;
    assert!(matches!(db.commit(), Err(FlatDbError::TransactionState(_))));
    assert!(matches!(db.rollback(), Err(FlatDbError::TransactionState(_))));

    db.begin()?;
    assert!(matches!(db.begin(), Err(FlatDbError::TransactionState(_))));
    db.commit()?;
    assert!(!db.in_transaction());
    Ok(())
}

#[test]
fn test_statement_errors() -> FlatDbResult<()> {
    let (dir, db) = temp_db(FormatKind::Csv)?;
    write_table(&dir, "Employees.csv", "Id,Name\n1,Ann\n")?;

    let cases = [
        ("SELECT * FROM Nobody", "table"),
        ("SELECT Age FROM Employees", "column"),
        ("SELECT * FORM Employees", "parse"),
        ("SELECT * FROM Employees e JOIN Employees f ON e.Id = f.Id", "unsupported"),
        ("SELECT * FROM Employees WHERE Id = @missing", "scalar"),
        ("SELECT * FROM Employees WHERE Id = nope()", "function"),
        ("INSERT INTO Employees (Name, Name) VALUES ('a', 'b')", "duplicate"),
        ("INSERT INTO Employees (Name) VALUES ('a', 'b')", "arity"),
        ("CREATE TABLE employees (X INT)", "exists"),
    ];
    for (sql, kind) in cases {
        let err = db.execute(sql).unwrap_err();
        let matched = match kind {
            "table" => matches!(err, FlatDbError::TableNotFound { .. }),
            "column" => matches!(err, FlatDbError::ColumnNotFound { .. }),
            "parse" => matches!(err, FlatDbError::SqlParse { .. }),
            "unsupported" => matches!(err, FlatDbError::SqlNotSupported { .. }),
            "scalar" => matches!(err, FlatDbError::MustDeclareScalar(_)),
            "function" => matches!(err, FlatDbError::FunctionNotFound(_)),
            "duplicate" => matches!(err, FlatDbError::DuplicateColumn { .. }),
            "arity" => matches!(err, FlatDbError::RowArity { .. }),
            "exists" => matches!(err, FlatDbError::DuplicateTable(_)),
            _ => false,
        };
        assert!(matched, "{sql}: unexpected {err:?}");
    }

    assert_eq!(read_table(&dir, "Employees.csv")?, "Id,Name\n1,Ann\n");
    Ok(())
}

#[test]
fn test_byte_order_mark_is_invisible() -> FlatDbResult<()> {
    let (dir, db) = temp_db(FormatKind::Csv)?;
    write_table(&dir, "Bom.csv", "\u{FEFF}Id,Name\n1,Ann\n")?;
    let rows = db.query("SELECT Id FROM Bom")?;
    assert_eq!(rows.columns[0].name, "Id");
    assert_eq!(rows.scalar(), Some(&Value::Integer(1)));

    let (dir, db) = temp_db(FormatKind::Json)?;
    write_table(&dir, "Bom.json", "\u{FEFF}[{\"Id\": 1, \"Name\": \"Ann\"}]")?;
    let rows = db.query("SELECT Name FROM Bom WHERE Id = 1")?;
    assert_eq!(rows.scalar(), Some(&Value::from("Ann")));
    Ok(())
}

#[test]
fn test_unreadable_table_is_not_overwritten_by_other_writes() -> FlatDbResult<()> {
    let dir = TempDir::new()?;
    let broken = b"Id,N\n1,1\n2,\xff\n3,3\n".to_vec();
    std::fs::write(dir.path().join("Bad.csv"), &broken)?;
    std::fs::write(dir.path().join("Good.csv"), "Id,N\n1,1\n")?;
    let db = DatabaseBuilder::new(
        ConnectionConfig::new(dir.path(), FormatKind::Csv)
            .with_sample_size(1)
            .with_page_size(1),
    )
    .watch(false)
    .build()?;

    assert_eq!(db.query("SELECT * FROM Bad LIMIT 1")?.len(), 1);
    assert!(db.query("SELECT * FROM Bad").is_err());
    db.execute("INSERT INTO Good (N) VALUES (2)")?;

    assert_eq!(std::fs::read(dir.path().join("Bad.csv"))?, broken);
    assert_eq!(read_table(&dir, "Good.csv")?, "Id,N\n1,1\n2,2\n");
    assert!(db.query("SELECT * FROM Bad").is_err());
    Ok(())
}
