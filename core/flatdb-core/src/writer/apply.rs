//! Mutations applied to live cached tables.

use crate::cache::{TableCache, compile};
use crate::error::{FlatDbError, FlatDbResult};
use crate::format::TableFormat;
use crate::sql::{RowMatcher, StatementResult};
use crate::table::VirtualTable;
use crate::types::{Column, NameComparer, Value};
use crate::writer::BoundOp;
use crate::writer::identity::{build_row, first_write_columns, settle};

pub fn apply(
    op: &BoundOp,
    cache: &mut TableCache,
    format: &dyn TableFormat,
    matcher: &dyn RowMatcher,
) -> FlatDbResult<StatementResult> {
    let names = cache.names();
    match op {
        BoundOp::Insert {
            table,
            columns,
            rows,
        } => {
            let table = cache.ensure_loaded(table)?;
            insert(table, columns, rows, names, format)
        }
        BoundOp::Update {
            table,
            assignments,
            predicate,
        } => {
            let table = cache.ensure_loaded(table)?;
            let name = table.name().to_string();
            let test = compile(&name, table.columns(), predicate.as_deref(), matcher, names)?;
            // column flags change only once every assignment fits
            let mut schema = table.columns().to_vec();
            let mut settled = Vec::with_capacity(assignments.len());
            for (column, value) in assignments {
                let index = names.position(&name, &schema, column)?;
                settled.push((index, settle(&mut schema[index], value.clone())?));
                schema[index].read_only = false;
            }
            let mut affected = 0;
            for row in table.rows_mut()?.iter_mut() {
                if test.matches(row) {
                    for (index, value) in &settled {
                        row[*index] = value.clone();
                    }
                    affected += 1;
                }
            }
            table.columns_mut().clone_from_slice(&schema);
            Ok(affected_rows(affected))
        }
        BoundOp::Delete { table, predicate } => {
            let table = cache.ensure_loaded(table)?;
            let name = table.name().to_string();
            let test = compile(&name, table.columns(), predicate.as_deref(), matcher, names)?;
            let rows = table.rows_mut()?;
            let before = rows.len();
            rows.retain(|row| !test.matches(row));
            Ok(affected_rows(before - rows.len()))
        }
        BoundOp::CreateTable {
            table,
            columns,
            if_not_exists,
        } => {
            check_distinct(table, columns.iter().map(|c| c.name.as_str()), names)?;
            if cache.table_exists(table)? {
                let existing = cache.ensure_loaded(table)?;
                if !existing.columns().is_empty() {
                    return if *if_not_exists {
                        Ok(StatementResult::default())
                    } else {
                        Err(FlatDbError::DuplicateTable(existing.name().to_string()))
                    };
                }
                existing.define_columns(columns.clone())?;
            } else {
                cache.register(VirtualTable::empty(table.clone(), columns.clone()));
            }
            Ok(StatementResult::default())
        }
        BoundOp::AddColumn { table, column } => {
            require_alter(format)?;
            cache
                .ensure_loaded(table)?
                .add_column(names, column.clone())?;
            Ok(StatementResult::default())
        }
        BoundOp::DropColumn { table, column } => {
            require_alter(format)?;
            cache.ensure_loaded(table)?.drop_column(names, column)?;
            Ok(StatementResult::default())
        }
        BoundOp::DropTable { table, if_exists } => {
            if !cache.table_exists(table)? {
                return if *if_exists {
                    Ok(StatementResult::default())
                } else {
                    Err(FlatDbError::TableNotFound {
                        table: table.clone(),
                        path: cache.identifier(table),
                    })
                };
            }
            cache.remove(table)?;
            Ok(StatementResult::default())
        }
    }
}

fn affected_rows(count: usize) -> StatementResult {
    StatementResult {
        affected_rows: count,
        last_identity: None,
    }
}

fn insert(
    table: &mut VirtualTable,
    columns: &[String],
    rows: &[Vec<Value>],
    names: NameComparer,
    format: &dyn TableFormat,
) -> FlatDbResult<StatementResult> {
    check_distinct(table.name(), columns.iter().map(String::as_str), names)?;
    if table.columns().is_empty() {
        if !format.capabilities().schema_on_first_write {
            return Err(FlatDbError::not_supported(
                "defining columns on first insert",
                format.name(),
            ));
        }
        if columns.is_empty() {
            return Err(FlatDbError::SqlNotSupported {
                feature: "positional INSERT into a table without columns".to_string(),
                hint: "name the target columns".to_string(),
            });
        }
        let defined = first_write_columns(columns, rows);
        table.define_columns(defined)?;
    }
    table.materialize()?;

    let name = table.name().to_string();
    let mut last_identity = None;
    for values in rows {
        let previous = table.loaded_rows().last().cloned();
        let (row, identity) = build_row(
            &name,
            table.columns_mut(),
            names,
            columns,
            values.clone(),
            previous.as_ref(),
            format,
        )?;
        table.push_row(row)?;
        if identity.is_some() {
            last_identity = identity;
        }
    }
    Ok(StatementResult {
        affected_rows: rows.len(),
        last_identity,
    })
}

fn require_alter(format: &dyn TableFormat) -> FlatDbResult<()> {
    if format.capabilities().alter_schema {
        Ok(())
    } else {
        Err(FlatDbError::not_supported("ALTER TABLE", format.name()))
    }
}

fn check_distinct<'a>(
    table: &str,
    columns: impl IntoIterator<Item = &'a str>,
    names: NameComparer,
) -> FlatDbResult<()> {
    let mut seen: Vec<&str> = Vec::new();
    for column in columns {
        if seen.iter().any(|s| names.eq(s, column)) {
            return Err(FlatDbError::DuplicateColumn {
                table: table.to_string(),
                column: column.to_string(),
            });
        }
        seen.push(column);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageMode;
    use crate::format::{CsvFormat, LoadOptions};
    use crate::provider::MemoryProvider;
    use crate::sql::PredicateMatcher;
    use crate::types::ColumnType;
    use std::sync::Arc;

    fn cache_over(text: &str) -> TableCache {
        let provider = Arc::new(MemoryProvider::new("db", StorageMode::Directory));
        provider.put("t", text);
        TableCache::new(
            provider,
            Arc::new(CsvFormat::default()),
            LoadOptions::default(),
            NameComparer::new(false),
            "db",
        )
    }

    fn update(assignments: Vec<(&str, Value)>) -> BoundOp {
        BoundOp::Update {
            table: "t".to_string(),
            assignments: assignments
                .into_iter()
                .map(|(c, v)| (c.to_string(), v))
                .collect(),
            predicate: Some("Id = 1".to_string()),
        }
    }

    #[test]
    fn test_rejected_update_keeps_column_flags() {
        let mut cache = cache_over("Id,N,Note\n1,1,\n");
        let insert = BoundOp::Insert {
            table: "t".to_string(),
            columns: vec!["N".to_string()],
            rows: vec![vec![Value::Integer(2)]],
        };
        apply(&insert, &mut cache, &CsvFormat::default(), &PredicateMatcher).unwrap();
        assert!(cache.ensure_loaded("t").unwrap().columns()[0].read_only);

        let bad = update(vec![
            ("Id", Value::Integer(7)),
            ("Note", Value::from("first")),
            ("N", Value::from("not a number")),
        ]);
        let err = apply(&bad, &mut cache, &CsvFormat::default(), &PredicateMatcher).unwrap_err();
        assert!(matches!(err, FlatDbError::TypeMismatch { .. }));

        let table = cache.ensure_loaded("t").unwrap();
        assert!(table.columns()[0].read_only);
        assert!(table.columns()[2].provisional);
        assert_eq!(table.rows().unwrap()[0][0], Value::Integer(1));
    }

    #[test]
    fn test_update_settles_columns_after_success() {
        let mut cache = cache_over("Id,N,Note\n1,1,\n");
        let ok = update(vec![("Note", Value::from("first"))]);
        let result = apply(&ok, &mut cache, &CsvFormat::default(), &PredicateMatcher).unwrap();
        assert_eq!(result.affected_rows, 1);

        let table = cache.ensure_loaded("t").unwrap();
        assert!(!table.columns()[2].provisional);
        assert_eq!(table.columns()[2].column_type, ColumnType::String);
        assert_eq!(table.rows().unwrap()[0][2], Value::from("first"));
    }
}
