//! Synthesized `INFORMATION_SCHEMA` tables.

use crate::sql::CatalogTable;
use crate::table::VirtualTable;
use crate::types::{Column, ColumnType, Value};
use std::cmp::Ordering;

fn by_name(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

fn text_columns(names: &[&str]) -> Vec<Column> {
    names
        .iter()
        .map(|n| Column::new(*n, ColumnType::String))
        .collect()
}

/// `TABLES(TABLE_CATALOG, TABLE_NAME, TABLE_TYPE)` ordered by table name.
pub fn tables(catalog: &str, table_names: &[String]) -> VirtualTable {
    let mut names: Vec<&String> = table_names.iter().collect();
    names.sort_by(|a, b| by_name(a, b));
    let rows = names
        .into_iter()
        .map(|name| {
            vec![
                Value::String(catalog.to_string()),
                Value::String(name.clone()),
                Value::String("BASE TABLE".to_string()),
            ]
        })
        .collect();
    VirtualTable::from_rows(
        "TABLES",
        text_columns(&["TABLE_CATALOG", "TABLE_NAME", "TABLE_TYPE"]),
        rows,
    )
}

/// `COLUMNS(TABLE_CATALOG, TABLE_NAME, COLUMN_NAME, DATA_TYPE)` ordered by
/// table then column name.
pub fn columns(catalog: &str, schemas: &[(String, Vec<Column>)]) -> VirtualTable {
    let mut entries: Vec<(&str, &Column)> = schemas
        .iter()
        .flat_map(|(table, cols)| cols.iter().map(move |c| (table.as_str(), c)))
        .collect();
    entries.sort_by(|a, b| by_name(a.0, b.0).then_with(|| by_name(&a.1.name, &b.1.name)));
    let rows = entries
        .into_iter()
        .map(|(table, column)| {
            vec![
                Value::String(catalog.to_string()),
                Value::String(table.to_string()),
                Value::String(column.name.clone()),
                Value::String(column.column_type.name().to_string()),
            ]
        })
        .collect();
    VirtualTable::from_rows(
        "COLUMNS",
        text_columns(&["TABLE_CATALOG", "TABLE_NAME", "COLUMN_NAME", "DATA_TYPE"]),
        rows,
    )
}

pub fn is_columns(table: Option<CatalogTable>) -> bool {
    table == Some(CatalogTable::Columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_sorted() {
        let mut t = tables("db", &["b".into(), "A".into(), "c".into()]);
        let names: Vec<_> = t.rows().unwrap().iter().map(|r| r[1].to_text()).collect();
        assert_eq!(names, vec!["A", "b", "c"]);
        assert_eq!(t.rows().unwrap()[0][2], Value::String("BASE TABLE".into()));
    }

    #[test]
    fn test_columns_sorted_by_table_then_column() {
        let schemas = vec![
            (
                "Orders".to_string(),
                vec![Column::new("Total", ColumnType::Decimal)],
            ),
            (
                "Employees".to_string(),
                vec![
                    Column::new("Name", ColumnType::String),
                    Column::new("Id", ColumnType::Integer),
                ],
            ),
        ];
        let mut t = columns("db", &schemas);
        let rows: Vec<(String, String, String)> = t
            .rows()
            .unwrap()
            .iter()
            .map(|r| (r[1].to_text(), r[2].to_text(), r[3].to_text()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("Employees".into(), "Id".into(), "Int64".into()),
                ("Employees".into(), "Name".into(), "String".into()),
                ("Orders".into(), "Total".into(), "Decimal".into()),
            ]
        );
    }
}
