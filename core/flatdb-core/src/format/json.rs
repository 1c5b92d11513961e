//! JSON tables.
//!
//! Directory mode stores each table as `<table>.json` holding an array of
//! objects. File mode stores every table in one document:
//! `{"Employees": [{...}, ...], "Orders": [...]}`.
//!
//! Column types come from the JSON kinds of the sampled values. The column
//! list is taken from the sampled object with the most properties; nested
//! objects and arrays are kept as raw JSON text.

use crate::config::{FormatKind, StorageMode};
use crate::error::{FlatDbError, FlatDbResult};
use crate::format::guess::{self, widen};
use crate::format::{FormatCapabilities, LoadOptions, SaveOptions, TableFormat};
use crate::provider::SourceProvider;
use crate::stream::BomSkipReader;
use crate::table::{IterPages, RowStream, VirtualTable};
use crate::types::{Column, ColumnType, Row, Value};
use serde_json::{Map, Number, Value as JsonValue};
use std::io::{Read, Write};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl JsonFormat {
    pub fn new() -> Self {
        Self
    }

    /// Parse the whole stream behind `table`; empty streams are `None`.
    fn read_document(
        &self,
        provider: &dyn SourceProvider,
        table: &str,
    ) -> FlatDbResult<Option<JsonValue>> {
        if !provider.exists(table) {
            return Ok(None);
        }
        let mut text = String::new();
        BomSkipReader::new(provider.open_read(table)?).read_to_string(&mut text)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&text)?))
    }

    /// Top-level object of a file-mode document.
    fn read_database(&self, provider: &dyn SourceProvider) -> FlatDbResult<Map<String, JsonValue>> {
        // every table name maps onto the same stream in file mode
        match self.read_document(provider, "")? {
            None => Ok(Map::new()),
            Some(JsonValue::Object(map)) => Ok(map),
            Some(_) => Err(FlatDbError::Serialization(format!(
                "'{}' must contain a JSON object of tables",
                provider.identifier("")
            ))),
        }
    }

    fn rows_of(&self, provider: &dyn SourceProvider, table: &str) -> FlatDbResult<Vec<JsonValue>> {
        let value = match provider.mode() {
            StorageMode::Directory => self.read_document(provider, table)?,
            StorageMode::File => self.read_database(provider)?.remove(table),
        };
        match value {
            None | Some(JsonValue::Null) => Ok(Vec::new()),
            Some(JsonValue::Array(items)) => Ok(items),
            Some(_) => Err(FlatDbError::Serialization(format!(
                "table '{table}' must be a JSON array of objects"
            ))),
        }
    }

    fn table_value(table: &VirtualTable) -> JsonValue {
        let items = table
            .loaded_rows()
            .iter()
            .map(|row| {
                let object: Map<String, JsonValue> = table
                    .columns()
                    .iter()
                    .zip(row)
                    .map(|(c, v)| (c.name.clone(), to_json(v)))
                    .collect();
                JsonValue::Object(object)
            })
            .collect();
        JsonValue::Array(items)
    }

    fn write_value(
        out: &mut (dyn Write + Send),
        value: &JsonValue,
        options: &SaveOptions,
    ) -> FlatDbResult<()> {
        if options.pretty_print {
            serde_json::to_writer_pretty(&mut *out, value)?;
        } else {
            serde_json::to_writer(&mut *out, value)?;
        }
        Ok(())
    }
}

/// Intrinsic column type of a JSON value, `None` for null.
fn kind_of(value: &JsonValue) -> Option<ColumnType> {
    match value {
        JsonValue::Null => None,
        JsonValue::Bool(_) => Some(ColumnType::Boolean),
        JsonValue::Number(n) if n.is_i64() || n.is_u64() => Some(ColumnType::Integer),
        JsonValue::Number(_) => Some(ColumnType::Decimal),
        JsonValue::String(s) if guess::parse_datetime(s).is_some() => Some(ColumnType::DateTime),
        JsonValue::String(_) => Some(ColumnType::String),
        JsonValue::Array(_) | JsonValue::Object(_) => Some(ColumnType::Raw),
    }
}

fn from_json(value: &JsonValue, ty: ColumnType) -> FlatDbResult<Value> {
    let value = match value {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Decimal(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Value::String(s.clone()),
        nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
            Value::Raw(serde_json::to_vec(nested)?)
        }
    };
    Ok(value.coerce_or_keep(ty))
}

fn to_json(value: &Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::from(*i),
        Value::Decimal(d) => Number::from_f64(*d).map_or(JsonValue::Null, JsonValue::Number),
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::DateTime(_) => JsonValue::String(value.to_text()),
        Value::String(s) => JsonValue::String(s.clone()),
        Value::Raw(bytes) => serde_json::from_slice(bytes)
            .unwrap_or_else(|_| JsonValue::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

impl TableFormat for JsonFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Json
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            file_mode: true,
            schema_on_first_write: true,
            alter_schema: true,
        }
    }

    fn table_names(&self, provider: &dyn SourceProvider) -> FlatDbResult<Vec<String>> {
        match provider.mode() {
            StorageMode::Directory => provider.list_tables(),
            StorageMode::File => Ok(self.read_database(provider)?.keys().cloned().collect()),
        }
    }

    fn table_exists(&self, provider: &dyn SourceProvider, table: &str) -> FlatDbResult<bool> {
        match provider.mode() {
            StorageMode::Directory => Ok(provider.exists(table)),
            StorageMode::File => Ok(self.read_database(provider)?.contains_key(table)),
        }
    }

    fn load(
        &self,
        provider: &dyn SourceProvider,
        table: &str,
        options: &LoadOptions,
    ) -> FlatDbResult<VirtualTable> {
        if !self.table_exists(provider, table)? {
            return Err(FlatDbError::TableNotFound {
                table: table.to_string(),
                path: provider.identifier(table),
            });
        }
        let items = self.rows_of(provider, table)?;
        let sample = &items[..items.len().min(options.sample_size)];

        let template = sample
            .iter()
            .filter_map(JsonValue::as_object)
            .max_by_key(|o| o.len());
        let columns: Vec<Column> = match template {
            None => Vec::new(),
            Some(template) => template
                .keys()
                .map(|name| {
                    let evidence = sample
                        .iter()
                        .filter_map(|item| item.get(name))
                        .filter_map(kind_of)
                        .fold(None, |acc, ty| Some(widen(acc, ty)));
                    match evidence {
                        Some(ty) => Column::new(name.clone(), options.guesser.prefer(ty)),
                        None => Column::provisional(name.clone(), ColumnType::String),
                    }
                })
                .collect(),
        };
        debug!(table, rows = items.len(), columns = columns.len(), "json table parsed");

        let schema = columns.clone();
        let rows = items.into_iter().map(move |item| -> FlatDbResult<Row> {
            let object = item.as_object().ok_or_else(|| {
                FlatDbError::Serialization(format!("expected a JSON object, found {item}"))
            })?;
            schema
                .iter()
                .map(|c| match object.get(&c.name) {
                    Some(v) => from_json(v, c.column_type),
                    None => Ok(Value::Null),
                })
                .collect()
        });
        Ok(VirtualTable::new(
            table,
            columns,
            RowStream::new(Box::new(IterPages::new(rows)), options.page_size),
        ))
    }

    fn write_table(
        &self,
        out: &mut (dyn Write + Send),
        table: &VirtualTable,
        options: &SaveOptions,
    ) -> FlatDbResult<()> {
        Self::write_value(out, &Self::table_value(table), options)
    }

    fn serialize_database(
        &self,
        provider: &dyn SourceProvider,
        tables: &[&VirtualTable],
        removed: &[String],
        options: &SaveOptions,
    ) -> FlatDbResult<()> {
        if provider.mode() == StorageMode::Directory {
            for name in removed {
                provider.remove(name)?;
            }
            for table in tables {
                let mut out = provider.open_write(table.name())?;
                self.write_table(&mut out, table, options)?;
                out.flush()?;
            }
            return Ok(());
        }

        let mut database = self.read_database(provider)?;
        for name in removed {
            database.shift_remove(name);
        }
        for table in tables {
            database.insert(table.name().to_string(), Self::table_value(table));
        }
        let mut out = provider.open_write("")?;
        Self::write_value(&mut out, &JsonValue::Object(database), options)?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryProvider;

    fn directory_with(table: &str, json: &str) -> MemoryProvider {
        let provider = MemoryProvider::new("db", StorageMode::Directory);
        provider.put(table, json.as_bytes().to_vec());
        provider
    }

    #[test]
    fn test_intrinsic_types() {
        let provider = directory_with(
            "Employees",
            r#"[{"Id":1,"Name":"Ann","Salary":50000.5,"Active":true,"Meta":{"a":1}}]"#,
        );
        let mut table = JsonFormat::new()
            .load(&provider, "Employees", &LoadOptions::default())
            .unwrap();
        let types: Vec<ColumnType> = table.columns().iter().map(|c| c.column_type).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Integer,
                ColumnType::String,
                ColumnType::Decimal,
                ColumnType::Boolean,
                ColumnType::Raw
            ]
        );
        let row = &table.rows().unwrap()[0];
        assert_eq!(row[4], Value::Raw(br#"{"a":1}"#.to_vec()));
    }

    #[test]
    fn test_widest_object_defines_columns() {
        let provider = directory_with("t", r#"[{"A":1},{"A":2,"B":"x"},{"B":"y"}]"#);
        let mut table = JsonFormat::new()
            .load(&provider, "t", &LoadOptions::default())
            .unwrap();
        let names: Vec<&str> = table.columns().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        let rows = table.rows().unwrap();
        assert_eq!(rows[0], vec![Value::Integer(1), Value::Null]);
        assert_eq!(rows[2], vec![Value::Null, Value::String("y".into())]);
    }

    #[test]
    fn test_value_beyond_sample_is_kept_as_read() {
        let provider = directory_with("t", r#"[{"N":1},{"N":"n/a"},{"N":3}]"#);
        let options = LoadOptions {
            sample_size: 1,
            ..LoadOptions::default()
        };
        let mut table = JsonFormat::new().load(&provider, "t", &options).unwrap();
        assert_eq!(table.columns()[0].column_type, ColumnType::Integer);
        let values: Vec<Value> = table.rows().unwrap().iter().map(|r| r[0].clone()).collect();
        assert_eq!(
            values,
            vec![Value::Integer(1), Value::String("n/a".into()), Value::Integer(3)]
        );
    }

    #[test]
    fn test_integers_widen_to_decimal() {
        let provider = directory_with("t", r#"[{"N":1},{"N":2.5}]"#);
        let mut table = JsonFormat::new()
            .load(&provider, "t", &LoadOptions::default())
            .unwrap();
        assert_eq!(table.columns()[0].column_type, ColumnType::Decimal);
        assert_eq!(table.rows().unwrap()[0][0], Value::Decimal(1.0));
    }

    #[test]
    fn test_empty_array_has_no_columns() {
        let provider = directory_with("t", "[]");
        let table = JsonFormat::new()
            .load(&provider, "t", &LoadOptions::default())
            .unwrap();
        assert!(table.columns().is_empty());
    }

    #[test]
    fn test_file_mode_round_trip_keeps_other_tables() {
        let provider = MemoryProvider::new("db.json", StorageMode::File);
        provider.put("", br#"{"A":[{"x":1}],"B":[{"y":"b"}]}"#.to_vec());
        let format = JsonFormat::new();
        assert_eq!(format.table_names(&provider).unwrap(), vec!["A", "B"]);
        assert!(format.table_exists(&provider, "B").unwrap());
        assert!(!format.table_exists(&provider, "C").unwrap());

        let mut a = format.load(&provider, "A", &LoadOptions::default()).unwrap();
        a.push_row(vec![Value::Integer(2)]).unwrap();
        format
            .serialize_database(&provider, &[&a], &[], &SaveOptions::default())
            .unwrap();
        assert_eq!(
            provider.get_string("").unwrap(),
            r#"{"A":[{"x":1},{"x":2}],"B":[{"y":"b"}]}"#
        );

        format
            .serialize_database(&provider, &[], &["B".to_string()], &SaveOptions::default())
            .unwrap();
        assert_eq!(format.table_names(&provider).unwrap(), vec!["A"]);
    }

    #[test]
    fn test_missing_table_in_file_mode() {
        let provider = MemoryProvider::new("db.json", StorageMode::File);
        provider.put("", br#"{"A":[]}"#.to_vec());
        let err = JsonFormat::new()
            .load(&provider, "Nope", &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, FlatDbError::TableNotFound { .. }));
    }

    #[test]
    fn test_pretty_print() {
        let table = VirtualTable::from_rows(
            "t",
            vec![Column::new("A", ColumnType::Integer)],
            vec![vec![Value::Integer(1)]],
        );
        let mut compact = Vec::new();
        let mut pretty = Vec::new();
        let format = JsonFormat::new();
        format
            .write_table(&mut compact, &table, &SaveOptions::default())
            .unwrap();
        format
            .write_table(&mut pretty, &table, &SaveOptions { pretty_print: true })
            .unwrap();
        assert_eq!(String::from_utf8(compact).unwrap(), r#"[{"A":1}]"#);
        assert!(String::from_utf8(pretty).unwrap().contains("\n  {"));
    }
}
