//! Parquet tables (one `<table>.parquet` per table).
//!
//! Column types come from the Arrow schema stored in the file. Rows are
//! decoded batch by batch with the batch size set to the page size, so only
//! the pages actually consumed are converted. Writes replace the file with a
//! single Snappy-compressed row group.

use crate::config::FormatKind;
use crate::error::{FlatDbError, FlatDbResult};
use crate::format::{FormatCapabilities, LoadOptions, SaveOptions, TableFormat};
use crate::provider::SourceProvider;
use crate::table::{Page, PageSource, RowStream, VirtualTable};
use crate::types::{Column, ColumnType, Row, Value};
use arrow::array::{
    Array, ArrayRef, AsArray, BinaryBuilder, BooleanBuilder, Float64Builder, Int64Builder,
    StringBuilder, TimestampMicrosecondBuilder,
};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Field, Float64Type, Int64Type, Schema, TimeUnit, TimestampMicrosecondType,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use bytes::Bytes;
use chrono::DateTime;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::{ParquetRecordBatchReader, ParquetRecordBatchReaderBuilder};
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct ParquetFormat;

impl ParquetFormat {
    pub fn new() -> Self {
        Self
    }
}

/// Semantic column type for an Arrow type.
fn column_type_of(data_type: &DataType) -> ColumnType {
    match data_type {
        DataType::Int8
        | DataType::Int16
        | DataType::Int32
        | DataType::Int64
        | DataType::UInt8
        | DataType::UInt16
        | DataType::UInt32
        | DataType::UInt64 => ColumnType::Integer,
        DataType::Float16
        | DataType::Float32
        | DataType::Float64
        | DataType::Decimal128(_, _)
        | DataType::Decimal256(_, _) => ColumnType::Decimal,
        DataType::Boolean => ColumnType::Boolean,
        DataType::Date32 | DataType::Date64 | DataType::Timestamp(_, _) => ColumnType::DateTime,
        DataType::Binary | DataType::LargeBinary | DataType::FixedSizeBinary(_) => ColumnType::Raw,
        _ => ColumnType::String,
    }
}

/// Arrow type used to store a column.
fn arrow_type_of(column_type: ColumnType) -> DataType {
    match column_type {
        ColumnType::String => DataType::Utf8,
        ColumnType::Integer => DataType::Int64,
        ColumnType::Decimal => DataType::Float64,
        ColumnType::Boolean => DataType::Boolean,
        ColumnType::DateTime => DataType::Timestamp(TimeUnit::Microsecond, None),
        ColumnType::Raw => DataType::Binary,
    }
}

fn is_text(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8 | DataType::LargeUtf8 | DataType::Utf8View
    )
}

fn type_error(column: &Column, array: &ArrayRef) -> FlatDbError {
    FlatDbError::TypeMismatch {
        expected: column.column_type.name().to_string(),
        actual: array.data_type().to_string(),
    }
}

/// Convert one record batch into rows.
fn decode_batch(batch: &RecordBatch, columns: &[Column]) -> FlatDbResult<Vec<Row>> {
    let mut rows: Vec<Row> = vec![Vec::with_capacity(columns.len()); batch.num_rows()];
    for (column, array) in columns.iter().zip(batch.columns()) {
        let ty = column.column_type;
        if ty == ColumnType::String && !is_text(array.data_type()) {
            // nested and exotic types are surfaced as their display text
            let formatter = ArrayFormatter::try_new(array.as_ref(), &FormatOptions::default())?;
            for (i, row) in rows.iter_mut().enumerate() {
                row.push(if array.is_null(i) {
                    Value::Null
                } else {
                    Value::String(formatter.value(i).to_string())
                });
            }
            continue;
        }

        let array = cast(array, &arrow_type_of(ty))?;
        for (i, row) in rows.iter_mut().enumerate() {
            if array.is_null(i) {
                row.push(Value::Null);
                continue;
            }
            let value = match ty {
                ColumnType::Integer => array
                    .as_primitive_opt::<Int64Type>()
                    .map(|a| Value::Integer(a.value(i))),
                ColumnType::Decimal => array
                    .as_primitive_opt::<Float64Type>()
                    .map(|a| Value::Decimal(a.value(i))),
                ColumnType::Boolean => array.as_boolean_opt().map(|a| Value::Boolean(a.value(i))),
                ColumnType::DateTime => array
                    .as_primitive_opt::<TimestampMicrosecondType>()
                    .map(|a| {
                        DateTime::from_timestamp_micros(a.value(i))
                            .map_or(Value::Null, |dt| Value::DateTime(dt.naive_utc()))
                    }),
                ColumnType::String => array
                    .as_string_opt::<i32>()
                    .map(|a| Value::String(a.value(i).to_string())),
                ColumnType::Raw => array
                    .as_binary_opt::<i32>()
                    .map(|a| Value::Raw(a.value(i).to_vec())),
            };
            row.push(value.ok_or_else(|| type_error(column, &array))?);
        }
    }
    Ok(rows)
}

/// Build the Arrow array for column `index` of `rows`.
fn encode_column(rows: &[Row], index: usize, ty: ColumnType) -> FlatDbResult<ArrayRef> {
    let values = rows
        .iter()
        .map(|row| row[index].clone().coerce(ty))
        .collect::<FlatDbResult<Vec<Value>>>()?;

    let array: ArrayRef = match ty {
        ColumnType::Integer => {
            let mut b = Int64Builder::with_capacity(values.len());
            for v in &values {
                match v {
                    Value::Integer(i) => b.append_value(*i),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Decimal => {
            let mut b = Float64Builder::with_capacity(values.len());
            for v in &values {
                match v {
                    Value::Decimal(d) => b.append_value(*d),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Boolean => {
            let mut b = BooleanBuilder::with_capacity(values.len());
            for v in &values {
                match v {
                    Value::Boolean(x) => b.append_value(*x),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::DateTime => {
            let mut b = TimestampMicrosecondBuilder::with_capacity(values.len());
            for v in &values {
                match v {
                    Value::DateTime(dt) => b.append_value(dt.and_utc().timestamp_micros()),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::String => {
            let mut b = StringBuilder::new();
            for v in &values {
                match v {
                    Value::String(s) => b.append_value(s),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        ColumnType::Raw => {
            let mut b = BinaryBuilder::new();
            for v in &values {
                match v {
                    Value::Raw(bytes) => b.append_value(bytes),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
    };
    Ok(array)
}

impl TableFormat for ParquetFormat {
    fn kind(&self) -> FormatKind {
        FormatKind::Parquet
    }

    fn capabilities(&self) -> FormatCapabilities {
        FormatCapabilities {
            file_mode: false,
            schema_on_first_write: false,
            alter_schema: true,
        }
    }

    fn load(
        &self,
        provider: &dyn SourceProvider,
        table: &str,
        options: &LoadOptions,
    ) -> FlatDbResult<VirtualTable> {
        let mut data = Vec::new();
        provider.open_read(table)?.read_to_end(&mut data)?;
        if data.is_empty() {
            return Ok(VirtualTable::empty(table, Vec::new()));
        }

        let builder = ParquetRecordBatchReaderBuilder::try_new(Bytes::from(data))?
            .with_batch_size(options.page_size);
        let columns: Vec<Column> = builder
            .schema()
            .fields()
            .iter()
            .map(|f| {
                Column::new(
                    f.name().clone(),
                    options.guesser.prefer(column_type_of(f.data_type())),
                )
            })
            .collect();
        debug!(
            table,
            rows = builder.metadata().file_metadata().num_rows(),
            "parquet table opened"
        );

        let pages = ParquetPages {
            reader: builder.build()?,
            columns: columns.clone(),
            pending: VecDeque::new(),
        };
        Ok(VirtualTable::new(
            table,
            columns,
            RowStream::new(Box::new(pages), options.page_size),
        ))
    }

    fn write_table(
        &self,
        out: &mut (dyn Write + Send),
        table: &VirtualTable,
        _options: &SaveOptions,
    ) -> FlatDbResult<()> {
        if table.columns().is_empty() {
            return Ok(());
        }
        let schema = Arc::new(Schema::new(
            table
                .columns()
                .iter()
                .map(|c| Field::new(&c.name, arrow_type_of(c.column_type), true))
                .collect::<Vec<_>>(),
        ));
        let rows = table.loaded_rows();
        let arrays = table
            .columns()
            .iter()
            .enumerate()
            .map(|(i, c)| encode_column(rows, i, c.column_type))
            .collect::<FlatDbResult<Vec<ArrayRef>>>()?;
        let batch = RecordBatch::try_new(Arc::clone(&schema), arrays)?;

        let props = WriterProperties::builder()
            .set_compression(Compression::SNAPPY)
            .build();
        let mut writer = ArrowWriter::try_new(&mut *out, schema, Some(props))?;
        if batch.num_rows() > 0 {
            writer.write(&batch)?;
        }
        writer.close()?;
        Ok(())
    }
}

/// Decoded pages of a Parquet file.
struct ParquetPages {
    reader: ParquetRecordBatchReader,
    columns: Vec<Column>,
    pending: VecDeque<Row>,
}

impl PageSource for ParquetPages {
    fn next_page(&mut self, page_size: usize) -> FlatDbResult<Page> {
        while self.pending.len() < page_size {
            match self.reader.next() {
                Some(batch) => {
                    let batch = batch?;
                    self.pending.extend(decode_batch(&batch, &self.columns)?);
                }
                None => break,
            }
        }
        let take = self.pending.len().min(page_size);
        let rows: Vec<Row> = self.pending.drain(..take).collect();
        Ok(Page {
            records_read: rows.len(),
            rows,
        })
    }
}
