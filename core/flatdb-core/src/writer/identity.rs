//! Identity inference and row assembly for inserts.

use crate::error::{FlatDbError, FlatDbResult};
use crate::format::TableFormat;
use crate::types::{Column, NameComparer, Row, Value};
use uuid::Uuid;

/// Next identity value after `previous`.
///
/// An empty table starts at the format default. Otherwise the successor is
/// derived from the shape of the previous value: a UUID yields a fresh UUID,
/// a number yields the number plus one. Anything else has no successor.
pub fn next_identity(
    format: &dyn TableFormat,
    column: &Column,
    previous: Option<&Value>,
) -> Option<Value> {
    let next = match previous {
        None => format.default_identity(column),
        Some(Value::Integer(i)) => Value::Integer(i.checked_add(1)?),
        Some(Value::Decimal(d)) => Value::Decimal(d + 1.0),
        Some(Value::String(s)) => {
            if Uuid::parse_str(s.trim()).is_ok() {
                Value::String(Uuid::new_v4().to_string())
            } else {
                let n = s.trim().parse::<i64>().ok()?;
                Value::String(n.checked_add(1)?.to_string())
            }
        }
        Some(Value::Raw(bytes)) if Uuid::from_slice(bytes).is_ok() => {
            Value::Raw(Uuid::new_v4().as_bytes().to_vec())
        }
        Some(_) => return None,
    };
    if column.provisional {
        Some(next)
    } else {
        next.coerce(column.column_type).ok()
    }
}

/// Fit `value` to `column`. A provisional column adopts the kind of the
/// first non-null value it receives.
pub fn settle(column: &mut Column, value: Value) -> FlatDbResult<Value> {
    if value.is_null() {
        return Ok(value);
    }
    if column.provisional {
        if let Some(kind) = value.kind() {
            column.column_type = kind;
            column.provisional = false;
        }
        return Ok(value);
    }
    value.coerce(column.column_type)
}

/// Assemble a full-width row from an INSERT value list.
///
/// `supplied` names the target columns; empty means positional. Identity
/// columns left out are filled from `previous` (the table's last row).
/// Returns the row and the identity value of the row, if any.
pub fn build_row(
    table: &str,
    columns: &mut [Column],
    names: NameComparer,
    supplied: &[String],
    values: Vec<Value>,
    previous: Option<&Row>,
    format: &dyn TableFormat,
) -> FlatDbResult<(Row, Option<Value>)> {
    let targets: Vec<usize> = if supplied.is_empty() {
        if values.len() > columns.len() {
            return Err(FlatDbError::RowArity {
                table: table.to_string(),
                expected: columns.len(),
                actual: values.len(),
            });
        }
        (0..values.len()).collect()
    } else {
        if supplied.len() != values.len() {
            return Err(FlatDbError::RowArity {
                table: table.to_string(),
                expected: supplied.len(),
                actual: values.len(),
            });
        }
        supplied
            .iter()
            .map(|name| names.position(table, columns, name))
            .collect::<FlatDbResult<_>>()?
    };

    let mut row = vec![Value::Null; columns.len()];
    let mut explicit = vec![false; columns.len()];
    for (index, value) in targets.into_iter().zip(values) {
        row[index] = settle(&mut columns[index], value)?;
        explicit[index] = true;
    }

    let mut identity: Option<(usize, Value)> = None;
    for index in 0..columns.len() {
        if !columns[index].is_identity() {
            continue;
        }
        if !explicit[index] {
            let last = previous.map(|r| r.get(index).unwrap_or(&Value::Null));
            if let Some(next) = next_identity(format, &columns[index], last) {
                row[index] = settle(&mut columns[index], next)?;
            }
        }
        columns[index].read_only = true;
        let exact = columns[index].name.eq_ignore_ascii_case("id");
        let replace = match &identity {
            None => true,
            Some((held, _)) => exact && !columns[*held].name.eq_ignore_ascii_case("id"),
        };
        if replace && !row[index].is_null() {
            identity = Some((index, row[index].clone()));
        }
    }
    Ok((row, identity.map(|(_, v)| v)))
}

/// Columns of a table defined by its first insert.
pub fn first_write_columns(supplied: &[String], rows: &[Vec<Value>]) -> Vec<Column> {
    supplied
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let kind = rows
                .iter()
                .filter_map(|r| r.get(i))
                .find_map(Value::kind);
            match kind {
                Some(kind) => Column::new(name.clone(), kind),
                None => Column::provisional(name.clone(), crate::types::ColumnType::String),
            }
        })
        .collect()
}
