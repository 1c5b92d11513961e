//! SELECT result shaping: ORDER BY, OFFSET/LIMIT and projection over rows
//! that already passed the filter.

use crate::error::{FlatDbError, FlatDbResult};
use crate::sql::statement::{Projection, SelectStatement};
use crate::types::{Column, ColumnType, NameComparer, Row, Value};
use std::cmp::Ordering;

/// Rows returned by a query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Case-insensitive position of a result column.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            })
    }

    /// Value of column `name` in row `row`.
    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let index = self.column_index(name)?;
        self.rows.get(row)?.get(index)
    }

    /// First value of the first row.
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first()?.first()
    }
}

/// Null sorts before every value; incomparable values keep their order.
fn order_values(a: &Value, b: &Value) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => a.compare(b).unwrap_or(Ordering::Equal),
    }
}

/// Shape filtered rows of `table` according to `select`.
pub fn shape(
    table: &str,
    columns: &[Column],
    mut rows: Vec<Row>,
    select: &SelectStatement,
    names: NameComparer,
) -> FlatDbResult<QueryResult> {
    let counts = select
        .projection
        .iter()
        .filter(|p| matches!(p, Projection::CountAll { .. }))
        .count();
    if counts > 0 {
        if counts != select.projection.len() {
            return Err(FlatDbError::SqlNotSupported {
                feature: "COUNT(*) mixed with columns".to_string(),
                hint: "aggregates other than a lone COUNT(*) need GROUP BY".to_string(),
            });
        }
        let result_columns = select
            .projection
            .iter()
            .map(|p| match p {
                Projection::CountAll { alias } => Column::new(
                    alias.clone().unwrap_or_else(|| "COUNT(*)".to_string()),
                    ColumnType::Integer,
                ),
                _ => Column::new("COUNT(*)", ColumnType::Integer),
            })
            .collect::<Vec<_>>();
        let count = Value::Integer(rows.len() as i64);
        return Ok(QueryResult {
            rows: vec![vec![count; result_columns.len()]],
            columns: result_columns,
        });
    }

    if !select.order_by.is_empty() {
        let keys = select
            .order_by
            .iter()
            .map(|o| Ok((names.position(table, columns, &o.column)?, o.descending)))
            .collect::<FlatDbResult<Vec<_>>>()?;
        rows.sort_by(|a, b| {
            keys.iter()
                .map(|&(i, descending)| {
                    let ord = order_values(&a[i], &b[i]);
                    if descending { ord.reverse() } else { ord }
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
    }

    let rows = rows
        .into_iter()
        .skip(select.offset)
        .take(select.limit.unwrap_or(usize::MAX));

    let mut picks = Vec::new();
    let mut result_columns = Vec::new();
    for projection in &select.projection {
        match projection {
            Projection::Wildcard => {
                picks.extend(0..columns.len());
                result_columns.extend(columns.iter().cloned());
            }
            Projection::Column { name, alias } => {
                let index = names.position(table, columns, name)?;
                let mut column = columns[index].clone();
                if let Some(alias) = alias {
                    column.name = alias.clone();
                }
                picks.push(index);
                result_columns.push(column);
            }
            Projection::CountAll { .. } => {}
        }
    }

    let rows = rows
        .map(|row| picks.iter().map(|&i| row[i].clone()).collect())
        .collect();
    Ok(QueryResult {
        columns: result_columns,
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::statement::{OrderBy, TableRef};

    fn columns() -> Vec<Column> {
        vec![
            Column::new("Id", ColumnType::Integer),
            Column::new("Name", ColumnType::String),
        ]
    }

    fn rows() -> Vec<Row> {
        vec![
            vec![Value::Integer(2), Value::String("Bo".into())],
            vec![Value::Integer(1), Value::String("Ann".into())],
            vec![Value::Null, Value::String("Cy".into())],
        ]
    }

    fn select(projection: Vec<Projection>) -> SelectStatement {
        SelectStatement {
            from: TableRef::new("t"),
            projection,
            filter: None,
            order_by: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    #[test]
    fn test_projection_and_alias() {
        let s = select(vec![Projection::Column {
            name: "name".into(),
            alias: Some("who".into()),
        }]);
        let result = shape("t", &columns(), rows(), &s, NameComparer::new(false)).unwrap();
        assert_eq!(result.columns[0].name, "who");
        assert_eq!(result.get(1, "WHO"), Some(&Value::String("Ann".into())));
    }

    #[test]
    fn test_order_limit_offset() {
        let mut s = select(vec![Projection::Wildcard]);
        s.order_by = vec![OrderBy {
            column: "Id".into(),
            descending: true,
        }];
        s.limit = Some(2);
        let result = shape("t", &columns(), rows(), &s, NameComparer::new(false)).unwrap();
        let ids: Vec<_> = result.rows.iter().map(|r| r[0].clone()).collect();
        assert_eq!(ids, vec![Value::Integer(2), Value::Integer(1)]);

        s.offset = 2;
        let result = shape("t", &columns(), rows(), &s, NameComparer::new(false)).unwrap();
        assert_eq!(result.rows, vec![vec![Value::Null, Value::String("Cy".into())]]);
    }

    #[test]
    fn test_count_all() {
        let s = select(vec![Projection::CountAll { alias: None }]);
        let result = shape("t", &columns(), rows(), &s, NameComparer::new(false)).unwrap();
        assert_eq!(result.scalar(), Some(&Value::Integer(3)));

        let mixed = select(vec![
            Projection::CountAll { alias: None },
            Projection::Wildcard,
        ]);
        assert!(matches!(
            shape("t", &columns(), rows(), &mixed, NameComparer::new(false)),
            Err(FlatDbError::SqlNotSupported { .. })
        ));
    }

    #[test]
    fn test_unknown_column() {
        let s = select(vec![Projection::Column {
            name: "Salary".into(),
            alias: None,
        }]);
        assert!(matches!(
            shape("t", &columns(), rows(), &s, NameComparer::new(false)),
            Err(FlatDbError::ColumnNotFound { .. })
        ));
    }
}
