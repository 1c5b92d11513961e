//! sqlparser AST → [`Statement`] translation.
//!
//! Only the single-table subset is accepted; anything else is rejected with
//! `SqlNotSupported` and a hint, the same way the planner reports features it
//! does not handle.

use crate::error::{FlatDbError, FlatDbResult};
use crate::filter::{CompareOp, Filter, FilterToken, Operand};
use crate::sql::statement::{
    ColumnDef, DeleteStatement, InsertStatement, OrderBy, Projection, SelectStatement, Statement,
    TableRef, UpdateStatement, ValueExpr,
};
use crate::types::{ColumnType, Value};
use sqlparser::ast::{
    self as ast, AlterTableOperation, BinaryOperator, Expr as SqlExpr, FromTable, FunctionArg,
    FunctionArgExpr, FunctionArguments, ObjectName, ObjectType, SelectItem, SetExpr, TableFactor,
    TableWithJoins, UnaryOperator,
};

fn unsupported(feature: impl Into<String>, hint: &str) -> FlatDbError {
    FlatDbError::SqlNotSupported {
        feature: feature.into(),
        hint: hint.to_string(),
    }
}

/// Stateful per-batch translator; numbers positional `?` placeholders.
#[derive(Debug, Default)]
pub struct Translator {
    positional: usize,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement(&mut self, statement: &ast::Statement) -> FlatDbResult<Statement> {
        match statement {
            ast::Statement::Query(query) => self.query(query).map(Statement::Select),
            ast::Statement::Insert(insert) => self.insert(insert).map(Statement::Insert),
            ast::Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => {
                let table = self.relation(table)?;
                let assignments = assignments
                    .iter()
                    .map(|a| {
                        let column = a.target.to_string();
                        let column = column.trim_matches('"').to_string();
                        Ok((column, self.value_expr(&a.value)?))
                    })
                    .collect::<FlatDbResult<Vec<_>>>()?;
                let filter = selection.as_ref().map(|e| self.filter(e)).transpose()?;
                Ok(Statement::Update(UpdateStatement {
                    table,
                    assignments,
                    filter,
                }))
            }
            ast::Statement::Delete(delete) => {
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(t) => t,
                    FromTable::WithoutKeyword(t) => t,
                };
                let [relation] = tables.as_slice() else {
                    return Err(unsupported(
                        "DELETE from several tables",
                        "Delete from one table at a time",
                    ));
                };
                let table = self.relation(relation)?;
                let filter = delete
                    .selection
                    .as_ref()
                    .map(|e| self.filter(e))
                    .transpose()?;
                Ok(Statement::Delete(DeleteStatement { table, filter }))
            }
            ast::Statement::CreateTable(create) => Ok(Statement::CreateTable {
                table: table_ref(&create.name),
                columns: create
                    .columns
                    .iter()
                    .map(|c| ColumnDef {
                        name: c.name.value.clone(),
                        column_type: ColumnType::from_sql_type(&c.data_type.to_string()),
                    })
                    .collect(),
                if_not_exists: create.if_not_exists,
            }),
            ast::Statement::AlterTable {
                name, operations, ..
            } => {
                let table = table_ref(name);
                let [operation] = operations.as_slice() else {
                    return Err(unsupported(
                        "ALTER TABLE with several operations",
                        "Issue one ADD COLUMN or DROP COLUMN per statement",
                    ));
                };
                match operation {
                    AlterTableOperation::AddColumn { column_def, .. } => Ok(Statement::AddColumn {
                        table,
                        column: ColumnDef {
                            name: column_def.name.value.clone(),
                            column_type: ColumnType::from_sql_type(&column_def.data_type.to_string()),
                        },
                    }),
                    AlterTableOperation::DropColumn { column_name, .. } => {
                        Ok(Statement::DropColumn {
                            table,
                            column: column_name.value.clone(),
                        })
                    }
                    other => Err(unsupported(
                        format!("ALTER TABLE operation: {other}"),
                        "Only ADD COLUMN and DROP COLUMN are supported",
                    )),
                }
            }
            ast::Statement::Drop {
                object_type,
                if_exists,
                names,
                ..
            } => match (object_type, names.as_slice()) {
                (ObjectType::Table, [name]) => Ok(Statement::DropTable {
                    table: table_ref(name),
                    if_exists: *if_exists,
                }),
                (ObjectType::Table, _) => Err(unsupported(
                    "DROP TABLE with several tables",
                    "Drop one table per statement",
                )),
                (other, _) => Err(unsupported(
                    format!("DROP {other}"),
                    "Only DROP TABLE is supported",
                )),
            },
            ast::Statement::StartTransaction { .. } => Ok(Statement::Begin),
            ast::Statement::Commit { .. } => Ok(Statement::Commit),
            ast::Statement::Rollback { .. } => Ok(Statement::Rollback),
            other => Err(unsupported(
                format!("statement: {other}"),
                "Supported: SELECT, INSERT, UPDATE, DELETE, CREATE/ALTER/DROP TABLE, BEGIN/COMMIT/ROLLBACK",
            )),
        }
    }

    fn query(&mut self, query: &ast::Query) -> FlatDbResult<SelectStatement> {
        let select = match query.body.as_ref() {
            SetExpr::Select(select) => select,
            _ => {
                return Err(unsupported(
                    "Non-SELECT queries",
                    "Only plain SELECT queries are supported",
                ));
            }
        };
        let from = match select.from.as_slice() {
            [relation] => self.relation(relation)?,
            [] => {
                return Err(unsupported(
                    "SELECT without FROM",
                    "Name the table to read from",
                ));
            }
            _ => {
                return Err(unsupported(
                    "Multiple tables in FROM clause",
                    "Query one table at a time",
                ));
            }
        };

        let projection = select
            .projection
            .iter()
            .map(|item| self.projection(item))
            .collect::<FlatDbResult<Vec<_>>>()?;
        let filter = select
            .selection
            .as_ref()
            .map(|e| self.filter(e))
            .transpose()?;

        let order_by = match &query.order_by {
            Some(order_by) => order_by
                .exprs
                .iter()
                .map(|ob| {
                    Ok(OrderBy {
                        column: column_name(&ob.expr).ok_or_else(|| {
                            unsupported(
                                format!("ORDER BY {}", ob.expr),
                                "Order by column names only",
                            )
                        })?,
                        descending: ob.asc == Some(false),
                    })
                })
                .collect::<FlatDbResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        let limit = query.limit.as_ref().map(extract_usize).transpose()?;
        let offset = match &query.offset {
            Some(offset) => extract_usize(&offset.value)?,
            None => 0,
        };

        Ok(SelectStatement {
            from,
            projection,
            filter,
            order_by,
            limit,
            offset,
        })
    }

    fn projection(&mut self, item: &SelectItem) -> FlatDbResult<Projection> {
        let (expr, alias) = match item {
            SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..) => {
                return Ok(Projection::Wildcard);
            }
            SelectItem::UnnamedExpr(expr) => (expr, None),
            SelectItem::ExprWithAlias { expr, alias } => (expr, Some(alias.value.clone())),
        };
        if let Some(name) = column_name(expr) {
            return Ok(Projection::Column { name, alias });
        }
        if let SqlExpr::Function(func) = expr {
            if func.name.to_string().eq_ignore_ascii_case("COUNT") {
                return Ok(Projection::CountAll { alias });
            }
        }
        Err(unsupported(
            format!("SELECT expression: {expr}"),
            "Select column names, * or COUNT(*)",
        ))
    }

    fn insert(&mut self, insert: &ast::Insert) -> FlatDbResult<InsertStatement> {
        let table = table_ref(&insert.table_name);
        let columns = insert.columns.iter().map(|c| c.value.clone()).collect();
        let source = insert.source.as_ref().ok_or_else(|| {
            unsupported(
                "INSERT without VALUES",
                "INSERT INTO ... VALUES (...) is required",
            )
        })?;
        let rows = match source.body.as_ref() {
            SetExpr::Values(values) => values
                .rows
                .iter()
                .map(|row| row.iter().map(|e| self.value_expr(e)).collect())
                .collect::<FlatDbResult<Vec<Vec<ValueExpr>>>>()?,
            _ => {
                return Err(unsupported(
                    "INSERT with SELECT",
                    "Only INSERT INTO ... VALUES (...) is supported",
                ));
            }
        };
        Ok(InsertStatement {
            table,
            columns,
            rows,
        })
    }

    fn relation(&mut self, table: &TableWithJoins) -> FlatDbResult<TableRef> {
        if !table.joins.is_empty() {
            return Err(unsupported("JOIN", "Query one table at a time"));
        }
        match &table.relation {
            TableFactor::Table { name, .. } => Ok(table_ref(name)),
            other => Err(unsupported(
                format!("table expression: {other}"),
                "Use simple table names only",
            )),
        }
    }

    /// WHERE clause → filter tree.
    /// Flatten a WHERE expression into filter tokens and build the filter
    /// from them.
    pub fn filter(&mut self, expr: &SqlExpr) -> FlatDbResult<Filter> {
        let mut tokens = Vec::new();
        self.filter_tokens(expr, &mut tokens)?;
        Filter::from_tokens(&tokens)
    }

    fn filter_tokens(&mut self, expr: &SqlExpr, out: &mut Vec<FilterToken>) -> FlatDbResult<()> {
        match expr {
            SqlExpr::Nested(inner) => self.filter_tokens(inner, out),
            SqlExpr::BinaryOp {
                left,
                op: op @ (BinaryOperator::And | BinaryOperator::Or),
                right,
            } => {
                self.filter_side(left, out)?;
                out.push(match op {
                    BinaryOperator::And => FilterToken::And,
                    _ => FilterToken::Or,
                });
                self.filter_side(right, out)
            }
            SqlExpr::BinaryOp { left, op, right } => {
                let op = match op {
                    BinaryOperator::Eq => CompareOp::Eq,
                    BinaryOperator::NotEq => CompareOp::NotEq,
                    BinaryOperator::Lt => CompareOp::Lt,
                    BinaryOperator::LtEq => CompareOp::LtEq,
                    BinaryOperator::Gt => CompareOp::Gt,
                    BinaryOperator::GtEq => CompareOp::GtEq,
                    other => {
                        return Err(unsupported(
                            format!("operator {other}"),
                            "Use =, <>, <, <=, >, >= joined by AND/OR",
                        ));
                    }
                };
                out.push(FilterToken::Operand(self.operand(left)?));
                out.push(FilterToken::Comparator(op.as_str().to_string()));
                out.push(FilterToken::Operand(self.operand(right)?));
                Ok(())
            }
            other => Err(unsupported(
                format!("WHERE expression: {other}"),
                "Use comparisons joined by AND/OR",
            )),
        }
    }

    /// An AND/OR operand becomes a group so the token list keeps the
    /// parsed precedence.
    fn filter_side(&mut self, expr: &SqlExpr, out: &mut Vec<FilterToken>) -> FlatDbResult<()> {
        if is_logical(expr) {
            let mut group = Vec::new();
            self.filter_tokens(expr, &mut group)?;
            out.push(FilterToken::Group(group));
            Ok(())
        } else {
            self.filter_tokens(expr, out)
        }
    }

    fn operand(&mut self, expr: &SqlExpr) -> FlatDbResult<Operand> {
        match expr {
            SqlExpr::Nested(inner) => self.operand(inner),
            SqlExpr::Function(func) => {
                let args = match &func.args {
                    FunctionArguments::List(list) => list
                        .args
                        .iter()
                        .map(|arg| match arg {
                            FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                                match self.value_expr(e)? {
                                    ValueExpr::Literal(v) => Ok(v),
                                    ValueExpr::Parameter(p) => Err(unsupported(
                                        format!("parameter {p} as function argument"),
                                        "Pass literal arguments",
                                    )),
                                }
                            }
                            other => Err(unsupported(
                                format!("function argument {other}"),
                                "Pass literal arguments",
                            )),
                        })
                        .collect::<FlatDbResult<Vec<Value>>>()?,
                    _ => Vec::new(),
                };
                Ok(Operand::Function {
                    name: func.name.to_string(),
                    args,
                })
            }
            other => match column_name(other) {
                Some(name) if !name.starts_with('@') => Ok(Operand::Field(name)),
                _ => Ok(match self.value_expr(other)? {
                    ValueExpr::Literal(v) => Operand::Literal(v),
                    ValueExpr::Parameter(p) => Operand::Parameter(p),
                }),
            },
        }
    }

    fn value_expr(&mut self, expr: &SqlExpr) -> FlatDbResult<ValueExpr> {
        match expr {
            SqlExpr::Nested(inner) => self.value_expr(inner),
            SqlExpr::Identifier(ident) if ident.value.starts_with('@') => {
                Ok(ValueExpr::Parameter(ident.value.clone()))
            }
            SqlExpr::Value(value) => self.literal(value),
            SqlExpr::UnaryOp {
                op: UnaryOperator::Plus,
                expr,
            } => self.value_expr(expr),
            SqlExpr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match self.value_expr(expr)? {
                ValueExpr::Literal(Value::Integer(i)) => Ok(ValueExpr::Literal(Value::Integer(-i))),
                ValueExpr::Literal(Value::Decimal(d)) => Ok(ValueExpr::Literal(Value::Decimal(-d))),
                _ => Err(unsupported(
                    format!("expression: {expr}"),
                    "Only numbers can be negated",
                )),
            },
            other => Err(unsupported(
                format!("value expression: {other}"),
                "Use literals or parameters",
            )),
        }
    }

    fn literal(&mut self, value: &ast::Value) -> FlatDbResult<ValueExpr> {
        let literal = match value {
            ast::Value::Number(n, _) => {
                if let Ok(i) = n.parse::<i64>() {
                    Value::Integer(i)
                } else if let Ok(f) = n.parse::<f64>() {
                    Value::Decimal(f)
                } else {
                    return Err(FlatDbError::TypeMismatch {
                        expected: "number".to_string(),
                        actual: n.clone(),
                    });
                }
            }
            ast::Value::SingleQuotedString(s)
            | ast::Value::DoubleQuotedString(s)
            | ast::Value::NationalStringLiteral(s) => Value::String(s.clone()),
            ast::Value::Boolean(b) => Value::Boolean(*b),
            ast::Value::Null => Value::Null,
            ast::Value::Placeholder(p) if p == "?" => {
                self.positional += 1;
                return Ok(ValueExpr::Parameter(format!("?{}", self.positional)));
            }
            ast::Value::Placeholder(p) => return Ok(ValueExpr::Parameter(p.clone())),
            other => {
                return Err(unsupported(
                    format!("literal {other}"),
                    "Use numbers, strings, TRUE/FALSE or NULL",
                ));
            }
        };
        Ok(ValueExpr::Literal(literal))
    }
}

fn table_ref(name: &ObjectName) -> TableRef {
    let idents = &name.0;
    match idents.as_slice() {
        [] => TableRef::new(String::new()),
        [only] => TableRef::new(only.value.clone()),
        [.., schema, table] => TableRef {
            schema: Some(schema.value.clone()),
            name: table.value.clone(),
        },
    }
}

fn is_logical(expr: &SqlExpr) -> bool {
    match expr {
        SqlExpr::Nested(inner) => is_logical(inner),
        SqlExpr::BinaryOp {
            op: BinaryOperator::And | BinaryOperator::Or,
            ..
        } => true,
        _ => false,
    }
}

/// Column named by a plain or qualified identifier.
fn column_name(expr: &SqlExpr) -> Option<String> {
    match expr {
        SqlExpr::Identifier(ident) => Some(ident.value.clone()),
        SqlExpr::CompoundIdentifier(idents) => idents.last().map(|i| i.value.clone()),
        SqlExpr::Nested(inner) => column_name(inner),
        _ => None,
    }
}

fn extract_usize(expr: &SqlExpr) -> FlatDbResult<usize> {
    match expr {
        SqlExpr::Value(ast::Value::Number(n, _)) => {
            n.parse::<usize>().map_err(|_| FlatDbError::TypeMismatch {
                expected: "non-negative integer".to_string(),
                actual: n.clone(),
            })
        }
        other => Err(unsupported(
            format!("LIMIT/OFFSET expression: {other}"),
            "Use a literal row count",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::SqlParser;

    fn select(sql: &str) -> SelectStatement {
        match SqlParser::new().parse_one(sql).unwrap() {
            Statement::Select(s) => s,
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_positional_placeholders_are_numbered() {
        let s = select("SELECT * FROM t WHERE A = ? AND B = ?");
        assert_eq!(
            s.filter.unwrap().fields(),
            vec!["A", "B"],
        );
        let stmt = SqlParser::new()
            .parse_one("INSERT INTO t (A, B) VALUES (?, ?)")
            .unwrap();
        match stmt {
            Statement::Insert(i) => assert_eq!(
                i.rows[0],
                vec![
                    ValueExpr::Parameter("?1".into()),
                    ValueExpr::Parameter("?2".into())
                ]
            ),
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn test_literal_on_left() {
        let s = select("SELECT * FROM t WHERE 30 < Age");
        assert_eq!(
            s.filter,
            Some(Filter::compare(
                Operand::literal(30i64),
                CompareOp::Lt,
                Operand::field("Age")
            ))
        );
    }

    #[test]
    fn test_where_precedence_survives_tokenizing() {
        let params = crate::sql::Parameters::new();
        let grouped = select("SELECT * FROM t WHERE (A = 1 OR B = 2) AND C = 3");
        assert_eq!(
            grouped.filter.unwrap().evaluate(&params).unwrap(),
            "(A = 1 OR B = 2) AND C = 3"
        );

        let plain = select("SELECT * FROM t WHERE A = 1 OR B = 2 AND C <> 3");
        let filter = plain.filter.unwrap();
        assert!(matches!(filter, Filter::OrElse(..)));
        assert_eq!(
            filter.evaluate(&params).unwrap(),
            "A = 1 OR (B = 2 AND C <> 3)"
        );

        let nested = select("SELECT * FROM t WHERE A = 1 AND (B = 2 OR (C = 3 AND D = 4))");
        assert_eq!(
            nested.filter.unwrap().evaluate(&params).unwrap(),
            "A = 1 AND (B = 2 OR (C = 3 AND D = 4))"
        );
    }

    #[test]
    fn test_catalog_reference() {
        let s = select("SELECT TABLE_NAME FROM INFORMATION_SCHEMA.TABLES");
        assert_eq!(s.from.schema.as_deref(), Some("INFORMATION_SCHEMA"));
        assert_eq!(s.from.name, "TABLES");
    }

    #[test]
    fn test_count_projection() {
        let s = select("SELECT COUNT(*) AS n FROM t");
        assert_eq!(
            s.projection,
            vec![Projection::CountAll {
                alias: Some("n".into())
            }]
        );
    }

    #[test]
    fn test_update_assignments() {
        let stmt = SqlParser::new()
            .parse_one("UPDATE Employees SET Salary = 60000, Name = @n WHERE Id = 2")
            .unwrap();
        match stmt {
            Statement::Update(u) => {
                assert_eq!(u.table.name, "Employees");
                assert_eq!(u.assignments[0].0, "Salary");
                assert_eq!(u.assignments[1].1, ValueExpr::Parameter("@n".into()));
                assert!(u.filter.is_some());
            }
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_where_shapes() {
        let err = SqlParser::new()
            .parse("SELECT * FROM t WHERE Name LIKE 'A%'")
            .unwrap_err();
        assert!(matches!(err, FlatDbError::SqlNotSupported { .. }));
    }
}
