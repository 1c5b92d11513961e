use crate::error::{FlatDbError, FlatDbResult};
use crate::sql::statement::Statement;
use crate::sql::translate::Translator;
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// SQL parser: sqlparser-rs front end producing [`Statement`]s.
pub struct SqlParser {
    dialect: GenericDialect,
}

impl SqlParser {
    pub fn new() -> Self {
        Self {
            dialect: GenericDialect {},
        }
    }

    /// Parse a SQL string into its AST.
    pub fn parse_ast(&self, sql: &str) -> FlatDbResult<Vec<sqlparser::ast::Statement>> {
        Parser::parse_sql(&self.dialect, sql).map_err(|e| FlatDbError::SqlParse {
            message: e.to_string(),
            sql: sql.to_string(),
        })
    }

    /// Parse and translate every statement in `sql`.
    pub fn parse(&self, sql: &str) -> FlatDbResult<Vec<Statement>> {
        let ast = self.parse_ast(sql)?;
        let mut translator = Translator::new();
        ast.iter().map(|s| translator.statement(s)).collect()
    }

    /// Parse exactly one statement.
    pub fn parse_one(&self, sql: &str) -> FlatDbResult<Statement> {
        let mut statements = self.parse(sql)?;
        if statements.len() != 1 {
            return Err(FlatDbError::SqlParse {
                message: format!("expected one statement, found {}", statements.len()),
                sql: sql.to_string(),
            });
        }
        Ok(statements.remove(0))
    }
}

impl Default for SqlParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{CompareOp, Filter, Operand};
    use crate::sql::statement::{Projection, ValueExpr};
    use crate::sql::Parameters;
    use crate::types::{ColumnType, Value};

    fn parse(sql: &str) -> Statement {
        SqlParser::new().parse_one(sql).unwrap()
    }

    #[test]
    fn test_parse_simple_select() {
        match parse("SELECT * FROM users") {
            Statement::Select(select) => {
                assert_eq!(select.from.name, "users");
                assert_eq!(select.projection, vec![Projection::Wildcard]);
                assert!(select.filter.is_none());
            }
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_select_with_where() {
        match parse("SELECT Id, Name AS n FROM users WHERE Salary > 40000 ORDER BY Id DESC LIMIT 5") {
            Statement::Select(select) => {
                assert_eq!(select.projection.len(), 2);
                assert_eq!(
                    select.projection[1],
                    Projection::Column {
                        name: "Name".into(),
                        alias: Some("n".into())
                    }
                );
                assert_eq!(
                    select.filter,
                    Some(Filter::compare(
                        Operand::field("Salary"),
                        CompareOp::Gt,
                        Operand::literal(40000i64)
                    ))
                );
                assert!(select.order_by[0].descending);
                assert_eq!(select.limit, Some(5));
            }
            other => panic!("expected select, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_insert() {
        match parse("INSERT INTO users (id, name) VALUES (1, 'Alice'), (@id, -2.5)") {
            Statement::Insert(insert) => {
                assert_eq!(insert.table.name, "users");
                assert_eq!(insert.columns, vec!["id", "name"]);
                assert_eq!(insert.rows.len(), 2);
                assert_eq!(insert.rows[0][1], ValueExpr::Literal(Value::String("Alice".into())));
                assert_eq!(insert.rows[1][0], ValueExpr::Parameter("@id".into()));
                assert_eq!(insert.rows[1][1], ValueExpr::Literal(Value::Decimal(-2.5)));
            }
            other => panic!("expected insert, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_where_precedence() {
        let select = match parse("SELECT * FROM t WHERE A = 1 OR B = 2 AND C = 3") {
            Statement::Select(s) => s,
            other => panic!("expected select, got {other:?}"),
        };
        let text = select.filter.unwrap().evaluate(&Parameters::new()).unwrap();
        assert_eq!(text, "A = 1 OR (B = 2 AND C = 3)");

        let select = match parse("SELECT * FROM t WHERE (A = 1 OR B = 2) AND C = 3") {
            Statement::Select(s) => s,
            other => panic!("expected select, got {other:?}"),
        };
        let text = select.filter.unwrap().evaluate(&Parameters::new()).unwrap();
        assert_eq!(text, "(A = 1 OR B = 2) AND C = 3");
    }

    #[test]
    fn test_parse_function_filter() {
        let select = match parse("SELECT Id FROM t WHERE changes() = 1 AND Id = last_insert_rowid()") {
            Statement::Select(s) => s,
            other => panic!("expected select, got {other:?}"),
        };
        assert!(select.filter.unwrap().has_function());
    }

    #[test]
    fn test_parse_ddl() {
        match parse("CREATE TABLE t (Id INT, Name VARCHAR(20), Price DECIMAL(10,2))") {
            Statement::CreateTable { table, columns, .. } => {
                assert_eq!(table.name, "t");
                let types: Vec<ColumnType> = columns.iter().map(|c| c.column_type).collect();
                assert_eq!(
                    types,
                    vec![ColumnType::Integer, ColumnType::String, ColumnType::Decimal]
                );
            }
            other => panic!("expected create, got {other:?}"),
        }
        assert!(matches!(
            parse("ALTER TABLE t ADD COLUMN Age INT"),
            Statement::AddColumn { .. }
        ));
        assert!(matches!(
            parse("ALTER TABLE t DROP COLUMN Age"),
            Statement::DropColumn { .. }
        ));
        assert!(matches!(
            parse("DROP TABLE IF EXISTS t"),
            Statement::DropTable { if_exists: true, .. }
        ));
    }

    #[test]
    fn test_parse_transaction_control() {
        assert_eq!(parse("BEGIN TRANSACTION"), Statement::Begin);
        assert_eq!(parse("COMMIT"), Statement::Commit);
        assert_eq!(parse("ROLLBACK"), Statement::Rollback);
    }

    #[test]
    fn test_parse_error() {
        let err = SqlParser::new().parse("SELECT * FORM users").unwrap_err();
        assert!(matches!(err, FlatDbError::SqlParse { .. }));
    }

    #[test]
    fn test_unsupported_join() {
        let err = SqlParser::new()
            .parse("SELECT * FROM a JOIN b ON a.x = b.x")
            .unwrap_err();
        assert!(matches!(err, FlatDbError::SqlNotSupported { .. }));
    }
}
