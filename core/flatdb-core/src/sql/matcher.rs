//! Row matching for rendered predicate text.
//!
//! The grammar is the one [`Filter::evaluate`](crate::filter::Filter::evaluate)
//! produces:
//!
//! ```text
//! or      := and ("OR" and)*
//! and     := primary ("AND" primary)*
//! primary := "(" or ")" | operand op operand
//! operand := identifier | [bracketed identifier] | 'text' | number
//!          | TRUE | FALSE | NULL
//! op      := = | <> | != | < | <= | > | >=
//! ```
//!
//! Comparisons involving NULL are never true.

use crate::error::{FlatDbError, FlatDbResult};
use crate::filter::CompareOp;
use crate::types::{Column, NameComparer, Row, Value};
use std::cmp::Ordering;

/// A compiled predicate.
pub trait RowPredicate: Send + Sync {
    fn matches(&self, row: &Row) -> bool;
}

/// Compiles predicate text against a table's columns.
pub trait RowMatcher: Send + Sync {
    fn compile(
        &self,
        predicate: &str,
        table: &str,
        columns: &[Column],
        names: NameComparer,
    ) -> FlatDbResult<Box<dyn RowPredicate>>;
}

/// Default matcher implementing the grammar above.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredicateMatcher;

impl RowMatcher for PredicateMatcher {
    fn compile(
        &self,
        predicate: &str,
        table: &str,
        columns: &[Column],
        names: NameComparer,
    ) -> FlatDbResult<Box<dyn RowPredicate>> {
        let tokens = tokenize(predicate)?;
        let mut parser = PredicateParser {
            predicate,
            tokens,
            pos: 0,
            table,
            columns,
            names,
        };
        let expr = parser.or_expr()?;
        if parser.pos != parser.tokens.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Box::new(expr))
    }
}

/// Always-true predicate used when a statement has no filter.
pub struct MatchAll;

impl RowPredicate for MatchAll {
    fn matches(&self, _row: &Row) -> bool {
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(Value),
    Op(CompareOp),
    And,
    Or,
    Open,
    Close,
}

fn tokenize(text: &str) -> FlatDbResult<Vec<Token>> {
    let err = |message: &str| FlatDbError::Predicate {
        predicate: text.to_string(),
        message: message.to_string(),
    };
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '\'' => {
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err("unterminated string literal")),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            s.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Literal(Value::String(s)));
            }
            '[' | '"' => {
                let close = if c == '[' { ']' } else { '"' };
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(err("unterminated identifier")),
                        Some(&ch) if ch == close && chars.get(i + 1) == Some(&close) => {
                            s.push(close);
                            i += 2;
                        }
                        Some(&ch) if ch == close => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                tokens.push(Token::Ident(s));
            }
            '=' | '<' | '>' | '!' => {
                let two: String = chars[i..chars.len().min(i + 2)].iter().collect();
                let (op, len) = match two.as_str() {
                    "<=" | ">=" | "<>" | "!=" | "==" => (CompareOp::parse(&two)?, 2),
                    _ if c == '!' => return Err(err("expected != operator")),
                    _ => (CompareOp::parse(&c.to_string())?, 1),
                };
                tokens.push(Token::Op(op));
                i += len;
            }
            c if c.is_ascii_digit()
                || ((c == '-' || c == '.')
                    && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit() || *n == '.')) =>
            {
                let start = i;
                i += 1;
                while chars
                    .get(i)
                    .is_some_and(|n| n.is_ascii_digit() || matches!(n, '.' | 'e' | 'E'))
                {
                    i += 1;
                }
                let text_num: String = chars[start..i].iter().collect();
                let value = if let Ok(n) = text_num.parse::<i64>() {
                    Value::Integer(n)
                } else {
                    text_num
                        .parse::<f64>()
                        .map(Value::Decimal)
                        .map_err(|_| err("invalid number"))?
                };
                tokens.push(Token::Literal(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while chars
                    .get(i)
                    .is_some_and(|n| n.is_alphanumeric() || *n == '_' || *n == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                let token = match word.to_ascii_uppercase().as_str() {
                    "AND" => Token::And,
                    "OR" => Token::Or,
                    "TRUE" => Token::Literal(Value::Boolean(true)),
                    "FALSE" => Token::Literal(Value::Boolean(false)),
                    "NULL" => Token::Literal(Value::Null),
                    // qualified names resolve on their last part
                    _ => Token::Ident(word.rsplit('.').next().unwrap_or(&word).to_string()),
                };
                tokens.push(token);
            }
            _ => return Err(err(&format!("unexpected character '{c}'"))),
        }
    }
    Ok(tokens)
}

enum Side {
    Column(usize),
    Literal(Value),
}

impl Side {
    fn value<'a>(&'a self, row: &'a Row) -> &'a Value {
        match self {
            Side::Column(i) => row.get(*i).unwrap_or(&Value::Null),
            Side::Literal(v) => v,
        }
    }
}

enum Expr {
    Compare(Side, CompareOp, Side),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

impl RowPredicate for Expr {
    fn matches(&self, row: &Row) -> bool {
        match self {
            Expr::Compare(l, op, r) => {
                let ordering = l.value(row).compare(r.value(row));
                match (op, ordering) {
                    (_, None) => false,
                    (CompareOp::Eq, Some(o)) => o == Ordering::Equal,
                    (CompareOp::NotEq, Some(o)) => o != Ordering::Equal,
                    (CompareOp::Lt, Some(o)) => o == Ordering::Less,
                    (CompareOp::LtEq, Some(o)) => o != Ordering::Greater,
                    (CompareOp::Gt, Some(o)) => o == Ordering::Greater,
                    (CompareOp::GtEq, Some(o)) => o != Ordering::Less,
                }
            }
            Expr::And(l, r) => l.matches(row) && r.matches(row),
            Expr::Or(l, r) => l.matches(row) || r.matches(row),
        }
    }
}

struct PredicateParser<'a> {
    predicate: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    table: &'a str,
    columns: &'a [Column],
    names: NameComparer,
}

impl PredicateParser<'_> {
    fn error(&self, message: &str) -> FlatDbError {
        FlatDbError::Predicate {
            predicate: self.predicate.to_string(),
            message: format!("{message} at token {}", self.pos),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or_expr(&mut self) -> FlatDbResult<Expr> {
        let mut expr = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            expr = Expr::Or(Box::new(expr), Box::new(self.and_expr()?));
        }
        Ok(expr)
    }

    fn and_expr(&mut self) -> FlatDbResult<Expr> {
        let mut expr = self.primary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            expr = Expr::And(Box::new(expr), Box::new(self.primary()?));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> FlatDbResult<Expr> {
        if self.peek() == Some(&Token::Open) {
            self.pos += 1;
            let expr = self.or_expr()?;
            if self.next() != Some(Token::Close) {
                return Err(self.error("expected ')'"));
            }
            return Ok(expr);
        }
        let left = self.side()?;
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            _ => return Err(self.error("expected comparison operator")),
        };
        let right = self.side()?;
        Ok(Expr::Compare(left, op, right))
    }

    fn side(&mut self) -> FlatDbResult<Side> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(Side::Column(self.names.position(
                self.table,
                self.columns,
                &name,
            )?)),
            Some(Token::Literal(value)) => Ok(Side::Literal(value)),
            _ => Err(self.error("expected column or literal")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ColumnType;

    fn columns() -> Vec<Column> {
        vec![
            Column::new("Id", ColumnType::Integer),
            Column::new("Name", ColumnType::String),
            Column::new("Salary", ColumnType::Decimal),
        ]
    }

    fn rows() -> Vec<Row> {
        vec![
            vec![
                Value::Integer(1),
                Value::String("Ann".into()),
                Value::Decimal(50000.0),
            ],
            vec![
                Value::Integer(2),
                Value::String("O'Hara".into()),
                Value::Decimal(40000.0),
            ],
            vec![Value::Integer(3), Value::Null, Value::Null],
        ]
    }

    fn matching(predicate: &str) -> Vec<i64> {
        let p = PredicateMatcher
            .compile(predicate, "t", &columns(), NameComparer::new(false))
            .unwrap();
        rows()
            .iter()
            .filter(|r| p.matches(r))
            .map(|r| match r[0] {
                Value::Integer(i) => i,
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(matching("Salary > 40000"), vec![1]);
        assert_eq!(matching("Salary >= 40000"), vec![1, 2]);
        assert_eq!(matching("Id <> 2"), vec![1, 3]);
        assert_eq!(matching("Name = 'O''Hara'"), vec![2]);
        assert_eq!(matching("name = 'Ann'"), vec![1]);
    }

    #[test]
    fn test_null_never_matches() {
        assert_eq!(matching("Name = NULL"), Vec::<i64>::new());
        assert_eq!(matching("Salary < 100000"), vec![1, 2]);
    }

    #[test]
    fn test_precedence_and_groups() {
        assert_eq!(matching("Id = 1 OR Id = 2 AND Salary > 45000"), vec![1]);
        assert_eq!(matching("(Id = 1 OR Id = 2) AND Salary < 45000"), vec![2]);
    }

    #[test]
    fn test_literal_only_comparisons() {
        assert_eq!(matching("1 = 1 AND Id = 3"), vec![3]);
        assert_eq!(matching("0 = 1 AND Id = 3"), Vec::<i64>::new());
    }

    #[test]
    fn test_bracketed_and_negative() {
        assert_eq!(matching("[Id] > -1 AND [Id] < 2"), vec![1]);
    }

    #[test]
    fn test_errors() {
        let m = PredicateMatcher;
        let cols = columns();
        let names = NameComparer::new(false);
        assert!(matches!(
            m.compile("Missing = 1", "t", &cols, names),
            Err(FlatDbError::ColumnNotFound { .. })
        ));
        assert!(matches!(
            m.compile("Id = ", "t", &cols, names),
            Err(FlatDbError::Predicate { .. })
        ));
        assert!(matches!(
            m.compile("Name = 'open", "t", &cols, names),
            Err(FlatDbError::Predicate { .. })
        ));
    }
}
