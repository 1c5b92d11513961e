//! Composable row filters.
//!
//! A [`Filter`] is a tree of comparisons joined by AND/OR. Operands may be
//! column references, literals, named parameters, or scalar function calls
//! such as `last_insert_rowid()`. Function calls must be replaced by values
//! ([`Filter::resolve`]) before the filter is rendered into predicate text
//! ([`Filter::evaluate`]) for the row matcher.
//!
//! `AndAlso`/`OrElse` are the grouped forms: their right-hand side is itself
//! compound and is rendered in parentheses.

use crate::error::{FlatDbError, FlatDbResult};
use crate::sql::{Parameters, StatementResult};
use crate::types::Value;
use std::fmt;

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    pub fn parse(text: &str) -> FlatDbResult<Self> {
        Ok(match text.trim() {
            "=" | "==" => CompareOp::Eq,
            "!=" | "<>" => CompareOp::NotEq,
            "<" => CompareOp::Lt,
            "<=" => CompareOp::LtEq,
            ">" => CompareOp::Gt,
            ">=" => CompareOp::GtEq,
            other => {
                return Err(FlatDbError::Predicate {
                    predicate: other.to_string(),
                    message: "unknown comparison operator".to_string(),
                });
            }
        })
    }

    /// Text used in rendered predicates.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Field(String),
    Literal(Value),
    /// Named placeholder (`@p0`, `:name`, `?1`)
    Parameter(String),
    /// Scalar function call awaiting resolution
    Function { name: String, args: Vec<Value> },
}

impl Operand {
    pub fn field(name: impl Into<String>) -> Self {
        Operand::Field(name.into())
    }

    pub fn literal(value: impl Into<Value>) -> Self {
        Operand::Literal(value.into())
    }

    pub fn function(name: impl Into<String>) -> Self {
        Operand::Function {
            name: name.into(),
            args: Vec::new(),
        }
    }

    fn render(&self, params: &Parameters) -> FlatDbResult<String> {
        match self {
            Operand::Field(name) => Ok(render_identifier(name)),
            Operand::Literal(value) => Ok(value.to_sql_literal()),
            Operand::Parameter(name) => params
                .get(name)
                .map(Value::to_sql_literal)
                .ok_or_else(|| FlatDbError::MustDeclareScalar(name.clone())),
            Operand::Function { name, .. } => Err(FlatDbError::UnresolvedFunction(name.clone())),
        }
    }
}

/// Bare identifiers stay bare; anything else is bracketed.
fn render_identifier(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if simple {
        name.to_string()
    } else {
        format!("[{}]", name.replace(']', "]]"))
    }
}

/// Filter tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Compare {
        left: Operand,
        op: CompareOp,
        right: Operand,
    },
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    /// AND whose right side is a parenthesized group
    AndAlso(Box<Filter>, Box<Filter>),
    /// OR whose right side is a parenthesized group
    OrElse(Box<Filter>, Box<Filter>),
}

/// Flat token form of a filter, as produced by a WHERE-clause walker.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterToken {
    Operand(Operand),
    Comparator(String),
    And,
    Or,
    Group(Vec<FilterToken>),
}

/// Supplies values for scalar function calls.
pub trait FunctionEvaluator: Send + Sync {
    fn evaluate(
        &self,
        name: &str,
        args: &[Value],
        previous: &StatementResult,
    ) -> FlatDbResult<Value>;
}

impl Filter {
    pub fn compare(left: Operand, op: CompareOp, right: Operand) -> Self {
        Filter::Compare { left, op, right }
    }

    /// Join two filters; a compound right side selects the grouped form.
    pub fn and(self, right: Filter) -> Self {
        if right.is_compound() {
            Filter::AndAlso(Box::new(self), Box::new(right))
        } else {
            Filter::And(Box::new(self), Box::new(right))
        }
    }

    pub fn or(self, right: Filter) -> Self {
        if right.is_compound() {
            Filter::OrElse(Box::new(self), Box::new(right))
        } else {
            Filter::Or(Box::new(self), Box::new(right))
        }
    }

    pub fn is_compound(&self) -> bool {
        !matches!(self, Filter::Compare { .. })
    }

    /// Build a filter from tokens.
    ///
    /// The token list is read as `operand comparator operand` followed by an
    /// optional `AND`/`OR` and the rest of the list, which becomes the right
    /// side. A `Group` token stands for a whole parenthesized sub-filter.
    pub fn from_tokens(tokens: &[FilterToken]) -> FlatDbResult<Filter> {
        let (left, rest) = Self::leading_term(tokens)?;
        match rest {
            [] => Ok(left),
            [FilterToken::And, tail @ ..] => Ok(left.and(Self::from_tokens(tail)?)),
            [FilterToken::Or, tail @ ..] => Ok(left.or(Self::from_tokens(tail)?)),
            [other, ..] => Err(token_error(format!("expected AND/OR, found {other:?}"))),
        }
    }

    fn leading_term(tokens: &[FilterToken]) -> FlatDbResult<(Filter, &[FilterToken])> {
        match tokens {
            [FilterToken::Group(inner), rest @ ..] => Ok((Self::from_tokens(inner)?, rest)),
            [
                FilterToken::Operand(left),
                FilterToken::Comparator(op),
                FilterToken::Operand(right),
                rest @ ..,
            ] => Ok((
                Filter::compare(left.clone(), CompareOp::parse(op)?, right.clone()),
                rest,
            )),
            [] => Err(token_error("empty filter".to_string())),
            other => Err(token_error(format!(
                "expected operand comparator operand, found {:?}",
                other.first()
            ))),
        }
    }

    /// Whether any operand in the tree is an unresolved function call.
    pub fn has_function(&self) -> bool {
        self.first_function().is_some()
    }

    fn first_function(&self) -> Option<&str> {
        match self {
            Filter::Compare { left, right, .. } => [left, right].into_iter().find_map(|o| match o {
                Operand::Function { name, .. } => Some(name.as_str()),
                _ => None,
            }),
            Filter::And(l, r) | Filter::Or(l, r) | Filter::AndAlso(l, r) | Filter::OrElse(l, r) => {
                l.first_function().or_else(|| r.first_function())
            }
        }
    }

    /// Replace every function operand by its value.
    pub fn resolve(
        &mut self,
        previous: &StatementResult,
        functions: &dyn FunctionEvaluator,
    ) -> FlatDbResult<()> {
        match self {
            Filter::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Function { name, args } = operand {
                        let value = functions.evaluate(name, args, previous)?;
                        *operand = Operand::Literal(value);
                    }
                }
                Ok(())
            }
            Filter::And(l, r) | Filter::Or(l, r) | Filter::AndAlso(l, r) | Filter::OrElse(l, r) => {
                l.resolve(previous, functions)?;
                r.resolve(previous, functions)
            }
        }
    }

    /// Render predicate text, substituting parameter values.
    pub fn evaluate(&self, params: &Parameters) -> FlatDbResult<String> {
        if let Some(name) = self.first_function() {
            return Err(FlatDbError::UnresolvedFunction(name.to_string()));
        }
        self.render(params)
    }

    /// Resolve a copy of the filter and render it.
    pub fn predicate(
        &self,
        params: &Parameters,
        previous: &StatementResult,
        functions: &dyn FunctionEvaluator,
    ) -> FlatDbResult<String> {
        let mut resolved = self.clone();
        if resolved.has_function() {
            resolved.resolve(previous, functions)?;
        }
        resolved.evaluate(params)
    }

    fn render(&self, params: &Parameters) -> FlatDbResult<String> {
        match self {
            Filter::Compare { left, op, right } => Ok(format!(
                "{} {} {}",
                left.render(params)?,
                op,
                right.render(params)?
            )),
            Filter::And(l, r) | Filter::AndAlso(l, r) => {
                Ok(format!("{} AND {}", l.render_side(params)?, r.render_side(params)?))
            }
            Filter::Or(l, r) | Filter::OrElse(l, r) => {
                Ok(format!("{} OR {}", l.render_side(params)?, r.render_side(params)?))
            }
        }
    }

    fn render_side(&self, params: &Parameters) -> FlatDbResult<String> {
        let text = self.render(params)?;
        Ok(if self.is_compound() {
            format!("({text})")
        } else {
            text
        })
    }

    /// Column names referenced by the filter.
    pub fn fields(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Filter::Compare { left, right, .. } => {
                for operand in [left, right] {
                    if let Operand::Field(name) = operand {
                        out.push(name);
                    }
                }
            }
            Filter::And(l, r) | Filter::Or(l, r) | Filter::AndAlso(l, r) | Filter::OrElse(l, r) => {
                l.collect_fields(out);
                r.collect_fields(out);
            }
        }
    }
}

fn token_error(message: String) -> FlatDbError {
    FlatDbError::Predicate {
        predicate: String::new(),
        message,
    }
}
