//! SQL Execution Pipeline: statement dispatch

use crate::cache::ReadOutcome;
use crate::engine::Database;
use crate::engine::database::SessionState;
use crate::error::{FlatDbError, FlatDbResult};
use crate::sql::{Parameters, QueryResult, Statement, StatementResult};
use crate::transaction::ScopedRow;
use crate::writer::{BoundOp, Writer};
use tracing::{debug, instrument};

/// Result of one statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Rows(QueryResult),
    Done(StatementResult),
}

impl Database {
    /// Execute every statement in `sql`, returning the last result.
    ///
    /// For a SELECT the affected count is the number of rows returned.
    pub fn execute(&self, sql: &str) -> FlatDbResult<StatementResult> {
        self.execute_with_params(sql, &Parameters::new())
    }

    #[instrument(skip(self, params), fields(format = self.format.name()))]
    pub fn execute_with_params(
        &self,
        sql: &str,
        params: &Parameters,
    ) -> FlatDbResult<StatementResult> {
        let mut last = StatementResult::default();
        for outcome in self.run_batch(sql, params)? {
            last = match outcome {
                Outcome::Done(result) => result,
                Outcome::Rows(rows) => StatementResult {
                    affected_rows: rows.len(),
                    last_identity: None,
                },
            };
        }
        Ok(last)
    }

    /// Rows of the last SELECT in `sql`.
    pub fn query(&self, sql: &str) -> FlatDbResult<QueryResult> {
        self.query_with_params(sql, &Parameters::new())
    }

    #[instrument(skip(self, params), fields(format = self.format.name()))]
    pub fn query_with_params(&self, sql: &str, params: &Parameters) -> FlatDbResult<QueryResult> {
        let mut rows = None;
        for outcome in self.run_batch(sql, params)? {
            if let Outcome::Rows(result) = outcome {
                rows = Some(result);
            }
        }
        rows.ok_or_else(|| FlatDbError::SqlNotSupported {
            feature: "query without a SELECT".to_string(),
            hint: "use execute() for statements that return no rows".to_string(),
        })
    }

    /// Parse `sql` and run each statement in order, stopping at the first
    /// error.
    pub fn run_batch(&self, sql: &str, params: &Parameters) -> FlatDbResult<Vec<Outcome>> {
        let statements = self.sql_parser.parse(sql)?;
        statements
            .iter()
            .map(|statement| self.run(statement, params))
            .collect()
    }

    /// Run one parsed statement.
    pub fn run(&self, statement: &Statement, params: &Parameters) -> FlatDbResult<Outcome> {
        let mut session = self.session.lock();
        match statement {
            Statement::Begin => {
                self.begin_locked(&mut session)?;
                Ok(Outcome::Done(StatementResult::default()))
            }
            Statement::Commit => Ok(Outcome::Done(self.commit_locked(&mut session)?)),
            Statement::Rollback => {
                self.rollback_locked(&mut session)?;
                Ok(Outcome::Done(StatementResult::default()))
            }
            Statement::Select(select) => {
                let predicate = select
                    .filter
                    .as_ref()
                    .map(|f| f.predicate(params, &session.previous, self.functions.as_ref()))
                    .transpose()?;
                let key = self.names.key(&select.from.name);
                let scoped: &[ScopedRow] = match (&session.transaction, select.from.catalog()) {
                    (Some(transaction), None) => transaction.scoped(&key),
                    _ => &[],
                };
                let _shared = self.lock.read();
                let mut cache = self.cache.lock();
                match cache.read(
                    statement,
                    predicate.as_deref(),
                    self.matcher.as_ref(),
                    scoped,
                )? {
                    ReadOutcome::Rows(rows) => {
                        debug!(table = %select.from.name, rows = rows.len(), "query answered");
                        Ok(Outcome::Rows(rows))
                    }
                    ReadOutcome::Live(_) => Err(FlatDbError::SqlNotSupported {
                        feature: "SELECT without result rows".to_string(),
                        hint: "report this as a bug".to_string(),
                    }),
                }
            }
            Statement::Insert(_)
            | Statement::Update(_)
            | Statement::Delete(_)
            | Statement::CreateTable { .. }
            | Statement::AddColumn { .. }
            | Statement::DropColumn { .. }
            | Statement::DropTable { .. } => {
                let result = self.write(&mut session, statement, params)?;
                Ok(Outcome::Done(result))
            }
        }
    }

    fn write(
        &self,
        session: &mut SessionState,
        statement: &Statement,
        params: &Parameters,
    ) -> FlatDbResult<StatementResult> {
        let op = BoundOp::bind(statement, params, &session.previous, self.functions.as_ref())?;
        let mut writer = Writer::new(op);
        let ctx = self.write_context();
        let result = match session.transaction.as_mut() {
            Some(transaction) => writer.stage(&ctx, transaction)?,
            None => writer.execute(&ctx)?,
        };
        session.previous = StatementResult {
            affected_rows: result.affected_rows,
            last_identity: result
                .last_identity
                .clone()
                .or_else(|| session.previous.last_identity.take()),
        };
        Ok(result)
    }
}
