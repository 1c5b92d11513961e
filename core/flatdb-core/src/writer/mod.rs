//! Writers: one per mutating statement.
//!
//! A [`Writer`] carries a [`BoundOp`]: the statement with parameters bound and
//! scalar functions resolved into predicate text, so it can run later (at
//! commit) without the session state it was created from.
//!
//! Outside a transaction a writer runs immediately under the exclusive
//! family lock with the provider's watcher suspended, and flushes the whole
//! database before the lock is released. Inside a transaction it is staged:
//! the affected count is computed against the transaction's overlay and the
//! writer is queued until commit.

pub mod apply;
pub mod identity;

use crate::cache::{TableCache, compile};
use crate::error::{FlatDbError, FlatDbResult};
use crate::filter::FunctionEvaluator;
use crate::format::{SaveOptions, TableFormat};
use crate::provider::{SourceProvider, WatchSuspension};
use crate::sql::{Parameters, RowMatcher, Statement, StatementResult, ValueExpr};
use crate::transaction::{RowOrigin, ScopedRow, Transaction, overlay};
use crate::types::{Column, Value};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

/// A mutation with all inputs resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundOp {
    Insert {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
    },
    Update {
        table: String,
        assignments: Vec<(String, Value)>,
        predicate: Option<String>,
    },
    Delete {
        table: String,
        predicate: Option<String>,
    },
    CreateTable {
        table: String,
        columns: Vec<Column>,
        if_not_exists: bool,
    },
    AddColumn {
        table: String,
        column: Column,
    },
    DropColumn {
        table: String,
        column: String,
    },
    DropTable {
        table: String,
        if_exists: bool,
    },
}

fn bind_value(expr: &ValueExpr, params: &Parameters) -> FlatDbResult<Value> {
    match expr {
        ValueExpr::Literal(value) => Ok(value.clone()),
        ValueExpr::Parameter(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| FlatDbError::MustDeclareScalar(name.clone())),
    }
}

impl BoundOp {
    /// Bind a mutating statement.
    pub fn bind(
        statement: &Statement,
        params: &Parameters,
        previous: &StatementResult,
        functions: &dyn FunctionEvaluator,
    ) -> FlatDbResult<Self> {
        if let Some(table) = statement.table() {
            if table.schema.is_some() && table.catalog().is_some() {
                return Err(FlatDbError::SqlNotSupported {
                    feature: "modifying catalog tables".to_string(),
                    hint: "INFORMATION_SCHEMA is read-only".to_string(),
                });
            }
        }
        let predicate = statement
            .filter()
            .map(|f| f.predicate(params, previous, functions))
            .transpose()?;
        Ok(match statement {
            Statement::Insert(insert) => BoundOp::Insert {
                table: insert.table.name.clone(),
                columns: insert.columns.clone(),
                rows: insert
                    .rows
                    .iter()
                    .map(|row| row.iter().map(|e| bind_value(e, params)).collect())
                    .collect::<FlatDbResult<_>>()?,
            },
            Statement::Update(update) => BoundOp::Update {
                table: update.table.name.clone(),
                assignments: update
                    .assignments
                    .iter()
                    .map(|(c, e)| Ok((c.clone(), bind_value(e, params)?)))
                    .collect::<FlatDbResult<_>>()?,
                predicate,
            },
            Statement::Delete(delete) => BoundOp::Delete {
                table: delete.table.name.clone(),
                predicate,
            },
            Statement::CreateTable {
                table,
                columns,
                if_not_exists,
            } => BoundOp::CreateTable {
                table: table.name.clone(),
                columns: columns
                    .iter()
                    .map(|c| Column::new(c.name.clone(), c.column_type))
                    .collect(),
                if_not_exists: *if_not_exists,
            },
            Statement::AddColumn { table, column } => BoundOp::AddColumn {
                table: table.name.clone(),
                column: Column::new(column.name.clone(), column.column_type),
            },
            Statement::DropColumn { table, column } => BoundOp::DropColumn {
                table: table.name.clone(),
                column: column.clone(),
            },
            Statement::DropTable { table, if_exists } => BoundOp::DropTable {
                table: table.name.clone(),
                if_exists: *if_exists,
            },
            Statement::Select(_) | Statement::Begin | Statement::Commit | Statement::Rollback => {
                return Err(FlatDbError::SqlNotSupported {
                    feature: "non-mutating statement in a writer".to_string(),
                    hint: "queries and transaction control run on the session".to_string(),
                });
            }
        })
    }

    pub fn table(&self) -> &str {
        match self {
            BoundOp::Insert { table, .. }
            | BoundOp::Update { table, .. }
            | BoundOp::Delete { table, .. }
            | BoundOp::CreateTable { table, .. }
            | BoundOp::AddColumn { table, .. }
            | BoundOp::DropColumn { table, .. }
            | BoundOp::DropTable { table, .. } => table,
        }
    }
}

/// Lifecycle of a writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    Created,
    /// Queued in a transaction
    Deferred,
    Executing,
    Flushed,
}

/// Shared resources a writer runs against.
pub struct WriteContext<'a> {
    pub provider: &'a dyn SourceProvider,
    pub format: &'a dyn TableFormat,
    pub lock: &'a RwLock<()>,
    pub cache: &'a Mutex<TableCache>,
    pub matcher: &'a dyn RowMatcher,
    pub save: SaveOptions,
    pub flush_on_error: bool,
}

#[derive(Debug)]
pub struct Writer {
    op: BoundOp,
    state: WriterState,
}

impl Writer {
    pub fn new(op: BoundOp) -> Self {
        Self {
            op,
            state: WriterState::Created,
        }
    }

    pub fn op(&self) -> &BoundOp {
        &self.op
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    pub(crate) fn mark_deferred(&mut self) {
        self.state = WriterState::Deferred;
    }

    /// Apply the mutation and flush the database.
    pub fn execute(&mut self, ctx: &WriteContext<'_>) -> FlatDbResult<StatementResult> {
        self.state = WriterState::Executing;
        let _exclusive = ctx.lock.write();
        let _suspended = WatchSuspension::new(ctx.provider);
        let mut cache = ctx.cache.lock();
        cache.drain_changes()?;

        let applied = apply::apply(&self.op, &mut cache, ctx.format, ctx.matcher);
        match &applied {
            Ok(result) => {
                cache.flush(&ctx.save)?;
                debug!(table = self.op.table(), affected = result.affected_rows, "write applied");
            }
            Err(e) if ctx.flush_on_error => {
                warn!(table = self.op.table(), error = %e, "write failed, flushing partial state");
                if let Err(flush) = cache.flush(&ctx.save) {
                    warn!(error = %flush, "flush after failed write also failed");
                }
            }
            Err(e) => {
                warn!(table = self.op.table(), error = %e, "write failed, discarding changes");
                cache.mark_dirty(self.op.table());
            }
        }
        self.state = WriterState::Flushed;
        applied
    }

    /// Queue the writer in `transaction`, returning the count it is expected
    /// to affect. Inserted, updated and deleted rows are reflected in reads
    /// inside the transaction.
    pub fn stage(
        self,
        ctx: &WriteContext<'_>,
        transaction: &mut Transaction,
    ) -> FlatDbResult<StatementResult> {
        let result = {
            let _shared = ctx.lock.read();
            let mut cache = ctx.cache.lock();
            self.preview(&mut cache, ctx, transaction)?
        };
        transaction.enqueue(self);
        Ok(result)
    }

    fn preview(
        &self,
        cache: &mut TableCache,
        ctx: &WriteContext<'_>,
        transaction: &mut Transaction,
    ) -> FlatDbResult<StatementResult> {
        let names = cache.names();
        let key = cache.key(self.op.table());
        match &self.op {
            BoundOp::Insert {
                table,
                columns,
                rows,
            } => {
                let mut result = StatementResult {
                    affected_rows: rows.len(),
                    last_identity: None,
                };
                if !cache.table_exists(table)? {
                    return Ok(result);
                }
                let live = cache.ensure_loaded(table)?;
                if live.columns().is_empty() {
                    return Ok(result);
                }
                let name = live.name().to_string();
                let mut schema = live.columns().to_vec();
                let mut last = overlay(live.rows()?, transaction.scoped(&key))
                    .pop()
                    .map(|(_, row)| row);
                for values in rows {
                    let (row, identity) = identity::build_row(
                        &name,
                        &mut schema,
                        names,
                        columns,
                        values.clone(),
                        last.as_ref(),
                        ctx.format,
                    )?;
                    transaction
                        .scoped_mut(&key)
                        .push(ScopedRow::inserted(row.clone()));
                    last = Some(row);
                    if identity.is_some() {
                        result.last_identity = identity;
                    }
                }
                Ok(result)
            }
            BoundOp::Update {
                table,
                assignments,
                predicate,
            } => {
                if !cache.table_exists(table)? {
                    return Ok(StatementResult::default());
                }
                let live = cache.ensure_loaded(table)?;
                let name = live.name().to_string();
                let mut schema = live.columns().to_vec();
                let test = compile(&name, &schema, predicate.as_deref(), ctx.matcher, names)?;
                let mut settled = Vec::with_capacity(assignments.len());
                for (column, value) in assignments {
                    let index = names.position(&name, &schema, column)?;
                    settled.push((index, identity::settle(&mut schema[index], value.clone())?));
                }
                let rows = overlay(live.rows()?, transaction.scoped(&key));
                let scoped = transaction.scoped_mut(&key);
                let mut affected = 0;
                for (origin, mut row) in rows {
                    if !test.matches(&row) {
                        continue;
                    }
                    for (index, value) in &settled {
                        row[*index] = value.clone();
                    }
                    match origin {
                        RowOrigin::Committed(i) => scoped.push(ScopedRow::replacing(i, row)),
                        RowOrigin::Scoped(j) => scoped[j].values = row,
                    }
                    affected += 1;
                }
                Ok(StatementResult {
                    affected_rows: affected,
                    last_identity: None,
                })
            }
            BoundOp::Delete { table, predicate } => {
                if !cache.table_exists(table)? {
                    return Ok(StatementResult::default());
                }
                let live = cache.ensure_loaded(table)?;
                let name = live.name().to_string();
                let test = compile(&name, live.columns(), predicate.as_deref(), ctx.matcher, names)?;
                let rows = overlay(live.rows()?, transaction.scoped(&key));
                let scoped = transaction.scoped_mut(&key);
                let mut affected = 0;
                for (origin, row) in rows {
                    if !test.matches(&row) {
                        continue;
                    }
                    match origin {
                        RowOrigin::Committed(i) => scoped.push(ScopedRow::deleting(i)),
                        RowOrigin::Scoped(j) => scoped[j].deleted = true,
                    }
                    affected += 1;
                }
                Ok(StatementResult {
                    affected_rows: affected,
                    last_identity: None,
                })
            }
            BoundOp::CreateTable { .. }
            | BoundOp::AddColumn { .. }
            | BoundOp::DropColumn { .. }
            | BoundOp::DropTable { .. } => Ok(StatementResult::default()),
        }
    }
}
