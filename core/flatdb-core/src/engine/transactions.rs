//! Transaction control: BEGIN / COMMIT / ROLLBACK

use crate::engine::Database;
use crate::engine::database::SessionState;
use crate::error::{FlatDbError, FlatDbResult};
use crate::sql::StatementResult;
use crate::transaction::Transaction;
use tracing::{info, instrument};

impl Database {
    /// Open a transaction. Mutations are staged until [`commit`](Self::commit).
    pub fn begin(&self) -> FlatDbResult<()> {
        self.begin_locked(&mut self.session.lock())
    }

    /// Replay staged mutations in order. Returns the summed affected count
    /// and the last identity assigned.
    ///
    /// The transaction is closed even when a replayed writer fails; writers
    /// after the failing one are dropped.
    pub fn commit(&self) -> FlatDbResult<StatementResult> {
        self.commit_locked(&mut self.session.lock())
    }

    /// Discard staged mutations.
    pub fn rollback(&self) -> FlatDbResult<()> {
        self.rollback_locked(&mut self.session.lock())
    }

    pub(crate) fn begin_locked(&self, session: &mut SessionState) -> FlatDbResult<()> {
        if session.transaction.is_some() {
            return Err(FlatDbError::TransactionState(
                "a transaction is already open".to_string(),
            ));
        }
        session.transaction = Some(Transaction::new());
        info!("transaction started");
        Ok(())
    }

    #[instrument(skip(self, session))]
    pub(crate) fn commit_locked(&self, session: &mut SessionState) -> FlatDbResult<StatementResult> {
        let mut transaction = session.transaction.take().ok_or_else(|| {
            FlatDbError::TransactionState("no transaction is open".to_string())
        })?;
        let writers = transaction.finish();
        let queued = writers.len();
        let ctx = self.write_context();
        let mut total = StatementResult::default();
        for mut writer in writers {
            let result = writer.execute(&ctx)?;
            total.affected_rows += result.affected_rows;
            if result.last_identity.is_some() {
                total.last_identity = result.last_identity;
            }
        }
        info!(writers = queued, affected = total.affected_rows, "transaction committed");
        Ok(total)
    }

    pub(crate) fn rollback_locked(&self, session: &mut SessionState) -> FlatDbResult<()> {
        let transaction = session.transaction.take().ok_or_else(|| {
            FlatDbError::TransactionState("no transaction is open".to_string())
        })?;
        info!(discarded = transaction.queued_len(), "transaction rolled back");
        Ok(())
    }
}
