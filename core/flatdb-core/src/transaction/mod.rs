//! Session transactions.
//!
//! A transaction holds the writers issued between `BEGIN` and `COMMIT`
//! instead of running them, plus the rows those writers would produce so
//! reads inside the transaction can see them. Nothing touches storage until
//! commit replays the queue in order; rollback just drops it.

pub mod scoped;

pub use scoped::{RowOrigin, ScopedRow, overlay};

use crate::writer::Writer;
use std::collections::HashMap;

#[derive(Default)]
pub struct Transaction {
    done: bool,
    /// Keyed by normalized table name
    scoped_rows: HashMap<String, Vec<ScopedRow>>,
    queued: Vec<Writer>,
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("done", &self.done)
            .field("scoped_tables", &self.scoped_rows.len())
            .field("queued", &self.queued.len())
            .finish()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Rows staged for `table`.
    pub fn scoped(&self, table_key: &str) -> &[ScopedRow] {
        self.scoped_rows
            .get(table_key)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn scoped_mut(&mut self, table_key: &str) -> &mut Vec<ScopedRow> {
        self.scoped_rows.entry(table_key.to_string()).or_default()
    }

    /// Queue a writer to run at commit.
    pub fn enqueue(&mut self, mut writer: Writer) {
        writer.mark_deferred();
        self.queued.push(writer);
    }

    pub fn queued_len(&self) -> usize {
        self.queued.len()
    }

    /// Close the transaction and hand back its writers in enqueue order.
    pub fn finish(&mut self) -> Vec<Writer> {
        self.done = true;
        self.scoped_rows.clear();
        std::mem::take(&mut self.queued)
    }
}
