//! Transaction-scoped rows and the read overlay built from them.

use crate::types::Row;

/// A row written inside an open transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedRow {
    /// Committed row this one stands in for; `None` for an inserted row
    pub replaces: Option<usize>,
    pub values: Row,
    /// Tombstone: the row (and any committed row it replaces) is hidden
    pub deleted: bool,
}

impl ScopedRow {
    pub fn inserted(values: Row) -> Self {
        Self {
            replaces: None,
            values,
            deleted: false,
        }
    }

    pub fn replacing(index: usize, values: Row) -> Self {
        Self {
            replaces: Some(index),
            values,
            deleted: false,
        }
    }

    /// Hide committed row `index`.
    pub fn deleting(index: usize) -> Self {
        Self {
            replaces: Some(index),
            values: Row::new(),
            deleted: true,
        }
    }
}

/// Where an overlaid row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowOrigin {
    Committed(usize),
    Scoped(usize),
}

/// Committed rows with the scoped rows applied: replacements in place,
/// inserts appended in staging order, tombstoned rows left out.
pub fn overlay(committed: &[Row], scoped: &[ScopedRow]) -> Vec<(RowOrigin, Row)> {
    let mut rows: Vec<Option<(RowOrigin, Row)>> = committed
        .iter()
        .enumerate()
        .map(|(i, row)| Some((RowOrigin::Committed(i), row.clone())))
        .collect();
    for (j, row) in scoped.iter().enumerate() {
        let visible = (!row.deleted).then(|| (RowOrigin::Scoped(j), row.values.clone()));
        match row.replaces {
            Some(i) if i < committed.len() => rows[i] = visible,
            _ => rows.push(visible),
        }
    }
    rows.into_iter().flatten().collect()
}
