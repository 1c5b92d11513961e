//! Built-in scalar functions usable inside WHERE clauses.

use crate::error::{FlatDbError, FlatDbResult};
use crate::filter::FunctionEvaluator;
use crate::sql::StatementResult;
use crate::types::Value;

/// `changes()` and the last-identity family used by ORMs to read back
/// generated keys after an insert.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinFunctions;

impl FunctionEvaluator for BuiltinFunctions {
    fn evaluate(
        &self,
        name: &str,
        _args: &[Value],
        previous: &StatementResult,
    ) -> FlatDbResult<Value> {
        match name.to_ascii_lowercase().as_str() {
            "changes" | "row_count" | "rowcount" => {
                Ok(Value::Integer(previous.affected_rows as i64))
            }
            "last_insert_rowid" | "scope_identity" | "last_insert_id" => {
                Ok(previous.last_identity.clone().unwrap_or(Value::Null))
            }
            _ => Err(FlatDbError::FunctionNotFound(name.to_string())),
        }
    }
}
