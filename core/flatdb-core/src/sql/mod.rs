//! SQL boundary: parsing into [`Statement`]s, predicate matching, scalar
//! functions and result shaping.

pub mod functions;
pub mod matcher;
pub mod parser;
pub mod select;
pub mod statement;
pub mod translate;

pub use functions::BuiltinFunctions;
pub use matcher::{MatchAll, PredicateMatcher, RowMatcher, RowPredicate};
pub use parser::SqlParser;
pub use select::QueryResult;
pub use statement::{
    CatalogTable, ColumnDef, DeleteStatement, INFORMATION_SCHEMA, InsertStatement, OrderBy,
    Parameters, Projection, SelectStatement, Statement, StatementResult, TableRef,
    UpdateStatement, ValueExpr,
};
