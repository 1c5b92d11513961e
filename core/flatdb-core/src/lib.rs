//! # flatdb: flat files as relational tables
//!
//! flatdb queries and mutates CSV, JSON and Parquet files with SQL. A folder
//! is a database with one file per table, or (JSON) a single file holds
//! every table under its own key.
//!
//! ## Key features
//!
//! - **Schema inference**: column types come from a bounded sample (CSV) or
//!   from the values themselves (JSON, Parquet)
//! - **Lazy paging**: rows are pulled from storage one page at a time
//! - **Consistent cache**: external edits are detected and reloaded on the
//!   next statement
//! - **Serialized writers**: one lock per format family, whole-database flush
//! - **Transactions**: staged writes with read-your-writes overlay
//!
//! ## Quick start
//!
//! ```no_run
//! use flatdb_core::{ConnectionConfig, Database, FormatKind, Parameters};
//!
//! # fn main() -> flatdb_core::FlatDbResult<()> {
//! let db = Database::open(ConnectionConfig::new("./data", FormatKind::Csv))?;
//!
//! db.execute("CREATE TABLE Employees (Id INT, Name VARCHAR(50), Salary DECIMAL(10,2))")?;
//! let inserted = db.execute("INSERT INTO Employees (Name, Salary) VALUES ('Ann', 50000)")?;
//! assert_eq!(inserted.affected_rows, 1);
//!
//! let params = Parameters::new().with("@min", 40000i64);
//! let rows = db.query_with_params("SELECT Id, Name FROM Employees WHERE Salary > @min", &params)?;
//! for row in &rows.rows {
//!     println!("{row:?}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ### Transactions
//!
//! ```no_run
//! use flatdb_core::{ConnectionConfig, Database, FormatKind};
//!
//! # fn main() -> flatdb_core::FlatDbResult<()> {
//! let db = Database::open(ConnectionConfig::new("./data", FormatKind::Csv))?;
//! db.begin()?;
//! db.execute("UPDATE Employees SET Salary = 55000 WHERE Id = 1")?;
//! // visible here, not yet on disk
//! let rows = db.query("SELECT Salary FROM Employees WHERE Id = 1")?;
//! db.commit()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Statement pipeline
//!
//! ```text
//! SQL text → sqlparser AST → Statement → Database dispatch
//!   SELECT → TableCache (load / reload) → row matcher → shaping
//!   write  → Writer (lock, suspend watcher) → mutation → flush
//! ```
//!
//! ## Module layout
//!
//! - [`engine`]: session API ([`Database`])
//! - [`sql`]: parser, statement model, row matcher, scalar functions
//! - [`cache`]: loaded tables, reloads, catalog tables
//! - [`writer`]: mutations, identity inference
//! - [`transaction`]: staged writes and overlays
//! - [`format`]: CSV / JSON / Parquet encodings
//! - [`table`]: virtual tables over paged row streams
//! - [`stream`]: re-seekable byte stream transforms
//! - [`provider`]: file system and in-memory storage

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod format;
pub mod provider;
pub mod sql;
pub mod stream;
pub mod table;
pub mod transaction;
pub mod types;
pub mod writer;

// Logging utilities
pub mod logging;

// Re-export commonly used types
pub use config::{ConnectionConfig, FormatKind, NumberPreference, StorageMode};
pub use engine::{Database, DatabaseBuilder, Outcome};
pub use error::{FlatDbError, FlatDbResult};
pub use filter::{CompareOp, Filter, FunctionEvaluator, Operand};
pub use format::TableFormat;
pub use provider::SourceProvider;
pub use sql::{Parameters, QueryResult, RowMatcher, StatementResult};
pub use types::{Column, ColumnType, Row, Value};
