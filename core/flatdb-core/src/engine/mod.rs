//! Database Engine Module

pub mod constructors;
pub mod database;
pub mod sql_interface;
pub mod transactions;

pub use constructors::DatabaseBuilder;
pub use database::Database;
pub use sql_interface::Outcome;
