//! Core types and traits
//!
//! This module provides the building blocks the mapper sits on: error types,
//! the driver trait, value types, coercion helpers, configuration, statement
//! builders and connection management.

pub mod coerce;
pub mod config;
pub mod connection;
pub mod database;
pub mod database_types;
pub mod error;
pub mod query_builder;
pub mod transaction;
pub mod value;

// Re-export commonly used types
pub use config::OrmConfig;
pub use connection::ConnectionManager;
pub use database::{ConnectionBuilder, Database, ExecResult};
pub use database_types::DatabaseType;
pub use error::{DatabaseError, Result};
pub use query_builder::{DeleteBuilder, InsertBuilder, SelectBuilder, Statement, UpdateBuilder};
pub use transaction::TransactionGuard;
pub use value::{DatabaseResult, DatabaseRow, DatabaseValue};
