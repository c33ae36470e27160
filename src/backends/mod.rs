//! Database backend implementations
//!
//! This module contains concrete implementations of the Database trait
//! for the supported dialects.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "mysql")]
pub mod mysql;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

#[cfg(feature = "mysql")]
pub use mysql::MysqlDatabase;
