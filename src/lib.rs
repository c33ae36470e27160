//! # Rust Model Mapper
//!
//! A lightweight object-relational mapper for MySQL and SQLite. Models
//! declare their column mapping in code; the mapper generates bound
//! INSERT/UPDATE/SELECT/DELETE statements from it, keeps model metadata in a
//! registry, hydrates models from rows with forgiving type coercion, and
//! owns a single shared connection that is re-established on demand.
//!
//! ## Features
//!
//! - **Schema as code**: the [`model!`] macro declares a struct and its
//!   column mapping; untagged fields are never persisted
//! - **Bound parameters**: every executed statement binds its values; the
//!   literal form is only rendered for logs
//! - **Soft deletes**: finds skip rows whose `deleted_at` is set
//! - **Timestamps**: `created_at` / `updated_at` are stamped on save
//! - **Caller-owned transactions** through [`TransactionGuard`]
//! - **Async** on Tokio
//!
//! ## Supported Databases
//!
//! | Database | Feature | Notes |
//! |----------|---------|-------|
//! | SQLite | `sqlite` (default) | bundled, blocking calls offloaded |
//! | MySQL | `mysql` | `mysql_async`, session time zone UTC |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rust_model_mapper::prelude::*;
//!
//! model! {
//!     #[derive(Debug, Default)]
//!     pub struct User in "users" {
//!         #[column("id")] pub id: u64,
//!         #[column("name")] pub name: String,
//!         #[column("created_at")] pub created_at: Option<DateTime<Utc>>,
//!         #[column("updated_at")] pub updated_at: Option<DateTime<Utc>>,
//!         #[column("deleted_at")] pub deleted_at: Option<DateTime<Utc>>,
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let orm: Orm<SqliteDatabase> = Orm::open(OrmConfig::new("app.db")).await?;
//!
//!     let mut user = User { name: "Alice".into(), ..Default::default() };
//!     orm.save(&mut user, None).await?;
//!
//!     let found: Option<User> = orm
//!         .find_one(&[("name", DatabaseValue::from("Alice"))])
//!         .await?;
//!     assert_eq!(found.map(|u| u.id), Some(user.id));
//!     Ok(())
//! }
//! ```
//!
//! ## Project Structure
//!
//! ```text
//! src/
//! ├── core/           # errors, values, coercion, config, driver trait,
//! │                   # statement builders, connection and transactions
//! ├── model/          # Model trait, model! macro, registry, rendering
//! ├── backends/       # SQLite and MySQL drivers
//! ├── orm.rs          # Orm facade and Persist trait
//! └── lib.rs
//! ```

/// Core types and traits
pub mod core;

/// Database backend implementations
pub mod backends;

/// Model declarations, registry and rendering
pub mod model;

/// Model persistence
pub mod orm;

#[doc(hidden)]
pub use chrono;

/// Prelude for convenient imports
///
/// ```rust
/// use rust_model_mapper::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<()> {
///     let orm: Orm<SqliteDatabase> = Orm::open(OrmConfig::new(":memory:")).await?;
///     assert!(orm.connection().is_initialized());
///     Ok(())
/// }
/// ```
pub mod prelude {
    pub use crate::core::{
        Database, DatabaseError, DatabaseResult, DatabaseRow, DatabaseType, DatabaseValue,
        OrmConfig, Result, TransactionGuard,
    };
    pub use crate::model;
    pub use crate::model::{Model, ModelRegistry};
    pub use crate::orm::{Orm, Persist};
    pub use chrono::{DateTime, Utc};

    #[cfg(feature = "sqlite")]
    pub use crate::backends::SqliteDatabase;

    #[cfg(feature = "mysql")]
    pub use crate::backends::MysqlDatabase;
}

// Re-export at root level for convenience
pub use core::{
    ConnectionBuilder, Database, DatabaseError, DatabaseResult, DatabaseRow, DatabaseType,
    DatabaseValue, OrmConfig, Result, TransactionGuard,
};
pub use model::{Model, ModelRegistry};
pub use orm::{Orm, Persist};

#[cfg(feature = "sqlite")]
pub use backends::SqliteDatabase;

#[cfg(feature = "mysql")]
pub use backends::MysqlDatabase;
