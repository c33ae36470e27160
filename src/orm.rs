//! Model persistence
//!
//! [`Orm`] owns the connection manager and the model registry, and turns
//! models into bound statements: insert on first save, update afterwards,
//! finds filtered on live (not soft-deleted) rows, and deletes.

use crate::core::config::OrmConfig;
use crate::core::connection::ConnectionManager;
use crate::core::database::{Database, ExecResult};
use crate::core::error::{DatabaseError, Result};
use crate::core::query_builder::{
    DeleteBuilder, InsertBuilder, SelectBuilder, Statement, UpdateBuilder,
};
use crate::core::transaction::TransactionGuard;
use crate::core::value::{DatabaseResult, DatabaseRow, DatabaseValue};
use crate::model::{
    bind_fields, render_fields, Model, ModelRegistry, RenderedFields, CREATED_AT_COLUMN,
    DELETED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN,
};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use tracing::{debug, info};

/// Column = value pairs a find must match
pub type Predicates<'a> = [(&'a str, DatabaseValue)];

fn now() -> DateTime<Utc> {
    // stored timestamps have whole-second precision
    Utc::now().trunc_subsecs(0)
}

/// Maps models onto a database reached through backend `D`
pub struct Orm<D: Database> {
    connections: ConnectionManager<D>,
    registry: ModelRegistry,
}

impl<D: Database + 'static> Orm<D> {
    /// Create an unconnected mapper
    pub fn new(config: OrmConfig) -> Self {
        Self {
            connections: ConnectionManager::new(config),
            registry: ModelRegistry::new(),
        }
    }

    /// Validate `config`, then connect to its data source
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Config`] for an unusable configuration or the
    /// driver error when the connection cannot be opened.
    pub async fn open(config: OrmConfig) -> Result<Self> {
        config.validate()?;
        let orm = Self::new(config);
        let data_source = orm.config().data_source.clone();
        orm.connections.initialize(&data_source).await?;
        Ok(orm)
    }

    /// Configuration in effect
    pub fn config(&self) -> &OrmConfig {
        self.connections.config()
    }

    /// Connection manager holding the shared handle
    pub fn connection(&self) -> &ConnectionManager<D> {
        &self.connections
    }

    /// Model metadata registry
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Register (or re-register) model `M`
    pub fn register<M: Model>(&self) -> Result<()> {
        self.registry.register::<M>().map(|_| ())
    }

    /// Every mapped field of `model` as SQL literal text
    pub fn render_fields<M: Model>(&self, model: &M) -> Result<RenderedFields> {
        render_fields(&self.registry, model)
    }

    /// Qualified select list for the given table paths
    pub fn qualified_fields<S: AsRef<str>>(&self, qualified_names: &[S]) -> Result<String> {
        self.registry.qualified_fields(qualified_names)
    }

    /// Begin a transaction on the shared handle
    ///
    /// While it is open, writes must pass the guard; writes without one fail
    /// with [`DatabaseError::TransactionError`]. Finds run on the same handle
    /// and see the transaction's uncommitted rows.
    pub async fn begin(&self) -> Result<TransactionGuard<D>> {
        TransactionGuard::begin(self.connections.ensure_live().await?).await
    }

    /// Disconnect the shared handle
    pub async fn close(&self) -> Result<()> {
        self.connections.close().await
    }

    /// INSERT for `model`, leaving `id` to the database
    ///
    /// A model mapping no column besides `id` inserts a row of defaults.
    pub fn prepare_insert<M: Model>(&self, model: &M) -> Result<Statement> {
        let mut fields = bind_fields(&self.registry, model)?;
        fields.shift_remove(ID_COLUMN);
        if fields.is_empty() {
            return Ok(Statement::new(
                D::default_values_insert(M::table_name()),
                Vec::new(),
            ));
        }

        let builder = fields
            .into_iter()
            .fold(InsertBuilder::new(M::table_name()), |builder, (column, value)| {
                builder.value(column, value)
            });
        Ok(builder.statement())
    }

    /// UPDATE of every mapped field of `model`, keyed by its id
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::MissingIdentifier`] when the id is 0.
    pub fn prepare_update<M: Model>(&self, model: &M) -> Result<Statement> {
        let id = model.id();
        if id == 0 {
            return Err(DatabaseError::missing_identifier(M::table_name()));
        }

        let mut fields = bind_fields(&self.registry, model)?;
        fields.shift_remove(ID_COLUMN);

        let builder = fields
            .into_iter()
            .fold(UpdateBuilder::new(M::table_name()), |builder, (column, value)| {
                builder.set(column, value)
            });
        Ok(builder.where_eq(ID_COLUMN, id).statement())
    }

    /// SELECT of live `M` rows matching every predicate
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::ColumnNotFound`] for a predicate column the
    /// model does not map.
    pub fn prepare_find<M: Model>(
        &self,
        predicates: &Predicates<'_>,
        limit: Option<usize>,
    ) -> Result<Statement> {
        let table = M::table_name();
        let descriptors = self.registry.descriptors_for::<M>()?;
        let has_column = |column: &str| descriptors.iter().any(|d| d.column == column);

        let fields = self.registry.qualified_fields(&[table])?;
        let mut builder = SelectBuilder::new(table);
        if !fields.is_empty() {
            builder = builder.column_list(fields);
        }

        for (column, value) in predicates {
            if !has_column(*column) {
                return Err(DatabaseError::ColumnNotFound(format!("{}.{}", table, column)));
            }
            builder = builder.where_eq(&format!("{}.{}", table, column), value.clone());
        }
        if has_column(DELETED_AT_COLUMN) {
            builder = builder.where_null(&format!("{}.{}", table, DELETED_AT_COLUMN));
        }
        if let Some(limit) = limit {
            builder = builder.limit(limit);
        }
        Ok(builder.statement())
    }

    /// Hard DELETE of the row with `id` in `table`
    pub fn prepare_delete(&self, table: &str, id: u64) -> Statement {
        DeleteBuilder::new(table).where_eq(ID_COLUMN, id).statement()
    }

    fn log_statement(&self, statement: &Statement) {
        if self.config().log_statements {
            info!(sql = %statement.to_literal_sql(), "executing statement");
        } else {
            debug!(
                sql = statement.sql(),
                params = statement.params().len(),
                "executing statement"
            );
        }
    }

    async fn exec(
        &self,
        statement: &Statement,
        tx: Option<&TransactionGuard<D>>,
    ) -> Result<ExecResult> {
        self.log_statement(statement);
        match tx {
            Some(tx) => {
                tx.execute_with_params(statement.sql(), statement.params())
                    .await
            }
            None => {
                let db = self.connections.ensure_live().await?;
                // the handle is shared, so the write would join the open transaction
                if db.in_transaction() {
                    return Err(DatabaseError::transaction(
                        "a transaction is open on the shared connection; pass its guard to write",
                    ));
                }
                db.execute_with_params(statement.sql(), statement.params())
                    .await
            }
        }
    }

    async fn fetch(&self, statement: &Statement) -> Result<DatabaseResult> {
        self.log_statement(statement);
        let db = self.connections.ensure_live().await?;
        db.query_with_params(statement.sql(), statement.params())
            .await
    }

    /// Persist `model` and return its id
    ///
    /// A model with id 0 is inserted: `created_at` and `updated_at` are
    /// stamped, and the generated id is written back to the model. Any other
    /// model is updated.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::MissingGeneratedId`] when the driver reports
    /// no generated id for the insert.
    pub async fn save<M: Model>(
        &self,
        model: &mut M,
        tx: Option<&TransactionGuard<D>>,
    ) -> Result<u64> {
        if model.id() != 0 {
            self.update(model, tx).await?;
            return Ok(model.id());
        }

        let at = now();
        model.set_timestamp(CREATED_AT_COLUMN, at);
        model.set_timestamp(UPDATED_AT_COLUMN, at);

        let statement = self.prepare_insert(model)?;
        let result = self.exec(&statement, tx).await?;
        let id = result
            .last_insert_id
            .ok_or_else(|| DatabaseError::MissingGeneratedId {
                table: M::table_name().to_string(),
            })?;
        model.set_id(id);
        Ok(id)
    }

    /// Write every mapped field of an already saved `model`
    ///
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::MissingIdentifier`] when the id is 0; nothing
    /// is executed in that case.
    pub async fn update<M: Model>(
        &self,
        model: &mut M,
        tx: Option<&TransactionGuard<D>>,
    ) -> Result<u64> {
        if model.id() == 0 {
            return Err(DatabaseError::missing_identifier(M::table_name()));
        }
        model.set_timestamp(UPDATED_AT_COLUMN, now());

        let statement = self.prepare_update(model)?;
        Ok(self.exec(&statement, tx).await?.affected_rows)
    }

    /// First live row of `M` matching every predicate
    pub async fn find_by_columns<M: Model>(
        &self,
        predicates: &Predicates<'_>,
    ) -> Result<Option<DatabaseRow>> {
        let statement = self.prepare_find::<M>(predicates, Some(1))?;
        Ok(self.fetch(&statement).await?.into_iter().next())
    }

    /// All live rows of `M` matching every predicate, in result order
    pub async fn find_all_by_columns<M: Model>(
        &self,
        predicates: &Predicates<'_>,
    ) -> Result<DatabaseResult> {
        let statement = self.prepare_find::<M>(predicates, None)?;
        self.fetch(&statement).await
    }

    /// First live `M` matching every predicate
    pub async fn find_one<M: Model>(&self, predicates: &Predicates<'_>) -> Result<Option<M>> {
        let prefix = format!("{}.", M::table_name());
        Ok(self
            .find_by_columns::<M>(predicates)
            .await?
            .map(|row| M::from_row(&row, &prefix)))
    }

    /// All live `M` matching every predicate
    pub async fn find_all<M: Model>(&self, predicates: &Predicates<'_>) -> Result<Vec<M>> {
        let prefix = format!("{}.", M::table_name());
        Ok(self
            .find_all_by_columns::<M>(predicates)
            .await?
            .iter()
            .map(|row| M::from_row(row, &prefix))
            .collect())
    }

    /// Live `M` with the given id
    pub async fn find_by_id<M: Model>(&self, id: u64) -> Result<Option<M>> {
        self.find_one::<M>(&[(ID_COLUMN, DatabaseValue::from(id))])
            .await
    }

    /// Remove the row with `id` from `table`
    ///
    /// Returns the number of rows removed.
    pub async fn delete(
        &self,
        table: &str,
        id: u64,
        tx: Option<&TransactionGuard<D>>,
    ) -> Result<u64> {
        if id == 0 {
            return Err(DatabaseError::missing_identifier(table));
        }
        let statement = self.prepare_delete(table, id);
        Ok(self.exec(&statement, tx).await?.affected_rows)
    }

    /// Mark `model` deleted by stamping `deleted_at`
    ///
    /// Soft-deleted rows are skipped by every find.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::MissingIdentifier`] for an unsaved model and
    /// [`DatabaseError::ColumnNotFound`] when the model maps no `deleted_at`
    /// timestamp.
    pub async fn soft_delete<M: Model>(
        &self,
        model: &mut M,
        tx: Option<&TransactionGuard<D>>,
    ) -> Result<u64> {
        let table = M::table_name();
        let id = model.id();
        if id == 0 {
            return Err(DatabaseError::missing_identifier(table));
        }

        let at = now();
        if !model.set_timestamp(DELETED_AT_COLUMN, at) {
            return Err(DatabaseError::ColumnNotFound(format!(
                "{}.{}",
                table, DELETED_AT_COLUMN
            )));
        }

        let statement = UpdateBuilder::new(table)
            .set(DELETED_AT_COLUMN, at)
            .where_eq(ID_COLUMN, id)
            .statement();
        Ok(self.exec(&statement, tx).await?.affected_rows)
    }
}

/// Save and update called on the model itself
///
/// ```ignore
/// account.save(&orm, None).await?;
/// account.balance += 10.0;
/// account.update(&orm, Some(&tx)).await?;
/// ```
#[async_trait]
pub trait Persist<D: Database + 'static>: Model + Sized {
    /// See [`Orm::save`]
    async fn save(&mut self, orm: &Orm<D>, tx: Option<&TransactionGuard<D>>) -> Result<u64>;

    /// See [`Orm::update`]
    async fn update(&mut self, orm: &Orm<D>, tx: Option<&TransactionGuard<D>>) -> Result<u64>;
}

#[async_trait]
impl<D: Database + 'static, M: Model + Sized> Persist<D> for M {
    async fn save(&mut self, orm: &Orm<D>, tx: Option<&TransactionGuard<D>>) -> Result<u64> {
        orm.save(self, tx).await
    }

    async fn update(&mut self, orm: &Orm<D>, tx: Option<&TransactionGuard<D>>) -> Result<u64> {
        orm.update(self, tx).await
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;
    use crate::backends::SqliteDatabase;
    use crate::model::fixtures::{Account, Untagged};

    fn orm() -> Orm<SqliteDatabase> {
        Orm::new(OrmConfig::new(":memory:"))
    }

    #[test]
    fn test_prepare_insert_omits_id() {
        let orm = orm();
        let account = Account {
            id: 9,
            name: "bob".into(),
            tier: 3,
            ..Default::default()
        };

        let statement = orm.prepare_insert(&account).unwrap();
        assert_eq!(
            statement.sql(),
            "INSERT INTO accounts (`name`, `balance`, `tier`, `created_at`, `updated_at`, `deleted_at`) VALUES (?, ?, ?, ?, ?, ?)"
        );
        assert_eq!(statement.params()[0], DatabaseValue::from("bob"));
        assert_eq!(statement.params()[2], DatabaseValue::Long(3));
    }

    #[test]
    fn test_prepare_insert_without_columns_uses_defaults() {
        let statement = orm().prepare_insert(&Untagged::default()).unwrap();
        assert_eq!(statement.sql(), "INSERT INTO untagged DEFAULT VALUES");
        assert!(statement.params().is_empty());
    }

    #[test]
    fn test_prepare_update_keys_by_id() {
        let orm = orm();
        let account = Account {
            id: 23,
            name: "bob".into(),
            ..Default::default()
        };

        let statement = orm.prepare_update(&account).unwrap();
        assert_eq!(
            statement.sql(),
            "UPDATE accounts SET name = ?, balance = ?, tier = ?, created_at = ?, updated_at = ?, deleted_at = ? WHERE id = ?"
        );
        assert_eq!(statement.params().last(), Some(&DatabaseValue::ULong(23)));
        assert_eq!(
            statement.to_literal_sql(),
            "UPDATE accounts SET name = \"bob\", balance = 0.00, tier = 0, created_at = null, updated_at = null, deleted_at = null WHERE id = 23"
        );
    }

    #[test]
    fn test_prepare_update_requires_id() {
        let err = orm().prepare_update(&Account::default()).unwrap_err();
        assert!(matches!(err, DatabaseError::MissingIdentifier { .. }));
    }

    #[test]
    fn test_prepare_find_filters_live_rows() {
        let orm = orm();
        let statement = orm
            .prepare_find::<Account>(&[("name", DatabaseValue::from("bob"))], Some(1))
            .unwrap();
        let sql = statement.sql();
        assert!(sql.starts_with("SELECT accounts.id AS \"accounts.id\", accounts.name AS \"accounts.name\""));
        assert!(sql.ends_with(
            "FROM accounts WHERE accounts.name = ? AND accounts.deleted_at IS NULL LIMIT 1"
        ));
        assert_eq!(statement.params(), &[DatabaseValue::from("bob")]);

        let all = orm.prepare_find::<Account>(&[], None).unwrap();
        assert!(all.sql().ends_with("FROM accounts WHERE accounts.deleted_at IS NULL"));
    }

    #[test]
    fn test_prepare_find_rejects_unknown_column() {
        let err = orm()
            .prepare_find::<Account>(&[("dummy", DatabaseValue::from("x"))], None)
            .unwrap_err();
        assert!(matches!(err, DatabaseError::ColumnNotFound(ref c) if c == "accounts.dummy"));
    }

    #[test]
    fn test_prepare_find_without_descriptors() {
        let statement = orm().prepare_find::<Untagged>(&[], None).unwrap();
        assert_eq!(statement.sql(), "SELECT * FROM untagged");
    }

    #[test]
    fn test_prepare_delete() {
        let statement = orm().prepare_delete("accounts", 5);
        assert_eq!(statement.sql(), "DELETE FROM accounts WHERE id = ?");
        assert_eq!(statement.params(), &[DatabaseValue::ULong(5)]);
    }

    #[tokio::test]
    async fn test_operations_before_open() {
        let orm = orm();
        let mut account = Account {
            id: 1,
            ..Default::default()
        };
        let err = orm.update(&mut account, None).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotInitialized));

        let err = orm.find_by_id::<Account>(1).await.unwrap_err();
        assert!(matches!(err, DatabaseError::NotInitialized));
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let result = Orm::<SqliteDatabase>::open(OrmConfig::new("")).await;
        assert!(matches!(result, Err(DatabaseError::Config(_))));
    }
}
