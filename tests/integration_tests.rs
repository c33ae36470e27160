//! Integration tests for the model mapper
//!
//! These run the full save / find / delete cycle against in-memory SQLite:
//! - Insert and update routing
//! - Soft and hard deletes
//! - Typed hydration, including joined rows
//! - Caller-owned transactions

#[cfg(feature = "sqlite")]
mod sqlite_tests {
    use rust_model_mapper::prelude::*;
    use tokio_test::{assert_err, assert_ok};

    model! {
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct Account in "accounts" {
            #[column("id")] pub id: u64,
            #[column("name")] pub name: String,
            pub scratch: String,
            #[column("balance")] pub balance: f64,
            #[column("tier")] pub tier: i32,
            #[column("created_at")] pub created_at: Option<DateTime<Utc>>,
            #[column("updated_at")] pub updated_at: Option<DateTime<Utc>>,
            #[column("deleted_at")] pub deleted_at: Option<DateTime<Utc>>,
        }
    }

    model! {
        #[derive(Debug, Clone, Default, PartialEq)]
        pub struct Ledger in "ledgers" {
            #[column("id")] pub id: u64,
            #[column("account_id")] pub account_id: u64,
            #[column("amount")] pub amount: f32,
            #[column("created_at")] pub created_at: Option<DateTime<Utc>>,
            #[column("updated_at")] pub updated_at: Option<DateTime<Utc>>,
            #[column("deleted_at")] pub deleted_at: Option<DateTime<Utc>>,
        }
    }

    model! {
        #[derive(Debug, Clone, Default)]
        pub struct Marker in "markers" {
            #[column("id")] pub id: u64,
            pub label: String,
        }
    }

    const SCHEMA: [&str; 3] = [
        "CREATE TABLE accounts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            balance REAL NOT NULL,
            tier INTEGER NOT NULL,
            created_at DATETIME,
            updated_at DATETIME,
            deleted_at DATETIME
        )",
        "CREATE TABLE ledgers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            account_id INTEGER NOT NULL REFERENCES accounts(id),
            amount REAL NOT NULL,
            created_at DATETIME,
            updated_at DATETIME,
            deleted_at DATETIME
        )",
        "CREATE TABLE markers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            placed_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
    ];

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    async fn setup_with(config: OrmConfig) -> Orm<SqliteDatabase> {
        init_tracing();
        let orm: Orm<SqliteDatabase> = Orm::open(config).await.expect("Failed to open");
        let db = orm.connection().get_handle().expect("No handle");
        for ddl in SCHEMA {
            db.execute(ddl).await.expect("Failed to create table");
        }
        orm
    }

    async fn setup() -> Orm<SqliteDatabase> {
        setup_with(OrmConfig::new(":memory:")).await
    }

    fn account(name: &str, balance: f64, tier: i32) -> Account {
        Account {
            name: name.to_string(),
            balance,
            tier,
            ..Default::default()
        }
    }

    async fn row_count(orm: &Orm<SqliteDatabase>, table: &str) -> i64 {
        let db = orm.connection().get_handle().expect("No handle");
        let rows = db
            .query(&format!("SELECT COUNT(*) AS n FROM {}", table))
            .await
            .expect("Count failed");
        match rows[0].get("n") {
            Some(DatabaseValue::Long(n)) => *n,
            other => panic!("unexpected count: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_save_assigns_generated_ids() {
        let orm = setup().await;

        let mut alice = account("alice", 10.0, 1);
        let mut bob = account("bob", 20.0, 2);
        assert_eq!(assert_ok!(orm.save(&mut alice, None).await), 1);
        assert_eq!(assert_ok!(orm.save(&mut bob, None).await), 2);

        assert_eq!(alice.id, 1);
        assert_eq!(bob.id, 2);
        assert!(alice.created_at.is_some());
        assert_eq!(alice.created_at, alice.updated_at);
        assert_eq!(alice.deleted_at, None);
    }

    #[tokio::test]
    async fn test_resave_routes_to_update() {
        let orm = setup().await;

        let mut alice = account("alice", 10.0, 1);
        let id = assert_ok!(orm.save(&mut alice, None).await);

        alice.name = "alice cooper".to_string();
        alice.balance = 99.5;
        assert_eq!(assert_ok!(orm.save(&mut alice, None).await), id);
        assert_eq!(row_count(&orm, "accounts").await, 1);

        let stored: Account = assert_ok!(orm.find_by_id(id).await).expect("row missing");
        assert_eq!(stored.name, "alice cooper");
        assert_eq!(stored.balance, 99.5);
    }

    #[tokio::test]
    async fn test_update_without_id_fails() {
        let orm = setup().await;

        let mut ghost = account("ghost", 0.0, 0);
        let err = assert_err!(orm.update(&mut ghost, None).await);
        assert!(matches!(err, DatabaseError::MissingIdentifier { .. }));
        assert_eq!(row_count(&orm, "accounts").await, 0);
    }

    #[tokio::test]
    async fn test_find_on_empty_table() {
        let orm = setup().await;

        let row = assert_ok!(
            orm.find_by_columns::<Account>(&[("name", DatabaseValue::from("nobody"))])
                .await
        );
        assert!(row.is_none());

        let rows = assert_ok!(orm.find_all_by_columns::<Account>(&[]).await);
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_find_by_columns_returns_aliased_row() {
        let orm = setup().await;
        let mut alice = account("alice", 12.346, 3);
        assert_ok!(orm.save(&mut alice, None).await);

        let row = assert_ok!(
            orm.find_by_columns::<Account>(&[
                ("name", DatabaseValue::from("alice")),
                ("tier", DatabaseValue::from(3i32)),
            ])
            .await
        )
        .expect("row missing");

        assert_eq!(row.get("accounts.name"), Some(&DatabaseValue::from("alice")));
        // values are stored as rendered: two decimals
        assert_eq!(row.get("accounts.balance"), Some(&DatabaseValue::Double(12.35)));
        assert_eq!(row.get("accounts.deleted_at"), Some(&DatabaseValue::Null));
    }

    #[tokio::test]
    async fn test_typed_finds_hydrate_models() {
        let orm = setup().await;

        let mut saved = Vec::new();
        for (name, tier) in [("alice", 1), ("bob", 2), ("carol", 2)] {
            let mut model = account(name, 5.0, tier);
            assert_ok!(orm.save(&mut model, None).await);
            saved.push(model);
        }

        let tier_two: Vec<Account> =
            assert_ok!(orm.find_all(&[("tier", DatabaseValue::from(2i32))]).await);
        let names: Vec<&str> = tier_two.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["bob", "carol"]);

        let bob: Account = assert_ok!(orm.find_one(&[("name", DatabaseValue::from("bob"))]).await)
            .expect("bob missing");
        assert_eq!(bob, saved[1]);
        // untagged fields are never persisted
        assert_eq!(bob.scratch, "");
    }

    #[tokio::test]
    async fn test_unknown_predicate_column() {
        let orm = setup().await;
        let err = assert_err!(
            orm.find_by_columns::<Account>(&[("scratch", DatabaseValue::from("x"))])
                .await
        );
        assert!(matches!(err, DatabaseError::ColumnNotFound(_)));
    }

    #[tokio::test]
    async fn test_soft_delete_hides_rows() {
        let orm = setup().await;

        let mut alice = account("alice", 1.0, 1);
        let mut bob = account("bob", 2.0, 1);
        assert_ok!(orm.save(&mut alice, None).await);
        assert_ok!(orm.save(&mut bob, None).await);

        assert_eq!(assert_ok!(orm.soft_delete(&mut alice, None).await), 1);
        assert!(alice.deleted_at.is_some());

        assert!(assert_ok!(orm.find_by_id::<Account>(alice.id).await).is_none());
        let remaining: Vec<Account> =
            assert_ok!(orm.find_all(&[("tier", DatabaseValue::from(1i32))]).await);
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].name, "bob");

        // the row itself is still there
        assert_eq!(row_count(&orm, "accounts").await, 2);
    }

    #[tokio::test]
    async fn test_hard_delete() {
        let orm = setup().await;

        let mut alice = account("alice", 1.0, 1);
        let id = assert_ok!(orm.save(&mut alice, None).await);

        assert_eq!(assert_ok!(orm.delete("accounts", id, None).await), 1);
        assert_eq!(assert_ok!(orm.delete("accounts", id, None).await), 0);
        assert_eq!(row_count(&orm, "accounts").await, 0);

        let err = assert_err!(orm.delete("accounts", 0, None).await);
        assert!(matches!(err, DatabaseError::MissingIdentifier { .. }));
    }

    #[tokio::test]
    async fn test_transaction_rollback_discards_saves() {
        let orm = setup().await;

        let tx = assert_ok!(orm.begin().await);
        let mut alice = account("alice", 1.0, 1);
        assert_ok!(orm.save(&mut alice, Some(&tx)).await);
        assert_eq!(alice.id, 1);
        assert_ok!(tx.rollback().await);

        assert_eq!(row_count(&orm, "accounts").await, 0);
    }

    #[tokio::test]
    async fn test_transaction_commit_keeps_related_rows() {
        let orm = setup().await;

        let tx = assert_ok!(orm.begin().await);
        let mut alice = account("alice", 1.0, 1);
        assert_ok!(orm.save(&mut alice, Some(&tx)).await);
        let mut entry = Ledger {
            account_id: alice.id,
            amount: 2.5,
            ..Default::default()
        };
        assert_ok!(orm.save(&mut entry, Some(&tx)).await);
        assert_ok!(tx.commit().await);

        let stored: Ledger = assert_ok!(orm.find_by_id(entry.id).await).expect("entry missing");
        assert_eq!(stored.account_id, alice.id);
        assert_eq!(stored.amount, 2.5);
    }

    #[tokio::test]
    async fn test_joined_rows_hydrate_both_models() {
        let orm = setup().await;

        let mut alice = account("alice", 1.0, 1);
        assert_ok!(orm.save(&mut alice, None).await);
        for amount in [1.25f32, 3.75] {
            let mut entry = Ledger {
                account_id: alice.id,
                amount,
                ..Default::default()
            };
            assert_ok!(orm.save(&mut entry, None).await);
        }

        orm.register::<Account>().expect("register");
        orm.register::<Ledger>().expect("register");
        let fields = assert_ok!(orm.qualified_fields(&["ledgers", "ledgers.accounts"]));

        let db = orm.connection().get_handle().expect("No handle");
        let rows = assert_ok!(
            db.query_with_params(
                &format!(
                    "SELECT {} FROM ledgers JOIN accounts ON accounts.id = ledgers.account_id \
                     WHERE accounts.id = ? ORDER BY ledgers.id",
                    fields
                ),
                &[DatabaseValue::from(alice.id)],
            )
            .await
        );

        assert_eq!(rows.len(), 2);
        for (row, amount) in rows.iter().zip([1.25f32, 3.75]) {
            let entry = Ledger::from_row(row, "ledgers.");
            let owner = Account::from_row(row, "accounts.");
            assert_eq!(entry.amount, amount);
            assert_eq!(owner, alice);
        }
    }

    #[tokio::test]
    async fn test_persist_extension_trait() {
        let orm = setup().await;

        let mut alice = account("alice", 1.0, 1);
        assert_ok!(alice.save(&orm, None).await);
        alice.tier = 7;
        assert_eq!(assert_ok!(alice.update(&orm, None).await), 1);

        let stored: Account = assert_ok!(orm.find_by_id(alice.id).await).expect("row missing");
        assert_eq!(stored.tier, 7);
    }

    #[tokio::test]
    async fn test_statement_logging_enabled() {
        let orm = setup_with(OrmConfig::new(":memory:").with_statement_logging(true)).await;
        let mut alice = account("it's \"quoted\"", 1.0, 1);
        assert_ok!(orm.save(&mut alice, None).await);

        let stored: Account = assert_ok!(orm.find_by_id(alice.id).await).expect("row missing");
        assert_eq!(stored.name, "it's \"quoted\"");
    }

    #[tokio::test]
    async fn test_close_then_use_fails() {
        let orm = setup().await;
        assert_ok!(orm.close().await);
        let err = assert_err!(orm.find_by_id::<Account>(1).await);
        assert!(matches!(err, DatabaseError::NotInitialized));
    }

    #[tokio::test]
    async fn test_find_reads_text_and_epoch_time_columns() {
        let orm = setup().await;
        let db = orm.connection().get_handle().expect("No handle");
        assert_ok!(
            db.execute(
                "INSERT INTO accounts (name, balance, tier, created_at, updated_at) \
                 VALUES ('alice', 1.0, 1, '2019-10-10T09:00:00Z', 1570698000)"
            )
            .await
        );

        let at = DateTime::<Utc>::from_timestamp(1_570_698_000, 0).expect("valid time");
        let stored: Account = assert_ok!(orm.find_by_id(1).await).expect("row missing");
        assert_eq!(stored.created_at, Some(at));
        assert_eq!(stored.updated_at, Some(at));
        assert_eq!(stored.deleted_at, None);
    }

    #[tokio::test]
    async fn test_write_without_guard_during_transaction_is_rejected() {
        let orm = setup().await;

        let tx = assert_ok!(orm.begin().await);
        let mut alice = account("alice", 1.0, 1);
        assert_ok!(orm.save(&mut alice, Some(&tx)).await);

        let mut bob = account("bob", 2.0, 1);
        let err = assert_err!(orm.save(&mut bob, None).await);
        assert!(matches!(err, DatabaseError::TransactionError(_)));
        assert_eq!(bob.id, 0);
        let err = assert_err!(orm.delete("accounts", alice.id, None).await);
        assert!(matches!(err, DatabaseError::TransactionError(_)));

        // reads share the handle and see the open transaction
        let seen: Option<Account> = assert_ok!(orm.find_by_id(alice.id).await);
        assert!(seen.is_some());
        assert_ok!(tx.rollback().await);

        assert_ok!(orm.save(&mut bob, None).await);
        let stored: Option<Account> = assert_ok!(orm.find_by_id(bob.id).await);
        assert_eq!(stored.map(|a| a.name), Some("bob".to_string()));
        assert_eq!(row_count(&orm, "accounts").await, 1);
    }

    #[tokio::test]
    async fn test_save_model_without_columns_inserts_defaults() {
        let orm = setup().await;

        let mut first = Marker::default();
        let mut second = Marker {
            label: "not persisted".into(),
            ..Default::default()
        };
        assert_eq!(assert_ok!(orm.save(&mut first, None).await), 1);
        assert_eq!(assert_ok!(orm.save(&mut second, None).await), 2);
        assert_eq!(row_count(&orm, "markers").await, 2);
    }
}
