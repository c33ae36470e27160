//! Model metadata registry
//!
//! Keeps the field descriptors of every known table, plus a cache of the
//! qualified select lists built from them. A registry is an ordinary owned
//! value; share it behind the [`Orm`](crate::orm::Orm) that owns it.

use super::{FieldDescriptor, Model};
use crate::core::error::{DatabaseError, Result};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Descriptor list shared between the registry and its callers
pub type Descriptors = Arc<[FieldDescriptor]>;

/// Table name -> field descriptors, with a select-list cache
///
/// Registering a table again replaces its entry wholesale. A model used
/// before it was registered is registered on first use, so the first type
/// seen for a table name defines that table until it is registered again.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    tables: RwLock<HashMap<String, Descriptors>>,
    qualified: RwLock<HashMap<String, Arc<str>>>,
}

impl ModelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-register) model `M`
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::DuplicateColumn`] when two fields of `M` map
    /// to the same column.
    pub fn register<M: Model>(&self) -> Result<Descriptors> {
        self.register_table(M::table_name(), M::descriptors())
    }

    /// Register a descriptor list under `table`, replacing any previous entry
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::DuplicateColumn`] when a column name repeats.
    pub fn register_table(
        &self,
        table: &str,
        descriptors: Vec<FieldDescriptor>,
    ) -> Result<Descriptors> {
        let descriptors = validate(table, descriptors)?;
        self.tables
            .write()
            .insert(table.to_string(), Arc::clone(&descriptors));
        // select lists built from the previous entry are stale now
        self.qualified.write().clear();
        debug!(table, fields = descriptors.len(), "registered model");
        Ok(descriptors)
    }

    /// Descriptors of `M`, registering it first if its table is unknown
    pub fn descriptors_for<M: Model>(&self) -> Result<Descriptors> {
        let table = M::table_name();
        if let Some(descriptors) = self.tables.read().get(table) {
            return Ok(Arc::clone(descriptors));
        }

        let descriptors = validate(table, M::descriptors())?;
        let mut tables = self.tables.write();
        // another caller may have registered the table in the meantime
        let entry = tables
            .entry(table.to_string())
            .or_insert_with(|| {
                debug!(table, fields = descriptors.len(), "registered model on first use");
                descriptors
            });
        Ok(Arc::clone(entry))
    }

    /// Descriptors registered under `table`
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::TableNotFound`] for an unknown table.
    pub fn descriptors(&self, table: &str) -> Result<Descriptors> {
        self.tables
            .read()
            .get(table)
            .cloned()
            .ok_or_else(|| DatabaseError::TableNotFound(table.to_string()))
    }

    /// Check whether `table` has been registered
    pub fn is_registered(&self, table: &str) -> bool {
        self.tables.read().contains_key(table)
    }

    /// Names of all registered tables, sorted
    pub fn tables(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Build the select list for one or more qualified table names
    ///
    /// Each name is a dotted path of tables (`"orders.customer"`). The last
    /// segment names the table whose columns are listed; the alias prefix is
    /// the path without its first segment, or the whole name when it has a
    /// single segment. Every column becomes `<table>.<col> AS "<prefix>.<col>"`.
    /// Results are cached per qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::TableNotFound`] when a leaf table has not been
    /// registered.
    pub fn qualified_fields<S: AsRef<str>>(&self, qualified_names: &[S]) -> Result<String> {
        let mut parts = Vec::with_capacity(qualified_names.len());
        for name in qualified_names {
            let name = name.as_ref();
            let cached = self.qualified.read().get(name).cloned();
            let fields = match cached {
                Some(fields) => fields,
                None => {
                    // built under the cache lock; register_table clears the
                    // cache only after its descriptors are in place
                    let mut cache = self.qualified.write();
                    match cache.get(name) {
                        Some(fields) => Arc::clone(fields),
                        None => {
                            let fields: Arc<str> = self.chained_fields(name)?.into();
                            cache.insert(name.to_string(), Arc::clone(&fields));
                            fields
                        }
                    }
                }
            };
            if !fields.is_empty() {
                parts.push(fields);
            }
        }
        Ok(parts.join(", "))
    }

    fn chained_fields(&self, qualified_name: &str) -> Result<String> {
        let path: Vec<&str> = qualified_name.split('.').collect();
        let table = path.last().copied().unwrap_or(qualified_name);
        let prefix = if path.len() > 1 {
            path[1..].join(".")
        } else {
            qualified_name.to_string()
        };

        let descriptors = self.descriptors(table)?;
        Ok(descriptors
            .iter()
            .map(|d| format!("{}.{} AS \"{}.{}\"", table, d.column, prefix, d.column))
            .collect::<Vec<_>>()
            .join(", "))
    }
}

fn validate(table: &str, descriptors: Vec<FieldDescriptor>) -> Result<Descriptors> {
    let mut seen = HashSet::with_capacity(descriptors.len());
    for descriptor in &descriptors {
        if !seen.insert(descriptor.column) {
            return Err(DatabaseError::DuplicateColumn {
                table: table.to_string(),
                column: descriptor.column.to_string(),
            });
        }
    }
    Ok(descriptors.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::fixtures::{Account, Ledger, Untagged};
    use crate::model::FieldKind;

    #[test]
    fn test_register_and_lookup() {
        let registry = ModelRegistry::new();
        assert!(!registry.is_registered("accounts"));

        registry.register::<Account>().unwrap();
        assert!(registry.is_registered("accounts"));
        assert_eq!(registry.descriptors("accounts").unwrap().len(), 7);
        assert_eq!(registry.tables(), vec!["accounts".to_string()]);

        let err = registry.descriptors("missing").unwrap_err();
        assert!(matches!(err, DatabaseError::TableNotFound(_)));
    }

    #[test]
    fn test_lazy_registration_on_first_use() {
        let registry = ModelRegistry::new();
        let descriptors = registry.descriptors_for::<Ledger>().unwrap();
        assert_eq!(descriptors.len(), 6);
        assert!(registry.is_registered("ledgers"));
    }

    #[test]
    fn test_untagged_model_registers_empty() {
        let registry = ModelRegistry::new();
        assert!(registry.register::<Untagged>().unwrap().is_empty());
        assert_eq!(registry.qualified_fields(&["untagged"]).unwrap(), "");
    }

    #[test]
    fn test_reregistration_overwrites() {
        let registry = ModelRegistry::new();
        registry.register::<Account>().unwrap();
        assert!(registry.qualified_fields(&["accounts"]).unwrap().contains("tier"));

        registry
            .register_table(
                "accounts",
                vec![FieldDescriptor::new("id", "id", FieldKind::Unsigned)],
            )
            .unwrap();
        assert_eq!(registry.descriptors("accounts").unwrap().len(), 1);
        assert_eq!(
            registry.qualified_fields(&["accounts"]).unwrap(),
            "accounts.id AS \"accounts.id\""
        );
    }

    #[test]
    fn test_duplicate_columns_rejected() {
        let registry = ModelRegistry::new();
        let err = registry
            .register_table(
                "dupes",
                vec![
                    FieldDescriptor::new("name", "first", FieldKind::Text),
                    FieldDescriptor::new("name", "second", FieldKind::Text),
                ],
            )
            .unwrap_err();
        assert!(matches!(err, DatabaseError::DuplicateColumn { .. }));
        assert!(!registry.is_registered("dupes"));
    }

    #[test]
    fn test_qualified_fields_for_two_tables() {
        let registry = ModelRegistry::new();
        registry.register::<Account>().unwrap();
        registry.register::<Ledger>().unwrap();

        let list = registry.qualified_fields(&["accounts", "ledgers"]).unwrap();
        let entries: Vec<&str> = list.split(", ").collect();
        assert_eq!(entries.len(), 7 + 6);

        let unique: HashSet<&str> = entries.iter().copied().collect();
        assert_eq!(unique.len(), entries.len());

        assert!(entries.contains(&"accounts.name AS \"accounts.name\""));
        assert!(entries.contains(&"ledgers.amount AS \"ledgers.amount\""));
    }

    #[test]
    fn test_qualified_fields_nested_path() {
        let registry = ModelRegistry::new();
        registry.register::<Account>().unwrap();

        let list = registry.qualified_fields(&["ledgers.accounts"]).unwrap();
        assert!(list.starts_with("accounts.id AS \"accounts.id\""));

        registry.register::<Ledger>().unwrap();
        let list = registry.qualified_fields(&["accounts.ledgers.accounts"]).unwrap();
        assert!(list.contains("accounts.name AS \"ledgers.accounts.name\""));
    }

    #[test]
    fn test_concurrent_first_use_sees_one_registration() {
        let registry = ModelRegistry::new();

        let seen: Vec<(Descriptors, String)> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        let descriptors = registry.descriptors_for::<Account>().unwrap();
                        let list = registry.qualified_fields(&["accounts"]).unwrap();
                        (descriptors, list)
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        let (first, first_list) = &seen[0];
        assert_eq!(first.len(), 7);
        for (descriptors, list) in &seen {
            assert!(Arc::ptr_eq(first, descriptors));
            assert_eq!(list, first_list);
        }
        assert_eq!(registry.tables(), vec!["accounts".to_string()]);
    }

    #[test]
    fn test_cached_list_follows_concurrent_reregistration() {
        let registry = ModelRegistry::new();
        registry.register::<Account>().unwrap();
        let id_only = || vec![FieldDescriptor::new("id", "id", FieldKind::Unsigned)];

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..200 {
                        registry.qualified_fields(&["accounts"]).unwrap();
                    }
                });
            }
            scope.spawn(|| {
                for round in 0..200 {
                    if round % 2 == 0 {
                        registry.register::<Account>().unwrap();
                    } else {
                        registry.register_table("accounts", id_only()).unwrap();
                    }
                }
            });
        });

        // the last registration wins, and no list built from an earlier one survives
        assert_eq!(registry.descriptors("accounts").unwrap().len(), 1);
        assert_eq!(
            registry.qualified_fields(&["accounts"]).unwrap(),
            "accounts.id AS \"accounts.id\""
        );
    }

    #[test]
    fn test_qualified_fields_unknown_table() {
        let registry = ModelRegistry::new();
        let err = registry.qualified_fields(&["nowhere"]).unwrap_err();
        assert!(matches!(err, DatabaseError::TableNotFound(_)));
    }
}
