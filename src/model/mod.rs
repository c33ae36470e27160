//! Model declarations
//!
//! A model is a struct persisted in one table. Its column mapping is declared
//! in code, either with the [`model!`](crate::model!) macro or by
//! implementing [`Model`] by hand, so no runtime introspection is needed.

pub mod registry;
pub mod render;

use crate::core::coerce::{safe_string, try_f32, try_f64, try_i64, try_int, try_time, try_u64};
use crate::core::error::{DatabaseError, Result};
use crate::core::value::{DatabaseRow, DatabaseValue};
use chrono::{DateTime, Utc};
use tracing::warn;

pub use registry::ModelRegistry;
pub use render::{bind_fields, escape_string, render_fields, render_value, BoundFields, RenderedFields};

/// Column holding the primary key of every model
pub const ID_COLUMN: &str = "id";
/// Column stamped when a model is first inserted
pub const CREATED_AT_COLUMN: &str = "created_at";
/// Column stamped on every insert and update
pub const UPDATED_AT_COLUMN: &str = "updated_at";
/// Column marking a soft-deleted row
pub const DELETED_AT_COLUMN: &str = "deleted_at";

/// How a field is rendered into SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Signed integer of any width
    Signed,
    /// Unsigned integer of any width
    Unsigned,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Text
    Text,
    /// Optional point in time
    Timestamp,
}

/// Mapping of one struct field to one column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// SQL column name
    pub column: &'static str,
    /// Name of the struct field
    pub field: &'static str,
    /// Declared kind of the field
    pub kind: FieldKind,
}

impl FieldDescriptor {
    /// Create a new descriptor
    pub const fn new(column: &'static str, field: &'static str, kind: FieldKind) -> Self {
        Self {
            column,
            field,
            kind,
        }
    }
}

/// A Rust type that can back a mapped column
pub trait SqlField {
    /// Rendering kind of the type
    const KIND: FieldKind;

    /// Convert the field into a value for rendering or binding
    fn to_value(&self) -> DatabaseValue;

    /// Read the field back from a driver value. Values that cannot be read
    /// as the field type are logged and read as the type's default.
    fn from_value(value: &DatabaseValue) -> Self
    where
        Self: Sized;

    /// Overwrite the field with `at` when it is a timestamp field
    fn assign_timestamp(&mut self, _at: DateTime<Utc>) -> bool {
        false
    }
}

/// Fall back to the default when a driver value cannot be read as `T`
fn or_default<T: Default>(read: Result<T>) -> T {
    read.unwrap_or_else(|err| {
        warn!(error = %err, "unreadable column value, using default");
        T::default()
    })
}

macro_rules! impl_sql_field_int {
    ($kind:ident, $wide:ty, $variant:ident, $read:ident: $($ty:ty),*) => {
        $(
            impl SqlField for $ty {
                const KIND: FieldKind = FieldKind::$kind;

                fn to_value(&self) -> DatabaseValue {
                    DatabaseValue::$variant(<$wide>::from(*self))
                }

                fn from_value(value: &DatabaseValue) -> Self {
                    or_default($read(value).and_then(|wide| {
                        <$ty>::try_from(wide)
                            .map_err(|_| DatabaseError::out_of_range(stringify!($ty), wide))
                    }))
                }
            }
        )*
    };
}

impl_sql_field_int!(Signed, i64, Long, try_i64: i8, i16, i64);
impl_sql_field_int!(Unsigned, u64, ULong, try_u64: u8, u16, u32, u64);

impl SqlField for i32 {
    const KIND: FieldKind = FieldKind::Signed;

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::Long(i64::from(*self))
    }

    fn from_value(value: &DatabaseValue) -> Self {
        or_default(try_int(value))
    }
}

impl SqlField for f32 {
    const KIND: FieldKind = FieldKind::Float32;

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::Float(*self)
    }

    fn from_value(value: &DatabaseValue) -> Self {
        or_default(try_f32(value))
    }
}

impl SqlField for f64 {
    const KIND: FieldKind = FieldKind::Float64;

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::Double(*self)
    }

    fn from_value(value: &DatabaseValue) -> Self {
        or_default(try_f64(value))
    }
}

impl SqlField for String {
    const KIND: FieldKind = FieldKind::Text;

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::String(self.clone())
    }

    fn from_value(value: &DatabaseValue) -> Self {
        safe_string(value)
    }
}

impl SqlField for Option<DateTime<Utc>> {
    const KIND: FieldKind = FieldKind::Timestamp;

    fn to_value(&self) -> DatabaseValue {
        DatabaseValue::from(*self)
    }

    fn from_value(value: &DatabaseValue) -> Self {
        or_default(try_time(value))
    }

    fn assign_timestamp(&mut self, at: DateTime<Utc>) -> bool {
        *self = Some(at);
        true
    }
}

/// A persisted entity
///
/// The primary key lives in the `id` column; `0` means the model has not
/// been inserted yet.
pub trait Model: Send + Sync {
    /// Table the model is stored in
    fn table_name() -> &'static str
    where
        Self: Sized;

    /// Tagged fields in declaration order
    fn descriptors() -> Vec<FieldDescriptor>
    where
        Self: Sized;

    /// Numeric identifier
    fn id(&self) -> u64;

    /// Assign the numeric identifier
    fn set_id(&mut self, id: u64);

    /// Current value of the field mapped to `column`
    fn field_value(&self, column: &str) -> Option<DatabaseValue>;

    /// Set the timestamp field mapped to `column`; false when there is none
    fn set_timestamp(&mut self, column: &str, at: DateTime<Utc>) -> bool;

    /// Build a model from a row whose keys are `prefix` followed by the
    /// column name. Plain column names are accepted as a fallback; missing
    /// columns read as null.
    fn from_row(row: &DatabaseRow, prefix: &str) -> Self
    where
        Self: Sized;
}

/// Look up `column` in `row`, preferring the `prefix`ed alias
#[doc(hidden)]
pub fn row_value<'a>(row: &'a DatabaseRow, prefix: &str, column: &str) -> &'a DatabaseValue {
    const NULL: &DatabaseValue = &DatabaseValue::Null;
    row.get(&format!("{}{}", prefix, column))
        .or_else(|| row.get(column))
        .unwrap_or(NULL)
}

/// Declare a model struct together with its column mapping
///
/// Fields tagged `#[column("name")]` are mapped; untagged fields are left
/// out of every generated statement and take their `Default` when a model is
/// read back. The struct must have an `id: u64` field.
///
/// ```
/// use chrono::{DateTime, Utc};
/// use rust_model_mapper::model;
///
/// model! {
///     #[derive(Debug, Clone, Default)]
///     pub struct User in "users" {
///         #[column("id")] pub id: u64,
///         #[column("name")] pub name: String,
///         pub scratch: String,
///         #[column("created_at")] pub created_at: Option<DateTime<Utc>>,
///     }
/// }
///
/// use rust_model_mapper::model::Model;
/// assert_eq!(User::table_name(), "users");
/// assert_eq!(User::descriptors().len(), 3);
/// ```
#[macro_export]
macro_rules! model {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident in $table:literal {
            $( $(#[column($col:literal)])? $fvis:vis $field:ident : $fty:ty ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $( $fvis $field: $fty, )*
        }

        impl $crate::model::Model for $name {
            fn table_name() -> &'static str {
                $table
            }

            fn descriptors() -> ::std::vec::Vec<$crate::model::FieldDescriptor> {
                ::std::vec![
                    $($(
                        $crate::model::FieldDescriptor::new(
                            $col,
                            stringify!($field),
                            <$fty as $crate::model::SqlField>::KIND,
                        ),
                    )?)*
                ]
            }

            fn id(&self) -> u64 {
                self.id
            }

            fn set_id(&mut self, id: u64) {
                self.id = id;
            }

            fn field_value(&self, column: &str) -> ::std::option::Option<$crate::core::DatabaseValue> {
                match column {
                    $($(
                        $col => ::std::option::Option::Some(
                            $crate::model::SqlField::to_value(&self.$field),
                        ),
                    )?)*
                    _ => ::std::option::Option::None,
                }
            }

            #[allow(unused_variables)]
            fn set_timestamp(&mut self, column: &str, at: $crate::chrono::DateTime<$crate::chrono::Utc>) -> bool {
                match column {
                    $($(
                        $col => $crate::model::SqlField::assign_timestamp(&mut self.$field, at),
                    )?)*
                    _ => false,
                }
            }

            #[allow(unused_variables)]
            fn from_row(row: &$crate::core::DatabaseRow, prefix: &str) -> Self {
                Self {
                    $( $field: $crate::__model_field_from_row!(row, prefix $(, $col)?), )*
                }
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __model_field_from_row {
    ($row:ident, $prefix:ident) => {
        ::std::default::Default::default()
    };
    ($row:ident, $prefix:ident, $col:literal) => {
        $crate::model::SqlField::from_value($crate::model::row_value($row, $prefix, $col))
    };
}
