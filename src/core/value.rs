//! Database value types
//!
//! This module defines the untyped values exchanged with drivers: what a
//! backend hands back for a column, and what gets bound to a placeholder.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Database value that can hold different types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DatabaseValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 16-bit signed integer
    Short(i16),
    /// 16-bit unsigned integer
    UShort(u16),
    /// 32-bit integer
    Int(i32),
    /// 32-bit unsigned integer
    UInt(u32),
    /// 64-bit integer
    Long(i64),
    /// 64-bit unsigned integer
    ULong(u64),
    /// 32-bit floating point
    Float(f32),
    /// 64-bit floating point
    Double(f64),
    /// String value
    String(String),
    /// Binary data, also how text-protocol drivers deliver numbers
    Bytes(Vec<u8>),
    /// Timestamp without time zone, interpreted as UTC
    Timestamp(NaiveDateTime),
}

impl DatabaseValue {
    /// Get the value as a string slice (zero-copy for String values)
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DatabaseValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Check if the value is one of the numeric variants
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DatabaseValue::Short(_)
                | DatabaseValue::UShort(_)
                | DatabaseValue::Int(_)
                | DatabaseValue::UInt(_)
                | DatabaseValue::Long(_)
                | DatabaseValue::ULong(_)
                | DatabaseValue::Float(_)
                | DatabaseValue::Double(_)
        )
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "null",
            DatabaseValue::Bool(_) => "bool",
            DatabaseValue::Short(_) => "short",
            DatabaseValue::UShort(_) => "ushort",
            DatabaseValue::Int(_) => "int",
            DatabaseValue::UInt(_) => "uint",
            DatabaseValue::Long(_) => "long",
            DatabaseValue::ULong(_) => "ulong",
            DatabaseValue::Float(_) => "float",
            DatabaseValue::Double(_) => "double",
            DatabaseValue::String(_) => "string",
            DatabaseValue::Bytes(_) => "bytes",
            DatabaseValue::Timestamp(_) => "timestamp",
        }
    }
}

macro_rules! impl_from_primitive {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for DatabaseValue {
                fn from(v: $ty) -> Self {
                    DatabaseValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_primitive! {
    bool => Bool,
    i16 => Short,
    u16 => UShort,
    i32 => Int,
    u32 => UInt,
    i64 => Long,
    u64 => ULong,
    f32 => Float,
    f64 => Double,
    String => String,
    Vec<u8> => Bytes,
    NaiveDateTime => Timestamp,
}

impl From<&str> for DatabaseValue {
    fn from(v: &str) -> Self {
        DatabaseValue::String(v.to_string())
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(v: DateTime<Utc>) -> Self {
        DatabaseValue::Timestamp(v.naive_utc())
    }
}

impl<T: Into<DatabaseValue>> From<Option<T>> for DatabaseValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(val) => val.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// A row of database results (column name -> value mapping)
pub type DatabaseRow = HashMap<String, DatabaseValue>;

/// Multiple rows returned from a query
pub type DatabaseResult = Vec<DatabaseRow>;
