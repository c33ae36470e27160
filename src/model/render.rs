//! Field/value serialization
//!
//! Turns a model into column -> value maps. [`render_fields`] produces SQL
//! literal text; [`bind_fields`] produces the same values ready for
//! parameter binding, which is what statements are executed with.
//!
//! Literal text is only as safe as [`escape_string`]. Never splice rendered
//! literals into SQL that reaches the server; use them for logging and
//! inspection.

use super::registry::ModelRegistry;
use super::Model;
use crate::core::coerce::SQL_TIME_FORMAT;
use crate::core::error::Result;
use crate::core::value::DatabaseValue;
use chrono::Timelike;
use indexmap::IndexMap;
use tracing::warn;

/// Column -> SQL literal text, in descriptor order
pub type RenderedFields = IndexMap<&'static str, String>;

/// Column -> value to bind, in descriptor order
pub type BoundFields = IndexMap<&'static str, DatabaseValue>;

/// Replacements applied by [`escape_string`], in order. Backslash goes first
/// so later substitutions are not escaped twice.
const ESCAPES: [(&str, &str); 7] = [
    ("\\", "\\\\"),
    ("'", "\\'"),
    ("\\0", "\\\\0"),
    ("\n", "\\n"),
    ("\r", "\\r"),
    ("\"", "\\\""),
    ("\x1a", "\\Z"),
];

/// Escape a string for use inside a quoted MySQL literal
pub fn escape_string(value: &str) -> String {
    ESCAPES
        .iter()
        .fold(value.to_string(), |acc, (from, to)| acc.replace(from, to))
}

fn quote(value: &str) -> String {
    format!("\"{}\"", escape_string(value))
}

/// Render one value as SQL literal text
///
/// Integers print in decimal, floats with exactly two decimals, text and
/// bytes quoted and escaped, timestamps quoted as `YYYY-MM-DD HH:MM:SS`
/// and null as `null`.
pub fn render_value(value: &DatabaseValue) -> String {
    match value {
        DatabaseValue::Null => "null".to_string(),
        DatabaseValue::Bool(v) => String::from(if *v { "1" } else { "0" }),
        DatabaseValue::Short(v) => v.to_string(),
        DatabaseValue::UShort(v) => v.to_string(),
        DatabaseValue::Int(v) => v.to_string(),
        DatabaseValue::UInt(v) => v.to_string(),
        DatabaseValue::Long(v) => v.to_string(),
        DatabaseValue::ULong(v) => v.to_string(),
        DatabaseValue::Float(v) => format!("{:.2}", v),
        DatabaseValue::Double(v) => format!("{:.2}", v),
        DatabaseValue::String(s) => quote(s),
        DatabaseValue::Bytes(b) => quote(&String::from_utf8_lossy(b)),
        DatabaseValue::Timestamp(t) => format!("\"{}\"", t.format(SQL_TIME_FORMAT)),
    }
}

/// Normalize a model value to what its literal rendering would store:
/// floats keep two decimals, timestamps whole seconds.
fn bind_value(value: DatabaseValue) -> DatabaseValue {
    match value {
        DatabaseValue::Float(v) => {
            DatabaseValue::Float(format!("{:.2}", v).parse().unwrap_or(v))
        }
        DatabaseValue::Double(v) => {
            DatabaseValue::Double(format!("{:.2}", v).parse().unwrap_or(v))
        }
        DatabaseValue::Timestamp(t) => {
            DatabaseValue::Timestamp(t.with_nanosecond(0).unwrap_or(t))
        }
        other => other,
    }
}

fn collect_fields<M, T>(
    registry: &ModelRegistry,
    model: &M,
    convert: impl Fn(DatabaseValue) -> T,
) -> Result<IndexMap<&'static str, T>>
where
    M: Model,
{
    let descriptors = registry.descriptors_for::<M>()?;
    let mut fields = IndexMap::with_capacity(descriptors.len());
    for descriptor in descriptors.iter() {
        match model.field_value(descriptor.column) {
            Some(value) => {
                fields.insert(descriptor.column, convert(value));
            }
            None => warn!(
                table = M::table_name(),
                column = descriptor.column,
                "registered column not exposed by model, skipped"
            ),
        }
    }
    Ok(fields)
}

/// Render every mapped field of `model` as SQL literal text
///
/// Registers the model on first use.
pub fn render_fields<M: Model>(registry: &ModelRegistry, model: &M) -> Result<RenderedFields> {
    collect_fields(registry, model, |value| render_value(&value))
}

/// Collect every mapped field of `model` as a value to bind
///
/// Registers the model on first use.
pub fn bind_fields<M: Model>(registry: &ModelRegistry, model: &M) -> Result<BoundFields> {
    collect_fields(registry, model, bind_value)
}
