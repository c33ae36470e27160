//! Coercion helpers for untyped column values
//!
//! Drivers hand back a [`DatabaseValue`] whose variant depends on the column
//! type and on the protocol in use (MySQL's text protocol delivers numbers as
//! bytes, SQLite widens every integer to `i64`). The helpers below read such a
//! value as the type the caller expects.
//!
//! Two families exist:
//!
//! - `try_*` return a [`Result`]: null reads as zero, unparsable text is a
//!   [`DatabaseError::Parse`] and an unexpected variant a
//!   [`DatabaseError::TypeMismatch`].
//! - `safe_*` never return an error. Null and unparsable text read as zero,
//!   so a stored zero and garbage look the same. An unexpected variant means
//!   the caller misjudged the column type and is treated as a bug: they panic.

use super::error::{DatabaseError, Result};
use super::value::DatabaseValue;
use chrono::{DateTime, Days, Months, NaiveDate, NaiveDateTime, Utc};

/// Text layout used for timestamps in SQL literals
pub const SQL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn parse_text<T: std::str::FromStr>(target: &'static str, text: &str) -> Result<T> {
    text.parse::<T>()
        .map_err(|_| DatabaseError::parse(target, text))
}

fn parse_bytes<T: std::str::FromStr>(target: &'static str, bytes: &[u8]) -> Result<T> {
    match std::str::from_utf8(bytes) {
        Ok(text) => parse_text(target, text),
        Err(_) => Err(DatabaseError::parse(
            target,
            String::from_utf8_lossy(bytes).into_owned(),
        )),
    }
}

/// Target type of a numeric coercion
trait Numeric: Sized + Default + std::str::FromStr {
    const NAME: &'static str;

    fn from_integer(v: i128) -> Option<Self>;

    fn from_float(v: f64) -> Option<Self>;
}

macro_rules! integer_targets {
    ($($ty:ty),*) => {
        $(
            impl Numeric for $ty {
                const NAME: &'static str = stringify!($ty);

                fn from_integer(v: i128) -> Option<Self> {
                    <$ty>::try_from(v).ok()
                }

                // Fractions truncate toward zero; NaN and infinities fail the bounds check.
                fn from_float(v: f64) -> Option<Self> {
                    let whole = v.trunc();
                    (whole >= <$ty>::MIN as f64 && whole < <$ty>::MAX as f64 + 1.0)
                        .then_some(whole as $ty)
                }
            }
        )*
    };
}

integer_targets!(u64, i64, i32);

impl Numeric for f32 {
    const NAME: &'static str = "f32";

    fn from_integer(v: i128) -> Option<Self> {
        Some(v as f32)
    }

    fn from_float(v: f64) -> Option<Self> {
        (!v.is_finite() || v.abs() <= f64::from(f32::MAX)).then_some(v as f32)
    }
}

impl Numeric for f64 {
    const NAME: &'static str = "f64";

    fn from_integer(v: i128) -> Option<Self> {
        Some(v as f64)
    }

    fn from_float(v: f64) -> Option<Self> {
        Some(v)
    }
}

fn try_number<T: Numeric>(value: &DatabaseValue) -> Result<T> {
    let integer = |v: i128| T::from_integer(v).ok_or_else(|| DatabaseError::out_of_range(T::NAME, v));
    let float = |v: f64| T::from_float(v).ok_or_else(|| DatabaseError::out_of_range(T::NAME, v));

    match value {
        DatabaseValue::Null => Ok(T::default()),
        DatabaseValue::Short(v) => integer(i128::from(*v)),
        DatabaseValue::UShort(v) => integer(i128::from(*v)),
        DatabaseValue::Int(v) => integer(i128::from(*v)),
        DatabaseValue::UInt(v) => integer(i128::from(*v)),
        DatabaseValue::Long(v) => integer(i128::from(*v)),
        DatabaseValue::ULong(v) => integer(i128::from(*v)),
        DatabaseValue::Float(v) => float(f64::from(*v)),
        DatabaseValue::Double(v) => float(*v),
        DatabaseValue::Bytes(b) => parse_bytes(T::NAME, b),
        DatabaseValue::String(s) => parse_text(T::NAME, s),
        other => Err(DatabaseError::type_mismatch(T::NAME, other.type_name())),
    }
}

macro_rules! numeric_coercions {
    ($($try_fn:ident, $safe_fn:ident => $ty:ty;)*) => {
        $(
            #[doc = concat!("Read a value as `", stringify!($ty), "`, reporting parse failures, overflow and unexpected kinds")]
            pub fn $try_fn(value: &DatabaseValue) -> Result<$ty> {
                try_number(value)
            }

            #[doc = concat!("Read a value as `", stringify!($ty), "`; null, unparsable text and out-of-range numbers read as zero")]
            ///
            /// # Panics
            ///
            /// Panics when the value is neither null, numeric, text nor bytes.
            pub fn $safe_fn(value: &DatabaseValue) -> $ty {
                match $try_fn(value) {
                    Ok(v) => v,
                    Err(DatabaseError::Parse { .. } | DatabaseError::OutOfRange { .. }) => <$ty>::default(),
                    Err(err) => panic!(concat!(stringify!($safe_fn), " unsupported value: {}"), err),
                }
            }
        )*
    };
}

numeric_coercions! {
    try_u64, safe_u64 => u64;
    try_i64, safe_i64 => i64;
    try_int, safe_int => i32;
    try_f32, safe_f32 => f32;
    try_f64, safe_f64 => f64;
}

/// Read any value as text. Never fails: null and bytes that are not UTF-8
/// read as the empty string.
pub fn safe_string(value: &DatabaseValue) -> String {
    match value {
        DatabaseValue::Null => String::new(),
        DatabaseValue::Bool(v) => v.to_string(),
        DatabaseValue::Short(v) => v.to_string(),
        DatabaseValue::UShort(v) => v.to_string(),
        DatabaseValue::Int(v) => v.to_string(),
        DatabaseValue::UInt(v) => v.to_string(),
        DatabaseValue::Long(v) => v.to_string(),
        DatabaseValue::ULong(v) => v.to_string(),
        DatabaseValue::Float(v) => v.to_string(),
        DatabaseValue::Double(v) => v.to_string(),
        DatabaseValue::String(s) => s.clone(),
        DatabaseValue::Bytes(b) => String::from_utf8(b.clone()).unwrap_or_default(),
        DatabaseValue::Timestamp(t) => t.and_utc().to_rfc3339(),
    }
}

/// Parse the text forms a time column may hold: `YYYY-MM-DD HH:MM:SS` with
/// optional fraction, the same with a `T` separator, RFC 3339 (converted to
/// UTC) and a bare date.
pub fn parse_time_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|t| t.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn from_epoch(secs: i64) -> Result<Option<DateTime<Utc>>> {
    DateTime::from_timestamp(secs, 0)
        .map(Some)
        .ok_or_else(|| DatabaseError::out_of_range("timestamp", secs))
}

/// Read a timestamp column, reporting values that hold no time
///
/// Null reads as `None`. Besides timestamps, text in one of the
/// [`parse_time_text`] forms and integer Unix seconds are accepted.
pub fn try_time(value: &DatabaseValue) -> Result<Option<DateTime<Utc>>> {
    match value {
        DatabaseValue::Null => Ok(None),
        DatabaseValue::Timestamp(t) => Ok(Some(t.and_utc())),
        DatabaseValue::String(s) => parse_time_text(s)
            .map(|t| Some(t.and_utc()))
            .ok_or_else(|| DatabaseError::parse("timestamp", s.as_str())),
        DatabaseValue::Bytes(b) => {
            let text = String::from_utf8_lossy(b);
            parse_time_text(&text)
                .map(|t| Some(t.and_utc()))
                .ok_or_else(|| DatabaseError::parse("timestamp", text.into_owned()))
        }
        DatabaseValue::Long(secs) => from_epoch(*secs),
        DatabaseValue::ULong(secs) => {
            let secs = i64::try_from(*secs).map_err(|_| DatabaseError::out_of_range("timestamp", secs))?;
            from_epoch(secs)
        }
        other => Err(DatabaseError::type_mismatch("timestamp", other.type_name())),
    }
}

/// Read a timestamp column. Null reads as `None`.
///
/// # Panics
///
/// Panics when the value is neither null nor a timestamp.
pub fn safe_time(value: &DatabaseValue) -> Option<DateTime<Utc>> {
    match value {
        DatabaseValue::Null => None,
        DatabaseValue::Timestamp(t) => Some(t.and_utc()),
        other => panic!("safe_time unsupported value: {}", other.type_name()),
    }
}

/// Return `t` when present, otherwise now shifted by the given offsets.
///
/// Used for default expirations, e.g. `check_nil_time(expires_at, 1, 0, 0)`
/// is "a year from now" unless an expiry is already set.
pub fn check_nil_time(
    t: Option<DateTime<Utc>>,
    years: i32,
    months: i32,
    days: i32,
) -> DateTime<Utc> {
    match t {
        Some(t) => t,
        None => shift_date(Utc::now(), years, months, days),
    }
}

/// Shift `at` by calendar years, months and days. Month arithmetic clamps
/// to the last day of the target month; out-of-range shifts leave the
/// corresponding component unchanged.
pub fn shift_date(at: DateTime<Utc>, years: i32, months: i32, days: i32) -> DateTime<Utc> {
    let total_months = i64::from(years) * 12 + i64::from(months);
    let month_step = Months::new(u32::try_from(total_months.unsigned_abs()).unwrap_or(u32::MAX));
    let shifted = if total_months >= 0 {
        at.checked_add_months(month_step)
    } else {
        at.checked_sub_months(month_step)
    }
    .unwrap_or(at);

    let day_step = Days::new(u64::from(days.unsigned_abs()));
    if days >= 0 {
        shifted.checked_add_days(day_step)
    } else {
        shifted.checked_sub_days(day_step)
    }
    .unwrap_or(shifted)
}

/// Format a time for a SQL literal: converted to UTC, no time zone suffix.
pub fn sql_time(t: &DateTime<Utc>) -> String {
    t.format(SQL_TIME_FORMAT).to_string()
}
