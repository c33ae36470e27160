//! Property-based tests for rendering, coercion and the model registry

use proptest::prelude::*;
use rust_model_mapper::core::coerce::{
    safe_i64, safe_int, safe_string, safe_u64, shift_date, try_int, try_u64,
};
use rust_model_mapper::model::{escape_string, render_fields, render_value};
use rust_model_mapper::prelude::*;
use std::collections::HashSet;

model! {
    #[derive(Debug, Clone, Default)]
    pub struct Profile in "profiles" {
        #[column("id")] pub id: u64,
        #[column("handle")] pub handle: String,
        pub cache: String,
        #[column("score")] pub score: f64,
        #[column("rank")] pub level: i16,
        #[column("seen_at")] pub seen_at: Option<DateTime<Utc>>,
    }
}

model! {
    #[derive(Debug, Clone, Default)]
    pub struct Session in "sessions" {
        #[column("id")] pub id: u64,
        #[column("profile_id")] pub profile_id: u64,
        #[column("token")] pub token: String,
    }
}

// ============================================================================
// Escaping
// ============================================================================

proptest! {
    /// Text without special characters is left untouched
    #[test]
    fn test_escape_plain_identity(value in "[a-zA-Z0-9 _.,-]*") {
        prop_assert_eq!(escape_string(&value), value);
    }

    /// Every quote in the output is escaped, and none are lost
    #[test]
    fn test_escape_quotes(value in ".*") {
        let escaped = escape_string(&value);
        let bytes = escaped.as_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if *b == b'\'' || *b == b'"' {
                prop_assert!(i > 0 && bytes[i - 1] == b'\\');
            }
        }
        prop_assert_eq!(
            escaped.matches('\'').count(),
            value.matches('\'').count()
        );
        prop_assert!(!escaped.contains('\n'));
        prop_assert!(escaped.len() >= value.len());
    }
}

// ============================================================================
// Rendering
// ============================================================================

proptest! {
    /// One rendered entry per tagged field, whatever the values
    #[test]
    fn test_render_count_matches_tags(
        handle in ".*",
        score in any::<f64>().prop_filter("finite", |v| v.is_finite()),
        level in any::<i16>(),
        id in any::<u64>(),
    ) {
        let registry = ModelRegistry::new();
        let profile = Profile { id, handle, cache: "x".into(), score, level, seen_at: None };

        let rendered = render_fields(&registry, &profile).unwrap();
        prop_assert_eq!(rendered.len(), Profile::descriptors().len());
        prop_assert_eq!(rendered.len(), 5);
        prop_assert_eq!(&rendered["id"], &id.to_string());
        prop_assert_eq!(&rendered["rank"], &level.to_string());
        prop_assert_eq!(&rendered["seen_at"], "null");
    }

    /// Floats always render with exactly two decimals
    #[test]
    fn test_float_two_decimals(value in -1.0e12f64..1.0e12) {
        let text = render_value(&DatabaseValue::Double(value));
        let (_, decimals) = text.split_once('.').unwrap();
        prop_assert_eq!(decimals.len(), 2);
    }
}

// ============================================================================
// Registry
// ============================================================================

proptest! {
    /// The qualified list names every descriptor of every table exactly once
    #[test]
    fn test_qualified_fields_count(order in prop::sample::subsequence(vec!["profiles", "sessions"], 1..=2)) {
        let registry = ModelRegistry::new();
        registry.register::<Profile>().unwrap();
        registry.register::<Session>().unwrap();

        let list = registry.qualified_fields(order.as_slice()).unwrap();
        let entries: Vec<&str> = list.split(", ").collect();
        let expected: usize = order
            .iter()
            .map(|table| registry.descriptors(table).unwrap().len())
            .sum();
        prop_assert_eq!(entries.len(), expected);

        let unique: HashSet<&str> = entries.iter().copied().collect();
        prop_assert_eq!(unique.len(), entries.len());
        for entry in entries {
            prop_assert!(entry.contains(" AS \""));
        }
    }
}

// ============================================================================
// Coercion
// ============================================================================

proptest! {
    /// Numbers delivered as text read back as the same number
    #[test]
    fn test_text_numbers_coerce(value in any::<u64>(), signed in any::<i64>()) {
        prop_assert_eq!(safe_u64(&DatabaseValue::Bytes(value.to_string().into_bytes())), value);
        prop_assert_eq!(safe_u64(&DatabaseValue::String(value.to_string())), value);
        prop_assert_eq!(safe_i64(&DatabaseValue::String(signed.to_string())), signed);
    }

    /// Numbers convert only when the target type can hold them
    #[test]
    fn test_numbers_convert_within_range(value in any::<i64>()) {
        match i32::try_from(value) {
            Ok(narrow) => prop_assert_eq!(try_int(&DatabaseValue::Long(value)).ok(), Some(narrow)),
            Err(_) => prop_assert!(try_int(&DatabaseValue::Long(value)).is_err()),
        }
        prop_assert_eq!(try_u64(&DatabaseValue::Long(value)).is_ok(), value >= 0);
    }

    /// Text that is not a number reads as zero
    #[test]
    fn test_unparsable_text_is_zero(value in "[a-z]+") {
        prop_assert_eq!(safe_int(&DatabaseValue::String(value.clone())), 0);
        prop_assert_eq!(safe_string(&DatabaseValue::String(value.clone())), value);
    }

    /// Zero offsets leave the date unchanged
    #[test]
    fn test_shift_by_nothing(secs in 0i64..4_000_000_000) {
        let at = DateTime::<Utc>::from_timestamp(secs, 0).unwrap();
        prop_assert_eq!(shift_date(at, 0, 0, 0), at);
    }
}
