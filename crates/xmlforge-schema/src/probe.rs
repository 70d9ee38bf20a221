//! The leaf-type probe.
//!
//! A deliberately simple policy surface: the probe decides the primitive
//! type of a text value with a handful of anchored patterns, checked in
//! order. Reimplementations must match this table exactly:
//!
//! | pattern | type |
//! |---|---|
//! | `true` / `false` | Bool |
//! | `-?\d+`, total length ≤ 10 | I32 |
//! | `-?\d+`, longer | I64 |
//! | `-?\d+\.\d+` | F64 |
//! | `\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}.*` | Timestamp |
//! | `\d{4}-\d{2}-\d{2}` | Date |
//! | anything else | Str |

use once_cell::sync::Lazy;
use regex::Regex;
use xmlforge_core::Kind;

static INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").unwrap());
static DEC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+\.\d+$").unwrap());
static TIMESTAMP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}").unwrap()
});
static DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap());

/// Decide the primitive type of a text value.
pub fn probe_leaf(s: &str) -> Kind {
    if s == "true" || s == "false" {
        return Kind::Bool;
    }
    if INT.is_match(s) {
        return if s.len() <= 10 { Kind::I32 } else { Kind::I64 };
    }
    if DEC.is_match(s) {
        return Kind::F64;
    }
    if TIMESTAMP.is_match(s) {
        return Kind::Timestamp;
    }
    if DATE.is_match(s) {
        return Kind::Date;
    }
    Kind::Str
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booleans() {
        assert_eq!(probe_leaf("true"), Kind::Bool);
        assert_eq!(probe_leaf("false"), Kind::Bool);
        assert_eq!(probe_leaf("True"), Kind::Str);
    }

    #[test]
    fn integers_split_on_width() {
        assert_eq!(probe_leaf("30"), Kind::I32);
        assert_eq!(probe_leaf("-42"), Kind::I32);
        assert_eq!(probe_leaf("1234567890"), Kind::I32);
        assert_eq!(probe_leaf("12345678901"), Kind::I64);
        assert_eq!(probe_leaf("-1234567890"), Kind::I64);
    }

    #[test]
    fn floats_dates_timestamps() {
        assert_eq!(probe_leaf("19.99"), Kind::F64);
        assert_eq!(probe_leaf("-0.5"), Kind::F64);
        assert_eq!(probe_leaf("2024-06-01"), Kind::Date);
        assert_eq!(probe_leaf("2024-06-01T12:30:00"), Kind::Timestamp);
        assert_eq!(probe_leaf("2024-06-01T12:30:00.123Z"), Kind::Timestamp);
        assert_eq!(probe_leaf("2024-06-01T12:30:00+02:00"), Kind::Timestamp);
    }

    #[test]
    fn everything_else_is_str() {
        assert_eq!(probe_leaf(""), Kind::Str);
        assert_eq!(probe_leaf("thirty"), Kind::Str);
        assert_eq!(probe_leaf("1.2.3"), Kind::Str);
        assert_eq!(probe_leaf("2024-06"), Kind::Str);
    }

    #[test]
    fn probe_is_idempotent_over_its_own_classes() {
        for s in ["true", "30", "12345678901", "19.99", "2024-06-01", "x"] {
            assert_eq!(probe_leaf(s), probe_leaf(s));
        }
    }
}
