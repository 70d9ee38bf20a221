//! Identifier sanitization for sink targets.
//!
//! One pure function parameterized by per-target rules, plus a
//! collision-aware namer so every sink resolves duplicate sanitized names
//! the same way (`_1`, `_2`, ... suffixes) instead of each inventing its
//! own scheme.

use std::collections::HashSet;

/// Per-target sanitization rules.
#[derive(Debug, Clone, Default)]
pub struct SanitizeRules {
    /// Hard cap on identifier length, in bytes, after cleaning.
    pub max_len: Option<usize>,
    /// Lowercase the result.
    pub lowercase: bool,
}

impl SanitizeRules {
    /// Relational targets: 63-byte identifier cap, lowercased.
    pub fn relational() -> SanitizeRules {
        SanitizeRules { max_len: Some(63), lowercase: true }
    }

    /// Warehouse targets: 128-byte cap, case preserved.
    pub fn warehouse() -> SanitizeRules {
        SanitizeRules { max_len: Some(128), lowercase: false }
    }

    /// File targets: no cap, case preserved.
    pub fn file() -> SanitizeRules {
        SanitizeRules { max_len: None, lowercase: false }
    }
}

/// Sanitize `name` for a target. Deterministic and idempotent:
/// `sanitize(sanitize(x)) == sanitize(x)` for any input.
///
/// A leading `@` (attribute marker) becomes the `attr_` prefix, `#` is
/// dropped, any other character outside `[A-Za-z0-9_]` becomes `_`,
/// leading/trailing underscores are stripped, then the length cap and
/// lowercasing apply. An input that cleans to nothing yields `"field"`.
pub fn sanitize(name: &str, rules: &SanitizeRules) -> String {
    let (prefix, rest) = match name.strip_prefix('@') {
        Some(rest) => ("attr_", rest),
        None => ("", name),
    };

    let mut out = String::with_capacity(prefix.len() + rest.len());
    out.push_str(prefix);
    for ch in rest.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else if ch != '#' {
            out.push('_');
        }
    }

    let mut out = out.trim_matches('_').to_string();
    if let Some(max) = rules.max_len {
        if out.len() > max {
            out.truncate(max);
            out = out.trim_end_matches('_').to_string();
        }
    }
    if rules.lowercase {
        out = out.to_ascii_lowercase();
    }
    if out.is_empty() {
        out.push_str("field");
    }
    out
}

/// Assigns unique sanitized column names for a run.
///
/// When two distinct source names collide after sanitization, the later one
/// takes the first unused numeric suffix. The suffix always fits inside the
/// length cap: the base is shortened to make room, so even long truncated
/// prefixes stay unique. Assignments are stable for the namer's lifetime.
#[derive(Debug)]
pub struct ColumnNamer {
    rules: SanitizeRules,
    used: HashSet<String>,
}

impl ColumnNamer {
    pub fn new(rules: SanitizeRules) -> ColumnNamer {
        ColumnNamer { rules, used: HashSet::new() }
    }

    /// Assign a unique column name for `source`.
    pub fn assign(&mut self, source: &str) -> String {
        let base = sanitize(source, &self.rules);
        if self.used.insert(base.clone()) {
            return base;
        }
        let mut n = 1usize;
        loop {
            let suffix = format!("_{n}");
            let mut candidate = base.clone();
            if let Some(max) = self.rules.max_len {
                let keep = max.saturating_sub(suffix.len());
                candidate.truncate(keep);
            }
            candidate.push_str(&suffix);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_marker_becomes_prefix() {
        let rules = SanitizeRules::file();
        assert_eq!(sanitize("@currency", &rules), "attr_currency");
    }

    #[test]
    fn hash_dropped_and_forbidden_replaced() {
        let rules = SanitizeRules::file();
        assert_eq!(sanitize("#text", &rules), "text");
        assert_eq!(sanitize("release-id.v2", &rules), "release_id_v2");
    }

    #[test]
    fn leading_and_trailing_underscores_stripped() {
        let rules = SanitizeRules::file();
        assert_eq!(sanitize("__name__", &rules), "name");
        assert_eq!(sanitize("---", &rules), "field");
    }

    #[test]
    fn idempotent_for_every_target() {
        for rules in
            [SanitizeRules::file(), SanitizeRules::warehouse(), SanitizeRules::relational()]
        {
            for name in ["@Currency", "#text", "Very-Weird Name!", "plain", "__x__"] {
                let once = sanitize(name, &rules);
                assert_eq!(sanitize(&once, &rules), once, "input {name:?}");
            }
        }
    }

    #[test]
    fn relational_rules_cap_and_lowercase() {
        let rules = SanitizeRules::relational();
        let long = "A".repeat(80);
        let out = sanitize(&long, &rules);
        assert_eq!(out.len(), 63);
        assert!(out.chars().all(|c| c == 'a'));
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let mut namer = ColumnNamer::new(SanitizeRules::relational());
        assert_eq!(namer.assign("Name"), "name");
        assert_eq!(namer.assign("name"), "name_1");
        assert_eq!(namer.assign("NAME"), "name_2");
    }

    #[test]
    fn suffix_fits_inside_the_cap() {
        let mut namer = ColumnNamer::new(SanitizeRules::relational());
        let long = "b".repeat(80);
        let first = namer.assign(&long);
        let second = namer.assign(&long);
        assert_eq!(first.len(), 63);
        assert_eq!(second.len(), 63);
        assert!(second.ends_with("_1"));
        assert_ne!(first, second);
    }
}
