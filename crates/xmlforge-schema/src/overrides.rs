//! User override application.
//!
//! Overrides run after every other schema source. Paths may be written
//! with slashes (`release/track/isrc`) but are matched on their top-level
//! segment only; deeper traversal is not performed.

use tracing::debug;
use xmlforge_config::InferenceCfg;
use xmlforge_core::{Field, Kind};

pub fn apply_overrides(mut fields: Vec<Field>, cfg: &InferenceCfg) -> Vec<Field> {
    for path in &cfg.force_arrays {
        let key = top_segment(path);
        match fields.iter_mut().find(|f| f.name == key) {
            Some(field) => field.repeating = true,
            None => {
                debug!(path = %path, "force_arrays path matches no field, ignored")
            }
        }
    }

    for (path, type_name) in &cfg.type_hints {
        let key = top_segment(path);
        let kind = Kind::from_type_name(type_name);
        match fields.iter_mut().find(|f| f.name == key) {
            Some(field) => field.kind = kind,
            None => fields.push(Field {
                name: key.to_string(),
                kind,
                nullable: true,
                repeating: false,
            }),
        }
    }

    fields
}

fn top_segment(path: &str) -> &str {
    path.trim_start_matches('/')
        .split('/')
        .next()
        .unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(
        force_arrays: &[&str],
        type_hints: &[(&str, &str)],
    ) -> InferenceCfg {
        InferenceCfg {
            force_arrays: force_arrays.iter().map(|s| s.to_string()).collect(),
            type_hints: type_hints
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..InferenceCfg::default()
        }
    }

    #[test]
    fn force_arrays_sets_repeating_on_existing_fields() {
        let fields = vec![Field::new("book", Kind::Str)];
        let out = apply_overrides(fields, &cfg(&["book"], &[]));
        assert!(out[0].repeating);
    }

    #[test]
    fn force_arrays_ignores_unknown_paths() {
        let fields = vec![Field::new("book", Kind::Str)];
        let out = apply_overrides(fields, &cfg(&["missing"], &[]));
        assert_eq!(out.len(), 1);
        assert!(!out[0].repeating);
    }

    #[test]
    fn type_hints_replace_existing_types() {
        let fields = vec![Field::new("year", Kind::Str)];
        let out = apply_overrides(fields, &cfg(&[], &[("year", "int")]));
        assert_eq!(out[0].kind, Kind::I32);
    }

    #[test]
    fn type_hints_create_missing_fields_nullable() {
        let out = apply_overrides(Vec::new(), &cfg(&[], &[("price", "decimal")]));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, Kind::Decimal { precision: 10, scale: 2 });
        assert!(out[0].nullable);
        assert!(!out[0].repeating);
    }

    #[test]
    fn deep_paths_apply_at_the_top_segment() {
        let fields = vec![Field::new("release", Kind::Str)];
        let out = apply_overrides(fields, &cfg(&["/release/track/isrc"], &[]));
        assert!(out[0].repeating, "only the top segment is matched");
    }
}
