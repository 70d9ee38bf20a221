//! Per-cell value coercion.
//!
//! Coercion walks the type lattice and the value tree together, producing
//! typed [`Cell`]s for columnar sinks, typed JSON for the text and
//! warehouse sinks, and `{name, value}` leaf pairs for the flattened
//! shape. A cell that fails its typed parse is logged, counted, and
//! dropped; the run is never aborted by a bad cell.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde_json::{json, Map, Number};
use tracing::warn;
use xmlforge_core::{
    sanitize, value::is_element_key, CoercionError, Field, Kind, SanitizeRules,
    Value, ATTR_PREFIX, TEXT_KEY,
};

/// A sink-ready typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Str(String),
    I32(i32),
    I64(i64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(DateTime<Utc>),
    Decimal { unscaled: i128, precision: u8, scale: u8 },
    List(Vec<Cell>),
    /// Children aligned with the struct's field order; absent children are
    /// `Null`.
    Struct(Vec<Cell>),
}

/// Coerce one record against the full top-level field list. The record
/// fills the cell of its own field; every other field is `Null`.
pub fn record_cells(
    name: &str,
    tree: &Value,
    fields: &[Field],
    dropped: &mut u64,
) -> Vec<Cell> {
    fields
        .iter()
        .map(|field| {
            if field.name == name {
                field_cell(field, std::slice::from_ref(tree), &field.name, dropped)
            } else {
                Cell::Null
            }
        })
        .collect()
}

/// Coerce the occurrence list of one field. Repeated fields become lists
/// (empty occurrence lists are null); plain fields take their first
/// occurrence.
pub fn field_cell(
    field: &Field,
    items: &[Value],
    path: &str,
    dropped: &mut u64,
) -> Cell {
    if field.is_repeated() {
        let elem = field.element_kind();
        let cells: Vec<Cell> = items
            .iter()
            .map(|item| value_cell(elem, item, path, dropped))
            .collect();
        if cells.is_empty() {
            Cell::Null
        } else {
            Cell::List(cells)
        }
    } else {
        match items.first() {
            Some(item) => value_cell(&field.kind, item, path, dropped),
            None => Cell::Null,
        }
    }
}

/// Coerce one value tree against a kind.
pub fn value_cell(
    kind: &Kind,
    value: &Value,
    path: &str,
    dropped: &mut u64,
) -> Cell {
    match kind {
        Kind::Struct(fields) => match value {
            Value::Record(_) => {
                let children = fields
                    .iter()
                    .map(|field| {
                        let child_path = format!("{path}.{}", field.name);
                        struct_child(field, value, &child_path, dropped)
                    })
                    .collect();
                Cell::Struct(children)
            }
            _ => {
                note_drop(path, "struct", value.text().unwrap_or(""), dropped);
                Cell::Null
            }
        },
        Kind::Array(elem) => match value {
            Value::List(items) => {
                if items.is_empty() {
                    Cell::Null
                } else {
                    Cell::List(
                        items
                            .iter()
                            .map(|item| value_cell(elem, item, path, dropped))
                            .collect(),
                    )
                }
            }
            other => Cell::List(vec![value_cell(elem, other, path, dropped)]),
        },
        leaf => match value.text() {
            Some(text) => leaf_cell(leaf, text, path, dropped),
            None => Cell::Null,
        },
    }
}

fn struct_child(
    field: &Field,
    node: &Value,
    path: &str,
    dropped: &mut u64,
) -> Cell {
    match node.get(&field.name) {
        Some(Value::List(items)) => field_cell(field, items, path, dropped),
        Some(leaf @ Value::Text(_)) => {
            // attribute and #text entries sit directly under their key
            field_cell(field, std::slice::from_ref(leaf), path, dropped)
        }
        Some(other) => field_cell(field, std::slice::from_ref(other), path, dropped),
        None => Cell::Null,
    }
}

/// Parse a text value into a leaf cell. Failures are counted and become
/// null.
pub fn leaf_cell(kind: &Kind, text: &str, path: &str, dropped: &mut u64) -> Cell {
    let text = text.trim();
    match kind {
        Kind::Str => return Cell::Str(text.to_string()),
        Kind::I32 => {
            if let Ok(v) = text.parse::<i32>() {
                return Cell::I32(v);
            }
        }
        Kind::I64 => {
            if let Ok(v) = text.parse::<i64>() {
                return Cell::I64(v);
            }
        }
        Kind::F64 => {
            if let Ok(v) = text.parse::<f64>() {
                return Cell::F64(v);
            }
        }
        Kind::Bool => match text {
            "true" => return Cell::Bool(true),
            "false" => return Cell::Bool(false),
            _ => {}
        },
        Kind::Date => {
            if let Ok(v) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
                return Cell::Date(v);
            }
        }
        Kind::Time => {
            if let Ok(v) = NaiveTime::parse_from_str(text, "%H:%M:%S%.f") {
                return Cell::Time(v);
            }
        }
        Kind::Timestamp => {
            if let Some(v) = parse_timestamp(text) {
                return Cell::Timestamp(v);
            }
        }
        Kind::Decimal { precision, scale } => {
            if let Some(unscaled) = parse_decimal(text, *precision, *scale) {
                return Cell::Decimal {
                    unscaled,
                    precision: *precision,
                    scale: *scale,
                };
            }
        }
        Kind::Array(_) | Kind::Struct(_) => {}
    }
    note_drop(path, kind.name(), text, dropped);
    Cell::Null
}

/// Accepted timestamp surface forms: ISO offset / instant, local
/// timestamp with `T`, and the space-separated variant. All normalize
/// to UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(v) = DateTime::parse_from_rfc3339(text) {
        return Some(v.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(v) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&v));
        }
    }
    None
}

/// Parse a decimal literal into its unscaled integer representation.
/// Extra fractional digits are truncated; values exceeding the precision
/// are rejected.
pub fn parse_decimal(text: &str, precision: u8, scale: u8) -> Option<i128> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit())
        || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let mut frac = frac_part.to_string();
    frac.truncate(scale as usize);
    while frac.len() < scale as usize {
        frac.push('0');
    }

    let combined = format!("{int_part}{frac}");
    let unscaled = combined.parse::<i128>().ok()?;
    if unscaled >= 10i128.checked_pow(precision as u32)? {
        return None;
    }
    Some(if negative { -unscaled } else { unscaled })
}

fn note_drop(path: &str, expected: &'static str, raw: &str, dropped: &mut u64) {
    let err = CoercionError {
        path: path.to_string(),
        expected,
        raw: raw.to_string(),
    };
    warn!(%err, "cell dropped");
    *dropped += 1;
}

// ============================================================================
// JSON rendering
// ============================================================================

/// Render a coerced cell as JSON. `widen` applies the warehouse
/// simplification: `I32` widens to 64-bit and decimals become floats.
/// Struct children take their (sanitized) field names from `kind`.
pub fn cell_json(
    cell: &Cell,
    kind: &Kind,
    rules: &SanitizeRules,
    widen: bool,
) -> serde_json::Value {
    match cell {
        Cell::Null => serde_json::Value::Null,
        Cell::Str(s) => json!(s),
        Cell::I32(v) => json!(*v),
        Cell::I64(v) => json!(*v),
        Cell::F64(v) => Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| json!(v.to_string())),
        Cell::Bool(v) => json!(*v),
        Cell::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
        Cell::Time(t) => json!(t.format("%H:%M:%S").to_string()),
        Cell::Timestamp(ts) => json!(ts.to_rfc3339()),
        Cell::Decimal { unscaled, scale, .. } => {
            if widen {
                let value = *unscaled as f64 / 10f64.powi(*scale as i32);
                Number::from_f64(value)
                    .map(serde_json::Value::Number)
                    .unwrap_or_else(|| json!(decimal_string(*unscaled, *scale)))
            } else {
                json!(decimal_string(*unscaled, *scale))
            }
        }
        Cell::List(items) => {
            let elem = match kind {
                Kind::Array(elem) => elem,
                other => other,
            };
            serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| cell_json(item, elem, rules, widen))
                    .collect(),
            )
        }
        Cell::Struct(children) => {
            let Kind::Struct(fields) = kind else {
                return serde_json::Value::Null;
            };
            let mut map = Map::new();
            for (field, child) in fields.iter().zip(children) {
                let key = sanitize(&field.name, rules);
                let elem = field.element_kind();
                map.insert(key, cell_json(child, elem, rules, widen));
            }
            serde_json::Value::Object(map)
        }
    }
}

/// Text rendering of a decimal cell.
pub fn decimal_string(unscaled: i128, scale: u8) -> String {
    if scale == 0 {
        return unscaled.to_string();
    }
    let negative = unscaled < 0;
    let digits = unscaled.unsigned_abs().to_string();
    let scale = scale as usize;
    let (int_part, frac_part) = if digits.len() > scale {
        let split = digits.len() - scale;
        (digits[..split].to_string(), digits[split..].to_string())
    } else {
        ("0".to_string(), format!("{digits:0>scale$}"))
    };
    if negative {
        format!("-{int_part}.{frac_part}")
    } else {
        format!("{int_part}.{frac_part}")
    }
}

/// Render a value tree as JSON following the tree's own structure: record
/// keys (including `@attr` and `#text`) are preserved, child values stay
/// lists, and leaves are typed through the schema where one is known.
/// Leaves that fail their typed parse are stringified and counted.
pub fn tree_json(
    value: &Value,
    kind: Option<&Kind>,
    dropped: &mut u64,
) -> serde_json::Value {
    match value {
        Value::Text(text) => leaf_json(kind, text, dropped),
        Value::List(items) => serde_json::Value::Array(
            items.iter().map(|i| tree_json(i, kind, dropped)).collect(),
        ),
        Value::Record(entries) => {
            let fields = match kind {
                Some(Kind::Struct(fields)) => Some(fields),
                _ => None,
            };
            let mut map = Map::new();
            for (key, child) in entries {
                let child_kind = fields.and_then(|fs| {
                    fs.iter()
                        .find(|f| &f.name == key)
                        .map(Field::element_kind)
                });
                let rendered = match child {
                    Value::Text(text) => {
                        // attributes and #text
                        if key == TEXT_KEY {
                            leaf_json(kind, text, dropped)
                        } else {
                            leaf_json(child_kind, text, dropped)
                        }
                    }
                    other => tree_json(other, child_kind, dropped),
                };
                map.insert(key.clone(), rendered);
            }
            serde_json::Value::Object(map)
        }
    }
}

fn leaf_json(
    kind: Option<&Kind>,
    text: &str,
    dropped: &mut u64,
) -> serde_json::Value {
    let Some(kind) = kind else {
        return json!(text);
    };
    if !kind.is_leaf() {
        return json!(text);
    }
    let mut local_drops = 0u64;
    let cell = leaf_cell(kind, text, "", &mut local_drops);
    if local_drops > 0 {
        // text serializers stringify rather than drop
        *dropped += local_drops;
        return json!(text);
    }
    cell_json(&cell, kind, &SanitizeRules::file(), false)
}

// ============================================================================
// Flattened shape
// ============================================================================

/// Flatten a record into `{name, value}` leaf pairs. Names are the
/// dot-joined path inside the record, attribute markers sanitized to the
/// `attr_` prefix; values keep their raw string form.
pub fn flatten_pairs(name: &str, tree: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    match tree {
        Value::Text(text) => out.push((name.to_string(), text.clone())),
        other => flatten_into("", other, &mut out),
    }
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    match value {
        Value::Text(text) => {
            if !prefix.is_empty() {
                out.push((prefix.to_string(), text.clone()));
            }
        }
        Value::List(items) => {
            for item in items {
                flatten_into(prefix, item, out);
            }
        }
        Value::Record(entries) => {
            for (key, child) in entries {
                if key == TEXT_KEY {
                    if let Some(text) = child.text() {
                        if !prefix.is_empty() {
                            out.push((prefix.to_string(), text.to_string()));
                        }
                    }
                } else if let Some(attr) = key.strip_prefix(ATTR_PREFIX) {
                    let name = join(prefix, &format!("attr_{attr}"));
                    if let Some(text) = child.text() {
                        out.push((name, text.to_string()));
                    }
                } else if is_element_key(key) {
                    flatten_into(&join(prefix, key), child, out);
                }
            }
        }
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, kind: Kind) -> Field {
        Field::new(name, kind)
    }

    #[test]
    fn leaf_parses_each_type() {
        let mut drops = 0;
        assert_eq!(leaf_cell(&Kind::I32, "30", "p", &mut drops), Cell::I32(30));
        assert_eq!(
            leaf_cell(&Kind::I64, "12345678901", "p", &mut drops),
            Cell::I64(12_345_678_901)
        );
        assert_eq!(
            leaf_cell(&Kind::F64, "9.99", "p", &mut drops),
            Cell::F64(9.99)
        );
        assert_eq!(
            leaf_cell(&Kind::Bool, "true", "p", &mut drops),
            Cell::Bool(true)
        );
        assert_eq!(drops, 0);
    }

    #[test]
    fn failed_parse_drops_and_counts() {
        let mut drops = 0;
        assert_eq!(leaf_cell(&Kind::I32, "thirty", "p", &mut drops), Cell::Null);
        assert_eq!(drops, 1);
    }

    #[test]
    fn timestamp_surface_forms_normalize_to_utc() {
        let instant = parse_timestamp("2024-06-01T10:00:00Z").unwrap();
        let offset = parse_timestamp("2024-06-01T12:00:00+02:00").unwrap();
        let local = parse_timestamp("2024-06-01T10:00:00").unwrap();
        let spaced = parse_timestamp("2024-06-01 10:00:00").unwrap();
        assert_eq!(instant, offset);
        assert_eq!(instant, local);
        assert_eq!(instant, spaced);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn decimal_parse_and_render() {
        assert_eq!(parse_decimal("10.50", 10, 2), Some(1050));
        assert_eq!(parse_decimal("10.5", 10, 2), Some(1050));
        assert_eq!(parse_decimal("-3.999", 10, 2), Some(-399));
        assert_eq!(parse_decimal("7", 10, 2), Some(700));
        assert_eq!(parse_decimal("abc", 10, 2), None);
        assert_eq!(
            parse_decimal("123456789012", 10, 2),
            None,
            "precision overflow is rejected"
        );
        assert_eq!(decimal_string(1050, 2), "10.50");
        assert_eq!(decimal_string(-399, 2), "-3.99");
        assert_eq!(decimal_string(7, 0), "7");
        assert_eq!(decimal_string(5, 2), "0.05");
    }

    #[test]
    fn record_cells_fill_only_the_named_field() {
        let fields = vec![field("age", Kind::I32), field("name", Kind::Str)];
        let mut drops = 0;
        let cells =
            record_cells("age", &Value::Text("30".into()), &fields, &mut drops);
        assert_eq!(cells, vec![Cell::I32(30), Cell::Null]);
    }

    #[test]
    fn repeated_field_with_no_occurrences_is_null() {
        let mut f = field("tag", Kind::Str);
        f.repeating = true;
        let mut drops = 0;
        assert_eq!(field_cell(&f, &[], "tag", &mut drops), Cell::Null);
    }

    #[test]
    fn struct_coercion_aligns_children_with_fields() {
        let book = field(
            "book",
            Kind::Struct(vec![
                field("title", Kind::Str),
                field("year", Kind::I32),
                field("missing", Kind::Str),
            ]),
        );
        let mut tree = Value::record();
        tree.push_child("title", Value::Text("Dune".into()));
        tree.push_child("year", Value::Text("1965".into()));
        let mut drops = 0;
        let cell = value_cell(&book.kind, &tree, "book", &mut drops);
        assert_eq!(
            cell,
            Cell::Struct(vec![
                Cell::Str("Dune".into()),
                Cell::I32(1965),
                Cell::Null,
            ])
        );
    }

    #[test]
    fn leaf_extraction_reads_text_from_structs() {
        let mut price = Value::record();
        price.push_attr("currency", "USD".into());
        price.set_text("9.99".into());
        let mut drops = 0;
        assert_eq!(
            value_cell(&Kind::F64, &price, "price", &mut drops),
            Cell::F64(9.99)
        );
    }

    #[test]
    fn tree_json_preserves_single_element_lists() {
        let mut tags = Value::record();
        tags.push_child("tag", Value::Text("c".into()));
        let mut rec = Value::record();
        rec.push_child("tags", tags);
        let mut drops = 0;
        let rendered = tree_json(&rec, None, &mut drops);
        assert_eq!(rendered, json!({"tags": [{"tag": ["c"]}]}));
    }

    #[test]
    fn tree_json_types_leaves_through_the_schema() {
        let kind = Kind::Struct(vec![field("year", Kind::I32)]);
        let mut rec = Value::record();
        rec.push_child("year", Value::Text("1965".into()));
        let mut drops = 0;
        let rendered = tree_json(&rec, Some(&kind), &mut drops);
        assert_eq!(rendered, json!({"year": [1965]}));
    }

    #[test]
    fn tree_json_stringifies_failed_leaves() {
        let kind = Kind::Struct(vec![field("year", Kind::I32)]);
        let mut rec = Value::record();
        rec.push_child("year", Value::Text("unknown".into()));
        let mut drops = 0;
        let rendered = tree_json(&rec, Some(&kind), &mut drops);
        assert_eq!(rendered, json!({"year": ["unknown"]}));
        assert_eq!(drops, 1);
    }

    #[test]
    fn flatten_names_are_dot_joined_paths() {
        let mut contact = Value::record();
        contact.push_child("email", Value::Text("a@b.c".into()));
        let mut price = Value::record();
        price.push_attr("currency", "USD".into());
        price.set_text("9.99".into());
        let mut rec = Value::record();
        rec.push_child("id", Value::Text("1".into()));
        rec.push_child("contact", contact);
        rec.push_child("price", price);

        let pairs = flatten_pairs("user", &rec);
        assert_eq!(
            pairs,
            vec![
                ("id".to_string(), "1".to_string()),
                ("contact.email".to_string(), "a@b.c".to_string()),
                ("price.attr_currency".to_string(), "USD".to_string()),
                ("price".to_string(), "9.99".to_string()),
            ]
        );
    }

    #[test]
    fn flatten_of_a_text_record_uses_the_record_name() {
        let pairs = flatten_pairs("age", &Value::Text("30".into()));
        assert_eq!(pairs, vec![("age".to_string(), "30".to_string())]);
    }

    #[test]
    fn cell_json_widening() {
        let rules = SanitizeRules::warehouse();
        let dec = Cell::Decimal { unscaled: 1050, precision: 10, scale: 2 };
        assert_eq!(
            cell_json(&dec, &Kind::decimal_default(), &rules, true),
            json!(10.5)
        );
        assert_eq!(
            cell_json(&dec, &Kind::decimal_default(), &rules, false),
            json!("10.50")
        );
    }
}
