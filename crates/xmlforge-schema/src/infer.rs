//! Sampling inference: fold sampled records into a field tree.

use xmlforge_core::{value::is_element_key, Field, Kind, Value, ATTR_PREFIX, TEXT_KEY};
use xmlforge_source::InputError;

use crate::merge::merge_fields;
use crate::probe::probe_leaf;

/// Consume up to `limit` records and fold each into the accumulated
/// top-level field set.
pub fn infer_fields<I>(records: I, limit: usize) -> Result<Vec<Field>, InputError>
where
    I: Iterator<Item = Result<(String, Value), InputError>>,
{
    let mut acc: Vec<Field> = Vec::new();
    for result in records.take(limit) {
        let (name, tree) = result?;
        let contributed = field_for_items(&name, std::slice::from_ref(&tree));
        acc = merge_fields(acc, vec![contributed]);
    }
    Ok(acc)
}

/// Build the field for a child element from its occurrence list.
///
/// A list of leaf strings takes its type from the first string and stays
/// unrepeated; a list of trees folds into a `Struct` and is marked
/// repeating. Maps that carry only `#text` and attributes are leaves, and
/// maps with only attributes are `Str`.
pub fn field_for_items(name: &str, items: &[Value]) -> Field {
    let kind = kind_of_items(items);
    let repeating = matches!(kind, Kind::Struct(_));
    Field { name: name.to_string(), kind, nullable: false, repeating }
}

fn kind_of_items(items: &[Value]) -> Kind {
    if let Some(Value::Text(first)) = items.first() {
        if items.iter().all(|v| matches!(v, Value::Text(_))) {
            return probe_leaf(first);
        }
    }
    items
        .iter()
        .map(kind_of_value)
        .reduce(crate::merge::merge_kind)
        .unwrap_or(Kind::Str)
}

fn kind_of_value(value: &Value) -> Kind {
    match value {
        Value::Text(s) => probe_leaf(s),
        Value::List(items) => kind_of_items(items),
        Value::Record(_) => kind_of_record(value),
    }
}

fn kind_of_record(node: &Value) -> Kind {
    if !node.has_element_children() {
        return match node.get(TEXT_KEY).and_then(Value::text) {
            Some(text) => probe_leaf(text),
            None => Kind::Str,
        };
    }
    Kind::Struct(fields_of_record(node))
}

fn fields_of_record(node: &Value) -> Vec<Field> {
    let mut fields = Vec::new();
    for (key, value) in node.entries() {
        if key == TEXT_KEY {
            // children take precedence over interleaved text
            continue;
        }
        if key.starts_with(ATTR_PREFIX) {
            fields.push(Field::new(key.clone(), Kind::Str));
        } else if is_element_key(key) {
            if let Value::List(items) = value {
                fields.push(field_for_items(key, items));
            }
        }
    }
    fields
}
