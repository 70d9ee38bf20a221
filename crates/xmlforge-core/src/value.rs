//! The recursive value tree produced by the record extractor.
//!
//! A parsed record is a tree of [`Value`] nodes. Keys inside a record node
//! follow three conventions:
//!
//! - `"@name"` — an attribute of the element, always a [`Value::Text`]
//! - `"#text"` — the element's accumulated character data
//! - any other key — a child element; the value is **always** a
//!   [`Value::List`], even when the child occurred exactly once
//!
//! The always-a-list rule is a hard invariant: downstream inference and
//! coercion never branch on cardinality. An element with neither attributes
//! nor element children collapses to a bare [`Value::Text`] leaf.

/// Prefix marking attribute keys inside a record node.
pub const ATTR_PREFIX: &str = "@";

/// Key under which an element's character data is stored.
pub const TEXT_KEY: &str = "#text";

/// One node of a parsed record.
///
/// `Record` keeps insertion order so that schema iteration matches the
/// first-seen order of the document.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// A leaf: attribute value, text content, or a text-only element.
    Text(String),
    /// The occurrences of a child element, in document order.
    List(Vec<Value>),
    /// An element with attributes and/or element children.
    Record(Vec<(String, Value)>),
}

impl Value {
    /// Empty record node.
    pub fn record() -> Value {
        Value::Record(Vec::new())
    }

    /// Look up an entry of a record node by exact key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Record(entries) => {
                entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
            }
            _ => None,
        }
    }

    /// The `#text` content of this node, if any. A bare [`Value::Text`]
    /// counts as its own text.
    pub fn text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            Value::Record(_) => self.get(TEXT_KEY).and_then(Value::text),
            Value::List(_) => None,
        }
    }

    /// Entries of a record node, in first-seen order. Empty for leaves.
    pub fn entries(&self) -> &[(String, Value)] {
        match self {
            Value::Record(entries) => entries,
            _ => &[],
        }
    }

    /// True when this record node has at least one child-element entry
    /// (an entry that is neither an attribute nor `#text`).
    pub fn has_element_children(&self) -> bool {
        self.entries().iter().any(|(k, _)| is_element_key(k))
    }

    /// Set an attribute entry (`@name`) on a record node.
    pub fn push_attr(&mut self, name: &str, text: String) {
        if let Value::Record(entries) = self {
            entries.push((format!("{ATTR_PREFIX}{name}"), Value::Text(text)));
        }
    }

    /// Append one occurrence of a child element, creating the one-element
    /// list on first sight and extending it afterwards.
    pub fn push_child(&mut self, name: &str, child: Value) {
        let Value::Record(entries) = self else {
            return;
        };
        if let Some((_, Value::List(items))) =
            entries.iter_mut().find(|(k, _)| k == name)
        {
            items.push(child);
        } else {
            entries.push((name.to_string(), Value::List(vec![child])));
        }
    }

    /// Store the trimmed text content under `#text`.
    pub fn set_text(&mut self, text: String) {
        if let Value::Record(entries) = self {
            entries.push((TEXT_KEY.to_string(), Value::Text(text)));
        }
    }
}

/// True for keys that name a child element (not `@attr`, not `#text`).
pub fn is_element_key(key: &str) -> bool {
    !key.starts_with(ATTR_PREFIX) && key != TEXT_KEY
}
