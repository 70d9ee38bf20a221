//! The type lattice and schema types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Every value in the system has one of these types. Only `Struct` and
/// `Array` are recursive; the rest are leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Kind {
    Str,
    I32,
    I64,
    F64,
    Bool,
    Date,
    Time,
    Timestamp,
    Decimal { precision: u8, scale: u8 },
    Array(Box<Kind>),
    Struct(Vec<Field>),
}

impl Kind {
    /// Default decimal used when a declaration gives no precision.
    pub fn decimal_default() -> Kind {
        Kind::Decimal { precision: 10, scale: 2 }
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, Kind::Array(_) | Kind::Struct(_))
    }

    /// Map a declared type name onto the lattice. The table is total:
    /// unknown names collapse to `Str`. Used both by the XSD parser and by
    /// user type hints, so the two surfaces can never disagree.
    pub fn from_type_name(name: &str) -> Kind {
        match name {
            "string" => Kind::Str,
            "int" | "integer" => Kind::I32,
            "long" => Kind::I64,
            "float" | "double" => Kind::F64,
            "boolean" => Kind::Bool,
            "date" => Kind::Date,
            "time" => Kind::Time,
            "dateTime" => Kind::Timestamp,
            "decimal" => Kind::decimal_default(),
            _ => Kind::Str,
        }
    }

    /// Short lowercase name, used in diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Str => "str",
            Kind::I32 => "i32",
            Kind::I64 => "i64",
            Kind::F64 => "f64",
            Kind::Bool => "bool",
            Kind::Date => "date",
            Kind::Time => "time",
            Kind::Timestamp => "timestamp",
            Kind::Decimal { .. } => "decimal",
            Kind::Array(_) => "array",
            Kind::Struct(_) => "struct",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Decimal { precision, scale } => {
                write!(f, "decimal({precision},{scale})")
            }
            Kind::Array(elem) => write!(f, "array<{elem}>"),
            Kind::Struct(fields) => {
                write!(f, "struct{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.kind)?;
                }
                write!(f, "}}")
            }
            other => f.write_str(other.name()),
        }
    }
}

/// One named slot of a record shape.
///
/// `repeating` means "this element can occur more than once" and is
/// orthogonal to `Kind::Array`; a field materializes as a repeated column
/// when either holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub kind: Kind,
    pub nullable: bool,
    pub repeating: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: Kind) -> Field {
        Field { name: name.into(), kind, nullable: false, repeating: false }
    }

    /// Whether this field materializes as a repeated column.
    pub fn is_repeated(&self) -> bool {
        self.repeating || matches!(self.kind, Kind::Array(_))
    }

    /// The element type of the repeated materialization: the array element
    /// for `Array` kinds, the field's own kind otherwise.
    pub fn element_kind(&self) -> &Kind {
        match &self.kind {
            Kind::Array(elem) => elem,
            other => other,
        }
    }
}

/// The unified shape of one record: the document root's name plus the
/// top-level fields, in first-seen order. Created once per run and
/// immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub root: String,
    pub fields: Vec<Field>,
}

impl Schema {
    pub fn new(root: impl Into<String>, fields: Vec<Field>) -> Schema {
        Schema { root: root.into(), fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
