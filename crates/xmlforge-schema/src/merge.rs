//! Field merging.
//!
//! The merge is the binary operator of the sampling fold: associative,
//! commutative up to field order, and widening. Two fields of the same
//! name must agree on type; a disagreement collapses to `Str`, the top of
//! the leaf lattice. Structs merge keywise. A field present on only one
//! side survives, marked nullable.

use xmlforge_core::{Field, Kind};

/// Merge one record's field set into the accumulator. Fields missing from
/// either side become nullable; shared fields merge recursively.
pub fn merge_fields(acc: Vec<Field>, incoming: Vec<Field>) -> Vec<Field> {
    let mut out: Vec<Field> = Vec::with_capacity(acc.len());
    let mut incoming: Vec<Option<Field>> = incoming.into_iter().map(Some).collect();

    for mut field in acc {
        let matched = incoming
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|f| f.name == field.name))
            .and_then(Option::take);
        match matched {
            Some(other) => out.push(merge_field(field, other)),
            None => {
                field.nullable = true;
                out.push(field);
            }
        }
    }
    for mut field in incoming.into_iter().flatten() {
        field.nullable = true;
        out.push(field);
    }
    out
}

/// Merge two occurrences of the same field.
pub fn merge_field(a: Field, b: Field) -> Field {
    Field {
        name: a.name,
        kind: merge_kind(a.kind, b.kind),
        nullable: a.nullable || b.nullable,
        repeating: a.repeating || b.repeating,
    }
}

/// Widening type merge: equal types stand, structs union keywise,
/// everything else collapses to `Str`.
pub fn merge_kind(a: Kind, b: Kind) -> Kind {
    if a == b {
        return a;
    }
    match (a, b) {
        (Kind::Struct(x), Kind::Struct(y)) => Kind::Struct(merge_fields(x, y)),
        _ => Kind::Str,
    }
}
