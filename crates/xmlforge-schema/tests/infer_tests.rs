use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;
use xmlforge_config::{InferenceCfg, InferenceMode, InputCfg};
use xmlforge_core::Kind;
use xmlforge_schema::{infer_schema, ExternalSchemaSource, NoExternal, SchemaError};
use xmlforge_xsd::{parse_xsd, ExternalSchema};

fn write_doc(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

fn input_for(doc: &NamedTempFile) -> InputCfg {
    InputCfg {
        path: doc.path().display().to_string(),
        record_element: None,
        window: None,
    }
}

struct FixedExternal(Arc<ExternalSchema>);

impl ExternalSchemaSource for FixedExternal {
    fn resolve(&self, _doc: &Path) -> Option<Arc<ExternalSchema>> {
        Some(Arc::clone(&self.0))
    }
}

#[test]
fn books_catalog_infers_a_repeating_struct() {
    let doc = write_doc(
        "<catalog>\
           <book><title>Dune</title><year>1965</year><price>9.99</price></book>\
           <book><title>Solaris</title><year>1961</year><price>12.50</price></book>\
         </catalog>",
    );
    let schema =
        infer_schema(&input_for(&doc), &InferenceCfg::default(), &NoExternal)
            .unwrap();

    assert_eq!(schema.root, "catalog");
    assert_eq!(schema.fields.len(), 1);
    let book = schema.field("book").unwrap();
    assert!(book.repeating);
    let Kind::Struct(fields) = &book.kind else {
        panic!("book must be a struct");
    };
    assert_eq!(fields[0].name, "title");
    assert_eq!(fields[0].kind, Kind::Str);
    assert_eq!(fields[1].name, "year");
    assert_eq!(fields[1].kind, Kind::I32);
    assert_eq!(fields[2].name, "price");
    assert_eq!(fields[2].kind, Kind::F64);
}

#[test]
fn nested_structs_stay_structs_at_every_level() {
    let doc = write_doc(
        "<company><employee>\
           <id>1</id><name>Ada</name>\
           <contact><email>ada@example.com</email><phone>555</phone></contact>\
         </employee></company>",
    );
    let schema =
        infer_schema(&input_for(&doc), &InferenceCfg::default(), &NoExternal)
            .unwrap();

    let employee = schema.field("employee").unwrap();
    let Kind::Struct(fields) = &employee.kind else {
        panic!("employee must be a struct");
    };
    let contact = fields.iter().find(|f| f.name == "contact").unwrap();
    let Kind::Struct(contact_fields) = &contact.kind else {
        panic!("contact must be a struct, not a leaf");
    };
    assert_eq!(contact_fields[0].name, "email");
    assert_eq!(contact_fields[0].kind, Kind::Str);
    assert_eq!(contact_fields[1].name, "phone");
}

#[test]
fn type_conflict_widens_to_str() {
    let doc = write_doc("<root><age>30</age><age>thirty</age></root>");
    let schema =
        infer_schema(&input_for(&doc), &InferenceCfg::default(), &NoExternal)
            .unwrap();
    let age = schema.field("age").unwrap();
    assert_eq!(age.kind, Kind::Str);
    assert!(!age.repeating, "a text leaf record is not repeated");
}

#[test]
fn top_level_fields_equal_the_union_of_record_names() {
    let doc = write_doc(
        "<data><alpha>1</alpha><beta>x</beta><alpha>2</alpha><gamma>true</gamma></data>",
    );
    let schema =
        infer_schema(&input_for(&doc), &InferenceCfg::default(), &NoExternal)
            .unwrap();
    let mut names: Vec<&str> =
        schema.fields.iter().map(|f| f.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["alpha", "beta", "gamma"]);
}

#[test]
fn empty_document_yields_zero_fields() {
    let doc = write_doc("<catalog></catalog>");
    let schema =
        infer_schema(&input_for(&doc), &InferenceCfg::default(), &NoExternal)
            .unwrap();
    assert_eq!(schema.root, "catalog");
    assert!(schema.is_empty());
}

#[test]
fn missing_root_is_a_schema_error() {
    let doc = write_doc("");
    let err =
        infer_schema(&input_for(&doc), &InferenceCfg::default(), &NoExternal)
            .unwrap_err();
    assert!(matches!(err, SchemaError::NoRoot | SchemaError::Input(_)));
}

#[test]
fn external_mode_fails_without_a_resolved_schema() {
    let doc = write_doc("<catalog><book/></catalog>");
    let cfg = InferenceCfg {
        mode: InferenceMode::External,
        ..InferenceCfg::default()
    };
    let err = infer_schema(&input_for(&doc), &cfg, &NoExternal).unwrap_err();
    assert!(matches!(err, SchemaError::ExternalUnavailable));
}

#[test]
fn external_mode_uses_declared_types() {
    let doc = write_doc("<catalog><book/></catalog>");
    let xsd = parse_xsd(
        r#"<schema>
             <element name="book" minOccurs="0" maxOccurs="unbounded">
               <complexType><sequence>
                 <element name="title" type="string"/>
                 <element name="year" type="int"/>
               </sequence></complexType>
             </element>
           </schema>"#,
        "http://example.com/books.xsd",
    )
    .unwrap();
    let cfg = InferenceCfg {
        mode: InferenceMode::External,
        ..InferenceCfg::default()
    };
    let schema =
        infer_schema(&input_for(&doc), &cfg, &FixedExternal(Arc::new(xsd)))
            .unwrap();
    let book = schema.field("book").unwrap();
    assert!(book.repeating, "unbounded maxOccurs is an array");
    assert!(book.nullable, "minOccurs 0 is optional");
    assert!(matches!(book.kind, Kind::Struct(_)));
}

#[test]
fn hybrid_prefers_external_and_adds_sampled_extras() {
    let doc = write_doc(
        "<catalog>\
           <book><title>Dune</title></book>\
           <review><stars>5</stars></review>\
         </catalog>",
    );
    let xsd = parse_xsd(
        r#"<schema><element name="book" type="string"/></schema>"#,
        "http://example.com/hybrid.xsd",
    )
    .unwrap();
    let cfg = InferenceCfg {
        mode: InferenceMode::Hybrid,
        ..InferenceCfg::default()
    };
    let schema =
        infer_schema(&input_for(&doc), &cfg, &FixedExternal(Arc::new(xsd)))
            .unwrap();

    let book = schema.field("book").unwrap();
    assert_eq!(book.kind, Kind::Str, "external declaration wins for book");
    assert!(
        schema.field("review").is_some(),
        "sampled-only fields are added"
    );
}

#[test]
fn manual_mode_builds_from_overrides_only() {
    let doc = write_doc("<catalog><book><title>x</title></book></catalog>");
    let mut type_hints = BTreeMap::new();
    type_hints.insert("year".to_string(), "int".to_string());
    type_hints.insert("price".to_string(), "decimal".to_string());
    let cfg = InferenceCfg {
        mode: InferenceMode::Manual,
        type_hints,
        ..InferenceCfg::default()
    };
    let schema = infer_schema(&input_for(&doc), &cfg, &NoExternal).unwrap();
    assert_eq!(schema.root, "catalog");
    assert_eq!(schema.fields.len(), 2);
    assert!(schema.fields.iter().all(|f| f.nullable));
    assert!(schema.field("book").is_none(), "manual mode does not sample");
}

#[test]
fn sampling_honors_the_size_bound() {
    let records: String =
        (0..50).map(|i| format!("<n{i}>1</n{i}>")).collect();
    let doc = write_doc(&format!("<root>{records}</root>"));
    let cfg = InferenceCfg { sample_size: 10, ..InferenceCfg::default() };
    let schema = infer_schema(&input_for(&doc), &cfg, &NoExternal).unwrap();
    assert_eq!(schema.fields.len(), 10);
}

#[test]
fn overrides_apply_on_top_of_sampling() {
    let doc = write_doc("<root><year>1999</year><book><t>x</t></book></root>");
    let mut type_hints = BTreeMap::new();
    type_hints.insert("year".to_string(), "string".to_string());
    let cfg = InferenceCfg {
        force_arrays: vec!["year".to_string()],
        type_hints,
        ..InferenceCfg::default()
    };
    let schema = infer_schema(&input_for(&doc), &cfg, &NoExternal).unwrap();
    let year = schema.field("year").unwrap();
    assert!(year.repeating, "force_arrays applied");
    assert_eq!(year.kind, Kind::Str, "type hint applied");
}
