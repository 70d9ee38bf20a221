use std::io::Write;

use tempfile::NamedTempFile;
use xmlforge_core::Value;
use xmlforge_source::{root_name, InputError, RecordReader};

fn write_doc(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const RELEASE_FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ern:NewReleaseMessage xmlns:ern="http://ddex.example.net/ern/43"
    xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">
  <MessageHeader>
    <MessageId>MSG-0001</MessageId>
    <MessageCreatedDateTime>2024-06-01T10:00:00Z</MessageCreatedDateTime>
  </MessageHeader>
  <ReleaseList>
    <Release>
      <ReleaseId><ISRC>USX9P2400001</ISRC></ReleaseId>
      <DisplayTitleText>First Light</DisplayTitleText>
      <Genre><GenreText>Ambient</GenreText></Genre>
      <Genre><GenreText>Electronic</GenreText></Genre>
    </Release>
  </ReleaseList>
</ern:NewReleaseMessage>
"#;

#[test]
fn file_backed_stream_produces_records_in_order() {
    let doc = write_doc(RELEASE_FEED);
    let mut reader = RecordReader::open(doc.path()).unwrap();

    let (name, header) = reader.next().unwrap().unwrap();
    assert_eq!(name, "MessageHeader");
    assert_eq!(reader.root(), Some("NewReleaseMessage"));
    let Some(Value::List(ids)) = header.get("MessageId") else {
        panic!("MessageId must be a list");
    };
    assert_eq!(ids[0], Value::Text("MSG-0001".into()));

    let (name, releases) = reader.next().unwrap().unwrap();
    assert_eq!(name, "ReleaseList");
    let Some(Value::List(release_list)) = releases.get("Release") else {
        panic!("Release must be a list");
    };
    let Some(Value::List(genres)) = release_list[0].get("Genre") else {
        panic!("Genre must be a list");
    };
    assert_eq!(genres.len(), 2, "both Genre occurrences are kept");

    assert!(reader.next().is_none());
    assert!(reader.next().is_none(), "the stream is not restartable");
}

#[test]
fn deeply_nested_structures_survive_extraction() {
    let doc = write_doc(
        "<root><a><b><c><d><e>bottom</e></d></c></b></a></root>",
    );
    let records: Vec<_> = RecordReader::open(doc.path())
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap();
    assert_eq!(records.len(), 1);
    let mut node = &records[0].1;
    for key in ["b", "c", "d", "e"] {
        let Some(Value::List(items)) = node.get(key) else {
            panic!("{key} must be a one-element list");
        };
        assert_eq!(items.len(), 1);
        node = &items[0];
    }
    assert_eq!(node, &Value::Text("bottom".into()));
}

#[test]
fn missing_file_is_an_open_error() {
    let err = RecordReader::open(std::path::Path::new(
        "/nonexistent/feed.xml",
    ))
    .unwrap_err();
    assert!(matches!(err, InputError::Open { .. }));
}

#[test]
fn probe_and_reader_agree_on_the_root() {
    let doc = write_doc(RELEASE_FEED);
    let probed = root_name(doc.path()).unwrap();
    let mut reader = RecordReader::open(doc.path()).unwrap();
    let _ = reader.next();
    assert_eq!(probed.as_deref(), reader.root());
}
