//! Root-element probes.
//!
//! Both probes open the document independently of any record stream and
//! look only at the root start tag, so they stay cheap even for very large
//! documents.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::errors::InputError;

/// Local name of the document's root element, if the document has one.
pub fn root_name(path: &Path) -> Result<Option<String>, InputError> {
    probe_root(path, |e| {
        Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
    })
}

/// The first schema-location-like attribute value on the root element,
/// reduced to a URL.
///
/// A schema-location value is either a whitespace-separated
/// `(namespace, url)` pair, in which case the token starting with `http`
/// wins, or a bare URL.
pub fn schema_location(path: &Path) -> Result<Option<String>, InputError> {
    probe_root(path, |e| {
        for attr in e.attributes().flatten() {
            let local = attr.key.local_name();
            let local = local.as_ref();
            if local != b"schemaLocation" && local != b"noNamespaceSchemaLocation"
            {
                continue;
            }
            let value = match attr.unescape_value() {
                Ok(v) => v.into_owned(),
                Err(_) => continue,
            };
            return location_url(&value);
        }
        None
    })
}

/// Pick the URL out of a schema-location attribute value.
fn location_url(value: &str) -> Option<String> {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    match tokens.as_slice() {
        [] => None,
        [single] => Some(single.to_string()),
        many => many
            .iter()
            .find(|t| t.starts_with("http"))
            .map(|t| t.to_string()),
    }
}

fn probe_root<T>(
    path: &Path,
    mut extract: impl FnMut(&BytesStart) -> Option<T>,
) -> Result<Option<T>, InputError> {
    let file = File::open(path).map_err(|source| InputError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = Reader::from_reader(BufReader::new(file));
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Ok(extract(&e));
            }
            Ok(Event::Eof) => return Ok(None),
            Ok(_) => {}
            Err(e) => {
                return Err(InputError::Malformed {
                    pos: reader.buffer_position() as u64,
                    details: e.to_string(),
                });
            }
        }
    }
}
