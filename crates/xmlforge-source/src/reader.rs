//! Pull-mode record reader.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use tracing::debug;
use xmlforge_core::Value;

use crate::errors::InputError;

/// A finite, non-restartable sequence of `(elementName, valueTree)` pairs,
/// one per depth-2 element of the document.
///
/// The reader moves through three states: before the root, inside the root
/// (emitting records), and done. Parse failures terminate the sequence with
/// the error; a partially built record is discarded with it.
pub struct RecordReader<R: BufRead> {
    reader: Reader<R>,
    state: State,
    window: Option<(u64, u64)>,
    filter: Option<String>,
    root: Option<String>,
}

impl<R: BufRead> std::fmt::Debug for RecordReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordReader")
            .field("state", &self.state)
            .field("window", &self.window)
            .field("filter", &self.filter)
            .field("root", &self.root)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    BeforeRoot,
    InRoot,
    Done,
}

impl RecordReader<BufReader<File>> {
    /// Open a document from the filesystem.
    pub fn open(path: &Path) -> Result<Self, InputError> {
        let file = File::open(path).map_err(|source| InputError::Open {
            path: path.display().to_string(),
            source,
        })?;
        Ok(RecordReader::new(BufReader::new(file)))
    }
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(input: R) -> Self {
        let mut reader = Reader::from_reader(input);
        reader.config_mut().trim_text(true);
        RecordReader {
            reader,
            state: State::BeforeRoot,
            window: None,
            filter: None,
            root: None,
        }
    }

    /// Restrict the stream to a byte window. The window is a hint: records
    /// are skipped until the read position passes `start`, and the stream
    /// ends at the first record boundary at or past `end`.
    pub fn with_window(mut self, window: Option<(u64, u64)>) -> Self {
        self.window = window;
        self
    }

    /// Emit only depth-2 elements with this local name.
    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    /// Local name of the document root, once it has been seen.
    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    fn pos(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    /// Whether a record starting here should be skipped rather than built.
    fn skip_record(&self, name: &str, start_pos: u64) -> bool {
        if let Some(filter) = &self.filter {
            if filter != name {
                return true;
            }
        }
        if let Some((start, _)) = self.window {
            if start_pos < start {
                return true;
            }
        }
        false
    }

    /// Consume events until the element opened just before this call is
    /// closed.
    fn skip_subtree(&mut self) -> Result<(), InputError> {
        let mut depth = 1usize;
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(_)) => depth += 1,
                Ok(Event::End(_)) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Ok(Event::Eof) => {
                    return Err(InputError::malformed(
                        self.pos(),
                        "unexpected end of document inside element",
                    ));
                }
                Ok(_) => {}
                Err(e) => return Err(InputError::malformed(self.pos(), e)),
            }
        }
    }

    /// Build the tree for the element whose start tag was just consumed.
    ///
    /// Text accumulates into one scratch buffer and is trimmed at assembly.
    /// Child elements append to per-name lists; a single occurrence is
    /// still a one-element list. Non-whitespace text alongside element
    /// children is discarded in favor of the children. CDATA is character
    /// data. An element with neither attributes nor children collapses to
    /// a text leaf.
    fn build_element(
        &mut self,
        attrs: Vec<(String, String)>,
    ) -> Result<Value, InputError> {
        let mut node = Value::record();
        for (name, value) in attrs {
            node.push_attr(&name, value);
        }
        let mut text = String::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(e)) => {
                    let name = local_name(&e);
                    let attrs = read_attrs(&e, self.pos())?;
                    let child = self.build_element(attrs)?;
                    node.push_child(&name, child);
                }
                Ok(Event::Empty(e)) => {
                    let name = local_name(&e);
                    let attrs = read_attrs(&e, self.pos())?;
                    node.push_child(&name, assemble(attrs_node(attrs), String::new()));
                }
                Ok(Event::Text(t)) => {
                    let piece = t
                        .unescape()
                        .map_err(|e| InputError::malformed(self.pos(), e))?;
                    text.push_str(&piece);
                }
                Ok(Event::CData(t)) => {
                    text.push_str(&String::from_utf8_lossy(t.as_ref()));
                }
                Ok(Event::End(_)) => return Ok(assemble(node, text)),
                Ok(Event::Eof) => {
                    return Err(InputError::malformed(
                        self.pos(),
                        "unexpected end of document inside element",
                    ));
                }
                Ok(_) => {}
                Err(e) => return Err(InputError::malformed(self.pos(), e)),
            }
        }
    }
}

impl<R: BufRead> Iterator for RecordReader<R> {
    type Item = Result<(String, Value), InputError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Done {
            return None;
        }
        let mut buf = Vec::new();
        loop {
            if self.state == State::InRoot {
                if let Some((_, end)) = self.window {
                    if self.pos() >= end {
                        debug!(pos = self.pos(), "byte window reached, ending stream");
                        self.state = State::Done;
                        return None;
                    }
                }
            }

            buf.clear();
            let event = match self.reader.read_event_into(&mut buf) {
                Ok(event) => event,
                Err(e) => {
                    self.state = State::Done;
                    return Some(Err(InputError::malformed(self.pos(), e)));
                }
            };

            match self.state {
                State::BeforeRoot => match event {
                    Event::Start(e) => {
                        self.root = Some(local_name(&e));
                        self.state = State::InRoot;
                    }
                    Event::Empty(e) => {
                        // A self-closing root: no records.
                        self.root = Some(local_name(&e));
                        self.state = State::Done;
                        return None;
                    }
                    Event::Eof => {
                        self.state = State::Done;
                        return Some(Err(InputError::malformed(
                            self.pos(),
                            "document has no root element",
                        )));
                    }
                    _ => {}
                },

                State::InRoot => match event {
                    Event::Start(e) => {
                        let start_pos = self.pos();
                        let name = local_name(&e);
                        let attrs = match read_attrs(&e, start_pos) {
                            Ok(attrs) => attrs,
                            Err(err) => {
                                self.state = State::Done;
                                return Some(Err(err));
                            }
                        };
                        if self.skip_record(&name, start_pos) {
                            if let Err(err) = self.skip_subtree() {
                                self.state = State::Done;
                                return Some(Err(err));
                            }
                            continue;
                        }
                        match self.build_element(attrs) {
                            Ok(tree) => return Some(Ok((name, tree))),
                            Err(err) => {
                                self.state = State::Done;
                                return Some(Err(err));
                            }
                        }
                    }
                    Event::Empty(e) => {
                        let start_pos = self.pos();
                        let name = local_name(&e);
                        let attrs = match read_attrs(&e, start_pos) {
                            Ok(attrs) => attrs,
                            Err(err) => {
                                self.state = State::Done;
                                return Some(Err(err));
                            }
                        };
                        if self.skip_record(&name, start_pos) {
                            continue;
                        }
                        return Some(Ok((
                            name,
                            assemble(attrs_node(attrs), String::new()),
                        )));
                    }
                    Event::End(_) => {
                        self.state = State::Done;
                        return None;
                    }
                    Event::Eof => {
                        self.state = State::Done;
                        return Some(Err(InputError::malformed(
                            self.pos(),
                            "unexpected end of document inside root",
                        )));
                    }
                    _ => {}
                },

                State::Done => return None,
            }
        }
    }
}

/// Final tree assembly for one element: children win over text, text-only
/// elements collapse to leaves.
fn assemble(mut node: Value, text: String) -> Value {
    let text = text.trim();
    if node.has_element_children() {
        return node;
    }
    if node.entries().is_empty() {
        return Value::Text(text.to_string());
    }
    if !text.is_empty() {
        node.set_text(text.to_string());
    }
    node
}

fn attrs_node(attrs: Vec<(String, String)>) -> Value {
    let mut node = Value::record();
    for (name, value) in attrs {
        node.push_attr(&name, value);
    }
    node
}

/// Local name of an element, namespace prefix flattened away.
fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

/// Attributes of an element as `(localName, value)` pairs. Namespace
/// declarations are not data and are skipped.
fn read_attrs(
    e: &BytesStart,
    pos: u64,
) -> Result<Vec<(String, String)>, InputError> {
    let mut out = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| InputError::malformed(pos, err))?;
        let qname = attr.key.as_ref();
        if qname == b"xmlns" || qname.starts_with(b"xmlns:") {
            continue;
        }
        let name =
            String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| InputError::malformed(pos, err))?
            .into_owned();
        out.push((name, value));
    }
    Ok(out)
}
