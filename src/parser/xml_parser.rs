use super::sanitize::{replace_invalid, SanitizingReader};
use super::scope::{FilterLists, ScopeFilter, StructureError};
use crate::constants::READ_BUFFER_SIZE;
use crate::errors::{AppError, AppResult};
use crate::models::{FlattenedRow, NodeKind};
use encoding_rs::Encoding;
use quick_xml::escape::resolve_predefined_entity;
use quick_xml::events::{BytesRef, BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::io::{BufRead, BufReader, Read};
use tracing::{debug, trace};

/// Whether parsing goes on after a node was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone)]
struct NodeName {
    uri: String,
    local_name: String,
    qualified_name: String,
}

/// An element that has been started but not yet closed.
#[derive(Debug, Clone)]
struct OpenElement {
    name: NodeName,
    first_sub_id: u64,
}

/// Outcome of flattening one document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenSummary {
    pub rows_emitted: u64,
    /// Ids handed out, emitted or not
    pub nodes_seen: u64,
    /// A skip-after node was reached before the end of the document
    pub stopped_early: bool,
}

/// Streams an XML document into [`FlattenedRow`]s.
///
/// Every element and every attribute gets an id from a per-document counter;
/// ids are handed out whether or not the node is emitted, so they stay stable
/// across filter settings. Attribute rows are produced when their element is
/// entered, tag rows when it closes.
///
/// A tag's value is the raw text between its last child (or its start tag)
/// and its end tag.
#[derive(Debug, Clone)]
pub struct XmlFlattener {
    scope: ScopeFilter,
    open: Vec<OpenElement>,
    text: String,
    next_id: u64,
    rows_emitted: u64,
    root_seen: bool,
}

impl XmlFlattener {
    pub fn new(lists: &FilterLists) -> AppResult<Self> {
        Ok(Self {
            scope: ScopeFilter::new(lists)?,
            open: Vec::new(),
            text: String::new(),
            next_id: 0,
            rows_emitted: 0,
            root_seen: false,
        })
    }

    fn reset(&mut self) {
        self.scope.clear();
        self.open.clear();
        self.text.clear();
        self.next_id = 0;
        self.rows_emitted = 0;
        self.root_seen = false;
    }

    /// Parses one document from `input` and hands every selected row to `sink`.
    ///
    /// `input` is decoded with `encoding` when given, otherwise with the
    /// encoding its XML declaration names (UTF-8 if none). Characters XML does
    /// not allow are replaced before parsing. `input` is only borrowed; after
    /// an early stop it is left partly unread.
    pub fn flatten<R, F>(
        &mut self,
        input: &mut R,
        encoding: Option<&'static Encoding>,
        mut sink: F,
    ) -> AppResult<FlattenSummary>
    where
        R: Read + ?Sized,
        F: FnMut(FlattenedRow) -> AppResult<()>,
    {
        self.reset();

        let sanitized = BufReader::with_capacity(READ_BUFFER_SIZE, SanitizingReader::new(input, encoding));
        let mut reader = NsReader::from_reader(sanitized);
        reader.config_mut().expand_empty_elements = true;

        let mut buf = Vec::with_capacity(READ_BUFFER_SIZE);
        loop {
            let (resolved, event) = reader.read_resolved_event_into(&mut buf)?;
            let uri = namespace_uri(resolved);

            let flow = match event {
                Event::Start(e) => self.start_element(&reader, uri?, &e, &mut sink)?,
                Event::End(_) => self.end_element(&mut sink)?,
                Event::Text(e) => {
                    let text = e.decode().map_err(quick_xml::Error::from)?;
                    self.append_text(&text)?;
                    Flow::Continue
                }
                Event::CData(e) => {
                    let text = e.decode().map_err(quick_xml::Error::from)?;
                    self.append_text(&text)?;
                    Flow::Continue
                }
                Event::GeneralRef(e) => {
                    let text = resolve_reference(&e)?;
                    self.append_text(&text)?;
                    Flow::Continue
                }
                Event::Eof => break,
                // Declarations, comments, processing instructions and DOCTYPE
                _ => Flow::Continue,
            };

            if flow == Flow::Stop {
                debug!(
                    node = self.scope.full_path(),
                    rows = self.rows_emitted,
                    "Skip point reached, document not read further"
                );
                return Ok(self.summary(true));
            }
            buf.clear();
        }

        if !self.open.is_empty() {
            return Err(AppError::MalformedDocument(format!(
                "unexpected end of document, {} element(s) not closed",
                self.open.len()
            )));
        }
        if !self.root_seen {
            return Err(AppError::MalformedDocument(
                "document has no root element".to_string(),
            ));
        }

        trace!(rows = self.rows_emitted, nodes = self.next_id, "Document flattened");
        Ok(self.summary(false))
    }

    fn summary(&self, stopped_early: bool) -> FlattenSummary {
        FlattenSummary {
            rows_emitted: self.rows_emitted,
            nodes_seen: self.next_id,
            stopped_early,
        }
    }

    fn start_element<B, F>(
        &mut self,
        reader: &NsReader<B>,
        uri: String,
        e: &BytesStart,
        sink: &mut F,
    ) -> AppResult<Flow>
    where
        B: BufRead,
        F: FnMut(FlattenedRow) -> AppResult<()>,
    {
        if self.open.is_empty() {
            if self.root_seen {
                return Err(AppError::MalformedDocument(
                    "more than one root element".to_string(),
                ));
            }
            self.root_seen = true;
        }

        let name = NodeName {
            uri,
            local_name: lossy(e.local_name().as_ref()),
            qualified_name: lossy(e.name().as_ref()),
        };
        self.scope.enter_node(&name.local_name);
        let first_sub_id = self.next_id;
        self.open.push(OpenElement { name, first_sub_id });
        self.text.clear();

        let mut count = 0u64;
        for attr in e.attributes() {
            let attr = attr.map_err(quick_xml::Error::from)?;
            // Namespace declarations are not attributes of the document
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let (resolved, local) = reader.resolve_attribute(attr.key);
            let name = NodeName {
                uri: namespace_uri(resolved)?,
                local_name: lossy(local.as_ref()),
                qualified_name: lossy(attr.key.as_ref()),
            };
            let value = attr
                .decode_and_unescape_value(reader.decoder())
                .map_err(quick_xml::Error::from)?;
            let id = first_sub_id + count;
            count += 1;

            self.scope.enter_node(&name.local_name);
            if self.selected() {
                let row = self.row(NodeKind::Attribute, &name, value.into_owned(), id, id);
                self.emit(row, sink)?;
            }
            if self.scope.exit_node()?.is_skipped() {
                self.next_id += count;
                return Ok(Flow::Stop);
            }
        }
        self.next_id += count;
        Ok(Flow::Continue)
    }

    fn end_element<F>(&mut self, sink: &mut F) -> AppResult<Flow>
    where
        F: FnMut(FlattenedRow) -> AppResult<()>,
    {
        let element = self.open.pop().ok_or(StructureError)?;
        if self.selected() {
            let row = self.row(
                NodeKind::Tag,
                &element.name,
                self.text.clone(),
                self.next_id,
                element.first_sub_id,
            );
            self.emit(row, sink)?;
        }
        self.text.clear();
        self.next_id += 1;

        if self.scope.exit_node()?.is_skipped() {
            return Ok(Flow::Stop);
        }
        Ok(Flow::Continue)
    }

    fn append_text(&mut self, text: &str) -> AppResult<()> {
        if self.open.is_empty() {
            if text.chars().all(char::is_whitespace) {
                return Ok(());
            }
            return Err(AppError::MalformedDocument(
                "text outside of the root element".to_string(),
            ));
        }
        self.text.push_str(text);
        Ok(())
    }

    fn selected(&self) -> bool {
        self.scope.is_included() && self.scope.matches_localname()
    }

    fn row(
        &self,
        kind: NodeKind,
        name: &NodeName,
        value: String,
        id: u64,
        first_sub_id: u64,
    ) -> FlattenedRow {
        FlattenedRow {
            include_parent: self.scope.include_parent().map(str::to_string),
            include_count: self.scope.include_count(),
            full_path: self.scope.full_path().to_string(),
            uri: name.uri.clone(),
            local_name: name.local_name.clone(),
            qualified_name: name.qualified_name.clone(),
            kind,
            value,
            id,
            first_sub_id,
        }
    }

    fn emit<F>(&mut self, row: FlattenedRow, sink: &mut F) -> AppResult<()>
    where
        F: FnMut(FlattenedRow) -> AppResult<()>,
    {
        sink(row)?;
        self.rows_emitted += 1;
        Ok(())
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn namespace_uri(resolved: ResolveResult) -> AppResult<String> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(lossy(ns.as_ref())),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) => Err(AppError::MalformedDocument(format!(
            "unbound namespace prefix '{}'",
            lossy(&prefix)
        ))),
    }
}

fn resolve_reference(e: &BytesRef) -> AppResult<String> {
    if let Some(c) = e.resolve_char_ref().map_err(quick_xml::Error::from)? {
        return Ok(replace_invalid(c).to_string());
    }
    let name = e.decode().map_err(quick_xml::Error::from)?;
    match resolve_predefined_entity(&name) {
        Some(text) => Ok(text.to_string()),
        None => Err(AppError::MalformedDocument(format!(
            "unknown entity '&{name};'"
        ))),
    }
}
