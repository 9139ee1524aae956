//! Pull-based tag reader over `quick-xml` events.
//!
//! The reader never builds a tree. A caller positioned on an opening tag asks
//! for that element's value and gets everything up to the matching close
//! flattened into one string, nested markup included. Nesting is tracked with
//! a depth counter, so hostile documents cannot grow the call stack.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Namespace prefix that gets field-specific handling.
pub const ATOM_PREFIX: &str = "atom";

/// Errors raised while tokenizing a feed document.
///
/// `Xml` and `UnexpectedEof` describe a broken input stream. `NotAnOpenTag`
/// and `NotAtomElement` mean a handler was called at the wrong position, which
/// is a bug in the caller rather than a property of the feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("XML error at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Document ended inside <{0}>")]
    UnexpectedEof(String),

    #[error("Expected an opening tag, found {0}")]
    NotAnOpenTag(&'static str),

    #[error("Atom handler called on non-atom element <{0}>")]
    NotAtomElement(String),
}

impl FeedError {
    /// True for errors caused by calling a handler on the wrong event.
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            FeedError::NotAnOpenTag(_) | FeedError::NotAtomElement(_)
        )
    }
}

/// Prefix and local name of an element, as written in the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagName {
    pub prefix: Option<String>,
    pub local: String,
}

impl TagName {
    pub fn of(start: &BytesStart<'_>) -> Self {
        let name = start.name();
        Self {
            prefix: name
                .prefix()
                .map(|p| String::from_utf8_lossy(p.as_ref()).into_owned()),
            local: String::from_utf8_lossy(name.local_name().as_ref()).into_owned(),
        }
    }

    pub fn is_atom(&self) -> bool {
        self.prefix.as_deref() == Some(ATOM_PREFIX)
    }

    /// Case-folded field key: `title`, or `atom:title` for atom elements.
    pub fn field_key(&self) -> String {
        if self.is_atom() {
            format!("{}:{}", ATOM_PREFIX, self.local).to_lowercase()
        } else {
            self.local.to_lowercase()
        }
    }

    fn qualified(&self) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}:{}", prefix, self.local),
            None => self.local.clone(),
        }
    }
}

/// Streaming reader handing out owned events and flattened element values.
pub struct TagReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: BufRead> TagReader<R> {
    pub fn new(input: R) -> Self {
        // SEC-002: quick-xml never expands DOCTYPE entities; see Cargo.toml pin.
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
        }
    }

    /// Reads the next event. `Event::Eof` is returned once the input is drained.
    pub fn next_event(&mut self) -> Result<Event<'static>, FeedError> {
        self.buf.clear();
        match self.reader.read_event_into(&mut self.buf) {
            Ok(event) => Ok(event.into_owned()),
            Err(source) => Err(FeedError::Xml {
                position: self.reader.buffer_position() as u64,
                source,
            }),
        }
    }

    /// Returns the text value of the element opened by `open`.
    ///
    /// `open` must be the `Start` (or self-closing `Empty`) event most recently
    /// returned by [`next_event`](Self::next_event). On return the reader sits
    /// just past the element's closing tag.
    ///
    /// Whitespace-only text nodes are dropped. Text directly inside the element
    /// is entity-decoded and CDATA is taken verbatim; nested elements are
    /// written back out as markup, so an HTML `<description>` survives as one
    /// opaque string.
    pub fn element_text(&mut self, open: &Event<'_>) -> Result<String, FeedError> {
        match open {
            Event::Start(start) => {
                let tag = TagName::of(start);
                self.flatten(&tag)
            }
            Event::Empty(_) => Ok(String::new()),
            other => Err(FeedError::NotAnOpenTag(event_kind(other))),
        }
    }

    /// Value of an `atom:`-prefixed element.
    ///
    /// `atom:link` carries its data in attributes and is rendered as
    /// `"{rel} : {href}"`, or just whichever of the two is present. Every other
    /// atom element is flattened like [`element_text`](Self::element_text).
    pub fn atom_text(&mut self, open: &Event<'_>) -> Result<String, FeedError> {
        let start = match open {
            Event::Start(start) | Event::Empty(start) => start,
            other => return Err(FeedError::NotAnOpenTag(event_kind(other))),
        };
        let tag = TagName::of(start);
        if !tag.is_atom() {
            return Err(FeedError::NotAtomElement(tag.qualified()));
        }
        if tag.local != "link" {
            return self.element_text(open);
        }

        let value = self.link_value(start);
        if matches!(open, Event::Start(_)) {
            self.skip(&tag)?;
        }
        Ok(value)
    }

    fn link_value(&self, start: &BytesStart<'_>) -> String {
        let decoder = self.reader.decoder();
        let mut rel = String::new();
        let mut href = String::new();

        for attr in start.attributes() {
            let attr = match attr {
                Ok(attr) => attr,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed atom:link attribute");
                    continue;
                }
            };
            let target = match attr.key.as_ref() {
                b"rel" => &mut rel,
                b"href" => &mut href,
                _ => continue,
            };
            *target = match attr.decode_and_unescape_value(decoder) {
                Ok(value) => value.into_owned(),
                Err(_) => self.decode_raw(&attr.value),
            };
        }

        if !rel.is_empty() && !href.is_empty() {
            format!("{} : {}", rel, href)
        } else {
            rel + &href
        }
    }

    fn flatten(&mut self, tag: &TagName) -> Result<String, FeedError> {
        let mut out = String::new();
        let mut depth: usize = 1;

        loop {
            match self.next_event()? {
                Event::Start(e) => {
                    depth += 1;
                    out.push('<');
                    out.push_str(&self.decode_raw(&e));
                    out.push('>');
                }
                Event::End(e) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push_str("</");
                    out.push_str(&self.decode_raw(e.name().as_ref()));
                    out.push('>');
                }
                Event::Empty(e) => {
                    out.push('<');
                    out.push_str(&self.decode_raw(&e));
                    out.push_str("/>");
                }
                Event::Text(e) => {
                    if e.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    if depth == 1 {
                        // Unknown entities such as `&nbsp;` are common in feeds
                        match e.unescape() {
                            Ok(text) => out.push_str(&text),
                            Err(err) => {
                                tracing::debug!(error = %err, "Keeping unescapable text as-is");
                                out.push_str(&self.decode_raw(&e));
                            }
                        }
                    } else {
                        out.push_str(&self.decode_raw(&e));
                    }
                }
                Event::CData(e) => {
                    let content = self.decode_raw(&e);
                    if depth == 1 {
                        out.push_str(&content);
                    } else {
                        out.push_str("<![CDATA[");
                        out.push_str(&content);
                        out.push_str("]]>");
                    }
                }
                Event::Eof => return Err(FeedError::UnexpectedEof(tag.qualified())),
                _ => {}
            }
        }
    }

    /// Decodes raw bytes with the document's declared encoding (UTF-8 when
    /// none is declared).
    fn decode_raw(&self, raw: &[u8]) -> String {
        match self.reader.decoder().decode(raw) {
            Ok(text) => text.into_owned(),
            Err(e) => {
                tracing::debug!(error = %e, "Bytes invalid in declared encoding");
                String::from_utf8_lossy(raw).into_owned()
            }
        }
    }

    fn skip(&mut self, tag: &TagName) -> Result<(), FeedError> {
        let mut depth: usize = 1;
        loop {
            match self.next_event()? {
                Event::Start(_) => depth += 1,
                Event::End(_) => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Event::Eof => return Err(FeedError::UnexpectedEof(tag.qualified())),
                _ => {}
            }
        }
    }
}

fn event_kind(event: &Event<'_>) -> &'static str {
    match event {
        Event::Start(_) => "opening tag",
        Event::End(_) => "closing tag",
        Event::Empty(_) => "empty tag",
        Event::Text(_) => "text",
        Event::CData(_) => "CDATA",
        Event::Comment(_) => "comment",
        Event::Decl(_) => "XML declaration",
        Event::PI(_) => "processing instruction",
        Event::DocType(_) => "DOCTYPE",
        Event::Eof => "end of document",
    }
}
