//! Single-pass construction of the generic feed model.

use std::collections::BTreeMap;
use std::io::BufRead;

use quick_xml::events::Event;

use super::tokenizer::{FeedError, TagName, TagReader};

/// Case-folded field name to raw value.
///
/// Sorted so that every pass over a map visits keys in the same order.
pub type FieldMap = BTreeMap<String, String>;

/// Everything recorded from the first channel of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedModel {
    pub meta_fields: FieldMap,
    /// One map per `<item>`/`<entry>`, in document order.
    pub item_fields: Vec<FieldMap>,
}

impl FeedModel {
    /// True when the document contained nothing recognizable as a channel.
    pub fn is_empty(&self) -> bool {
        self.meta_fields.is_empty() && self.item_fields.is_empty()
    }
}

/// Result of a parse: whatever was recorded, plus the error that stopped it.
#[derive(Debug)]
pub struct ParseOutcome {
    pub model: FeedModel,
    pub error: Option<FeedError>,
}

impl ParseOutcome {
    /// Discards a partial model when the stream broke.
    pub fn into_result(self) -> Result<FeedModel, FeedError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(self.model),
        }
    }
}

/// Parses the first `<channel>` (RSS) or `<feed>` (Atom) of `input`.
///
/// Content before the channel and after its close is never looked at. A
/// stream error mid-document keeps what was recorded up to that point, minus
/// the item being read when it happened.
pub fn parse_feed<R: BufRead>(input: R) -> ParseOutcome {
    let mut reader = TagReader::new(input);
    let mut model = FeedModel::default();
    let error = read_document(&mut reader, &mut model).err();

    if let Some(e) = &error {
        tracing::debug!(
            error = %e,
            items = model.item_fields.len(),
            "Feed stream ended early; keeping partial model"
        );
    }
    ParseOutcome { model, error }
}

fn read_document<R: BufRead>(
    reader: &mut TagReader<R>,
    model: &mut FeedModel,
) -> Result<(), FeedError> {
    loop {
        match reader.next_event()? {
            Event::Start(start) if is_channel(&TagName::of(&start).local) => {
                return read_channel(reader, model);
            }
            // <channel/>: a channel with nothing in it
            Event::Empty(start) if is_channel(&TagName::of(&start).local) => return Ok(()),
            Event::Eof => return Ok(()),
            _ => {}
        }
    }
}

fn read_channel<R: BufRead>(
    reader: &mut TagReader<R>,
    model: &mut FeedModel,
) -> Result<(), FeedError> {
    loop {
        let event = reader.next_event()?;
        match &event {
            Event::Start(start) | Event::Empty(start) => {
                let tag = TagName::of(start);
                if is_item(&tag.local) {
                    let fields = match &event {
                        Event::Start(_) => read_item(reader)?,
                        _ => FieldMap::new(),
                    };
                    model.item_fields.push(fields);
                } else {
                    let value = field_value(reader, &tag, &event)?;
                    model.meta_fields.insert(tag.field_key(), value);
                }
            }
            Event::End(_) => return Ok(()),
            Event::Eof => return Err(FeedError::UnexpectedEof("channel".to_owned())),
            _ => {}
        }
    }
}

fn read_item<R: BufRead>(reader: &mut TagReader<R>) -> Result<FieldMap, FeedError> {
    let mut fields = FieldMap::new();
    loop {
        let event = reader.next_event()?;
        match &event {
            Event::Start(start) | Event::Empty(start) => {
                let tag = TagName::of(start);
                let value = field_value(reader, &tag, &event)?;
                fields.insert(tag.field_key(), value);
            }
            Event::End(_) => return Ok(fields),
            Event::Eof => return Err(FeedError::UnexpectedEof("item".to_owned())),
            _ => {}
        }
    }
}

fn field_value<R: BufRead>(
    reader: &mut TagReader<R>,
    tag: &TagName,
    open: &Event<'_>,
) -> Result<String, FeedError> {
    if tag.is_atom() {
        reader.atom_text(open)
    } else {
        reader.element_text(open)
    }
}

fn is_channel(local: &str) -> bool {
    local == "channel" || local == "feed"
}

fn is_item(local: &str) -> bool {
    local == "item" || local == "entry"
}
