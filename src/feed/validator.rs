//! Lightweight feed checks used before subscribing.
//!
//! Validation parses and normalizes like ingestion does but needs no feed
//! settings: it only asks whether the document could ever produce a channel.

use std::io::BufRead;

use thiserror::Error;

use super::model::{parse_feed, FeedModel, FieldMap};
use super::normalize::normalize;
use super::settings::FieldKind;
use super::tokenizer::FeedError;

/// Why a document is not an acceptable feed.
#[derive(Debug, Error)]
pub enum InvalidFeed {
    #[error("Malformed feed: {0}")]
    Malformed(#[from] FeedError),

    #[error("No channel fields found")]
    NoChannel,

    #[error("Channel is missing mandatory field '{0}'")]
    ChannelField(&'static str),

    #[error("Item {index} is missing mandatory field '{field}'")]
    ItemField { index: usize, field: &'static str },
}

/// Parses `input` and checks it with [`validate_model`].
pub fn validate_stream<R: BufRead>(input: R) -> Result<(), InvalidFeed> {
    let model = parse_feed(input).into_result()?;
    validate_model(model)
}

/// Checks a raw (not yet normalized) model for mandatory fields.
pub fn validate_model(model: FeedModel) -> Result<(), InvalidFeed> {
    if model.meta_fields.is_empty() {
        return Err(InvalidFeed::NoChannel);
    }

    let model = normalize(model);

    if let Some(field) = first_missing(FieldKind::Channel, &model.meta_fields) {
        return Err(InvalidFeed::ChannelField(field));
    }

    for (index, item) in model.item_fields.iter().enumerate() {
        if let Some(field) = first_missing(FieldKind::Item, item) {
            return Err(InvalidFeed::ItemField { index, field });
        }
    }

    Ok(())
}

fn first_missing(kind: FieldKind, fields: &FieldMap) -> Option<&'static str> {
    kind.mandatory()
        .iter()
        .copied()
        .find(|name| !fields.contains_key(*name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(xml: &str) -> Result<(), InvalidFeed> {
        validate_stream(xml.as_bytes())
    }

    #[test]
    fn test_valid_rss() {
        let xml = "<rss><channel><title>t</title>\
                   <item><title>a</title><pubDate>Tue, 03 May 2016 11:46:11 GMT</pubDate></item>\
                   </channel></rss>";
        assert!(check(xml).is_ok());
    }

    #[test]
    fn test_valid_atom() {
        let xml = "<atom:feed><atom:title>t</atom:title>\
                   <atom:entry><atom:title>a</atom:title><atom:published>x</atom:published></atom:entry>\
                   </atom:feed>";
        assert!(check(xml).is_ok());
    }

    #[test]
    fn test_channel_without_items_is_valid() {
        assert!(check("<rss><channel><title>t</title></channel></rss>").is_ok());
    }

    #[test]
    fn test_not_a_feed() {
        assert!(matches!(check("<html><body/></html>"), Err(InvalidFeed::NoChannel)));
        assert!(matches!(check(""), Err(InvalidFeed::NoChannel)));
    }

    #[test]
    fn test_malformed_xml() {
        let err = check("<rss><channel><title>t</link></channel></rss>").unwrap_err();
        assert!(matches!(err, InvalidFeed::Malformed(_)));
    }

    #[test]
    fn test_missing_channel_title() {
        let err = check("<rss><channel><description>d</description></channel></rss>").unwrap_err();
        assert!(matches!(err, InvalidFeed::ChannelField("title")));
    }

    #[test]
    fn test_missing_item_pubdate() {
        let xml = "<rss><channel><title>t</title>\
                   <item><title>a</title><pubDate>p</pubDate></item>\
                   <item><title>b</title></item>\
                   </channel></rss>";
        let err = check(xml).unwrap_err();
        assert!(matches!(
            err,
            InvalidFeed::ItemField {
                index: 1,
                field: "pubdate"
            }
        ));
        assert_eq!(err.to_string(), "Item 1 is missing mandatory field 'pubdate'");
    }
}
