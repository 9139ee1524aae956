//! Feed ingestion: from raw XML bytes to the channel of new items.
//!
//! The pipeline runs in four synchronous steps, each in its own submodule:
//!
//! - [`tokenizer`] - Streaming tag reader over `quick-xml` that flattens
//!   element content without building a tree
//! - [`model`] - Records the first channel's fields and its items
//! - [`normalize`] - Folds Atom names onto RSS names
//! - [`channel`] - Applies per-feed whitelists, mandatory fields and the
//!   publish-date cursor
//!
//! Around the pipeline sit [`render`] (text output), [`validator`] (checks
//! before subscribing) and [`fetcher`] (HTTP download with retries).
//!
//! # Example
//!
//! ```
//! use feedpoll::feed::{ingest, ConfigSnapshot, FeedSettings};
//!
//! let url = "https://example.com/rss";
//! let snapshot = ConfigSnapshot::new([FeedSettings::new(url, "news.txt", 10)]);
//! let xml = r#"<rss><channel><title>News</title>
//!   <item><title>Hello</title><pubDate>Tue, 03 May 2016 11:46:11 GMT</pubDate></item>
//! </channel></rss>"#;
//!
//! let ingestion = ingest(&snapshot, url, xml.as_bytes()).unwrap();
//! assert_eq!(ingestion.channel.items.len(), 1);
//! assert!(ingestion.stream_error.is_none());
//! ```

mod channel;
mod fetcher;
mod model;
mod normalize;
mod render;
mod settings;
mod tokenizer;
mod validator;

use std::io::BufRead;

pub use channel::{build_channel, build_item, Channel, ConstructionError, Item};
pub use fetcher::{fetch_feed, FetchError};
pub use model::{parse_feed, FeedModel, FieldMap, ParseOutcome};
pub use normalize::{atom_to_rss, normalize, normalize_fields};
pub use render::{render_channel, render_fields};
pub use settings::{
    sanitize_fields, ConfigSnapshot, FeedSettings, FieldKind, CHANNEL_FIELDS, ITEM_FIELDS,
    PUB_DATE,
};
pub use tokenizer::{FeedError, TagName, TagReader};
pub use validator::{validate_model, validate_stream, InvalidFeed};

/// A built channel, plus the stream error that cut the document short, if any.
#[derive(Debug)]
pub struct Ingestion {
    pub channel: Channel,
    /// Set when only part of the document could be read. The channel then
    /// holds what was parsed before the break.
    pub stream_error: Option<FeedError>,
}

/// Runs the whole pipeline for one feed document.
///
/// A broken stream does not abort ingestion: items read before the break are
/// still used. A contract violation inside the tokenizer is a bug and is
/// treated the same way, after being logged loudly.
pub fn ingest<R: BufRead>(
    snapshot: &ConfigSnapshot,
    feed_id: &str,
    input: R,
) -> Result<Ingestion, ConstructionError> {
    let ParseOutcome { model, error } = parse_feed(input);

    if let Some(e) = &error {
        if e.is_contract_violation() {
            tracing::error!(feed = %feed_id, error = %e, "Tokenizer misuse while parsing feed");
        } else {
            tracing::warn!(
                feed = %feed_id,
                error = %e,
                items = model.item_fields.len(),
                "Feed document is malformed; using the part read before the error"
            );
        }
    }

    let channel = build_channel(snapshot, feed_id, &normalize(model))?;
    Ok(Ingestion {
        channel,
        stream_error: error,
    })
}
