//! Channel and item construction from a normalized model.
//!
//! This is where per-feed settings meet feed data: whitelists are applied,
//! mandatory fields enforced, dates parsed, and the "new since last poll"
//! slice computed.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::model::{FeedModel, FieldMap};
use super::settings::{ConfigSnapshot, FeedSettings, FieldKind, PUB_DATE};
use crate::util::parse_pub_date;

/// Why a channel or an item could not be built.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConstructionError {
    #[error("Feed {0} is not configured")]
    FeedNotConfigured(String),

    #[error("Channel is missing mandatory fields: {}", .missing.join(", "))]
    MissingChannelFields { missing: Vec<String> },

    #[error("Item is missing mandatory fields: {}", .missing.join(", "))]
    MissingItemFields { missing: Vec<String> },

    #[error("Item has an empty publish date")]
    NullPubDate,

    #[error("Unrecognized publish date: {0:?}")]
    UnparseablePubDate(String),
}

/// One entry that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Whitelisted fields only.
    pub body: FieldMap,
    pub published: DateTime<Utc>,
}

/// New items of one feed, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    pub meta_body: FieldMap,
    pub items: Vec<Item>,
    /// Cursor to store after this channel is written.
    pub latest_published: Option<DateTime<Utc>>,
}

impl Channel {
    pub fn has_items(&self) -> bool {
        !self.items.is_empty()
    }
}

/// Builds the channel for `feed_id` out of a normalized model.
///
/// Items that fail validation are logged and skipped; the channel itself fails
/// only if the feed is unknown or the channel lacks a mandatory field.
pub fn build_channel(
    snapshot: &ConfigSnapshot,
    feed_id: &str,
    model: &FeedModel,
) -> Result<Channel, ConstructionError> {
    let settings = lookup(snapshot, feed_id)?;

    let missing = missing_fields(FieldKind::Channel, &model.meta_fields);
    if !missing.is_empty() {
        return Err(ConstructionError::MissingChannelFields { missing });
    }

    let meta_body = whitelisted(&model.meta_fields, &settings.channel_fields);

    let mut items: Vec<Item> = model
        .item_fields
        .iter()
        .enumerate()
        .filter_map(|(index, source)| match item_for(settings, source) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::debug!(feed = %feed_id, index, error = %e, "Skipping item");
                None
            }
        })
        .filter(|item| is_new(item, settings.last_published))
        .collect();

    // sort_by is stable: equal timestamps keep document order
    items.sort_by(|a, b| b.published.cmp(&a.published));
    items.truncate(settings.max_items);

    let latest_published = items
        .iter()
        .map(|item| item.published)
        .max()
        .or(settings.last_published);

    Ok(Channel {
        meta_body,
        items,
        latest_published,
    })
}

/// Validates one normalized item map for `feed_id`.
pub fn build_item(
    snapshot: &ConfigSnapshot,
    feed_id: &str,
    source: &FieldMap,
) -> Result<Item, ConstructionError> {
    item_for(lookup(snapshot, feed_id)?, source)
}

fn item_for(settings: &FeedSettings, source: &FieldMap) -> Result<Item, ConstructionError> {
    let missing = missing_fields(FieldKind::Item, source);
    if !missing.is_empty() {
        return Err(ConstructionError::MissingItemFields { missing });
    }

    let raw = source
        .get(PUB_DATE)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .ok_or(ConstructionError::NullPubDate)?;
    let published =
        parse_pub_date(raw).ok_or_else(|| ConstructionError::UnparseablePubDate(raw.to_owned()))?;

    Ok(Item {
        body: whitelisted(source, &settings.item_fields),
        published,
    })
}

fn lookup<'a>(
    snapshot: &'a ConfigSnapshot,
    feed_id: &str,
) -> Result<&'a FeedSettings, ConstructionError> {
    snapshot
        .feed(feed_id)
        .ok_or_else(|| ConstructionError::FeedNotConfigured(feed_id.to_owned()))
}

fn missing_fields(kind: FieldKind, source: &FieldMap) -> Vec<String> {
    kind.mandatory()
        .iter()
        .filter(|name| !source.contains_key(**name))
        .map(|name| name.to_string())
        .collect()
}

fn whitelisted(source: &FieldMap, whitelist: &[String]) -> FieldMap {
    source
        .iter()
        .filter(|(key, _)| whitelist.contains(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn is_new(item: &Item, cursor: Option<DateTime<Utc>>) -> bool {
    cursor.map_or(true, |last| item.published > last)
}
