//! Atom vocabulary folded onto RSS field names.

use super::model::{FeedModel, FieldMap};
use super::tokenizer::ATOM_PREFIX;

/// RSS name for an `atom:`-prefixed key, or `None` if the key has no RSS
/// counterpart.
pub fn atom_to_rss(key: &str) -> Option<&'static str> {
    let rss = match key {
        "atom:author" => "author",
        "atom:category" => "category",
        "atom:feed" => "channel",
        "atom:rights" => "copyright",
        "atom:subtitle" => "subtitle",
        "atom:summary" => "description",
        "atom:content" => "description",
        "atom:generator" => "generator",
        "atom:id" => "guid",
        "atom:logo" => "image",
        "atom:entry" => "item",
        "atom:updated" => "pubdate",
        "atom:link" => "link",
        "atom:contributor" => "managingeditor",
        "atom:published" => "pubdate",
        "atom:title" => "title",
        _ => return None,
    };
    Some(rss)
}

fn is_atom_key(key: &str) -> bool {
    key.strip_prefix(ATOM_PREFIX)
        .is_some_and(|rest| rest.starts_with(':'))
}

/// Rewrites both the channel map and every item map to RSS names.
pub fn normalize(model: FeedModel) -> FeedModel {
    FeedModel {
        meta_fields: normalize_fields(&model.meta_fields),
        item_fields: model.item_fields.iter().map(normalize_fields).collect(),
    }
}

/// A native RSS key always keeps its own value; an atom alias only fills a
/// name nothing else has claimed. Unknown atom keys are dropped.
pub fn normalize_fields(fields: &FieldMap) -> FieldMap {
    let mut out = FieldMap::new();

    for (key, value) in fields.iter().filter(|(key, _)| !is_atom_key(key)) {
        out.insert(key.clone(), value.clone());
    }

    for (key, value) in fields.iter().filter(|(key, _)| is_atom_key(key)) {
        match atom_to_rss(key) {
            Some(rss) => {
                out.entry(rss.to_owned()).or_insert_with(|| value.clone());
            }
            None => tracing::debug!(key = %key, "Dropping atom field with no RSS counterpart"),
        }
    }

    out
}
