//! Per-feed settings and the legal field vocabulary.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

/// Item date field; every item needs one to be ordered and cursored.
pub const PUB_DATE: &str = "pubdate";

/// Channel elements of RSS 2.0, case-folded.
pub const CHANNEL_FIELDS: &[&str] = &[
    "title",
    "link",
    "description",
    "language",
    "copyright",
    "managingeditor",
    "webmaster",
    "pubdate",
    "lastbuilddate",
    "category",
    "generator",
    "docs",
    "cloud",
    "ttl",
    "rating",
    "textinput",
    "skiphours",
    "skipdays",
];

/// Item elements of RSS 2.0, case-folded.
pub const ITEM_FIELDS: &[&str] = &[
    "title",
    "description",
    "link",
    "author",
    "category",
    "comments",
    "enclosure",
    "guid",
    "pubdate",
    "source",
];

/// Which whitelist a field list belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Channel,
    Item,
}

impl FieldKind {
    /// Every name the whitelist may contain.
    pub fn available(self) -> &'static [&'static str] {
        match self {
            FieldKind::Channel => CHANNEL_FIELDS,
            FieldKind::Item => ITEM_FIELDS,
        }
    }

    /// Whitelist given to newly added feeds.
    pub fn defaults(self) -> &'static [&'static str] {
        &["title", "description"]
    }

    /// Names a source map must carry, whitelisted or not.
    pub fn mandatory(self) -> &'static [&'static str] {
        match self {
            FieldKind::Channel => &["title"],
            FieldKind::Item => &["title", PUB_DATE],
        }
    }

    pub fn is_legal(self, name: &str) -> bool {
        self.available().contains(&name)
    }
}

/// Case-folds `names` and keeps the legal ones, in order, without repeats.
///
/// An empty result means nothing usable was given; callers keep the old list.
pub fn sanitize_fields<S: AsRef<str>>(kind: FieldKind, names: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref().trim().to_lowercase();
        if kind.is_legal(&name) && !out.contains(&name) {
            out.push(name);
        } else if !kind.is_legal(&name) {
            tracing::debug!(field = %name, ?kind, "Ignoring unknown field name");
        }
    }
    out
}

/// Everything the pipeline needs to know about one subscribed feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Feed URL, also its identifier.
    pub url: String,
    pub output_file: String,
    pub enabled: bool,
    pub channel_fields: Vec<String>,
    pub item_fields: Vec<String>,
    /// Always at least 1.
    pub max_items: usize,
    /// Publish date of the newest item written so far.
    pub last_published: Option<DateTime<Utc>>,
}

impl FeedSettings {
    /// A new subscription: enabled, default whitelists, no cursor.
    pub fn new(url: impl Into<String>, output_file: impl Into<String>, max_items: usize) -> Self {
        Self {
            url: url.into(),
            output_file: output_file.into(),
            enabled: true,
            channel_fields: owned(FieldKind::Channel.defaults()),
            item_fields: owned(FieldKind::Item.defaults()),
            max_items: max_items.max(1),
            last_published: None,
        }
    }

    pub fn fields(&self, kind: FieldKind) -> &[String] {
        match kind {
            FieldKind::Channel => &self.channel_fields,
            FieldKind::Item => &self.item_fields,
        }
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Feed settings frozen for the duration of one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct ConfigSnapshot {
    feeds: HashMap<String, FeedSettings>,
}

impl ConfigSnapshot {
    pub fn new(feeds: impl IntoIterator<Item = FeedSettings>) -> Self {
        Self {
            feeds: feeds.into_iter().map(|f| (f.url.clone(), f)).collect(),
        }
    }

    pub fn feed(&self, url: &str) -> Option<&FeedSettings> {
        self.feeds.get(url)
    }

    /// Enabled feeds, sorted by URL.
    pub fn enabled(&self) -> Vec<&FeedSettings> {
        let mut feeds: Vec<_> = self.feeds.values().filter(|f| f.enabled).collect();
        feeds.sort_by(|a, b| a.url.cmp(&b.url));
        feeds
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }
}
