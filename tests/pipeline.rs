//! End-to-end tests of the ingestion pipeline: raw document in, rendered text out.
//!
//! Nothing here touches the network or the database; feed settings are built
//! by hand and handed to the pipeline as a snapshot.

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;

use feedpoll::feed::{
    ingest, render_channel, validate_stream, ConfigSnapshot, ConstructionError, FeedSettings,
    InvalidFeed,
};

const URL: &str = "https://news.example.com/rss";

const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
  <channel>
    <title>Example News</title>
    <link>https://news.example.com/</link>
    <description>Daily headlines</description>
    <atom:link rel="self" href="https://news.example.com/rss"/>
    <item>
      <title>Parliament returns</title>
      <link>https://news.example.com/1</link>
      <description>Session opens &amp; debates begin</description>
      <pubDate>Tue, 03 May 2016 11:46:11 GMT</pubDate>
    </item>
    <item>
      <title>Late result</title>
      <link>https://news.example.com/2</link>
      <description>Counting ran overnight</description>
      <pubDate>Wed, 04 May 2016 08:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Undated</title>
      <link>https://news.example.com/3</link>
    </item>
    <item>
      <title>Old news</title>
      <link>https://news.example.com/0</link>
      <pubDate>Mon, 02 May 2016 10:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

fn settings(max_items: usize) -> FeedSettings {
    let mut settings = FeedSettings::new(URL, "news.txt", max_items);
    settings.channel_fields = vec!["title".into(), "link".into()];
    settings.item_fields = vec!["title".into(), "link".into(), "description".into()];
    settings
}

#[test]
fn test_rss_renders_newest_items_up_to_cap() {
    let settings = settings(2);
    let snapshot = ConfigSnapshot::new([settings.clone()]);

    let ingestion = ingest(&snapshot, URL, RSS.as_bytes()).unwrap();
    assert!(ingestion.stream_error.is_none());

    let rendered = render_channel(&ingestion.channel, &settings);
    assert_eq!(
        rendered,
        "title:\n\tExample News\n\
         link:\n\thttps://news.example.com/\n\n\
         \ttitle:\n\t\tLate result\n\
         \tlink:\n\t\thttps://news.example.com/2\n\
         \tdescription:\n\t\tCounting ran overnight\n\n\
         \ttitle:\n\t\tParliament returns\n\
         \tlink:\n\t\thttps://news.example.com/1\n\
         \tdescription:\n\t\tSession opens & debates begin\n\n"
    );
    assert_eq!(
        ingestion.channel.latest_published,
        Some(Utc.with_ymd_and_hms(2016, 5, 4, 8, 0, 0).unwrap())
    );
}

#[test]
fn test_cursor_limits_output_to_newer_items() {
    let mut settings = settings(10);
    settings.last_published = Some(Utc.with_ymd_and_hms(2016, 5, 3, 11, 46, 11).unwrap());
    let snapshot = ConfigSnapshot::new([settings]);

    let channel = ingest(&snapshot, URL, RSS.as_bytes()).unwrap().channel;
    let titles: Vec<&str> = channel.items.iter().map(|i| i.body["title"].as_str()).collect();
    assert_eq!(titles, vec!["Late result"]);
}

#[test]
fn test_nothing_new_keeps_cursor() {
    let cursor = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    let mut settings = settings(10);
    settings.last_published = Some(cursor);
    let snapshot = ConfigSnapshot::new([settings.clone()]);

    let channel = ingest(&snapshot, URL, RSS.as_bytes()).unwrap().channel;
    assert!(!channel.has_items());
    assert_eq!(channel.latest_published, Some(cursor));
}

#[test]
fn test_atom_document_uses_rss_names() {
    let atom = r#"<?xml version="1.0" encoding="utf-8"?>
<atom:feed xmlns:atom="http://www.w3.org/2005/Atom">
  <atom:title>Atom Weekly</atom:title>
  <atom:subtitle>Things worth reading</atom:subtitle>
  <atom:link rel="alternate" href="https://atom.example.com/"/>
  <atom:entry>
    <atom:title>First entry</atom:title>
    <atom:link rel="alternate" href="https://atom.example.com/1"/>
    <atom:summary>Short version</atom:summary>
    <atom:published>Tue, 03 May 2016 11:46:11 GMT</atom:published>
    <atom:id>urn:uuid:1</atom:id>
  </atom:entry>
</atom:feed>"#;

    let mut settings = FeedSettings::new(URL, "atom.txt", 10);
    settings.channel_fields = vec!["title".into(), "link".into()];
    settings.item_fields = vec!["title".into(), "description".into(), "guid".into()];
    let snapshot = ConfigSnapshot::new([settings.clone()]);

    let ingestion = ingest(&snapshot, URL, atom.as_bytes()).unwrap();
    assert_eq!(
        render_channel(&ingestion.channel, &settings),
        "title:\n\tAtom Weekly\n\
         link:\n\talternate : https://atom.example.com/\n\n\
         \ttitle:\n\t\tFirst entry\n\
         \tdescription:\n\t\tShort version\n\
         \tguid:\n\t\turn:uuid:1\n\n"
    );
}

#[test]
fn test_native_field_beats_atom_alias() {
    let xml = r#"<rss xmlns:atom="http://www.w3.org/2005/Atom"><channel>
<title>Native</title><atom:title>Alias</atom:title>
<item><title>Item</title><pubDate>Tue, 03 May 2016 11:46:11 GMT</pubDate></item>
</channel></rss>"#;
    let snapshot = ConfigSnapshot::new([FeedSettings::new(URL, "out.txt", 10)]);

    let channel = ingest(&snapshot, URL, xml.as_bytes()).unwrap().channel;
    assert_eq!(channel.meta_body["title"], "Native");
}

#[test]
fn test_unconfigured_feed_is_rejected() {
    let snapshot = ConfigSnapshot::default();
    let err = ingest(&snapshot, URL, RSS.as_bytes()).unwrap_err();
    assert_eq!(err, ConstructionError::FeedNotConfigured(URL.to_string()));
}

#[test]
fn test_validator_accepts_realistic_feed() {
    let dated = RSS.replace(
        "<title>Undated</title>",
        "<title>Undated</title><pubDate>Sun, 01 May 2016 00:00:00 GMT</pubDate>",
    );
    validate_stream(dated.as_bytes()).unwrap();
}

#[test]
fn test_validator_reports_first_bad_item() {
    // The third item has no pubDate
    let err = validate_stream(RSS.as_bytes()).unwrap_err();
    assert!(matches!(
        err,
        InvalidFeed::ItemField {
            index: 2,
            field: "pubdate"
        }
    ));
}

#[test]
fn test_validator_rejects_html_page() {
    let html = "<html><head><title>Not a feed</title></head><body/></html>";
    assert!(matches!(
        validate_stream(html.as_bytes()),
        Err(InvalidFeed::NoChannel)
    ));
}

#[test]
fn test_latin1_feed_renders_as_utf8() {
    let xml: &[u8] = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\
        <rss><channel><title>Caf\xE9 du Monde</title>\
        <item><title>Cr\xE8me br\xFBl\xE9e</title>\
        <pubDate>Tue, 03 May 2016 11:46:11 GMT</pubDate></item>\
        </channel></rss>";
    let settings = FeedSettings::new(URL, "latin1.txt", 10);
    let snapshot = ConfigSnapshot::new([settings.clone()]);

    let ingestion = ingest(&snapshot, URL, xml).unwrap();
    assert!(ingestion.stream_error.is_none());
    assert_eq!(
        render_channel(&ingestion.channel, &settings),
        "title:\n\tCaf\u{e9} du Monde\n\n\ttitle:\n\t\tCr\u{e8}me br\u{fb}l\u{e9}e\n\n"
    );
}
