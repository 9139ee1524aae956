//! Integration tests for the feed registry and the poll cycle built on it.
//!
//! Each test creates its own in-memory SQLite database for isolation.
//! Poll tests serve documents from a local mock server and write to files
//! under the system temp directory.

use std::time::Duration;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use feedpoll::feed::FieldKind;
use feedpoll::poller::{poll_once, PollSettings};
use feedpoll::storage::{Database, DatabaseError, MIN_POLL_INTERVAL};

const URL: &str = "https://example.com/feed.xml";

async fn test_db() -> Database {
    Database::open(":memory:").await.unwrap()
}

fn temp_output(name: &str) -> String {
    let path = std::env::temp_dir().join(format!(
        "feedpoll_registry_{}_{}.txt",
        name,
        std::process::id()
    ));
    let _ = std::fs::remove_file(&path);
    path.to_string_lossy().into_owned()
}

fn rss(items: &[(&str, &str)]) -> String {
    let body: String = items
        .iter()
        .map(|(title, date)| format!("<item><title>{title}</title><pubDate>{date}</pubDate></item>"))
        .collect();
    format!("<rss><channel><title>Mock</title>{body}</channel></rss>")
}

async fn serve(server: &MockServer, body: String) {
    server.reset().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

// ============================================================================
// Subscription Tests
// ============================================================================

#[tokio::test]
async fn test_add_then_list() {
    let db = test_db().await;
    db.add_feed(URL, "out.txt", 5).await.unwrap();

    let feeds = db.list_feeds().await.unwrap();
    assert_eq!(feeds.len(), 1);
    let settings = &feeds[0].settings;
    assert_eq!(settings.url, URL);
    assert_eq!(settings.output_file, "out.txt");
    assert_eq!(settings.max_items, 5);
    assert!(settings.enabled);
    assert_eq!(settings.channel_fields, vec!["title", "description"]);
    assert_eq!(settings.item_fields, vec!["title", "description"]);
    assert_eq!(settings.last_published, None);
    assert_eq!(feeds[0].error, None);
}

#[tokio::test]
async fn test_duplicate_add_is_rejected() {
    let db = test_db().await;
    db.add_feed(URL, "a.txt", 5).await.unwrap();

    let err = db.add_feed(URL, "b.txt", 5).await.unwrap_err();
    assert!(matches!(err, DatabaseError::FeedExists(_)));
    assert!(err.is_usage_error());

    // First registration is untouched
    assert_eq!(db.get_feed(URL).await.unwrap().settings.output_file, "a.txt");
}

#[tokio::test]
async fn test_operations_on_unknown_feed() {
    let db = test_db().await;

    assert!(matches!(
        db.remove_feed(URL).await,
        Err(DatabaseError::UnknownFeed(_))
    ));
    assert!(matches!(
        db.set_feed_enabled(URL, false).await,
        Err(DatabaseError::UnknownFeed(_))
    ));
    assert!(matches!(
        db.set_max_items(URL, 3).await,
        Err(DatabaseError::UnknownFeed(_))
    ));
    assert!(matches!(
        db.reconfigure_fields(URL, FieldKind::Item, &["link"]).await,
        Err(DatabaseError::UnknownFeed(_))
    ));
}

#[tokio::test]
async fn test_zero_max_items_rejected() {
    let db = test_db().await;
    assert!(matches!(
        db.add_feed(URL, "out.txt", 0).await,
        Err(DatabaseError::InvalidMaxItems)
    ));

    db.add_feed(URL, "out.txt", 4).await.unwrap();
    assert!(matches!(
        db.set_max_items(URL, 0).await,
        Err(DatabaseError::InvalidMaxItems)
    ));
    assert_eq!(db.get_feed(URL).await.unwrap().settings.max_items, 4);
}

#[tokio::test]
async fn test_reconfigure_persists_sanitized_fields() {
    let db = test_db().await;
    db.add_feed(URL, "out.txt", 5).await.unwrap();

    let applied = db
        .reconfigure_fields(URL, FieldKind::Item, &["Link", " TITLE ", "bogus", "link"])
        .await
        .unwrap();
    assert_eq!(applied, vec!["link", "title"]);
    assert_eq!(
        db.get_feed(URL).await.unwrap().settings.item_fields,
        vec!["link", "title"]
    );

    // Nothing legal: keep what is there
    let kept = db
        .reconfigure_fields(URL, FieldKind::Item, &["nope"])
        .await
        .unwrap();
    assert_eq!(kept, vec!["link", "title"]);
}

#[tokio::test]
async fn test_disabled_feed_left_out_of_snapshot_enabled() {
    let db = test_db().await;
    db.add_feed(URL, "a.txt", 5).await.unwrap();
    db.add_feed("https://example.com/other.xml", "b.txt", 5)
        .await
        .unwrap();
    db.set_feed_enabled(URL, false).await.unwrap();

    let snapshot = db.snapshot().await.unwrap();
    assert_eq!(snapshot.len(), 2);
    let enabled: Vec<&str> = snapshot.enabled().iter().map(|f| f.url.as_str()).collect();
    assert_eq!(enabled, vec!["https://example.com/other.xml"]);
}

#[tokio::test]
async fn test_remove_forgets_feed() {
    let db = test_db().await;
    db.add_feed(URL, "out.txt", 5).await.unwrap();
    db.remove_feed(URL).await.unwrap();

    assert!(db.list_feeds().await.unwrap().is_empty());
    // The URL can be added again afterwards
    db.add_feed(URL, "out.txt", 5).await.unwrap();
}

#[tokio::test]
async fn test_cursor_only_moves_forward() {
    let db = test_db().await;
    db.add_feed(URL, "out.txt", 5).await.unwrap();
    let newer = Utc.with_ymd_and_hms(2016, 5, 4, 0, 0, 0).unwrap();
    let older = Utc.with_ymd_and_hms(2016, 5, 1, 0, 0, 0).unwrap();

    assert!(db.advance_cursor(URL, Some(newer)).await.unwrap());
    assert!(!db.advance_cursor(URL, Some(older)).await.unwrap());
    assert!(!db.advance_cursor(URL, None).await.unwrap());
    assert_eq!(
        db.get_feed(URL).await.unwrap().settings.last_published,
        Some(newer)
    );
}

#[tokio::test]
async fn test_poll_interval_floor() {
    let db = test_db().await;
    let default = Duration::from_secs(60);
    assert_eq!(db.poll_interval(default).await.unwrap(), default);

    assert_eq!(db.set_poll_interval(1).await.unwrap(), MIN_POLL_INTERVAL);
    assert_eq!(db.poll_interval(default).await.unwrap(), MIN_POLL_INTERVAL);

    db.set_poll_interval(120).await.unwrap();
    assert_eq!(
        db.poll_interval(default).await.unwrap(),
        Duration::from_secs(120)
    );
}

// ============================================================================
// Poll Cycle Tests
// ============================================================================

#[tokio::test]
async fn test_poll_appends_only_new_items_across_cycles() {
    let server = MockServer::start().await;
    let url = format!("{}/feed.xml", server.uri());
    let output = temp_output("cycles");

    let db = test_db().await;
    db.add_feed(&url, &output, 10).await.unwrap();
    db.reconfigure_fields(&url, FieldKind::Item, &["title"])
        .await
        .unwrap();
    let client = reqwest::Client::new();
    let settings = PollSettings::default();

    serve(&server, rss(&[("first", "Tue, 03 May 2016 11:46:11 GMT")])).await;
    let report = poll_once(&db, &client, &settings).await.unwrap();
    assert_eq!(report.new_items(), 1);

    // Same document again: nothing new
    let report = poll_once(&db, &client, &settings).await.unwrap();
    assert_eq!(report.new_items(), 0);

    serve(
        &server,
        rss(&[
            ("second", "Wed, 04 May 2016 11:46:11 GMT"),
            ("first", "Tue, 03 May 2016 11:46:11 GMT"),
        ]),
    )
    .await;
    let report = poll_once(&db, &client, &settings).await.unwrap();
    assert_eq!(report.new_items(), 1);

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(
        written,
        "title:\n\tMock\n\n\ttitle:\n\t\tfirst\n\n\
         title:\n\tMock\n\n\ttitle:\n\t\tsecond\n\n"
    );

    let record = db.get_feed(&url).await.unwrap();
    assert_eq!(
        record.settings.last_published,
        Some(Utc.with_ymd_and_hms(2016, 5, 4, 11, 46, 11).unwrap())
    );
    assert_eq!(record.error, None);
    let _ = std::fs::remove_file(&output);
}

#[tokio::test]
async fn test_poll_failure_recorded_then_cleared() {
    let server = MockServer::start().await;
    let url = format!("{}/feed.xml", server.uri());
    let output = temp_output("recover");

    let db = test_db().await;
    db.add_feed(&url, &output, 10).await.unwrap();
    let client = reqwest::Client::new();
    let settings = PollSettings::default();

    serve(&server, "<rss><channel><link>no title</link></channel></rss>".into()).await;
    let report = poll_once(&db, &client, &settings).await.unwrap();
    assert_eq!(report.failures(), 1);
    let error = db.get_feed(&url).await.unwrap().error.unwrap();
    assert!(error.contains("title"), "{error}");

    serve(&server, rss(&[("ok", "Tue, 03 May 2016 11:46:11 GMT")])).await;
    let report = poll_once(&db, &client, &settings).await.unwrap();
    assert_eq!(report.failures(), 0);
    assert_eq!(db.get_feed(&url).await.unwrap().error, None);
    let _ = std::fs::remove_file(&output);
}
