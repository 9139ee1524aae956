//! Poll cycles: fetch every enabled feed, write what is new, move cursors.

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio::time::Instant;

use crate::feed::{
    fetch_feed, ingest, ConfigSnapshot, ConstructionError, FeedError, FeedSettings, FetchError,
};
use crate::sink::append_channel;
use crate::storage::{DatabaseError, FeedStore, MIN_POLL_INTERVAL};

/// Knobs for the poll loop that come from the application config.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Interval used while no override is stored in the registry.
    pub default_interval: Duration,
    pub request_timeout: Duration,
    /// Feeds fetched at the same time.
    pub max_concurrent_fetches: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
            max_concurrent_fetches: 10,
        }
    }
}

/// Why one feed produced nothing this cycle.
#[derive(Debug, Error)]
pub enum PollError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error("Cannot write {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Store(#[from] DatabaseError),
}

/// Outcome of one feed in a cycle.
#[derive(Debug)]
pub struct FeedReport {
    pub url: String,
    /// Number of items written.
    pub outcome: Result<usize, PollError>,
    /// Set when only part of the document could be read. Items before the
    /// break were still written.
    pub warning: Option<String>,
}

impl FeedReport {
    /// What the registry keeps as the feed's last error, `None` for a clean poll.
    pub fn status(&self) -> Option<String> {
        match &self.outcome {
            Err(e) => Some(e.to_string()),
            Ok(_) => self.warning.clone(),
        }
    }
}

/// Outcome of a whole cycle, one entry per enabled feed, in completion order.
#[derive(Debug, Default)]
pub struct PollReport {
    pub feeds: Vec<FeedReport>,
}

impl PollReport {
    pub fn new_items(&self) -> usize {
        self.feeds
            .iter()
            .filter_map(|f| f.outcome.as_ref().ok())
            .sum()
    }

    pub fn failures(&self) -> usize {
        self.feeds.iter().filter(|f| f.outcome.is_err()).count()
    }
}

/// Runs one cycle over every enabled feed.
///
/// Feeds are handled concurrently, at most `max_concurrent_fetches` at a time.
/// A failing feed never stops the others; its error ends up in the report and
/// in the registry.
///
/// # Errors
///
/// Only when the registry cannot produce a snapshot.
pub async fn poll_once<S: FeedStore>(
    store: &S,
    client: &reqwest::Client,
    settings: &PollSettings,
) -> Result<PollReport, DatabaseError> {
    let snapshot = store.snapshot().await?;
    let enabled = snapshot.enabled();
    if enabled.is_empty() {
        tracing::debug!(feeds = snapshot.len(), "No enabled feeds to poll");
        return Ok(PollReport::default());
    }

    let snapshot = &snapshot;
    let feeds: Vec<FeedReport> = stream::iter(enabled)
        .map(|feed| async move {
            let polled = poll_feed(store, client, snapshot, feed, settings).await;
            let (outcome, warning) = match polled {
                Ok(polled) => {
                    let warning = polled.stream_error.map(|e| {
                        tracing::warn!(feed = %feed.url, error = %e, "Feed document cut short");
                        format!("Partially read document: {e}")
                    });
                    (Ok(polled.written), warning)
                }
                Err(e) => {
                    tracing::warn!(feed = %feed.url, error = %e, "Feed poll failed");
                    (Err(e), None)
                }
            };
            FeedReport {
                url: feed.url.clone(),
                outcome,
                warning,
            }
        })
        .buffer_unordered(settings.max_concurrent_fetches.max(1))
        .collect()
        .await;

    // PERF-002: Batch update all feed error statuses in a single transaction
    let updates: Vec<(String, Option<String>)> = feeds
        .iter()
        .map(|f| (f.url.clone(), f.status()))
        .collect();
    if let Err(e) = store.record_poll_errors(&updates).await {
        tracing::warn!(error = %e, "Failed to record feed poll statuses");
    }

    let report = PollReport { feeds };
    tracing::info!(
        feeds = report.feeds.len(),
        new_items = report.new_items(),
        failures = report.failures(),
        "Poll cycle finished"
    );
    Ok(report)
}

/// One feed's successful poll.
struct Polled {
    written: usize,
    stream_error: Option<FeedError>,
}

async fn poll_feed<S: FeedStore>(
    store: &S,
    client: &reqwest::Client,
    snapshot: &ConfigSnapshot,
    feed: &FeedSettings,
    settings: &PollSettings,
) -> Result<Polled, PollError> {
    let bytes = fetch_feed(client, &feed.url, settings.request_timeout).await?;
    let ingestion = ingest(snapshot, &feed.url, bytes.as_slice())?;
    let channel = ingestion.channel;
    let stream_error = ingestion.stream_error;

    let written = append_channel(Path::new(&feed.output_file), &channel, feed)
        .await
        .map_err(|source| PollError::Output {
            path: feed.output_file.clone(),
            source,
        })?;
    if !written {
        tracing::debug!(feed = %feed.url, "Nothing new");
        return Ok(Polled {
            written: 0,
            stream_error,
        });
    }

    // Only after the items are on disk, so a failed write is retried next cycle
    store
        .advance_cursor(&feed.url, channel.latest_published)
        .await?;
    Ok(Polled {
        written: channel.items.len(),
        stream_error,
    })
}

/// Polls until `shutdown` resolves.
///
/// The interval is re-read from the store at least every
/// [`MIN_POLL_INTERVAL`], so a changed interval applies to the wait already
/// in progress. A cycle that has started always runs to completion; shutdown
/// is only observed while waiting.
pub async fn run<S, F>(
    store: S,
    client: reqwest::Client,
    settings: PollSettings,
    shutdown: F,
) -> anyhow::Result<()>
where
    S: FeedStore,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let started = Instant::now();
        if let Err(e) = poll_once(&store, &client, &settings).await {
            tracing::warn!(error = %e, "Poll cycle skipped");
        }

        loop {
            let interval = match store.poll_interval(settings.default_interval).await {
                Ok(interval) => interval,
                Err(e) => {
                    tracing::warn!(error = %e, "Cannot read poll interval, using default");
                    settings.default_interval.max(MIN_POLL_INTERVAL)
                }
            };
            let elapsed = started.elapsed();
            if elapsed >= interval {
                break;
            }

            let wait = (interval - elapsed).min(MIN_POLL_INTERVAL);
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, poller stopping");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }
}
