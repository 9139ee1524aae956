//! SQLite-backed feed registry.
//!
//! The registry owns every piece of per-feed state: subscription settings,
//! the publish-date cursor and the last poll error. The poller only talks to
//! it through [`FeedStore`], so tests can substitute an in-memory database.

mod feeds;
mod schema;
mod settings;
mod types;

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::feed::ConfigSnapshot;

pub use schema::Database;
pub use settings::MIN_POLL_INTERVAL;
pub use types::{DatabaseError, FeedRecord};

/// What a poll cycle needs from the feed registry.
pub trait FeedStore: Clone + Send + Sync + 'static {
    /// Settings of every feed, frozen for one cycle.
    fn snapshot(&self) -> impl Future<Output = Result<ConfigSnapshot, DatabaseError>> + Send;

    /// Record that everything up to `latest` has been written for `url`.
    fn advance_cursor(
        &self,
        url: &str,
        latest: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send;

    /// Store each feed's poll outcome; `None` clears a previous error.
    fn record_poll_errors(
        &self,
        updates: &[(String, Option<String>)],
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send;

    /// Time to wait between cycles, given the configured default.
    fn poll_interval(&self, default: Duration) -> impl Future<Output = anyhow::Result<Duration>> + Send;
}

impl FeedStore for Database {
    fn snapshot(&self) -> impl Future<Output = Result<ConfigSnapshot, DatabaseError>> + Send {
        Database::snapshot(self)
    }

    fn advance_cursor(
        &self,
        url: &str,
        latest: Option<DateTime<Utc>>,
    ) -> impl Future<Output = Result<bool, DatabaseError>> + Send {
        Database::advance_cursor(self, url, latest)
    }

    fn record_poll_errors(
        &self,
        updates: &[(String, Option<String>)],
    ) -> impl Future<Output = Result<(), DatabaseError>> + Send {
        Database::record_poll_errors(self, updates)
    }

    fn poll_interval(&self, default: Duration) -> impl Future<Output = anyhow::Result<Duration>> + Send {
        Database::poll_interval(self, default)
    }
}
