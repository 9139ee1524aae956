use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::feed::FeedSettings;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process has locked the database
    #[error("Another feedpoll process appears to be using the database. Please stop it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// The feed URL is not subscribed
    #[error("Feed {0} is not added")]
    UnknownFeed(String),

    /// The feed URL is already subscribed
    #[error("Feed {0} is already added")]
    FeedExists(String),

    /// Item cap must be at least one
    #[error("Count should be greater than 0")]
    InvalidMaxItems,

    /// A stored row could not be turned back into settings
    #[error("Corrupt row for feed {url}: {reason}")]
    CorruptRow { url: String, reason: String },

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // Check for SQLite lock-related error messages
        // SQLITE_BUSY (5): database is locked
        // SQLITE_LOCKED (6): database table is locked
        // SQLITE_CANTOPEN (14): unable to open database file
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return DatabaseError::InstanceLocked;
        }

        DatabaseError::Other(err)
    }

    /// True for errors caused by what the caller asked for rather than the store.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::UnknownFeed(_)
                | DatabaseError::FeedExists(_)
                | DatabaseError::InvalidMaxItems
        )
    }
}

// ============================================================================
// Helper Types
// ============================================================================

/// Internal row type for feed queries (used by sqlx FromRow)
/// Converts to FeedRecord via into_record()
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct FeedDbRow {
    pub url: String,
    pub output_file: String,
    pub enabled: bool,
    pub last_published: Option<i64>,
    pub channel_fields: String,
    pub item_fields: String,
    pub max_items: i64,
    pub error: Option<String>,
}

impl FeedDbRow {
    pub(crate) fn into_record(self) -> Result<FeedRecord, DatabaseError> {
        let max_items = usize::try_from(self.max_items)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| DatabaseError::CorruptRow {
                url: self.url.clone(),
                reason: format!("max_items = {}", self.max_items),
            })?;

        let last_published = match self.last_published {
            Some(secs) => Some(DateTime::<Utc>::from_timestamp(secs, 0).ok_or_else(|| {
                DatabaseError::CorruptRow {
                    url: self.url.clone(),
                    reason: format!("last_published = {secs}"),
                }
            })?),
            None => None,
        };

        Ok(FeedRecord {
            settings: FeedSettings {
                url: self.url,
                output_file: self.output_file,
                enabled: self.enabled,
                channel_fields: split_fields(&self.channel_fields),
                item_fields: split_fields(&self.item_fields),
                max_items,
                last_published,
            },
            error: self.error,
        })
    }
}

/// Whitelists are stored as comma-separated lower-case names.
pub(crate) fn join_fields(fields: &[String]) -> String {
    fields.join(",")
}

pub(crate) fn split_fields(stored: &str) -> Vec<String> {
    stored
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

// ============================================================================
// Data Structures
// ============================================================================

/// A subscribed feed as stored, with the outcome of its last poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedRecord {
    pub settings: FeedSettings,
    /// Error message from the most recent poll, `None` after a success.
    pub error: Option<String>,
}
