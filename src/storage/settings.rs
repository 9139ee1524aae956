use anyhow::Result;
use std::time::Duration;

use super::schema::Database;

/// Polling never runs more often than this.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

const POLL_INTERVAL_KEY: &str = "poll.interval_secs";

impl Database {
    // ========================================================================
    // Runtime Settings Operations
    // ========================================================================

    /// Get a single setting value by key.
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a setting value (UPSERT).
    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Time between poll cycles: the stored override, else `default`.
    ///
    /// Both are raised to [`MIN_POLL_INTERVAL`]. An unreadable stored value is
    /// logged and ignored.
    pub async fn poll_interval(&self, default: Duration) -> Result<Duration> {
        let stored = match self.get_setting(POLL_INTERVAL_KEY).await? {
            Some(raw) => match raw.parse::<u64>() {
                Ok(secs) => Some(Duration::from_secs(secs)),
                Err(e) => {
                    tracing::warn!(value = %raw, error = %e, "Ignoring invalid stored poll interval");
                    None
                }
            },
            None => None,
        };

        Ok(stored.unwrap_or(default).max(MIN_POLL_INTERVAL))
    }

    /// Stores a new poll interval and returns the value actually in effect.
    pub async fn set_poll_interval(&self, secs: u64) -> Result<Duration> {
        let interval = Duration::from_secs(secs).max(MIN_POLL_INTERVAL);
        self.set_setting(POLL_INTERVAL_KEY, &interval.as_secs().to_string())
            .await?;
        tracing::info!(secs = interval.as_secs(), "Poll interval updated");
        Ok(interval)
    }
}
