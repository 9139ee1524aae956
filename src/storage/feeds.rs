use chrono::{DateTime, Utc};
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{join_fields, DatabaseError, FeedDbRow, FeedRecord};
use crate::feed::{sanitize_fields, ConfigSnapshot, FeedSettings, FieldKind};

const SELECT_FEEDS: &str = "SELECT url, output_file, enabled, last_published, channel_fields, \
                            item_fields, max_items, error FROM feeds";

impl Database {
    // ========================================================================
    // Subscription Operations
    // ========================================================================

    /// Subscribe to `url`, writing new items to `output_file`.
    ///
    /// New feeds start enabled, with the default whitelists and no cursor.
    pub async fn add_feed(
        &self,
        url: &str,
        output_file: &str,
        max_items: usize,
    ) -> Result<FeedSettings, DatabaseError> {
        if max_items == 0 {
            return Err(DatabaseError::InvalidMaxItems);
        }
        let settings = FeedSettings::new(url, output_file, max_items);

        let result = sqlx::query(
            r#"
            INSERT INTO feeds (url, output_file, enabled, channel_fields, item_fields, max_items, added_at)
            VALUES (?, ?, 1, ?, ?, ?, ?)
            ON CONFLICT(url) DO NOTHING
        "#,
        )
        .bind(&settings.url)
        .bind(&settings.output_file)
        .bind(join_fields(&settings.channel_fields))
        .bind(join_fields(&settings.item_fields))
        .bind(max_items as i64)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::FeedExists(url.to_owned()));
        }
        tracing::info!(feed = %url, file = %output_file, "Feed added");
        Ok(settings)
    }

    /// Unsubscribe from `url`. Its output file is left alone.
    pub async fn remove_feed(&self, url: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("DELETE FROM feeds WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), url)?;
        tracing::info!(feed = %url, "Feed removed");
        Ok(())
    }

    /// Turn polling of `url` on or off.
    pub async fn set_feed_enabled(&self, url: &str, enabled: bool) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE feeds SET enabled = ? WHERE url = ?")
            .bind(enabled)
            .bind(url)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), url)
    }

    pub async fn set_output_file(&self, url: &str, output_file: &str) -> Result<(), DatabaseError> {
        let result = sqlx::query("UPDATE feeds SET output_file = ? WHERE url = ?")
            .bind(output_file)
            .bind(url)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), url)
    }

    /// Cap on items written per poll. Must be at least 1.
    pub async fn set_max_items(&self, url: &str, count: usize) -> Result<(), DatabaseError> {
        if count == 0 {
            return Err(DatabaseError::InvalidMaxItems);
        }
        let result = sqlx::query("UPDATE feeds SET max_items = ? WHERE url = ?")
            .bind(count as i64)
            .bind(url)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), url)
    }

    /// Replace one of the feed's whitelists.
    ///
    /// Names are case-folded and unknown ones dropped. If nothing legal is
    /// left the old list stays. Returns the list in effect afterwards.
    pub async fn reconfigure_fields<S: AsRef<str>>(
        &self,
        url: &str,
        kind: FieldKind,
        names: &[S],
    ) -> Result<Vec<String>, DatabaseError> {
        let current = self.get_feed(url).await?.settings;
        let fields = sanitize_fields(kind, names);
        if fields.is_empty() {
            tracing::debug!(feed = %url, ?kind, "No legal field names given; keeping whitelist");
            return Ok(current.fields(kind).to_vec());
        }

        let query = match kind {
            FieldKind::Channel => "UPDATE feeds SET channel_fields = ? WHERE url = ?",
            FieldKind::Item => "UPDATE feeds SET item_fields = ? WHERE url = ?",
        };
        let result = sqlx::query(query)
            .bind(join_fields(&fields))
            .bind(url)
            .execute(&self.pool)
            .await?;
        expect_row(result.rows_affected(), url)?;
        Ok(fields)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn get_feed(&self, url: &str) -> Result<FeedRecord, DatabaseError> {
        let row: Option<FeedDbRow> = sqlx::query_as(&format!("{SELECT_FEEDS} WHERE url = ?"))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row.into_record(),
            None => Err(DatabaseError::UnknownFeed(url.to_owned())),
        }
    }

    /// All subscriptions in the order they were added.
    pub async fn list_feeds(&self) -> Result<Vec<FeedRecord>, DatabaseError> {
        let rows: Vec<FeedDbRow> = sqlx::query_as(&format!("{SELECT_FEEDS} ORDER BY added_at, url"))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(FeedDbRow::into_record).collect()
    }

    /// Freeze the current settings of every feed for one poll cycle.
    pub async fn snapshot(&self) -> Result<ConfigSnapshot, DatabaseError> {
        let records = self.list_feeds().await?;
        Ok(ConfigSnapshot::new(records.into_iter().map(|r| r.settings)))
    }

    // ========================================================================
    // Poll Bookkeeping
    // ========================================================================

    /// Move the feed's cursor to `latest`.
    ///
    /// `None` is ignored, as is a timestamp older than the stored one. Returns
    /// whether the stored cursor changed.
    pub async fn advance_cursor(
        &self,
        url: &str,
        latest: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError> {
        let Some(latest) = latest else {
            return Ok(false);
        };

        let result = sqlx::query(
            "UPDATE feeds SET last_published = ?
             WHERE url = ? AND (last_published IS NULL OR last_published < ?)",
        )
        .bind(latest.timestamp())
        .bind(url)
        .bind(latest.timestamp())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            tracing::debug!(feed = %url, cursor = %latest, "Cursor advanced");
            return Ok(true);
        }
        // Distinguish "not newer" from "no such feed"
        self.get_feed(url).await?;
        Ok(false)
    }

    /// Batch update per-feed error statuses in a single UPDATE statement.
    ///
    /// PERF-002: One bulk UPDATE with a CASE expression instead of one
    /// statement per feed. `None` clears the error.
    pub async fn record_poll_errors(
        &self,
        updates: &[(String, Option<String>)],
    ) -> Result<(), DatabaseError> {
        if updates.is_empty() {
            return Ok(());
        }

        // Build: UPDATE feeds SET error = CASE url
        //            WHEN 'a' THEN 'error1'
        //            WHEN 'b' THEN NULL
        //        END
        //        WHERE url IN ('a', 'b')
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("UPDATE feeds SET error = CASE url ");

        for (url, error) in updates {
            builder.push("WHEN ");
            builder.push_bind(url.as_str());
            builder.push(" THEN ");
            builder.push_bind(error.as_deref());
            builder.push(" ");
        }

        builder.push("END WHERE url IN (");
        let mut separated = builder.separated(", ");
        for (url, _) in updates {
            separated.push_bind(url.as_str());
        }
        separated.push_unseparated(")");

        let mut tx = self.pool.begin().await?;
        builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(())
    }
}

fn expect_row(rows_affected: u64, url: &str) -> Result<(), DatabaseError> {
    if rows_affected == 0 {
        Err(DatabaseError::UnknownFeed(url.to_owned()))
    } else {
        Ok(())
    }
}
