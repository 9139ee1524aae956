//! Output files that collect each feed's new items.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;

use crate::feed::{render_channel, Channel, FeedSettings};
use crate::storage::Database;

/// Creates `path` if it does not exist. Existing content is kept.
pub async fn ensure_output_file(path: &Path) -> std::io::Result<()> {
    tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    Ok(())
}

/// Adds `url` to the registry with `path` as its output file.
///
/// The file is created first, so a path that cannot be written never reaches
/// the registry.
pub async fn subscribe(
    db: &Database,
    url: &str,
    path: &Path,
    max_items: usize,
) -> Result<FeedSettings> {
    let file = output_path_str(path)?;
    ensure_output_file(path)
        .await
        .with_context(|| format!("Cannot create output file {}", path.display()))?;
    Ok(db.add_feed(url, file, max_items).await?)
}

/// Points `url` at a new output file, creating it before the registry changes.
pub async fn reassociate(db: &Database, url: &str, path: &Path) -> Result<()> {
    let file = output_path_str(path)?;
    ensure_output_file(path)
        .await
        .with_context(|| format!("Cannot create output file {}", path.display()))?;
    Ok(db.set_output_file(url, file).await?)
}

fn output_path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in path {}", path.display()))
}

/// Append the rendering of `channel` to `path`, creating the file if needed.
///
/// A channel without items writes nothing. Returns whether anything was
/// written.
pub async fn append_channel(
    path: &Path,
    channel: &Channel,
    settings: &FeedSettings,
) -> std::io::Result<bool> {
    if !channel.has_items() {
        return Ok(false);
    }

    let text = render_channel(channel, settings);
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(text.as_bytes()).await?;
    file.flush().await?;

    tracing::debug!(
        feed = %settings.url,
        path = %path.display(),
        items = channel.items.len(),
        "Appended channel"
    );
    Ok(true)
}
