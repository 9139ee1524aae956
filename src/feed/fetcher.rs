//! HTTP download of feed documents.

use futures::stream::StreamExt;
use std::time::Duration;
use thiserror::Error;

/// Extra attempts after the first for transient failures.
const MAX_RETRIES: u32 = 3;
/// Upper bound on a feed body.
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, connect, TLS or body stream failure
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    #[error("Request timed out")]
    Timeout,

    /// Still 429 after every retry
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),

    #[error("Feed exceeds {} bytes", MAX_FEED_SIZE)]
    ResponseTooLarge,

    /// Body ended before Content-Length bytes arrived
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

impl FetchError {
    /// 429, 5xx and truncated bodies are worth another attempt.
    fn is_transient(&self) -> bool {
        match self {
            FetchError::HttpStatus(status) => *status == 429 || (500..600).contains(status),
            FetchError::IncompleteResponse { .. } => true,
            _ => false,
        }
    }
}

/// Downloads the raw feed document at `url`.
///
/// Every attempt, headers and body together, is bounded by `timeout`.
/// Transient failures (429, 5xx and truncated bodies) are retried up to three
/// times, waiting 1s, 2s and 4s; a server that keeps answering 429 ends as
/// [`FetchError::RateLimited`]. Bodies over 10 MB are refused.
pub async fn fetch_feed(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Vec<u8>, FetchError> {
    let mut retry = 0;

    loop {
        let outcome = tokio::time::timeout(timeout, attempt(client, url))
            .await
            .unwrap_or(Err(FetchError::Timeout));
        let err = match outcome {
            Ok(bytes) => return Ok(bytes),
            Err(e) if e.is_transient() && retry < MAX_RETRIES => e,
            Err(FetchError::HttpStatus(429)) => return Err(FetchError::RateLimited(MAX_RETRIES)),
            Err(e) => return Err(e),
        };

        // EDGE-004: exponential backoff, 1s then 2s then 4s
        let delay = Duration::from_secs(2u64.pow(retry));
        tracing::warn!(
            feed = %url,
            error = %err,
            retry,
            delay_secs = delay.as_secs(),
            "Transient fetch failure, retrying"
        );
        tokio::time::sleep(delay).await;
        retry += 1;
    }
}

async fn attempt(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::HttpStatus(status.as_u16()));
    }
    read_limited_bytes(response, MAX_FEED_SIZE).await
}

/// Streams the body, giving up as soon as it passes `limit`.
async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let declared = response.content_length();
    if declared.is_some_and(|len| len > limit as u64) {
        return Err(FetchError::ResponseTooLarge);
    }

    let mut body = Vec::with_capacity(declared.map_or(0, |len| len as usize));
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        body.extend_from_slice(&chunk);
    }

    match declared {
        Some(expected) if (body.len() as u64) < expected => Err(FetchError::IncompleteResponse {
            expected,
            received: body.len(),
        }),
        _ => Ok(body),
    }
}
