//! Fetches remote assets as byte streams and persists them to disk.

use std::{io::Write, path::Path, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream::BoxStream, StreamExt, TryStreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Body of a successful response, delivered chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// A response with status 200.
pub struct Fetched {
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

/// Retrieves a remote asset.
///
/// Anything but a 200 is `Error::FetchFailure`; the caller decides whether
/// to skip the period. Implementations never touch the disk.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Fetched>;
}

/// Fetcher backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Transfer(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::Transfer(format!("failed to download file: {}", e)))?;

        if response.status() != StatusCode::OK {
            return Err(Error::FetchFailure {
                status: response.status().as_u16(),
            });
        }

        let content_length = response.content_length();
        let body = response
            .bytes_stream()
            .map_err(|e| Error::Transfer(format!("error reading chunk: {}", e)))
            .boxed();

        Ok(Fetched {
            content_length,
            body,
        })
    }
}

/// Backoff schedule for [`RetryingFetcher`].
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Doubles after every failed attempt.
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the one just used.
    pub fn next_delay(&self, delay: Duration) -> Duration {
        std::cmp::min(delay * 2, self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
        }
    }
}

/// Wraps a fetcher with exponential backoff on server errors and requests
/// that fail before a response arrives. Client errors (4xx) are returned
/// immediately. A body that breaks off after a 200 is not retried here; the
/// pipeline restarts the whole download.
pub struct RetryingFetcher<F> {
    inner: F,
    policy: RetryPolicy,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

fn is_retryable(error: &Error) -> bool {
    match error {
        Error::FetchFailure { status } => (500..600).contains(status),
        Error::Transfer(_) => true,
        _ => false,
    }
}

#[async_trait]
impl<F: Fetcher> Fetcher for RetryingFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        let mut retry_count = 0;
        let mut delay = self.policy.initial_delay;

        loop {
            match self.inner.fetch(url).await {
                Err(e) if is_retryable(&e) && retry_count < self.policy.max_retries => {
                    retry_count += 1;
                    warn!(
                        url = %url,
                        error = %e,
                        retry = retry_count,
                        max_retries = self.policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = self.policy.next_delay(delay);
                }
                result => return result,
            }
        }
    }
}

/// Writes `body` to `dest` through a sibling temporary file, returning the
/// number of bytes written. `dest` only appears once the stream completed.
pub async fn save_stream(
    mut body: ByteStream,
    dest: &Path,
    progress_bar: Option<&ProgressBar>,
) -> Result<u64> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let file_name = dest
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut tmp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".part")
        .tempfile_in(dir)?;

    let mut downloaded = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        tmp.write_all(&chunk)?;
        downloaded += chunk.len() as u64;
        if let Some(pb) = progress_bar {
            pb.set_position(downloaded);
        }
    }
    tmp.flush()?;

    tmp.persist(dest).map_err(|e| e.error)?;
    debug!(path = %dest.display(), bytes = downloaded, "Saved download");

    Ok(downloaded)
}

/// Byte progress bar for a download of known size, spinner otherwise.
pub fn download_progress_bar(content_length: Option<u64>, message: String) -> ProgressBar {
    match content_length {
        Some(total_size) if total_size > 0 => ProgressBar::new(total_size)
            .with_message(message)
            .with_style(
                ProgressStyle::with_template(
                    "{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({percent}%) {eta}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
            ),
        _ => crate::cli::create_spinner(message),
    }
}

// -- Tests -------------------------------------------------------------------
