use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::ReadAt;
use anyhow::{Context, Result, anyhow, bail};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 10;
/// Delay before retry `n` is `n` times this.
const RETRY_STEP: Duration = Duration::from_millis(500);

/// Archive size from a HEAD response, provided the server serves byte
/// ranges.
fn ranged_length(headers: &HeaderMap) -> Result<u64> {
    let accepts_bytes = headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.split(',').any(|unit| unit.trim() == "bytes"));
    if !accepts_bytes {
        bail!("Remote server does not support Range requests");
    }

    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(|| anyhow!("Remote server did not return Content-Length"))
}

/// Reader for remote archives over HTTP Range requests
///
/// Only the byte ranges the parser asks for are downloaded: the directory
/// tail, plus the entries that are verified or extracted.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
}

impl HttpRangeReader {
    /// Connect to `url` and learn the archive size from a HEAD request
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let resp = client
            .head(&url)
            .send()
            .await
            .with_context(|| format!("HEAD {} failed", url))?;
        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }
        let size = ranged_length(resp.headers())?;
        tracing::debug!("Remote archive {} is {} bytes", url, size);

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
        })
    }

    /// Bytes downloaded so far
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    /// One ranged GET for `start..=end`, retried on timeouts and connection
    /// failures. The server may answer with fewer bytes than asked.
    async fn fetch(&self, start: u64, end: u64) -> Result<Vec<u8>> {
        let range = format!("bytes={}-{}", start, end);
        let mut attempt = 0;

        loop {
            attempt += 1;
            let err = match self.client.get(&self.url).header(RANGE, &range).send().await {
                Ok(resp) if resp.status() == StatusCode::PARTIAL_CONTENT => {
                    match resp.bytes().await {
                        Ok(body) if body.is_empty() => {
                            bail!("Server returned an empty range for {}", range)
                        }
                        Ok(body) => return Ok(body.to_vec()),
                        Err(e) => e,
                    }
                }
                Ok(resp) => bail!("HTTP request failed with status: {}", resp.status()),
                Err(e) => e,
            };

            if !(err.is_timeout() || err.is_connect()) || attempt >= MAX_ATTEMPTS {
                return Err(err).with_context(|| format!("GET {} ({})", self.url, range));
            }
            tracing::warn!(
                "Fetching {} failed, retry {}/{}: {}",
                range,
                attempt,
                MAX_ATTEMPTS - 1,
                err
            );
            tokio::time::sleep(RETRY_STEP * attempt).await;
        }
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() || offset >= self.size {
            return Ok(0);
        }

        let end = (offset + buf.len() as u64 - 1).min(self.size - 1);
        let wanted = (end - offset + 1) as usize;
        let mut received = 0;

        while received < wanted {
            let body = self.fetch(offset + received as u64, end).await?;
            let chunk = body.len().min(wanted - received);
            buf[received..received + chunk].copy_from_slice(&body[..chunk]);
            received += chunk;
            self.transferred_bytes
                .fetch_add(chunk as u64, Ordering::Relaxed);
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
