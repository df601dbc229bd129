//! Random-access archive sources.
//!
//! The cracker never streams an archive front to back: it reads the
//! central directory from the tail and then jumps to the few entries it
//! needs. [`ReadAt`] captures exactly that, for local files and for remote
//! files served with HTTP Range support.

mod http;
mod local;

pub use http::HttpRangeReader;
pub use local::LocalFileReader;

use anyhow::{Result, bail};
use async_trait::async_trait;

/// Trait for random access reading from a data source
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Read data at the specified offset into the buffer, returning the
    /// number of bytes read (zero at end of data)
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    /// Get the total size of the data source
    fn size(&self) -> u64;

    /// Fill `buf` completely from `offset` or fail
    async fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read_at(offset + filled as u64, &mut buf[filled..]).await?;
            if n == 0 {
                bail!(
                    "Unexpected end of archive at offset {} (wanted {} more bytes)",
                    offset + filled as u64,
                    buf.len() - filled
                );
            }
            filled += n;
        }
        Ok(())
    }

    /// Read the whole source into memory
    async fn read_all(&self) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; self.size() as usize];
        self.read_exact_at(0, &mut buf).await?;
        Ok(buf)
    }
}

/// Whether `target` names a remote archive rather than a local path
pub fn is_http_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}
