//! The archive oracle: everything the attack needs to know about a
//! container format, behind one trait.
//!
//! The coordinator never parses archives itself. It asks an
//! [`ArchiveOracle`] to describe the archive, to check a candidate password,
//! and to extract once a password is confirmed. Only ZIP has an
//! implementation ([`ZipOracle`]); other formats are recognised by name so
//! they can be rejected with a clear message.

mod zip;

pub use self::zip::ZipOracle;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::SetupError;
use crate::io::{self, HttpRangeReader, LocalFileReader, ReadAt};

/// Container formats recognised by file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zip,
    Rar,
    SevenZip,
    Unknown,
}

impl ArchiveKind {
    /// Guess the format from the extension of a path or URL.
    pub fn detect(target: &str) -> Self {
        let path = target
            .split(['?', '#'])
            .next()
            .unwrap_or(target);
        let extension = Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);

        match extension.as_deref() {
            Some("zip") => ArchiveKind::Zip,
            Some("rar") => ArchiveKind::Rar,
            Some("7z") => ArchiveKind::SevenZip,
            _ => ArchiveKind::Unknown,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ArchiveKind::Zip => "ZIP",
            ArchiveKind::Rar => "RAR",
            ArchiveKind::SevenZip => "7-Zip",
            ArchiveKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One archive member as seen by the attack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: String,
    pub crc32: u32,
    pub size: u64,
    pub compressed_size: u64,
    pub encrypted: bool,
    pub is_directory: bool,
}

/// Result of [`ArchiveOracle::analyze`].
#[derive(Debug, Clone)]
pub struct ArchiveInfo {
    pub kind: ArchiveKind,
    pub is_encrypted: bool,
    pub file_count: usize,
    pub total_size: u64,
    pub entries: Vec<EntryInfo>,
    pub has_fake_encryption: bool,
    /// Whether [`ArchiveOracle::try_password`] can confirm a password.
    pub can_verify: bool,
}

impl ArchiveInfo {
    /// Encrypted files short enough for CRC plaintext recovery.
    pub fn crc_targets(&self, max_size: usize) -> impl Iterator<Item = &EntryInfo> {
        self.entries.iter().filter(move |e| {
            e.encrypted && !e.is_directory && e.size > 0 && e.size <= max_size as u64
        })
    }
}

/// Verification and extraction capability for one opened archive.
#[async_trait]
pub trait ArchiveOracle: Send + Sync {
    /// Describe the archive.
    async fn analyze(&self) -> Result<ArchiveInfo>;

    /// Confirm that `candidate` unlocks the archive without extracting it.
    ///
    /// Called from worker threads for every candidate, so it must be cheap
    /// and must not block on I/O. Internal failures count as a mismatch.
    fn try_password(&self, candidate: &str) -> bool;

    /// Extract every entry into `output_dir`, creating it. Returns the
    /// number of files written.
    async fn extract(&self, password: Option<&str>, output_dir: &Path) -> Result<usize>;

    /// Write a copy of the archive with bogus encryption flags cleared.
    /// Returns the number of entries repaired.
    async fn repair_fake_encryption(&self, output_path: &Path) -> Result<usize>;
}

/// Open the archive named by `target` (local path or HTTP URL).
pub async fn open_target(target: &str) -> Result<Arc<dyn ArchiveOracle>> {
    let kind = ArchiveKind::detect(target);
    match kind {
        ArchiveKind::Rar | ArchiveKind::SevenZip => {
            return Err(SetupError::UnsupportedArchive(kind.name()).into());
        }
        ArchiveKind::Unknown => {
            tracing::warn!("Unrecognised extension for {}, trying ZIP", target);
        }
        ArchiveKind::Zip => {}
    }

    if io::is_http_url(target) {
        let reader = Arc::new(HttpRangeReader::new(target.to_string()).await?);
        let oracle = ZipOracle::open(reader.clone()).await?;
        tracing::info!(
            "Fetched {} of {} bytes from {}",
            reader.transferred_bytes(),
            reader.size(),
            target
        );
        Ok(Arc::new(oracle))
    } else {
        let path = Path::new(target);
        if !path.exists() {
            return Err(SetupError::TargetNotFound(path.to_path_buf()).into());
        }
        let reader = LocalFileReader::new(path)?;
        Ok(Arc::new(ZipOracle::open(Arc::new(reader)).await?))
    }
}
