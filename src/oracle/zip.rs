use std::cmp::Reverse;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::fs;

use crate::io::ReadAt;
use crate::zip::{CompressionMethod, ZipExtractor, ZipFileEntry, crypto, decode_entry, repair};

use super::{ArchiveInfo, ArchiveKind, ArchiveOracle, EntryInfo};

/// Entries larger than this are not probed for fake encryption.
const FAKE_PROBE_LIMIT: u64 = 1 << 20;

/// Raw bytes preloaded for password checks, across all verifiers.
const VERIFIER_BUDGET: u64 = 8 << 20;

/// Most entries a candidate password is checked against.
const MAX_VERIFIERS: usize = 4;

/// Encrypted entry kept in memory for password checks.
struct Verifier {
    entry: ZipFileEntry,
    raw: Vec<u8>,
}

/// [`ArchiveOracle`] for ZIP archives using traditional PKWARE encryption.
///
/// Everything `try_password` needs is loaded by [`ZipOracle::open`], so
/// password checks never touch the reader. A candidate is accepted only
/// when it opens every preloaded entry: all header check bytes first, then
/// a full decode with CRC check of each entry, largest first.
pub struct ZipOracle<R: ReadAt> {
    extractor: ZipExtractor<R>,
    /// Entries with bogus encryption flags cleared.
    entries: Vec<ZipFileEntry>,
    /// Entries whose encryption flag is bogus, as found in the archive.
    fake: Vec<ZipFileEntry>,
    flagged_encrypted: bool,
    verifiers: Vec<Verifier>,
}

impl<R: ReadAt> ZipOracle<R> {
    pub async fn open(reader: Arc<R>) -> Result<Self> {
        let extractor = ZipExtractor::new(reader);
        let listed = extractor.list_files().await?;
        tracing::debug!("Central directory lists {} entries", listed.len());

        let flagged_encrypted = listed.iter().any(|e| e.is_encrypted());
        let mut entries = Vec::with_capacity(listed.len());
        let mut fake = Vec::new();

        for entry in listed {
            if entry.is_encrypted() && is_fake_encrypted(&extractor, &entry).await? {
                tracing::info!(
                    "{} is flagged encrypted but stored in the clear",
                    entry.file_name
                );
                let mut cleared = entry.clone();
                cleared.flags = entry.flags.without_encryption();
                fake.push(entry);
                entries.push(cleared);
            } else {
                entries.push(entry);
            }
        }

        let mut verifiers = Vec::new();
        for entry in pick_verifiers(&entries) {
            let raw = extractor.parser().read_raw_data(entry).await?;
            tracing::debug!(
                "Verifying candidates against {} ({} bytes)",
                entry.file_name,
                raw.len()
            );
            verifiers.push(Verifier {
                entry: entry.clone(),
                raw,
            });
        }
        if let [only] = verifiers.as_slice() {
            if only.entry.uncompressed_size < 4 {
                tracing::warn!(
                    "Only {} ({} bytes) can confirm a password, expect rare false positives",
                    only.entry.file_name,
                    only.entry.uncompressed_size
                );
            }
        }

        Ok(Self {
            extractor,
            entries,
            fake,
            flagged_encrypted,
            verifiers,
        })
    }
}

/// An entry is fake-encrypted when its local header does not repeat the
/// flag, or when its stored bytes already decode to the recorded CRC.
async fn is_fake_encrypted<R: ReadAt>(
    extractor: &ZipExtractor<R>,
    entry: &ZipFileEntry,
) -> Result<bool> {
    if entry.is_directory {
        return Ok(false);
    }

    let local = extractor.parser().local_header(entry).await?;
    if !local.flags.is_encrypted() {
        return Ok(true);
    }

    if entry.compressed_size > FAKE_PROBE_LIMIT || entry.flags.is_strong_encryption() {
        return Ok(false);
    }

    let raw = extractor.parser().read_raw_data(entry).await?;
    let mut cleared = entry.clone();
    cleared.flags = entry.flags.without_encryption();
    Ok(decode_entry(&cleared, &raw, None).is_ok())
}

/// Genuinely encrypted, non-empty files we know how to decrypt, largest
/// first, within [`VERIFIER_BUDGET`]. When every candidate is over budget
/// the smallest one is used alone. Empty files never qualify: their CRC
/// tells nothing about the password.
fn pick_verifiers(entries: &[ZipFileEntry]) -> Vec<&ZipFileEntry> {
    let mut candidates: Vec<&ZipFileEntry> = entries
        .iter()
        .filter(|e| e.is_encrypted() && !e.is_directory && !e.flags.is_strong_encryption())
        .filter(|e| e.uncompressed_size > 0)
        .filter(|e| {
            matches!(
                e.compression_method,
                CompressionMethod::Stored | CompressionMethod::Deflate
            )
        })
        .collect();
    candidates.sort_by_key(|e| Reverse(e.compressed_size));

    let mut budget = VERIFIER_BUDGET;
    let mut picked = Vec::new();
    for &entry in &candidates {
        if picked.len() == MAX_VERIFIERS {
            break;
        }
        if entry.compressed_size <= budget {
            budget -= entry.compressed_size;
            picked.push(entry);
        }
    }
    if picked.is_empty() {
        picked.extend(candidates.last().copied());
    }
    picked
}

fn entry_info(entry: &ZipFileEntry) -> EntryInfo {
    EntryInfo {
        name: entry.file_name.clone(),
        crc32: entry.crc32,
        size: entry.uncompressed_size,
        compressed_size: entry.compressed_size,
        encrypted: entry.is_encrypted(),
        is_directory: entry.is_directory,
    }
}

#[async_trait]
impl<R: ReadAt + 'static> ArchiveOracle for ZipOracle<R> {
    async fn analyze(&self) -> Result<ArchiveInfo> {
        let entries: Vec<EntryInfo> = self.entries.iter().map(entry_info).collect();
        let file_count = entries.iter().filter(|e| !e.is_directory).count();
        let total_size = entries.iter().map(|e| e.size).sum();

        if self.verifiers.is_empty() && entries.iter().any(|e| e.encrypted) {
            tracing::warn!("No encrypted entry uses a method that can be verified");
        }

        Ok(ArchiveInfo {
            kind: ArchiveKind::Zip,
            is_encrypted: self.flagged_encrypted,
            file_count,
            total_size,
            entries,
            has_fake_encryption: !self.fake.is_empty(),
            can_verify: !self.verifiers.is_empty(),
        })
    }

    fn try_password(&self, candidate: &str) -> bool {
        if self.verifiers.is_empty() {
            return false;
        }
        let password = candidate.as_bytes();

        let headers_match = self.verifiers.iter().all(|v| {
            crypto::check_header(password, &v.raw, v.entry.check_byte()).is_some()
        });
        headers_match
            && self
                .verifiers
                .iter()
                .all(|v| decode_entry(&v.entry, &v.raw, Some(password)).is_ok())
    }

    async fn extract(&self, password: Option<&str>, output_dir: &Path) -> Result<usize> {
        let written = self
            .extractor
            .extract_entries(&self.entries, output_dir, password.map(str::as_bytes))
            .await?;
        tracing::info!("Extracted {} files to {}", written, output_dir.display());
        Ok(written)
    }

    async fn repair_fake_encryption(&self, output_path: &Path) -> Result<usize> {
        if self.fake.is_empty() {
            bail!("Archive has no fake-encrypted entries");
        }

        let mut archive = self.extractor.parser().reader().read_all().await?;
        let repaired = repair::clear_encryption_flags(&mut archive, &self.fake)?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(output_path, &archive).await?;
        tracing::info!(
            "Cleared fake encryption on {} entries into {}",
            repaired,
            output_path.display()
        );
        Ok(repaired)
    }
}
