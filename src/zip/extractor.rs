use flate2::read::DeflateDecoder;
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::crc32;
use crate::io::ReadAt;
use anyhow::{Result, bail};

use super::crypto::{self, HEADER_LEN};
use super::parser::ZipParser;
use super::structures::{CompressionMethod, ZipFileEntry};

/// Turn an entry's stored bytes into its plaintext.
///
/// Encrypted entries need `password`; the header check byte is verified
/// first. The result is checked against the entry's size and CRC-32.
pub fn decode_entry(entry: &ZipFileEntry, raw: &[u8], password: Option<&[u8]>) -> Result<Vec<u8>> {
    let payload = if entry.is_encrypted() {
        let Some(password) = password else {
            bail!("{} is encrypted and no password was given", entry.file_name);
        };
        let Some(mut keys) = crypto::check_header(password, raw, entry.check_byte()) else {
            bail!("Wrong password for {}", entry.file_name);
        };
        let mut payload = raw[HEADER_LEN..].to_vec();
        keys.decrypt(&mut payload);
        payload
    } else {
        raw.to_vec()
    };

    let data = decompress(entry, payload)?;
    if data.len() as u64 != entry.uncompressed_size {
        bail!(
            "Size mismatch for {}: expected {}, got {}",
            entry.file_name,
            entry.uncompressed_size,
            data.len()
        );
    }
    let actual = crc32::crc32(&data);
    if actual != entry.crc32 {
        bail!(
            "CRC mismatch for {}: expected 0x{:08X}, got 0x{:08X}",
            entry.file_name,
            entry.crc32,
            actual
        );
    }
    Ok(data)
}

fn decompress(entry: &ZipFileEntry, payload: Vec<u8>) -> Result<Vec<u8>> {
    match entry.compression_method {
        CompressionMethod::Stored => Ok(payload),
        CompressionMethod::Deflate => {
            // Never inflate past the declared size, wrong keys produce noise
            let limit = entry.uncompressed_size.saturating_add(1);
            let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 20) as usize);
            DeflateDecoder::new(payload.as_slice())
                .take(limit)
                .read_to_end(&mut out)?;
            Ok(out)
        }
        CompressionMethod::Aes => bail!("AES-encrypted entries are not supported"),
        CompressionMethod::Unknown(method) => {
            bail!("Unsupported compression method: {}", method)
        }
    }
}

/// Map an entry name to a path below `root`, refusing anything that would
/// escape it.
pub fn safe_output_path(root: &Path, name: &str) -> Option<PathBuf> {
    let mut path = root.to_path_buf();
    let mut any = false;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => {
                path.push(part);
                any = true;
            }
            Component::CurDir => {}
            _ => return None,
        }
    }
    any.then_some(path)
}

/// ZIP file extractor
pub struct ZipExtractor<R: ReadAt> {
    parser: ZipParser<R>,
}

impl<R: ReadAt> ZipExtractor<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self {
            parser: ZipParser::new(reader),
        }
    }

    pub fn parser(&self) -> &ZipParser<R> {
        &self.parser
    }

    /// List all files in the archive
    pub async fn list_files(&self) -> Result<Vec<ZipFileEntry>> {
        self.parser.list_files().await
    }

    /// Extract file data to memory
    pub async fn extract_to_memory(
        &self,
        entry: &ZipFileEntry,
        password: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let raw = self.parser.read_raw_data(entry).await?;
        decode_entry(entry, &raw, password)
    }

    /// Extract file to disk
    pub async fn extract_to_file(
        &self,
        entry: &ZipFileEntry,
        password: Option<&[u8]>,
        output_path: &Path,
    ) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let data = self.extract_to_memory(entry, password).await?;

        let mut file = fs::File::create(output_path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        Ok(())
    }

    /// Extract `entries` below `output_dir`, returning how many files were
    /// written.
    ///
    /// Entries whose names would escape the directory are skipped. A failing
    /// entry does not stop the others; the call fails afterwards if any did.
    pub async fn extract_entries(
        &self,
        entries: &[ZipFileEntry],
        output_dir: &Path,
        password: Option<&[u8]>,
    ) -> Result<usize> {
        fs::create_dir_all(output_dir).await?;

        let mut written = 0;
        let mut failed = 0;
        for entry in entries {
            let Some(output_path) = safe_output_path(output_dir, &entry.file_name) else {
                tracing::warn!("Skipping unsafe entry name: {}", entry.file_name);
                continue;
            };

            if entry.is_directory {
                fs::create_dir_all(&output_path).await?;
                continue;
            }

            tracing::debug!("extracting: {}", entry.file_name);
            match self.extract_to_file(entry, password, &output_path).await {
                Ok(()) => written += 1,
                Err(e) => {
                    tracing::warn!("Failed to extract {}: {:#}", entry.file_name, e);
                    failed += 1;
                }
            }
        }

        if failed > 0 {
            bail!("{} of {} entries could not be extracted", failed, written + failed);
        }
        Ok(written)
    }
}
