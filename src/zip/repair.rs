//! Repair of "fake" (pseudo) encryption.
//!
//! Some archives set the encrypted bit on entries whose data was never
//! encrypted, so ordinary tools ask for a password that does not exist.
//! Clearing the bit in both copies of the header makes the archive
//! readable again; nothing else in the file changes.

use anyhow::{Result, bail};

use super::structures::{
    CDFH_FLAGS_OFFSET, CDFH_SIGNATURE, GeneralFlags, LFH_FLAGS_OFFSET, LFH_SIGNATURE,
    ZipFileEntry,
};

/// Clear the encrypted bit of `entries` inside the in-memory `archive`.
pub fn clear_encryption_flags<'a>(
    archive: &mut [u8],
    entries: impl IntoIterator<Item = &'a ZipFileEntry>,
) -> Result<usize> {
    let mut patched = 0;
    for entry in entries {
        clear_flag(archive, entry.cdfh_offset, CDFH_SIGNATURE, CDFH_FLAGS_OFFSET)?;
        clear_flag(archive, entry.lfh_offset, LFH_SIGNATURE, LFH_FLAGS_OFFSET)?;
        patched += 1;
    }
    Ok(patched)
}

fn clear_flag(archive: &mut [u8], header: u64, signature: &[u8], flags_at: u64) -> Result<()> {
    let start = header as usize;
    let at = (header + flags_at) as usize;
    if at + 2 > archive.len() || archive.get(start..start + 4) != Some(signature) {
        bail!("No header at offset {}", header);
    }

    let flags = GeneralFlags(u16::from_le_bytes([archive[at], archive[at + 1]]));
    archive[at..at + 2].copy_from_slice(&flags.without_encryption().0.to_le_bytes());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zip::structures::CompressionMethod;

    #[test]
    fn test_clears_both_headers() {
        let mut archive = vec![0u8; 100];
        archive[0..4].copy_from_slice(LFH_SIGNATURE);
        archive[6] = 0x09;
        archive[50..54].copy_from_slice(CDFH_SIGNATURE);
        archive[58] = 0x01;

        let entry = ZipFileEntry {
            file_name: "x".into(),
            flags: GeneralFlags(0x01),
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            cdfh_offset: 50,
            last_mod_time: 0,
            is_directory: false,
        };

        assert_eq!(clear_encryption_flags(&mut archive, [&entry]).unwrap(), 1);
        assert_eq!(archive[6], 0x08);
        assert_eq!(archive[58], 0x00);
    }

    #[test]
    fn test_rejects_wrong_offset() {
        let mut archive = vec![0u8; 10];
        let entry = ZipFileEntry {
            file_name: "x".into(),
            flags: GeneralFlags(0x01),
            compression_method: CompressionMethod::Stored,
            compressed_size: 0,
            uncompressed_size: 0,
            crc32: 0,
            lfh_offset: 0,
            cdfh_offset: 4,
            last_mod_time: 0,
            is_directory: false,
        };
        assert!(clear_encryption_flags(&mut archive, [&entry]).is_err());
    }
}
