//! In-process ZIP archives for integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::DeflateEncoder;
use zipcrack::crc32;
use zipcrack::zip::crypto::ZipCryptoKeys;

/// How an entry is protected.
#[derive(Clone, Copy)]
pub enum Protection<'a> {
    None,
    Password(&'a str),
    /// Encrypted flag set in both headers, data stored in the clear
    Fake,
}

pub struct TestEntry<'a> {
    pub name: &'a str,
    pub data: &'a [u8],
    pub deflate: bool,
    pub protection: Protection<'a>,
}

impl<'a> TestEntry<'a> {
    pub fn plain(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            deflate: false,
            protection: Protection::None,
        }
    }

    pub fn encrypted(name: &'a str, data: &'a [u8], password: &'a str) -> Self {
        Self {
            name,
            data,
            deflate: false,
            protection: Protection::Password(password),
        }
    }

    pub fn fake(name: &'a str, data: &'a [u8]) -> Self {
        Self {
            name,
            data,
            deflate: false,
            protection: Protection::Fake,
        }
    }

    pub fn deflated(mut self) -> Self {
        self.deflate = true;
        self
    }
}

pub fn build_zip(entries: &[TestEntry]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        let crc = crc32::crc32(entry.data);
        let (method, mut payload) = if entry.deflate {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(entry.data).unwrap();
            (8u16, encoder.finish().unwrap())
        } else {
            (0u16, entry.data.to_vec())
        };

        let flags: u16 = match entry.protection {
            Protection::None => 0,
            Protection::Password(password) => {
                let mut sealed = vec![index as u8 ^ 0x5A; 11];
                sealed.push((crc >> 24) as u8);
                sealed.extend_from_slice(&payload);
                ZipCryptoKeys::new(password.as_bytes()).encrypt(&mut sealed);
                payload = sealed;
                1
            }
            Protection::Fake => 1,
        };

        let lfh_offset = out.len() as u32;
        let name = entry.name.as_bytes();

        out.extend_from_slice(b"PK\x03\x04");
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(&method.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0x5A21u16.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name);
        out.extend_from_slice(&payload);

        central.extend_from_slice(b"PK\x01\x02");
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&flags.to_le_bytes());
        central.extend_from_slice(&method.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0x5A21u16.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        central.extend_from_slice(&(entry.data.len() as u32).to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&lfh_offset.to_le_bytes());
        central.extend_from_slice(name);
    }

    let cd_offset = out.len() as u32;
    out.extend_from_slice(&central);

    out.extend_from_slice(b"PK\x05\x06");
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(central.len() as u32).to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

/// Write `entries` as `name` inside `dir`.
pub fn write_zip(dir: &Path, name: &str, entries: &[TestEntry]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, build_zip(entries)).unwrap();
    path
}

/// Word list with `password` on line `line` (1-based) among `total` lines.
pub fn write_word_list(dir: &Path, total: usize, password: Option<(&str, usize)>) -> PathBuf {
    let path = dir.join("words.txt");
    let mut text = String::new();
    for n in 1..=total {
        match password {
            Some((word, line)) if line == n => text.push_str(word),
            _ => text.push_str(&format!("guess-{}", n)),
        }
        text.push('\n');
    }
    std::fs::write(&path, text).unwrap();
    path
}
