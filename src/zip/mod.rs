//! ZIP archive parsing, decryption and extraction.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`crypto`]: Traditional PKWARE encryption
//! - [`extractor`]: Decoding of entry payloads and extraction to disk
//! - [`repair`]: Clearing bogus encryption flags
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and (possibly encrypted) compressed data for each file
//! 2. Central Directory with metadata for all files, including each CRC-32
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The parser reads the EOCD first, then the Central Directory, so the
//! metadata an attack needs is available without reading entry data.
//!
//! ## Supported Features
//!
//! - ZIP64 extensions
//! - STORED and DEFLATE compression
//! - Traditional PKWARE (ZipCrypto) encryption
//!
//! ## Limitations
//!
//! - No AES (WinZip) or strong encryption
//! - No multi-disk archives

pub mod crypto;
mod extractor;
mod parser;
pub mod repair;
mod structures;

pub use extractor::{ZipExtractor, decode_entry, safe_output_path};
pub use parser::ZipParser;
pub use structures::*;
