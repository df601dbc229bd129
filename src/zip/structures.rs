use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;

use anyhow::{Result, bail};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    /// WinZip AES wrapper (method 99)
    Aes,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            99 => CompressionMethod::Aes,
            _ => CompressionMethod::Unknown(value),
        }
    }
}

/// General purpose bit flag of local and central headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GeneralFlags(pub u16);

impl GeneralFlags {
    /// Bit 0: entry is encrypted
    pub const ENCRYPTED: u16 = 0x0001;
    /// Bit 3: sizes and CRC follow the data in a descriptor
    pub const DATA_DESCRIPTOR: u16 = 0x0008;
    /// Bit 6: strong encryption
    pub const STRONG_ENCRYPTION: u16 = 0x0040;

    pub fn is_encrypted(self) -> bool {
        self.0 & Self::ENCRYPTED != 0
    }

    pub fn has_data_descriptor(self) -> bool {
        self.0 & Self::DATA_DESCRIPTOR != 0
    }

    pub fn is_strong_encryption(self) -> bool {
        self.0 & Self::STRONG_ENCRYPTION != 0
    }

    pub fn without_encryption(self) -> Self {
        Self(self.0 & !Self::ENCRYPTED)
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
pub struct EndOfCentralDirectory {
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid End of Central Directory");
        }

        // Skip the two disk number fields, multi-disk archives are not handled
        let mut cursor = Cursor::new(&data[8..]);

        Ok(Self {
            disk_entries: cursor.read_u16::<LittleEndian>()?,
            total_entries: cursor.read_u16::<LittleEndian>()?,
            cd_size: cursor.read_u32::<LittleEndian>()?,
            cd_offset: cursor.read_u32::<LittleEndian>()?,
            comment_len: cursor.read_u16::<LittleEndian>()?,
        })
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
pub struct Zip64EOCDLocator {
    pub eocd64_offset: u64,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        let mut cursor = Cursor::new(&data[8..]);
        Ok(Self {
            eocd64_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
pub struct Zip64EOCD {
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    pub const MIN_SIZE: usize = 56;

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE || &data[0..4] != Self::SIGNATURE {
            bail!("Invalid ZIP64 format");
        }

        // total_entries sits after size (8), versions (4), disk fields (8)
        // and entries on this disk (8)
        let mut cursor = Cursor::new(&data[32..]);
        Ok(Self {
            total_entries: cursor.read_u64::<LittleEndian>()?,
            cd_size: cursor.read_u64::<LittleEndian>()?,
            cd_offset: cursor.read_u64::<LittleEndian>()?,
        })
    }
}

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;
/// Offset of the general purpose flags inside a CDFH
pub const CDFH_FLAGS_OFFSET: u64 = 8;

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;
/// Offset of the general purpose flags inside an LFH
pub const LFH_FLAGS_OFFSET: u64 = 6;

/// Fixed part of a Local File Header
#[derive(Debug, Clone, Copy)]
pub struct LocalFileHeader {
    pub flags: GeneralFlags,
    pub compression_method: CompressionMethod,
    pub file_name_length: u16,
    pub extra_field_length: u16,
}

impl LocalFileHeader {
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < LFH_SIZE || &data[0..4] != LFH_SIGNATURE {
            bail!("Invalid Local File Header");
        }

        let mut cursor = Cursor::new(&data[6..]);
        let flags = GeneralFlags(cursor.read_u16::<LittleEndian>()?);
        let compression_method = CompressionMethod::from_u16(cursor.read_u16::<LittleEndian>()?);
        cursor.set_position(20);
        let file_name_length = cursor.read_u16::<LittleEndian>()?;
        let extra_field_length = cursor.read_u16::<LittleEndian>()?;

        Ok(Self {
            flags,
            compression_method,
            file_name_length,
            extra_field_length,
        })
    }

    /// Bytes between the start of the header and the entry data.
    pub fn header_len(&self) -> u64 {
        LFH_SIZE as u64 + self.file_name_length as u64 + self.extra_field_length as u64
    }
}

/// Parsed ZIP file entry information
#[derive(Debug, Clone)]
pub struct ZipFileEntry {
    pub file_name: String,
    pub flags: GeneralFlags,
    pub compression_method: CompressionMethod,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub lfh_offset: u64,
    /// Position of this entry's header inside the archive
    pub cdfh_offset: u64,
    pub last_mod_time: u16,
    pub is_directory: bool,
}

impl ZipFileEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags.is_encrypted()
    }

    /// Byte the ZipCrypto header must end with for a correct password.
    ///
    /// Streamed entries write their CRC after the data, so the check byte is
    /// taken from the modification time instead.
    pub fn check_byte(&self) -> u8 {
        if self.flags.has_data_descriptor() {
            (self.last_mod_time >> 8) as u8
        } else {
            (self.crc32 >> 24) as u8
        }
    }
}
