//! CRC-32 as used by the ZIP format.
//!
//! Reflected polynomial `0xEDB88320`, register preset to `0xFFFFFFFF` and
//! inverted on output. This is the checksum stored in every ZIP entry header,
//! so any plaintext recovered by the collision search can be confirmed
//! against the archive bit for bit.
//!
//! Besides the usual one-shot [`crc32`], the module exposes the raw register
//! operations the search code needs: [`update`] to extend a cached prefix
//! state, and [`forge_suffix`] to solve the last four bytes of a message
//! for a given target register.

/// Register value before any byte is processed.
pub const INIT: u32 = 0xFFFF_FFFF;

/// Value XORed into the register to produce the final checksum.
pub const XOR_OUT: u32 = 0xFFFF_FFFF;

const POLY: u32 = 0xEDB8_8320;

/// Byte-at-a-time lookup table.
pub static TABLE: [u32; 256] = build_table();

/// Maps the top byte of a table entry back to its index.
///
/// Every entry of [`TABLE`] has a distinct top byte, which is what makes
/// the register update invertible.
static TOP_INDEX: [u8; 256] = build_top_index();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 { (crc >> 1) ^ POLY } else { crc >> 1 };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn build_top_index() -> [u8; 256] {
    let table = build_table();
    let mut inverse = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        inverse[(table[i] >> 24) as usize] = i as u8;
        i += 1;
    }
    inverse
}

/// Advance the register by one byte.
#[inline(always)]
pub fn update_byte(state: u32, byte: u8) -> u32 {
    (state >> 8) ^ TABLE[((state ^ byte as u32) & 0xFF) as usize]
}

/// Advance the register over `data`.
///
/// `state` is a raw register value: start from [`INIT`] and XOR the result
/// with [`XOR_OUT`] to obtain a checksum.
#[inline]
pub fn update(state: u32, data: &[u8]) -> u32 {
    data.iter().fold(state, |crc, &b| update_byte(crc, b))
}

/// Compute the CRC-32 checksum of `data`.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    update(INIT, data) ^ XOR_OUT
}

/// Compute the four bytes that move the register from `state` to `target`.
///
/// Both arguments are raw register values (not final checksums). The suffix
/// always exists and is unique, so for a fixed prefix exactly one 4-byte
/// continuation reaches any given checksum.
pub fn forge_suffix(state: u32, target: u32) -> [u8; 4] {
    // Walking backwards from the target, the top byte of each register value
    // identifies the table index used in the step that produced it.
    let mut indices = [0u8; 4];
    let mut reg = target;
    for slot in indices.iter_mut().rev() {
        let index = TOP_INDEX[(reg >> 24) as usize];
        *slot = index;
        reg = (reg ^ TABLE[index as usize]) << 8;
    }

    // Replay forwards: each byte is whatever selects the required index.
    let mut suffix = [0u8; 4];
    let mut reg = state;
    for (byte, &index) in suffix.iter_mut().zip(indices.iter()) {
        *byte = index ^ (reg as u8);
        reg = (reg >> 8) ^ TABLE[index as usize];
    }
    suffix
}
