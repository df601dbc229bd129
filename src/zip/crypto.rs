//! Traditional PKWARE encryption ("ZipCrypto").
//!
//! Three 32-bit keys are initialised from the password and updated with
//! every plaintext byte. Each encrypted entry starts with a 12-byte header
//! whose last byte, once decrypted, must equal a known check byte: this
//! rejects about 255 in 256 wrong passwords without touching the payload.

use crate::crc32;

/// Length of the encryption header in front of each entry's data.
pub const HEADER_LEN: usize = 12;

const KEY0: u32 = 0x1234_5678;
const KEY1: u32 = 0x2345_6789;
const KEY2: u32 = 0x3456_7890;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZipCryptoKeys {
    k0: u32,
    k1: u32,
    k2: u32,
}

impl ZipCryptoKeys {
    /// Keys after processing `password`.
    pub fn new(password: &[u8]) -> Self {
        let mut keys = Self {
            k0: KEY0,
            k1: KEY1,
            k2: KEY2,
        };
        for &b in password {
            keys.update(b);
        }
        keys
    }

    #[inline(always)]
    fn update(&mut self, plain: u8) {
        self.k0 = crc32::update_byte(self.k0, plain);
        self.k1 = self
            .k1
            .wrapping_add(self.k0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.k2 = crc32::update_byte(self.k2, (self.k1 >> 24) as u8);
    }

    #[inline(always)]
    fn keystream(&self) -> u8 {
        let temp = (self.k2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    #[inline]
    pub fn decrypt_byte(&mut self, cipher: u8) -> u8 {
        let plain = cipher ^ self.keystream();
        self.update(plain);
        plain
    }

    #[inline]
    pub fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let cipher = plain ^ self.keystream();
        self.update(plain);
        cipher
    }

    pub fn decrypt(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.decrypt_byte(*b);
        }
    }

    pub fn encrypt(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.encrypt_byte(*b);
        }
    }
}

/// Decrypt the header of `data` with `password` and compare its last byte
/// to `check_byte`. Returns the keys positioned at the payload on success.
pub fn check_header(password: &[u8], data: &[u8], check_byte: u8) -> Option<ZipCryptoKeys> {
    let header = data.get(..HEADER_LEN)?;
    let mut keys = ZipCryptoKeys::new(password);
    let mut last = 0;
    for &b in header {
        last = keys.decrypt_byte(b);
    }
    (last == check_byte).then_some(keys)
}
