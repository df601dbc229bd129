//! CRC-32 plaintext recovery for very short entries.
//!
//! ZIP stores the CRC-32 of every entry in clear text, even when the entry
//! itself is encrypted. For entries of a handful of bytes the plaintext can
//! be recovered by searching for an input of the right length with the same
//! checksum. The secret is assumed to be typed text, so a matching input
//! containing bytes outside printable ASCII is not accepted.
//!
//! ## Strategies
//!
//! - [`CollisionSearch::brute_force_exact`]: all `256^len` inputs, `len <= 4`
//! - [`CollisionSearch::threaded_brute_force`]: the same space split between
//!   worker threads
//! - [`CollisionSearch::printable_enumerate`]: inputs over a 94-character
//!   printable charset, `len <= 8`
//! - [`CollisionSearch::pattern_match`]: common flag and credential shapes,
//!   `len <= 16`, falling back to the exhaustive strategies

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

use thiserror::Error;

use crate::crc32;

/// Longest input the full byte-space search accepts.
pub const MAX_EXACT_LEN: usize = 4;

/// Longest input the printable enumeration accepts.
pub const MAX_ENUMERATE_LEN: usize = 8;

/// Longest input the pattern search accepts.
pub const MAX_PATTERN_LEN: usize = 16;

/// Widest zero-padded numeric suffix tried after a pattern.
pub const MAX_PATTERN_DIGITS: usize = 6;

/// Enumeration alphabet, in search order: every printable ASCII byte except
/// space.
pub const PRINTABLE_CHARSET: &[u8; 94] = b"0123456789\
abcdefghijklmnopqrstuvwxyz\
ABCDEFGHIJKLMNOPQRSTUVWXYZ\
!@#$%^&*()_+-=[]{}|;:,.<>?\
\"'/\\`~";

/// Literal shapes tried first, alone or followed by digits.
pub const COMMON_PATTERNS: &[&str] = &[
    "flag{", "FLAG{", "ctf{", "CTF{", "key:", "pass:", "password:", "secret:", "admin", "root",
    "user", "test", "demo", "123456", "password", "qwerty", "abc123", "admin123", "root123",
    "test123",
];

/// Candidates between progress log lines in the byte-space search.
const PROGRESS_INTERVAL: u64 = 1 << 24;

/// The requested input length is outside what a strategy supports.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot search {len}-byte inputs (supported: 1..={max})")]
pub struct UnsupportedLength {
    pub len: usize,
    pub max: usize,
}

fn check_len(len: usize, max: usize) -> Result<(), UnsupportedLength> {
    if len == 0 || len > max {
        Err(UnsupportedLength { len, max })
    } else {
        Ok(())
    }
}

/// Bytes a person could have typed: ASCII 32..=126.
#[inline]
fn is_printable(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| (32..=126).contains(&b))
}

/// The `combo`-th input of the byte space, least significant byte first.
#[inline]
fn combo_bytes(combo: u64, buf: &mut [u8]) {
    let mut value = combo;
    for byte in buf.iter_mut() {
        *byte = value as u8;
        value >>= 8;
    }
}

/// Whether a byte appears in [`PRINTABLE_CHARSET`].
#[inline]
fn in_charset(b: u8) -> bool {
    (33..=126).contains(&b)
}

/// Search engine configuration.
///
/// The engine itself holds no search state, so one value can run several
/// searches. An optional cancellation flag is polled between candidates.
#[derive(Clone, Copy)]
pub struct CollisionSearch<'a> {
    workers: usize,
    cancel: Option<&'a AtomicBool>,
}

impl Default for CollisionSearch<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> CollisionSearch<'a> {
    pub fn new() -> Self {
        Self {
            workers: 1,
            cancel: None,
        }
    }

    /// Use up to `workers` threads for the byte-space search.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Abort any search as soon as `flag` becomes true.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    #[inline]
    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Search every byte string of length `len` in counter order.
    ///
    /// A checksum match that is not printable is skipped and the search
    /// continues.
    pub fn brute_force_exact(
        &self,
        target: u32,
        len: usize,
    ) -> Result<Option<String>, UnsupportedLength> {
        check_len(len, MAX_EXACT_LEN)?;

        let total = 1u64 << (8 * len);
        tracing::info!(
            "Exhaustive CRC search: target 0x{:08X}, {} bytes, {} inputs",
            target,
            len,
            total
        );

        let mut buf = [0u8; MAX_EXACT_LEN];
        let buf = &mut buf[..len];
        for combo in 0..total {
            if self.cancelled() {
                return Ok(None);
            }
            combo_bytes(combo, buf);
            if crc32::crc32(buf) == target && is_printable(buf) {
                return Ok(Some(ascii_string(buf)));
            }
            if combo > 0 && combo % PROGRESS_INTERVAL == 0 {
                tracing::debug!(
                    "CRC search progress: {:.2}%",
                    combo as f64 / total as f64 * 100.0
                );
            }
        }
        Ok(None)
    }

    /// [`brute_force_exact`](Self::brute_force_exact) split across threads.
    ///
    /// The space is cut into `workers` contiguous ranges, the last one
    /// absorbing the remainder. Workers stop as soon as any of them finds a
    /// printable match; the result is written once, under a lock.
    pub fn threaded_brute_force(
        &self,
        target: u32,
        len: usize,
        workers: usize,
    ) -> Result<Option<String>, UnsupportedLength> {
        check_len(len, MAX_EXACT_LEN)?;

        let workers = workers.max(1);
        let total = 1u64 << (8 * len);
        let range = total / workers as u64;
        tracing::info!(
            "Threaded CRC search: target 0x{:08X}, {} bytes, {} workers",
            target,
            len,
            workers
        );

        let found = AtomicBool::new(false);
        let result: Mutex<Option<String>> = Mutex::new(None);

        thread::scope(|s| {
            let mut unstarted = Vec::new();
            for worker in 0..workers {
                let start = worker as u64 * range;
                let end = if worker == workers - 1 {
                    total
                } else {
                    start + range
                };
                let found = &found;
                let result = &result;

                let spawned = thread::Builder::new()
                    .name(format!("crc-{worker}"))
                    .spawn_scoped(s, move || {
                        self.scan_range(target, len, start..end, found, result);
                    });
                if let Err(e) = spawned {
                    tracing::warn!(
                        "Failed to start CRC worker {}, searching inline: {}",
                        worker,
                        e
                    );
                    unstarted.push(start..end);
                }
            }

            for range in unstarted {
                self.scan_range(target, len, range, &found, &result);
            }
        });

        Ok(result.into_inner().unwrap_or_else(PoisonError::into_inner))
    }

    /// Search `combos` of the `len`-byte space, publishing the first
    /// printable match into `result` unless another range got there first.
    fn scan_range(
        &self,
        target: u32,
        len: usize,
        combos: Range<u64>,
        found: &AtomicBool,
        result: &Mutex<Option<String>>,
    ) {
        let mut buf = [0u8; MAX_EXACT_LEN];
        let buf = &mut buf[..len];
        for combo in combos {
            if found.load(Ordering::Acquire) || self.cancelled() {
                return;
            }
            combo_bytes(combo, buf);
            if crc32::crc32(buf) == target && is_printable(buf) {
                let mut slot = result.lock().unwrap_or_else(PoisonError::into_inner);
                if slot.is_none() {
                    *slot = Some(ascii_string(buf));
                    found.store(true, Ordering::Release);
                }
                return;
            }
        }
    }

    /// Enumerate strings over [`PRINTABLE_CHARSET`] in charset order and
    /// return the first whose checksum matches.
    ///
    /// For lengths of four or more only the leading `len - 4` positions are
    /// enumerated: the trailing four bytes that reach the target are unique
    /// and are solved directly, then accepted only if they fall inside the
    /// charset. This visits candidates in the same order as a plain
    /// enumeration would.
    pub fn printable_enumerate(
        &self,
        target: u32,
        len: usize,
    ) -> Result<Option<String>, UnsupportedLength> {
        check_len(len, MAX_ENUMERATE_LEN)?;
        tracing::info!(
            "Printable CRC search: target 0x{:08X}, {} bytes over {} characters",
            target,
            len,
            PRINTABLE_CHARSET.len()
        );

        let mut walk = PrintableWalk {
            search: self,
            target_reg: target ^ crc32::XOR_OUT,
            prefix_len: len.saturating_sub(4),
            forge: len >= 4,
            len,
            buf: [0u8; MAX_ENUMERATE_LEN],
            states: [crc32::INIT; MAX_ENUMERATE_LEN + 1],
        };
        Ok(walk.descend(0))
    }

    /// Try [`COMMON_PATTERNS`], alone and followed by zero-padded numbers of
    /// up to [`MAX_PATTERN_DIGITS`] digits, then fall back to the exhaustive
    /// strategy for the length.
    pub fn pattern_match(
        &self,
        target: u32,
        len: usize,
    ) -> Result<Option<String>, UnsupportedLength> {
        check_len(len, MAX_PATTERN_LEN)?;

        tracing::debug!("Trying {} common patterns", COMMON_PATTERNS.len());
        if let Some(hit) = self.common_patterns(target, len) {
            return Ok(Some(hit));
        }
        if self.cancelled() || len > MAX_ENUMERATE_LEN {
            return Ok(None);
        }
        self.exhaustive(target, len)
    }

    /// Best exhaustive strategy for `len`: byte space up to four bytes
    /// (threaded when configured with several workers), printable charset
    /// beyond.
    pub fn exhaustive(
        &self,
        target: u32,
        len: usize,
    ) -> Result<Option<String>, UnsupportedLength> {
        match len {
            1..=MAX_EXACT_LEN if self.workers > 1 => {
                self.threaded_brute_force(target, len, self.workers)
            }
            1..=MAX_EXACT_LEN => self.brute_force_exact(target, len),
            _ => self.printable_enumerate(target, len),
        }
    }

    fn common_patterns(&self, target: u32, len: usize) -> Option<String> {
        let mut buf = Vec::with_capacity(MAX_PATTERN_LEN);
        for pattern in COMMON_PATTERNS {
            if self.cancelled() {
                return None;
            }
            let base = pattern.as_bytes();
            if base.len() == len {
                if crc32::crc32(base) == target {
                    return Some((*pattern).to_string());
                }
                continue;
            }
            if base.len() > len {
                continue;
            }

            let width = len - base.len();
            if width > MAX_PATTERN_DIGITS {
                continue;
            }
            let state = crc32::update(crc32::INIT, base);
            for number in 0..10u32.pow(width as u32) {
                buf.clear();
                buf.extend_from_slice(format!("{:0width$}", number, width = width).as_bytes());
                if crc32::update(state, &buf) ^ crc32::XOR_OUT == target {
                    return Some(format!("{}{}", pattern, ascii_string(&buf)));
                }
            }
        }
        None
    }
}

/// Depth-first walk over the printable charset with cached CRC prefixes.
struct PrintableWalk<'s, 'a> {
    search: &'s CollisionSearch<'a>,
    target_reg: u32,
    prefix_len: usize,
    forge: bool,
    len: usize,
    buf: [u8; MAX_ENUMERATE_LEN],
    /// `states[i]` is the register after the first `i` bytes of `buf`.
    states: [u32; MAX_ENUMERATE_LEN + 1],
}

impl PrintableWalk<'_, '_> {
    fn descend(&mut self, depth: usize) -> Option<String> {
        if depth == self.prefix_len {
            return self.leaf();
        }
        if self.search.cancelled() {
            return None;
        }
        for &c in PRINTABLE_CHARSET {
            self.buf[depth] = c;
            self.states[depth + 1] = crc32::update_byte(self.states[depth], c);
            if let Some(hit) = self.descend(depth + 1) {
                return Some(hit);
            }
        }
        None
    }

    fn leaf(&mut self) -> Option<String> {
        let state = self.states[self.prefix_len];
        if self.forge {
            let suffix = crc32::forge_suffix(state, self.target_reg);
            if !suffix.iter().all(|&b| in_charset(b)) {
                return None;
            }
            self.buf[self.prefix_len..self.len].copy_from_slice(&suffix);
        } else if state != self.target_reg {
            return None;
        }
        Some(ascii_string(&self.buf[..self.len]))
    }
}

/// Callers only pass printable ASCII.
fn ascii_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc32::crc32;

    #[test]
    fn test_charset_is_printable_without_space() {
        assert_eq!(PRINTABLE_CHARSET.len(), 94);
        let mut sorted = PRINTABLE_CHARSET.to_vec();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted, (33u8..=126).collect::<Vec<_>>());
    }

    #[test]
    fn test_exact_two_bytes() {
        let search = CollisionSearch::new();
        let found = search.brute_force_exact(crc32(b"Hi"), 2).unwrap();
        assert_eq!(found.as_deref(), Some("Hi"));
    }

    #[test]
    fn test_exact_includes_space() {
        let search = CollisionSearch::new();
        let found = search.brute_force_exact(crc32(b"a b"), 3).unwrap();
        assert_eq!(found.as_deref(), Some("a b"));
    }

    #[test]
    fn test_exact_skips_non_printable_match() {
        let search = CollisionSearch::new();
        assert_eq!(search.brute_force_exact(crc32(&[0x01, 0xFF]), 2).unwrap(), None);
    }

    #[test]
    fn test_rejects_unsupported_lengths() {
        let search = CollisionSearch::new();
        assert_eq!(
            search.brute_force_exact(0, 0),
            Err(UnsupportedLength { len: 0, max: 4 })
        );
        assert!(search.brute_force_exact(0, 5).is_err());
        assert!(search.threaded_brute_force(0, 5, 4).is_err());
        assert!(search.printable_enumerate(0, 9).is_err());
        assert!(search.pattern_match(0, 17).is_err());
        assert!(search.pattern_match(0, 0).is_err());
    }

    #[test]
    fn test_threaded_matches_single_threaded() {
        let search = CollisionSearch::new();
        let target = crc32(b"k3y");
        let single = search.brute_force_exact(target, 3).unwrap();
        let threaded = search.threaded_brute_force(target, 3, 4).unwrap();
        assert_eq!(single.as_deref(), Some("k3y"));
        assert_eq!(threaded, single);
    }

    #[test]
    fn test_scan_range_only_searches_its_slice() {
        let target = crc32(b"Hi");
        let combo = u64::from(b'H') | u64::from(b'i') << 8;
        let search = CollisionSearch::new();

        let found = AtomicBool::new(false);
        let result = Mutex::new(None);
        search.scan_range(target, 2, 0..combo, &found, &result);
        assert!(!found.load(Ordering::Acquire));
        assert_eq!(*result.lock().unwrap(), None);

        search.scan_range(target, 2, combo..combo + 1, &found, &result);
        assert!(found.load(Ordering::Acquire));
        assert_eq!(result.lock().unwrap().as_deref(), Some("Hi"));
    }

    #[test]
    fn test_threaded_more_workers_than_inputs() {
        let search = CollisionSearch::new();
        let found = search.threaded_brute_force(crc32(b"Z"), 1, 300).unwrap();
        assert_eq!(found.as_deref(), Some("Z"));
    }

    #[test]
    fn test_printable_short_lengths() {
        let search = CollisionSearch::new();
        assert_eq!(
            search.printable_enumerate(crc32(b"x7"), 2).unwrap().as_deref(),
            Some("x7")
        );
        assert_eq!(
            search.printable_enumerate(crc32(b"~a/\\"), 4).unwrap().as_deref(),
            Some("~a/\\")
        );
    }

    #[test]
    fn test_printable_five_bytes() {
        let search = CollisionSearch::new();
        let target = crc32(b"ab#Z9");
        let found = search.printable_enumerate(target, 5).unwrap().unwrap();
        assert_eq!(found.len(), 5);
        assert_eq!(crc32(found.as_bytes()), target);
        assert!(found.bytes().all(in_charset));
    }

    #[test]
    fn test_printable_six_bytes_first_prefix() {
        // With a leading "00" the forged tail is already in the charset, so
        // nothing earlier in enumeration order can match.
        let search = CollisionSearch::new();
        let target = crc32(b"00abcd");
        let found = search.printable_enumerate(target, 6).unwrap().unwrap();
        assert_eq!(found, "00abcd");
    }

    #[test]
    fn test_pattern_literal() {
        let search = CollisionSearch::new();
        let found = search.pattern_match(crc32(b"password"), 8).unwrap();
        assert_eq!(found.as_deref(), Some("password"));
    }

    #[test]
    fn test_pattern_with_numeric_suffix() {
        let search = CollisionSearch::new();
        let found = search.pattern_match(crc32(b"admin0042"), 9).unwrap();
        assert_eq!(found.as_deref(), Some("admin0042"));

        let found = search.pattern_match(crc32(b"flag{123456"), 11).unwrap();
        assert_eq!(found.as_deref(), Some("flag{123456"));
    }

    #[test]
    fn test_pattern_long_miss() {
        let search = CollisionSearch::new();
        assert_eq!(search.pattern_match(crc32(b"no such pattern!"), 16).unwrap(), None);
    }

    #[test]
    fn test_pattern_falls_back_to_exhaustive() {
        let search = CollisionSearch::new().with_workers(2);
        let found = search.pattern_match(crc32(b"q!"), 2).unwrap();
        assert_eq!(found.as_deref(), Some("q!"));
    }

    #[test]
    fn test_cancel_stops_search() {
        let flag = AtomicBool::new(true);
        let search = CollisionSearch::new().with_cancel(&flag);
        assert_eq!(search.brute_force_exact(crc32(b"Hi"), 2).unwrap(), None);
        assert_eq!(search.printable_enumerate(crc32(b"abcdefgh"), 8).unwrap(), None);
        assert_eq!(search.threaded_brute_force(crc32(b"abc"), 3, 4).unwrap(), None);
    }
}
