//! Password candidate sources.
//!
//! A [`PasswordGenerator`] is a lazy, finite, single-owner sequence of
//! candidate strings. Each attack worker owns exactly one generator; several
//! workers can split one logical sequence between them with a [`Partition`],
//! which keeps generators unshared and lock-free.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::iter::FusedIterator;
use std::path::Path;

use crate::error::SetupError;

/// Longest numeric candidate the generator accepts.
pub const MAX_NUMERIC_LENGTH: usize = 20;

/// A slice of a candidate sequence.
///
/// A generator with partition `{ index, count }` yields only the candidates
/// whose zero-based position `p` in the full sequence satisfies
/// `p % count == index`. The `count` partitions of one sequence are disjoint
/// and together cover it exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partition {
    pub index: usize,
    pub count: usize,
}

impl Partition {
    /// The partition that owns every position.
    pub const fn whole() -> Self {
        Self { index: 0, count: 1 }
    }

    /// Partition `index` of `count`. A zero `count` is treated as one and
    /// `index` is reduced modulo `count`.
    pub fn new(index: usize, count: usize) -> Self {
        let count = count.max(1);
        Self {
            index: index % count,
            count,
        }
    }

    fn owns(&self, position: u64) -> bool {
        position % self.count as u64 == self.index as u64
    }
}

impl Default for Partition {
    fn default() -> Self {
        Self::whole()
    }
}

/// Polymorphic candidate source.
pub enum PasswordGenerator {
    Dictionary(DictionaryGenerator),
    Numeric(NumericGenerator),
    /// Sources drained one after another, front first.
    Chain(VecDeque<PasswordGenerator>),
}

impl PasswordGenerator {
    /// Open a dictionary-backed generator over the lines of `path`.
    pub fn dictionary(path: &Path, partition: Partition) -> Result<Self, SetupError> {
        DictionaryGenerator::open(path, partition).map(Self::Dictionary)
    }

    /// Create a numeric generator for all digit strings of length `min..=max`.
    pub fn numeric(min: usize, max: usize, partition: Partition) -> Result<Self, SetupError> {
        NumericGenerator::new(min, max, partition).map(Self::Numeric)
    }

    /// Yield everything `sources` yields, in order.
    pub fn chain(sources: impl IntoIterator<Item = PasswordGenerator>) -> Self {
        Self::Chain(sources.into_iter().collect())
    }

    /// Short label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            PasswordGenerator::Dictionary(_) => "dictionary",
            PasswordGenerator::Numeric(_) => "numeric",
            PasswordGenerator::Chain(_) => "chained",
        }
    }
}

impl Iterator for PasswordGenerator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        match self {
            PasswordGenerator::Dictionary(g) => g.next(),
            PasswordGenerator::Numeric(g) => g.next(),
            PasswordGenerator::Chain(sources) => loop {
                let candidate = sources.front_mut()?.next();
                if candidate.is_some() {
                    return candidate;
                }
                sources.pop_front();
            },
        }
    }
}

impl FusedIterator for PasswordGenerator {}

/// Reads candidates line by line from a word list.
///
/// Trailing `\r`/`\n` are stripped, blank lines are skipped, and lines that
/// are not valid UTF-8 are decoded lossily. A read error ends the sequence.
pub struct DictionaryGenerator {
    reader: Box<dyn BufRead + Send>,
    line: Vec<u8>,
    position: u64,
    partition: Partition,
    exhausted: bool,
}

impl DictionaryGenerator {
    /// Open the word list at `path`.
    ///
    /// An unreadable file fails here rather than during iteration.
    pub fn open(path: &Path, partition: Partition) -> Result<Self, SetupError> {
        let file = File::open(path).map_err(|source| SetupError::Dictionary {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_reader(BufReader::new(file), partition))
    }

    /// Build a generator over any buffered reader.
    pub fn from_reader<R: BufRead + Send + 'static>(reader: R, partition: Partition) -> Self {
        Self {
            reader: Box::new(reader),
            line: Vec::with_capacity(64),
            position: 0,
            partition,
            exhausted: false,
        }
    }

    /// Read the next line into `self.line`, returning its length without
    /// the line ending.
    fn read_line(&mut self) -> Option<usize> {
        self.line.clear();
        match self.reader.read_until(b'\n', &mut self.line) {
            Ok(0) => None,
            Ok(_) => Some(
                self.line
                    .iter()
                    .rposition(|&b| b != b'\n' && b != b'\r')
                    .map_or(0, |i| i + 1),
            ),
            Err(e) => {
                tracing::warn!("Dictionary read failed, ending word list early: {}", e);
                None
            }
        }
    }
}

impl Iterator for DictionaryGenerator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while !self.exhausted {
            let Some(len) = self.read_line() else {
                self.exhausted = true;
                break;
            };
            if len == 0 {
                continue;
            }

            let position = self.position;
            self.position += 1;
            // Lines owned by other workers are never decoded
            if self.partition.owns(position) {
                return Some(String::from_utf8_lossy(&self.line[..len]).into_owned());
            }
        }
        None
    }
}

impl FusedIterator for DictionaryGenerator {}

/// Enumerates zero-padded digit strings in increasing length, then value.
///
/// For bounds `min..=max` the full sequence is `"0".."9"` repeated with one
/// more digit per length, e.g. `1..=2` gives `0, 1, .., 9, 00, 01, .., 99`.
pub struct NumericGenerator {
    max_length: usize,
    /// Length of `digits`; `max_length + 1` once the sequence is exhausted.
    current_length: usize,
    digits: Vec<u8>,
    stride: usize,
}

impl NumericGenerator {
    pub fn new(min: usize, max: usize, partition: Partition) -> Result<Self, SetupError> {
        if min == 0 || min > max || max > MAX_NUMERIC_LENGTH {
            return Err(SetupError::NumericBounds {
                min,
                max,
                limit: MAX_NUMERIC_LENGTH,
            });
        }

        let mut generator = Self {
            max_length: max,
            current_length: min,
            digits: vec![b'0'; min],
            stride: partition.count,
        };
        for _ in 0..partition.index {
            generator.step();
        }
        Ok(generator)
    }

    fn is_exhausted(&self) -> bool {
        self.current_length > self.max_length
    }

    /// Move to the next string of the full sequence.
    fn step(&mut self) {
        if self.is_exhausted() {
            return;
        }

        for digit in self.digits.iter_mut().rev() {
            if *digit < b'9' {
                *digit += 1;
                return;
            }
            *digit = b'0';
        }

        // Every digit rolled over: continue at the next length.
        self.current_length += 1;
        if !self.is_exhausted() {
            self.digits.clear();
            self.digits.resize(self.current_length, b'0');
        }
    }
}

impl Iterator for NumericGenerator {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.is_exhausted() {
            return None;
        }

        // Digits are always ASCII.
        let candidate = self.digits.iter().map(|&d| d as char).collect();
        for _ in 0..self.stride {
            self.step();
        }
        Some(candidate)
    }
}

impl FusedIterator for NumericGenerator {}

/// Number of candidates a numeric generator over `min..=max` yields.
///
/// Saturates at `u64::MAX` for very long lengths.
pub fn numeric_cardinality(min: usize, max: usize) -> u64 {
    (min..=max)
        .map(|len| 10u64.checked_pow(len as u32).unwrap_or(u64::MAX))
        .fold(0u64, u64::saturating_add)
}

/// Number of candidates a dictionary generator over `path` yields.
pub fn count_dictionary(path: &Path) -> Result<u64, SetupError> {
    DictionaryGenerator::open(path, Partition::whole()).map(|g| g.count() as u64)
}
