use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};

use clap::ValueEnum;

use crate::collision::MAX_PATTERN_LEN;
use crate::error::SetupError;
use crate::generator::MAX_NUMERIC_LENGTH;
use crate::io::is_http_url;

pub const DEFAULT_DICTIONARY: &str = "password_list.txt";
pub const DEFAULT_OUTPUT_DIR: &str = "./extracted";
pub const DEFAULT_MIN_LENGTH: usize = 1;
pub const DEFAULT_MAX_LENGTH: usize = 8;
pub const DEFAULT_CRC_MAX_SIZE: usize = 8;

/// Which attacks to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum AttackMode {
    /// Word list only
    #[value(name = "dict", alias = "dictionary")]
    Dictionary,
    /// Digit strings only
    #[value(name = "brute", alias = "bruteforce")]
    Bruteforce,
    /// Recover short files from their CRC, no password search
    #[value(name = "crc", alias = "crc32")]
    Crc,
    /// CRC first, then word list and digits side by side
    #[default]
    Hybrid,
}

impl AttackMode {
    pub fn uses_crc(self) -> bool {
        matches!(self, AttackMode::Crc | AttackMode::Hybrid)
    }

    pub fn uses_dictionary(self) -> bool {
        matches!(self, AttackMode::Dictionary | AttackMode::Hybrid)
    }

    pub fn uses_numeric(self) -> bool {
        matches!(self, AttackMode::Bruteforce | AttackMode::Hybrid)
    }

    pub fn uses_candidates(self) -> bool {
        self.uses_dictionary() || self.uses_numeric()
    }

    pub fn name(self) -> &'static str {
        match self {
            AttackMode::Dictionary => "dict",
            AttackMode::Bruteforce => "brute",
            AttackMode::Crc => "crc",
            AttackMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for AttackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything one attack run needs to know, already validated.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Local path or HTTP(S) URL of the archive
    pub target: String,
    pub dictionary: PathBuf,
    pub threads: usize,
    pub mode: AttackMode,
    /// Parent directory for extracted and repaired output
    pub output_dir: PathBuf,
    pub min_length: usize,
    pub max_length: usize,
    /// Largest entry size handed to the CRC search
    pub crc_max_size: usize,
}

impl AttackConfig {
    /// Defaults for `target`: hybrid mode, one thread per CPU times four.
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            dictionary: PathBuf::from(DEFAULT_DICTIONARY),
            threads: default_threads(),
            mode: AttackMode::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            min_length: DEFAULT_MIN_LENGTH,
            max_length: DEFAULT_MAX_LENGTH,
            crc_max_size: DEFAULT_CRC_MAX_SIZE,
        }
    }

    /// Check everything that can be checked before the archive is opened.
    pub fn validate(&self) -> Result<(), SetupError> {
        if !is_http_url(&self.target) && !Path::new(&self.target).is_file() {
            return Err(SetupError::TargetNotFound(PathBuf::from(&self.target)));
        }
        if self.threads == 0 {
            return Err(SetupError::ZeroThreads);
        }
        if self.min_length == 0
            || self.min_length > self.max_length
            || self.max_length > MAX_NUMERIC_LENGTH
        {
            return Err(SetupError::NumericBounds {
                min: self.min_length,
                max: self.max_length,
                limit: MAX_NUMERIC_LENGTH,
            });
        }
        if self.crc_max_size == 0 || self.crc_max_size > MAX_PATTERN_LEN {
            return Err(SetupError::CrcSizeLimit(self.crc_max_size, MAX_PATTERN_LEN));
        }
        if self.mode.uses_dictionary() {
            File::open(&self.dictionary).map_err(|source| SetupError::Dictionary {
                path: self.dictionary.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

pub fn default_threads() -> usize {
    num_cpus::get().max(1) * 4
}
