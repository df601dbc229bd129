use std::path::PathBuf;

use clap::Parser;

use crate::config::{
    AttackConfig, AttackMode, DEFAULT_CRC_MAX_SIZE, DEFAULT_DICTIONARY, DEFAULT_MAX_LENGTH,
    DEFAULT_MIN_LENGTH, DEFAULT_OUTPUT_DIR, default_threads,
};
use crate::error::SetupError;

#[derive(Parser, Debug)]
#[command(name = "zipcrack")]
#[command(version)]
#[command(about = "Recover ZIP passwords and short encrypted file contents", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipcrack secret.zip                      hybrid attack with password_list.txt\n  \
  zipcrack -m dict -d rockyou.txt -t 8 secret.zip\n  \
  zipcrack -m brute --min-length 4 --max-length 6 secret.zip\n  \
  zipcrack -m crc https://example.com/flag.zip")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Word list, one candidate per line
    #[arg(short = 'd', long = "dict", value_name = "FILE", env = "ZIPCRACK_DICT",
          default_value = DEFAULT_DICTIONARY)]
    pub dictionary: PathBuf,

    /// Worker threads (default: CPU count * 4)
    #[arg(short = 't', long, env = "ZIPCRACK_THREADS")]
    pub threads: Option<usize>,

    /// Attack mode
    #[arg(short = 'm', long, env = "ZIPCRACK_MODE", value_enum, ignore_case = true,
          default_value_t = AttackMode::Hybrid)]
    pub mode: AttackMode,

    /// Directory for extracted files
    #[arg(short = 'o', long, value_name = "DIR", env = "ZIPCRACK_OUTPUT",
          default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Shortest numeric candidate
    #[arg(long, default_value_t = DEFAULT_MIN_LENGTH)]
    pub min_length: usize,

    /// Longest numeric candidate
    #[arg(long, default_value_t = DEFAULT_MAX_LENGTH)]
    pub max_length: usize,

    /// Largest entry, in bytes, attacked through its CRC
    #[arg(long, default_value_t = DEFAULT_CRC_MAX_SIZE)]
    pub crc_max_size: usize,

    /// Verbose logging
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default log filter when `RUST_LOG` is not set.
    pub fn log_level(&self) -> &'static str {
        if self.is_very_quiet() {
            "error"
        } else if self.is_quiet() {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Build and validate the attack configuration.
    pub fn into_config(self) -> Result<AttackConfig, SetupError> {
        let config = AttackConfig {
            mode: self.mode,
            target: self.file,
            dictionary: self.dictionary,
            threads: self.threads.unwrap_or_else(default_threads),
            output_dir: self.output,
            min_length: self.min_length,
            max_length: self.max_length,
            crc_max_size: self.crc_max_size,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_full_command_line() {
        let target = NamedTempFile::new().unwrap();
        let dict = NamedTempFile::new().unwrap();
        let target_path = target.path().to_str().unwrap();
        let dict_path = dict.path().to_str().unwrap();

        let cli = Cli::try_parse_from([
            "zipcrack", "-d", dict_path, "-t", "3", "-m", "dict", "-o", "out", "--min-length",
            "2", "--max-length", "5", "-qq", target_path,
        ])
        .unwrap();
        assert!(cli.is_very_quiet());
        assert_eq!(cli.log_level(), "error");

        let config = cli.into_config().unwrap();
        assert_eq!(config.threads, 3);
        assert_eq!(config.mode, AttackMode::Dictionary);
        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!((config.min_length, config.max_length), (2, 5));
    }

    #[test]
    fn test_unknown_mode_rejected_while_parsing() {
        let err = Cli::try_parse_from(["zipcrack", "-m", "rainbow", "a.zip"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidValue);
    }

    #[test]
    fn test_mode_aliases_and_default() {
        let cli = Cli::try_parse_from(["zipcrack", "-m", "CRC32", "a.zip"]).unwrap();
        assert_eq!(cli.mode, AttackMode::Crc);

        let cli = Cli::try_parse_from(["zipcrack", "a.zip"]).unwrap();
        assert_eq!(cli.mode, AttackMode::Hybrid);
    }

    #[test]
    fn test_zero_threads_rejected() {
        let target = NamedTempFile::new().unwrap();
        let cli = Cli::try_parse_from([
            "zipcrack",
            "-m",
            "brute",
            "-t",
            "0",
            target.path().to_str().unwrap(),
        ])
        .unwrap();
        assert!(matches!(cli.into_config(), Err(SetupError::ZeroThreads)));
    }
}
