//! # zipcrack
//!
//! Concurrent password recovery for encrypted ZIP archives, local or
//! remote.
//!
//! An attack runs in up to two phases:
//!
//! - **CRC phase**: encrypted entries of a few bytes leak their content
//!   through the CRC-32 stored in the central directory. [`collision`]
//!   searches printable strings with that checksum, so a short flag or key
//!   can be read without knowing the password.
//! - **Candidate phase**: a pool of worker threads pulls passwords from
//!   [`generator`]s (a word list, numeric strings, or both) and checks each
//!   one against the archive through an [`oracle::ArchiveOracle`].
//!
//! Archives are read through [`io::ReadAt`], so a remote archive served
//! with HTTP Range support is attacked without downloading it: only the
//! central directory and the smallest encrypted entry are fetched.
//!
//! ## Example
//!
//! ```no_run
//! use zipcrack::{AttackConfig, AttackMode, AttackOutcome, Coordinator, open_target};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = AttackConfig::new("secret.zip");
//!     config.mode = AttackMode::Bruteforce;
//!     config.max_length = 6;
//!     config.validate()?;
//!
//!     let oracle = open_target(&config.target).await?;
//!     let report = Coordinator::new(config, oracle).run().await?;
//!     if let AttackOutcome::Success(secret) = report.outcome {
//!         println!("{}", secret);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod collision;
pub mod config;
pub mod coordinator;
pub mod crc32;
pub mod error;
pub mod generator;
pub mod io;
pub mod oracle;
pub mod progress;
pub mod status;
pub mod zip;

pub use cli::Cli;
pub use config::{AttackConfig, AttackMode};
pub use coordinator::{AttackOutcome, AttackReport, Coordinator};
pub use error::SetupError;
pub use io::{HttpRangeReader, LocalFileReader, ReadAt};
pub use oracle::{ArchiveInfo, ArchiveKind, ArchiveOracle, EntryInfo, ZipOracle, open_target};
pub use status::{AttackStatus, Secret, StopHandle};
