use std::path::PathBuf;

use thiserror::Error;

/// Problems detected before an attack starts.
///
/// Nothing has been spawned or written when one of these is returned.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("target archive not found: {0}")]
    TargetNotFound(PathBuf),

    #[error("dictionary file not readable: {path}: {source}")]
    Dictionary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("thread count must be at least 1")]
    ZeroThreads,

    #[error("invalid numeric bounds {min}..={max} (expected 1 <= min <= max <= {limit})")]
    NumericBounds { min: usize, max: usize, limit: usize },

    #[error("invalid CRC size limit {0} (expected 1..={1})")]
    CrcSizeLimit(usize, usize),

    #[error("no password verifier available for {0} archives")]
    UnsupportedArchive(&'static str),
}
