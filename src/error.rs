//! Error types.
//!
//! Every fatal condition of a run maps to one variant here. `main` wraps
//! these in `anyhow` for reporting.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while fetching, decoding, aggregating or rendering.
#[derive(Debug, Error)]
pub enum MinipoolError {
    /// Network or HTTP failure while downloading the dataset.
    #[error("failed to fetch dataset from {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Local I/O failure while reading or replacing the cache file.
    #[error("cache file {path}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The cached data could not be decompressed.
    #[error("failed to decompress {path}: {source}")]
    Decompress {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The cached data is not a JSON array of minipools.
    #[error("failed to parse dataset {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A minipool entry parsed but carries unusable values.
    #[error("minipool #{index}: {reason}")]
    InvalidRecord { index: usize, reason: String },

    /// A record's deposit category has no bucket configuration.
    #[error("minipool #{index} has deposit category {category} with no bucket configuration")]
    InvalidCategory { index: usize, category: u64 },

    /// A chart, page or stats file could not be written.
    #[error("failed to write {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MinipoolError>;
