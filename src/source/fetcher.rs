//! Dataset download with an on-disk cache.
//!
//! The cache is a single file whose modification time tells how old the
//! data is. A stale or missing file is replaced by a fresh download.

use crate::error::{MinipoolError, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::ACCEPT_ENCODING;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Options for fetching the dataset.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Remote dataset URL.
    pub url: String,
    /// Local cache file.
    pub path: PathBuf,
    /// Maximum age of the cache file before it is downloaded again.
    pub refresh_period: Duration,
    /// Request timeout.
    pub timeout: Duration,
    /// Download even if the cache is fresh.
    pub force_refresh: bool,
    /// Whether to show a download progress bar.
    pub show_progress: bool,
}

/// A cache file guaranteed to be no older than the refresh period.
#[derive(Debug, Clone)]
pub struct CachedDataset {
    pub path: PathBuf,
    /// Modification time of the cache file.
    pub retrieved_at: DateTime<Utc>,
    /// Whether this run downloaded the file.
    pub downloaded: bool,
}

/// Make sure the cache file is present and fresh, downloading if needed.
pub async fn ensure_fresh(options: &CacheOptions) -> Result<CachedDataset> {
    let stale = options.force_refresh
        || needs_refresh(&options.path, options.refresh_period, SystemTime::now())?;

    if stale {
        info!("Retrieving minipool data from {}", options.url);
        let bytes = download(options).await?;
        info!(
            "Stored {} bytes in {}",
            bytes,
            options.path.display()
        );
    } else {
        info!("Using cached dataset: {}", options.path.display());
    }

    Ok(CachedDataset {
        path: options.path.clone(),
        retrieved_at: modified_at(&options.path)?,
        downloaded: stale,
    })
}

/// Whether `path` is missing or older than `refresh_period` at `now`.
pub fn needs_refresh(path: &Path, refresh_period: Duration, now: SystemTime) -> Result<bool> {
    let modified = match fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => modified,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No cache file at {}", path.display());
            return Ok(true);
        }
        Err(source) => {
            return Err(MinipoolError::Cache {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    // A modification time in the future counts as fresh.
    let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
    debug!(
        "Cache file {} is {:.1}h old",
        path.display(),
        age.as_secs_f64() / 3600.0
    );
    Ok(age > refresh_period)
}

fn modified_at(path: &Path) -> Result<DateTime<Utc>> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map(DateTime::<Utc>::from)
        .map_err(|source| MinipoolError::Cache {
            path: path.to_path_buf(),
            source,
        })
}

/// Stream the dataset into a temporary file next to the cache, then move it
/// into place. Returns the number of bytes written.
async fn download(options: &CacheOptions) -> Result<u64> {
    let fetch_error = |source: reqwest::Error| MinipoolError::Fetch {
        url: options.url.clone(),
        source,
    };
    let cache_error = |source: io::Error| MinipoolError::Cache {
        path: options.path.clone(),
        source,
    };

    let client = reqwest::Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(fetch_error)?;

    // Stored as sent: without reqwest's gzip feature the body is not decoded.
    let mut response = client
        .get(&options.url)
        .header(ACCEPT_ENCODING, "gzip")
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(fetch_error)?;

    let progress_bar = options
        .show_progress
        .then(|| new_progress_bar(response.content_length()));

    let dir = match options.path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(cache_error)?;
    let mut staging = NamedTempFile::new_in(&dir).map_err(cache_error)?;

    let mut written = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(fetch_error)? {
        staging.write_all(&chunk).map_err(cache_error)?;
        written += chunk.len() as u64;
        if let Some(ref pb) = progress_bar {
            pb.set_position(written);
        }
    }
    staging.flush().map_err(cache_error)?;

    staging
        .persist(&options.path)
        .map_err(|e| cache_error(e.error))?;

    if let Some(pb) = progress_bar {
        pb.finish_with_message("Download complete");
    }

    Ok(written)
}

fn new_progress_bar(length: Option<u64>) -> ProgressBar {
    match length {
        Some(len) => {
            let pb = ProgressBar::new(len);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb
        }
        None => {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.green} [{elapsed_precise}] {bytes}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb
        }
    }
}
