//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Every setting is optional here so that the
//! config file keeps its values unless a flag overrides them.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// minipool-collat - collateralization histograms for Rocket Pool minipools
///
/// Downloads the minipool dataset (cached on disk), buckets borrowed ETH by
/// the node's RPL collateralization and writes one SVG chart per deposit
/// size plus an HTML page embedding them.
///
/// Examples:
///   minipool-collat
///   minipool-collat --output-dir ../site --stats-json stats.json
///   minipool-collat --force-refresh --show-effective
///   minipool-collat --dry-run --verbose
///   minipool-collat --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to configuration file
    ///
    /// If not specified, looks for .minipools.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Dataset URL
    #[arg(long, value_name = "URL", env = "MINIPOOLS_URL")]
    pub url: Option<String>,

    /// Local cache file for the dataset
    #[arg(long, value_name = "FILE")]
    pub cache_file: Option<PathBuf>,

    /// Hours before the cached dataset is downloaded again
    #[arg(long, value_name = "HOURS")]
    pub refresh_hours: Option<f64>,

    /// Download the dataset even if the cache is fresh
    #[arg(long)]
    pub force_refresh: bool,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Directory for the charts and the HTML page
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Also write the aggregated statistics as JSON
    #[arg(long, value_name = "FILE")]
    pub stats_json: Option<PathBuf>,

    /// Abort when a minipool has a deposit size with no bucket configuration
    ///
    /// By default such minipools are skipped with a warning.
    #[arg(long)]
    pub strict: bool,

    /// Draw the average effective collateral line as well
    #[arg(long)]
    pub show_effective: bool,

    /// Fetch and aggregate, print the summary, write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .minipools.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Dataset URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(hours) = self.refresh_hours {
            if !(hours > 0.0) || !hours.is_finite() {
                return Err("Refresh period must be a positive number of hours".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Log filter: `--verbose`/`--quiet` win, then `RUST_LOG`-style
    /// directives, then the default level.
    pub fn log_filter(&self, directives: Option<&str>) -> EnvFilter {
        let fallback = || EnvFilter::new(self.log_level().to_string().to_lowercase());
        if self.verbose || self.quiet {
            return fallback();
        }
        directives
            .filter(|d| !d.trim().is_empty())
            .and_then(|d| EnvFilter::try_new(d).ok())
            .unwrap_or_else(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            config: None,
            url: None,
            cache_file: None,
            refresh_hours: None,
            force_refresh: false,
            timeout: None,
            output_dir: None,
            stats_json: None,
            strict: false,
            show_effective: false,
            dry_run: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_url() {
        let mut args = make_args();
        args.url = Some("ftp://example.org/minipools".to_string());
        assert!(args.validate().is_err());

        args.url = Some("https://example.org/minipools".to_string());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_refresh_and_timeout() {
        let mut args = make_args();
        args.refresh_hours = Some(0.0);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.refresh_hours = Some(f64::NAN);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.refresh_hours = Some(f64::INFINITY);
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_log_filter() {
        use tracing::level_filters::LevelFilter;

        let mut args = make_args();
        assert_eq!(args.log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
        assert_eq!(
            args.log_filter(Some("trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );

        args.quiet = true;
        assert_eq!(
            args.log_filter(Some("trace")).max_level_hint(),
            Some(LevelFilter::ERROR)
        );
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::try_parse_from([
            "minipool-collat",
            "--url",
            "https://example.org/all",
            "--timeout",
            "30",
            "-o",
            "site",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(args.url.as_deref(), Some("https://example.org/all"));
        assert_eq!(args.timeout, Some(30));
        assert_eq!(args.output_dir, Some(PathBuf::from("site")));
        assert!(args.dry_run);
        assert!(!args.strict);
    }
}
