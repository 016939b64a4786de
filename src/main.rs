//! minipool-collat - Rocket Pool minipool collateralization histograms
//!
//! A CLI tool that downloads the minipool dataset (cached on disk),
//! buckets borrowed ETH by the node's RPL collateralization ratio and
//! renders one SVG bar chart per deposit size plus an HTML page.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (fetch, decode, configuration or write failure)

mod analysis;
mod cli;
mod config;
mod error;
mod models;
mod report;
mod source;

use anyhow::{Context, Result};
use cli::Args;
use config::{Config, DEFAULT_CONFIG_FILE};
use models::Aggregation;
use report::{ChartSpec, ChartStyle, PageImage, StatsReport};
use source::{CacheOptions, CachedDataset};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Initialize logging
    init_logging(&args);

    info!("minipool-collat v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Run failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .minipools.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        eprintln!(
            "⚠️  {} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize the source, buckets and output.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(args.log_filter(directives.as_deref()))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Fetch, aggregate and render. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    // Load configuration
    let mut config = load_config(&args)?;
    config.merge_with_args(&args);
    config.validate()?;

    // Step 1: Make sure the cached dataset is fresh
    let cache_options = CacheOptions {
        url: config.source.url.clone(),
        path: config.source.cache_file.clone(),
        refresh_period: config.source.refresh_period()?,
        timeout: config.source.timeout(),
        force_refresh: args.force_refresh,
        show_progress: !args.quiet,
    };

    if !args.quiet {
        println!("📥 Checking dataset cache: {}", cache_options.path.display());
    }
    let dataset = source::ensure_fresh(&cache_options)
        .await
        .context("Could not obtain a fresh minipool dataset")?;

    // Step 2: Decode and aggregate
    let records = source::load_records(&dataset.path)?;
    let params = config.aggregation_params();
    let aggregation = analysis::aggregate(&records, &params)?;

    if !args.quiet {
        print_summary(&dataset, &aggregation, records.len());
    }

    if args.dry_run {
        if !args.quiet {
            println!("\n✅ Dry run complete. No files were written.");
        }
        return Ok(0);
    }

    // Step 3: Render charts and the page
    let written = render_outputs(&config, &dataset, &aggregation)?;

    // Step 4: Optional JSON stats
    if let Some(ref stats_path) = args.stats_json {
        let stats = StatsReport::new(&config.source.url, dataset.retrieved_at, &aggregation);
        report::write_json_stats(&stats, stats_path)?;
        info!("Stats written to {}", stats_path.display());
    }

    if !args.quiet {
        for path in &written {
            println!("   📄 {}", path.display());
        }
        println!(
            "\n✅ Done in {:.1}s. Page saved to: {}",
            start_time.elapsed().as_secs_f64(),
            config
                .render
                .output_dir
                .join(&config.render.page_file)
                .display()
        );
    }

    Ok(0)
}

/// Write one chart per category and the page embedding them.
fn render_outputs(
    config: &Config,
    dataset: &CachedDataset,
    aggregation: &Aggregation,
) -> Result<Vec<PathBuf>> {
    let style = ChartStyle::from(&config.render);
    let output_dir = &config.render.output_dir;
    let show_effective =
        config.render.show_effective_average && config.aggregation.track_effective_metrics;

    let mut written = Vec::new();
    let mut images = Vec::new();

    for stats in aggregation.stats.values() {
        if stats.count == 0 {
            warn!(
                "No minipools with deposit category {}, rendering an empty chart",
                stats.category
            );
        }

        let spec = ChartSpec::from_stats(
            stats,
            config.aggregation.min_collat_percent,
            show_effective,
        );
        let file_name = report::chart_file_name(stats.category);
        let path = output_dir.join(&file_name);

        report::write_artifact(&path, &report::render_svg(&spec, &style))?;
        info!("Chart written to {}", path.display());

        images.push(PageImage {
            file_name,
            alt: spec.title,
        });
        written.push(path);
    }

    let page_path = output_dir.join(&config.render.page_file);
    let page = report::generate_index_page(
        &images,
        &config.render.source_label,
        &dataset.retrieved_at,
    );
    report::write_artifact(&page_path, &page)?;
    info!("Page written to {}", page_path.display());
    written.push(page_path);

    Ok(written)
}

/// Print per-category results to stdout.
fn print_summary(dataset: &CachedDataset, aggregation: &Aggregation, total_records: usize) {
    println!(
        "   Data retrieved at {}{}",
        report::page::format_retrieved_at(&dataset.retrieved_at),
        if dataset.downloaded {
            " (downloaded now)"
        } else {
            " (cached)"
        }
    );

    println!("\n📊 Collateralization Summary:");
    println!(
        "   Minipools: {} | Counted: {} | No min stake: {} | Unknown size: {}",
        total_records,
        aggregation.contributing(),
        aggregation.skipped_zero_min_stake,
        aggregation.skipped_unknown_total()
    );

    for stats in aggregation.stats.values() {
        let average = stats
            .average()
            .map(|avg| format!("{:.1}%", avg))
            .unwrap_or_else(|| "n/a".to_string());
        let effective = stats
            .average_effective()
            .map(|avg| format!(" | Avg effective: {:.1}%", avg))
            .unwrap_or_default();

        println!(
            "   - {} ETH: {} minipools | Borrowed: {} | Avg: {}{}",
            stats.category,
            stats.count,
            report::chart::format_eth(stats.total_borrowed()),
            average,
            effective
        );
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
