//! Output artifacts: SVG charts, the HTML page and a JSON stats dump.

pub mod chart;
pub mod page;

use crate::error::{MinipoolError, Result};
use crate::models::{Aggregation, CategoryStats};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

pub use chart::{render_svg, ChartSpec, ChartStyle};
pub use page::{generate_index_page, PageImage};

/// File name of a category's chart, e.g. `minipools-8eth.svg`.
pub fn chart_file_name(category: u64) -> String {
    format!("minipools-{}eth.svg", category)
}

/// Escape text for use in SVG/HTML content and attribute values.
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Write an artifact, creating its directory if needed.
pub fn write_artifact(path: &Path, content: &str) -> Result<()> {
    let render_error = |source: io::Error| MinipoolError::Render {
        path: path.to_path_buf(),
        source,
    };

    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(render_error)?;
    }
    fs::write(path, content).map_err(render_error)?;

    debug!("Wrote {} ({} bytes)", path.display(), content.len());
    Ok(())
}

/// Averages of one category, in percent.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryAverages {
    pub average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_effective: Option<f64>,
}

impl From<&CategoryStats> for CategoryAverages {
    fn from(stats: &CategoryStats) -> Self {
        Self {
            average: stats.average(),
            average_effective: stats.average_effective(),
        }
    }
}

/// Machine-readable summary of a run.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport<'a> {
    pub source_url: &'a str,
    pub retrieved_at: DateTime<Utc>,
    pub averages: BTreeMap<u64, CategoryAverages>,
    pub aggregation: &'a Aggregation,
}

impl<'a> StatsReport<'a> {
    pub fn new(source_url: &'a str, retrieved_at: DateTime<Utc>, aggregation: &'a Aggregation) -> Self {
        Self {
            source_url,
            retrieved_at,
            averages: aggregation
                .stats
                .iter()
                .map(|(&category, stats)| (category, CategoryAverages::from(stats)))
                .collect(),
            aggregation,
        }
    }
}

/// Generate the JSON stats document.
pub fn generate_json_stats(report: &StatsReport<'_>) -> serde_json::Result<String> {
    serde_json::to_string_pretty(report)
}

/// Write the JSON stats document to `path`.
pub fn write_json_stats(report: &StatsReport<'_>, path: &Path) -> Result<()> {
    let content = generate_json_stats(report).map_err(|e| MinipoolError::Render {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::InvalidData, e),
    })?;
    write_artifact(path, &content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregate;
    use crate::models::{AggregationParams, PoolRecord};
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn sample_aggregation() -> Aggregation {
        let records = vec![
            PoolRecord {
                category: 8,
                stake: 100,
                min_stake: 100,
            },
            PoolRecord {
                category: 4,
                stake: 100,
                min_stake: 100,
            },
        ];
        aggregate(&records, &AggregationParams::default()).unwrap()
    }

    #[test]
    fn test_chart_file_name() {
        assert_eq!(chart_file_name(8), "minipools-8eth.svg");
        assert_eq!(chart_file_name(16), "minipools-16eth.svg");
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml("plain"), "plain");
        assert_eq!(escape_xml("<a href='x'>&</a>"), "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;");
    }

    #[test]
    fn test_write_artifact_creates_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("site").join("index.html");

        write_artifact(&path, "<html></html>").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<html></html>");
    }

    #[test]
    fn test_write_artifact_reports_render_error() {
        let dir = TempDir::new().unwrap();
        // A directory cannot be overwritten with a file.
        let result = write_artifact(dir.path(), "x");
        assert!(matches!(result, Err(MinipoolError::Render { .. })));
    }

    #[test]
    fn test_generate_json_stats() {
        let aggregation = sample_aggregation();
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 7, 42, 0).unwrap();
        let report = StatsReport::new("https://example.org/minipools", at, &aggregation);
        let json = generate_json_stats(&report).unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["source_url"], "https://example.org/minipools");
        assert_eq!(value["aggregation"]["stats"]["8"]["count"], 1);
        assert_eq!(value["aggregation"]["stats"]["8"]["bucket_totals"][10], 24);
        assert_eq!(value["aggregation"]["skipped_unknown"]["4"], 1);
        assert!(value["averages"]["16"]["average"].is_null());
        assert!((value["averages"]["8"]["average"].as_f64().unwrap() - 10.0).abs() < 1e-9);
    }
}
