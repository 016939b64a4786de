//! Static HTML index page.

use super::escape_xml;
use chrono::{DateTime, Utc};

/// A chart embedded in the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Path relative to the page.
    pub file_name: String,
    pub alt: String,
}

/// Timestamp as shown on the page, e.g. "2026-10-19 07:42 UTC".
pub fn format_retrieved_at(retrieved_at: &DateTime<Utc>) -> String {
    retrieved_at.format("%Y-%m-%d %H:%M UTC").to_string()
}

/// Generate the page embedding every chart.
pub fn generate_index_page(
    images: &[PageImage],
    source_label: &str,
    retrieved_at: &DateTime<Utc>,
) -> String {
    let mut page = String::new();

    page.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    page.push_str("\t<meta charset=\"utf-8\">\n");
    page.push_str("\t<title>Minipool Collateralization</title>\n");
    page.push_str("</head>\n<body>\n");

    page.push_str("\t<div style=\"text-align: center\">\n");
    for image in images {
        page.push_str(&format!(
            "\t\t<img src=\"{}\" alt=\"{}\" style=\"padding: 1em\">\n",
            escape_xml(&image.file_name),
            escape_xml(&image.alt)
        ));
    }
    page.push_str("\t</div>\n");

    page.push_str("\t<div style=\"text-align: right; color: gray\">\n");
    page.push_str(&format!(
        "\t\tData retrieved from {} at {}\n",
        escape_xml(source_label),
        format_retrieved_at(retrieved_at)
    ));
    page.push_str("\t</div>\n");

    page.push_str("</body>\n</html>\n");
    page
}
