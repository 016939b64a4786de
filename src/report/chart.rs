//! SVG bar chart rendering.
//!
//! Each category's histogram becomes one standalone SVG document. The
//! output only depends on its input, so regenerated charts diff cleanly.

use super::escape_xml;
use crate::models::CategoryStats;

const MARGIN_LEFT: f64 = 80.0;
const MARGIN_RIGHT: f64 = 20.0;
const MARGIN_TOP: f64 = 40.0;
const MARGIN_BOTTOM: f64 = 50.0;

const GRID_COLOR: &str = "#DAD8D7";
const AVERAGE_COLOR: &str = "#1f77b4";
const TEXT_COLOR: &str = "#333333";

const X_LABEL: &str = "Staked RPL vs borrowed ETH";
const Y_LABEL: &str = "Borrowed ETH";

/// Size and colours of a chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartStyle {
    pub width: u32,
    pub height: u32,
    /// Fill of bars below the minimum collateral.
    pub light_color: String,
    /// Fill of bars at or above the minimum collateral.
    pub dark_color: String,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 1500,
            height: 400,
            light_color: "#f7b852".to_string(),
            dark_color: "#fa9b02".to_string(),
        }
    }
}

impl From<&crate::config::RenderConfig> for ChartStyle {
    fn from(config: &crate::config::RenderConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            light_color: config.light_color.clone(),
            dark_color: config.dark_color.clone(),
        }
    }
}

/// Everything needed to draw one histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: String,
    /// `(bucket start in percent, borrowed ETH)`, leading empty buckets trimmed.
    pub bars: Vec<(u32, u64)>,
    /// Bucket width in percentage points.
    pub bucket_width: u32,
    /// Ratio in percent from which bars use the dark colour.
    pub threshold: f64,
    pub average: Option<f64>,
    pub effective_average: Option<f64>,
}

impl ChartSpec {
    /// Build the chart for one category.
    pub fn from_stats(stats: &CategoryStats, threshold: f64, show_effective: bool) -> Self {
        Self {
            title: format!("{} ETH Minipools", stats.category),
            bars: stats.series(),
            bucket_width: stats.step,
            threshold,
            average: stats.average(),
            effective_average: if show_effective {
                stats.average_effective()
            } else {
                None
            },
        }
    }
}

/// Maps data coordinates to SVG coordinates.
struct Plot {
    x_min: f64,
    x_max: f64,
    y_max: f64,
    width: f64,
    height: f64,
}

impl Plot {
    fn x(&self, value: f64) -> f64 {
        MARGIN_LEFT + (value - self.x_min) / (self.x_max - self.x_min) * self.width
    }

    fn y(&self, value: f64) -> f64 {
        MARGIN_TOP + self.height - value / self.y_max * self.height
    }

    fn bottom(&self) -> f64 {
        MARGIN_TOP + self.height
    }
}

/// Render a chart as an SVG document.
pub fn render_svg(spec: &ChartSpec, style: &ChartStyle) -> String {
    let width = f64::from(style.width);
    let height = f64::from(style.height);

    let mut svg = String::new();
    svg.push_str(&format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" font-family=\"sans-serif\">\n",
        w = style.width,
        h = style.height
    ));
    svg.push_str(&format!(
        "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"#ffffff\"/>\n",
        style.width, style.height
    ));
    svg.push_str(&format!(
        "<text x=\"{:.2}\" y=\"24\" text-anchor=\"middle\" font-size=\"19\" font-weight=\"bold\" fill=\"{}\" fill-opacity=\"0.8\">{}</text>\n",
        width / 2.0,
        TEXT_COLOR,
        escape_xml(&spec.title)
    ));

    let plot = Plot {
        x_min: 0.0,
        x_max: 1.0,
        y_max: 1.0,
        width: (width - MARGIN_LEFT - MARGIN_RIGHT).max(1.0),
        height: (height - MARGIN_TOP - MARGIN_BOTTOM).max(1.0),
    };

    if spec.bars.is_empty() {
        svg.push_str(&generate_frame(&plot));
        svg.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-size=\"16\" fill=\"{}\">No data</text>\n",
            plot.x(0.5),
            MARGIN_TOP + plot.height / 2.0,
            TEXT_COLOR
        ));
        svg.push_str("</svg>\n");
        return svg;
    }

    let step = f64::from(spec.bucket_width);
    let first = f64::from(spec.bars[0].0);
    let last = f64::from(spec.bars[spec.bars.len() - 1].0);
    let max_value = spec.bars.iter().map(|&(_, v)| v).max().unwrap_or(0);

    let mut x_min = first - step * 0.6;
    let mut x_max = last + step * 0.6;
    for marker in [spec.average, spec.effective_average].into_iter().flatten() {
        x_min = x_min.min(marker - step);
        x_max = x_max.max(marker + step);
    }

    let y_step = nice_step(max_value as f64);
    let plot = Plot {
        x_min,
        x_max,
        y_max: ((max_value as f64 / y_step).ceil() * y_step).max(y_step),
        ..plot
    };

    svg.push_str(&generate_grid(&plot, spec, y_step, last));
    svg.push_str(&generate_bars(&plot, spec, style));

    if let Some(average) = spec.average {
        svg.push_str(&generate_marker(&plot, average, "average", max_value));
    }
    if let Some(effective) = spec.effective_average {
        svg.push_str(&generate_marker(
            &plot,
            effective,
            "average effective",
            max_value,
        ));
    }

    svg.push_str(&generate_frame(&plot));
    svg.push_str("</svg>\n");
    svg
}

/// Gridlines and tick labels on both axes.
fn generate_grid(plot: &Plot, spec: &ChartSpec, y_step: f64, last: f64) -> String {
    let mut grid = String::new();

    let x_step = 5.0 * f64::from(spec.bucket_width);
    let mut tick = (plot.x_min.max(0.0) / x_step).ceil() * x_step;
    while tick <= plot.x_max {
        let x = plot.x(tick);
        grid.push_str(&format!(
            "<line x1=\"{x:.2}\" y1=\"{:.2}\" x2=\"{x:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-opacity=\"0.5\"/>\n",
            MARGIN_TOP,
            plot.bottom(),
            GRID_COLOR
        ));
        grid.push_str(&format!(
            "<text x=\"{x:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-size=\"11\" fill=\"{}\">{}</text>\n",
            plot.bottom() + 16.0,
            TEXT_COLOR,
            format_ratio_tick(tick, last)
        ));
        tick += x_step;
    }

    let mut value = 0.0;
    while value <= plot.y_max {
        let y = plot.y(value);
        grid.push_str(&format!(
            "<line x1=\"{:.2}\" y1=\"{y:.2}\" x2=\"{:.2}\" y2=\"{y:.2}\" stroke=\"{}\" stroke-opacity=\"0.5\"/>\n",
            MARGIN_LEFT,
            MARGIN_LEFT + plot.width,
            GRID_COLOR
        ));
        grid.push_str(&format!(
            "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"end\" font-size=\"11\" fill=\"{}\">{}</text>\n",
            MARGIN_LEFT - 6.0,
            y + 4.0,
            TEXT_COLOR,
            format_eth(value as u64)
        ));
        value += y_step;
    }

    grid
}

fn generate_bars(plot: &Plot, spec: &ChartSpec, style: &ChartStyle) -> String {
    let mut bars = String::new();
    let half = f64::from(spec.bucket_width) / 2.0;

    for &(start, total) in &spec.bars {
        if total == 0 {
            continue;
        }
        let ratio = f64::from(start);
        let color = if ratio >= spec.threshold {
            &style.dark_color
        } else {
            &style.light_color
        };
        let left = plot.x(ratio - half);
        let top = plot.y(total as f64);
        bars.push_str(&format!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\"><title>{}: {}</title></rect>\n",
            left,
            top,
            plot.x(ratio + half) - left,
            plot.bottom() - top,
            escape_xml(color),
            format_ratio_tick(ratio, f64::NAN),
            format_eth(total)
        ));
    }

    bars
}

/// Dotted vertical line with a rotated label.
fn generate_marker(plot: &Plot, at: f64, label: &str, max_value: u64) -> String {
    let x = plot.x(at);
    let label_x = x + 12.0;
    let label_y = plot.y(max_value as f64 / 2.0);

    let mut marker = format!(
        "<line x1=\"{x:.2}\" y1=\"{:.2}\" x2=\"{x:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"1.5\" stroke-dasharray=\"2,3\"/>\n",
        MARGIN_TOP,
        plot.bottom(),
        AVERAGE_COLOR
    );
    marker.push_str(&format!(
        "<text x=\"{label_x:.2}\" y=\"{label_y:.2}\" transform=\"rotate(-90 {label_x:.2} {label_y:.2})\" text-anchor=\"middle\" font-size=\"12\" fill=\"{}\">{}</text>\n",
        TEXT_COLOR,
        escape_xml(label)
    ));
    marker
}

/// Axis lines and axis labels.
fn generate_frame(plot: &Plot) -> String {
    let mut frame = String::new();
    let right = MARGIN_LEFT + plot.width;

    frame.push_str(&format!(
        "<line x1=\"{:.2}\" y1=\"{b:.2}\" x2=\"{:.2}\" y2=\"{b:.2}\" stroke=\"{}\"/>\n",
        MARGIN_LEFT,
        right,
        TEXT_COLOR,
        b = plot.bottom()
    ));
    frame.push_str(&format!(
        "<line x1=\"{l:.2}\" y1=\"{:.2}\" x2=\"{l:.2}\" y2=\"{:.2}\" stroke=\"{}\"/>\n",
        MARGIN_TOP,
        plot.bottom(),
        TEXT_COLOR,
        l = MARGIN_LEFT
    ));
    frame.push_str(&format!(
        "<text x=\"{:.2}\" y=\"{:.2}\" text-anchor=\"middle\" font-size=\"13\" fill=\"{}\">{}</text>\n",
        MARGIN_LEFT + plot.width / 2.0,
        plot.bottom() + 40.0,
        TEXT_COLOR,
        X_LABEL
    ));
    let label_y = MARGIN_TOP + plot.height / 2.0;
    frame.push_str(&format!(
        "<text x=\"18\" y=\"{label_y:.2}\" transform=\"rotate(-90 18 {label_y:.2})\" text-anchor=\"middle\" font-size=\"13\" fill=\"{}\">{}</text>\n",
        TEXT_COLOR,
        Y_LABEL
    ));

    frame
}

/// "25%", with a trailing "+" on the last bucket, which holds everything above it.
pub fn format_ratio_tick(tick: f64, last: f64) -> String {
    let mut label = format!("{:.0}%", tick);
    if tick == last {
        label.push('+');
    }
    label
}

/// "Ξ12,345".
pub fn format_eth(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    grouped.push('Ξ');
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

/// Tick spacing of 1, 2 or 5 times a power of ten, giving about five ticks.
pub fn nice_step(max: f64) -> f64 {
    if max <= 0.0 {
        return 1.0;
    }
    let raw = max / 5.0;
    let magnitude = 10f64.powf(raw.log10().floor());
    let normalized = raw / magnitude;
    let nice = if normalized <= 1.0 {
        1.0
    } else if normalized <= 2.0 {
        2.0
    } else if normalized <= 5.0 {
        5.0
    } else {
        10.0
    };
    (nice * magnitude).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_spec() -> ChartSpec {
        ChartSpec {
            title: "8 ETH Minipools".to_string(),
            bars: vec![(5, 24), (6, 0), (7, 48), (8, 24), (9, 0), (10, 1_200)],
            bucket_width: 1,
            threshold: 10.0,
            average: Some(8.5),
            effective_average: None,
        }
    }

    #[test]
    fn test_format_eth() {
        assert_eq!(format_eth(0), "Ξ0");
        assert_eq!(format_eth(999), "Ξ999");
        assert_eq!(format_eth(1_000), "Ξ1,000");
        assert_eq!(format_eth(1_234_567), "Ξ1,234,567");
    }

    #[test]
    fn test_format_ratio_tick() {
        assert_eq!(format_ratio_tick(25.0, 50.0), "25%");
        assert_eq!(format_ratio_tick(50.0, 50.0), "50%+");
    }

    #[test]
    fn test_nice_step() {
        assert_eq!(nice_step(0.0), 1.0);
        assert_eq!(nice_step(3.0), 1.0);
        assert_eq!(nice_step(48.0), 10.0);
        assert_eq!(nice_step(1_200.0), 500.0);
        assert_eq!(nice_step(90_000.0), 20_000.0);
    }

    #[test]
    fn test_render_svg_contents() {
        let svg = render_svg(&sample_spec(), &ChartStyle::default());

        assert!(svg.starts_with("<svg"));
        assert!(svg.trim_end().ends_with("</svg>"));
        assert!(svg.contains("8 ETH Minipools"));
        assert!(svg.contains(X_LABEL));
        assert!(svg.contains(Y_LABEL));
        assert!(svg.contains(">average</text>"));
        assert!(svg.contains("10%+"));
        assert!(svg.contains("Ξ1,000"));
        assert!(!svg.contains("average effective"));
    }

    #[test]
    fn test_bar_colors_follow_threshold() {
        let style = ChartStyle::default();
        let svg = render_svg(&sample_spec(), &style);

        // Three light bars below 10%, one dark bar at 10%.
        assert_eq!(svg.matches(&format!("fill=\"{}\"", style.light_color)).count(), 3);
        assert_eq!(svg.matches(&format!("fill=\"{}\"", style.dark_color)).count(), 1);
    }

    #[test]
    fn test_render_svg_is_deterministic() {
        let style = ChartStyle::default();
        assert_eq!(
            render_svg(&sample_spec(), &style),
            render_svg(&sample_spec(), &style)
        );
    }

    #[test]
    fn test_effective_average_marker() {
        let spec = ChartSpec {
            effective_average: Some(7.0),
            ..sample_spec()
        };
        let svg = render_svg(&spec, &ChartStyle::default());
        assert!(svg.contains(">average effective</text>"));
        assert_eq!(svg.matches("stroke-dasharray").count(), 2);
    }

    #[test]
    fn test_no_data_placeholder() {
        let spec = ChartSpec {
            bars: Vec::new(),
            average: None,
            ..sample_spec()
        };
        let svg = render_svg(&spec, &ChartStyle::default());
        assert!(svg.contains("No data"));
        assert!(!svg.contains("stroke-dasharray"));
    }

    #[test]
    fn test_from_stats_trims_and_averages() {
        let stats = CategoryStats {
            category: 16,
            step: 2,
            bucket_totals: vec![0, 0, 16, 32],
            count: 3,
            total_collateral_ratio: 0.15,
            total_effective_ratio: Some(0.12),
        };

        let spec = ChartSpec::from_stats(&stats, 10.0, false);
        assert_eq!(spec.title, "16 ETH Minipools");
        assert_eq!(spec.bars, vec![(4, 16), (6, 32)]);
        assert!((spec.average.unwrap() - 5.0).abs() < 1e-9);
        assert_eq!(spec.effective_average, None);

        let spec = ChartSpec::from_stats(&stats, 10.0, true);
        assert!((spec.effective_average.unwrap() - 4.0).abs() < 1e-9);
    }
}
