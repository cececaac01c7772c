use std::collections::HashMap;
use std::fmt::Write;

use indexmap::IndexSet;
use serde::Serialize;

use crate::aggregate::{DashboardView, KpiSummary};

/// One-line KPI banner, e.g.
/// `Total Users: 1,204 | Adopted Users: 611 | Adoption Rate: 50.75% | Avg Uses: 4.18`.
pub fn kpi_banner(kpis: &KpiSummary) -> String {
    format!(
        "Total Users: {} | Adopted Users: {} | Adoption Rate: {:.2}% | Avg Uses: {:.2}",
        with_thousands(kpis.total_users),
        with_thousands(kpis.adopted_users),
        kpis.adoption_rate_pct,
        kpis.avg_uses_among_adopters
    )
}

fn with_thousands(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Box-plot summary of one channel's use counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageStats {
    pub count: usize,
    pub min: u32,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: u32,
    pub mean: f64,
}

impl UsageStats {
    /// `None` for an empty sample.
    #[allow(clippy::cast_precision_loss)]
    pub fn from_values(values: &[u32]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        let (&min, &max) = (sorted.first()?, sorted.last()?);
        let sum: u64 = sorted.iter().map(|&v| u64::from(v)).sum();

        Some(UsageStats {
            count: sorted.len(),
            min,
            q1: quantile(&sorted, 0.25),
            median: quantile(&sorted, 0.5),
            q3: quantile(&sorted, 0.75),
            max,
            mean: sum as f64 / sorted.len() as f64,
        })
    }
}

/// Linear interpolation between closest ranks. `sorted` must be non-empty.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn quantile(sorted: &[u32], p: f64) -> f64 {
    let pos = p * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let (a, b) = (f64::from(sorted[lo]), f64::from(sorted[hi]));
    a + (b - a) * (pos - lo as f64)
}

/// Plain-text rendering of a whole view: banner plus the three projections.
pub fn render_text(view: &DashboardView) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Feature Adoption Dashboard");
    let _ = writeln!(output, "{}", kpi_banner(&view.kpis));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Feature Adoption Rate by Device Type");
    if view.device_adoption.is_empty() {
        let _ = writeln!(output, "No users match the current filters.");
    } else {
        let width = label_width(view.device_adoption.iter().map(|d| d.device_type.as_str()));
        for device in &view.device_adoption {
            let _ = writeln!(
                output,
                "- {:<width$}  {:>7.2}%",
                device.device_type,
                device.adoption_rate * 100.0
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Feature Use Distribution by Channel");
    if view.channel_usage.is_empty() {
        let _ = writeln!(output, "No adopters match the current filters.");
    } else {
        let width = label_width(view.channel_usage.keys().map(String::as_str));
        for (channel, values) in &view.channel_usage {
            if let Some(stats) = UsageStats::from_values(values) {
                let _ = writeln!(
                    output,
                    "- {:<width$}  n={} min={} q1={:.1} median={:.1} q3={:.1} max={} mean={:.2}",
                    channel,
                    stats.count,
                    stats.min,
                    stats.q1,
                    stats.median,
                    stats.q3,
                    stats.max,
                    stats.mean
                );
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Adoption Rate Heatmap by Segment");
    if view.heatmap.is_empty() {
        let _ = writeln!(output, "No segments match the current filters.");
    } else {
        write_heatmap(&mut output, view);
    }

    output
}

fn label_width<'a>(labels: impl Iterator<Item = &'a str>) -> usize {
    labels.map(str::len).max().unwrap_or(0)
}

/// Device rows × channel columns; `-` marks pairs absent from the subset.
fn write_heatmap(output: &mut String, view: &DashboardView) {
    let devices: IndexSet<&str> = view.heatmap.iter().map(|c| c.device_type.as_str()).collect();
    let channels: IndexSet<&str> = view.heatmap.iter().map(|c| c.channel.as_str()).collect();
    let rates: HashMap<(&str, &str), f64> = view
        .heatmap
        .iter()
        .map(|c| ((c.device_type.as_str(), c.channel.as_str()), c.adoption_rate))
        .collect();

    let row_width = label_width(devices.iter().copied());
    let col_width = label_width(channels.iter().copied()).max(4);

    let _ = write!(output, "  {:<row_width$}", "");
    for channel in &channels {
        let _ = write!(output, "  {channel:>col_width$}");
    }
    let _ = writeln!(output);

    for device in &devices {
        let _ = write!(output, "  {device:<row_width$}");
        for channel in &channels {
            match rates.get(&(*device, *channel)) {
                Some(rate) => {
                    let _ = write!(output, "  {rate:>col_width$.2}");
                }
                None => {
                    let _ = write!(output, "  {:>col_width$}", "-");
                }
            }
        }
        let _ = writeln!(output);
    }
}
