//! Markdown rendering of a report.
//!
//! Same section presence rules as the HTML document; charts become tables
//! with one column per series.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use super::html::{format_amount, format_number, format_timestamp};
use crate::report::{ChartSpec, ReportConfig, ReportRecord};

/// Render `record` as a Markdown document.
pub fn render_markdown(
    record: &ReportRecord,
    config: &ReportConfig,
    generated_at: DateTime<Utc>,
) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail.
    let _ = write_document(&mut out, record, config, generated_at);
    out
}

fn write_document(
    out: &mut String,
    record: &ReportRecord,
    config: &ReportConfig,
    generated_at: DateTime<Utc>,
) -> std::fmt::Result {
    writeln!(out, "# {}", inline(&config.title))?;
    if let Some(subtitle) = &config.subtitle {
        writeln!(out, "\n_{}_", inline(subtitle))?;
    }
    writeln!(out)?;
    writeln!(
        out,
        "**Analysis Type:** {}  ",
        config.analysis_type.heading_label()
    )?;
    if !config.timeframe.is_empty() {
        writeln!(out, "**Timeframe:** {}  ", inline(&config.timeframe))?;
    }
    if let Some(region) = &config.region {
        writeln!(out, "**Region:** {}  ", inline(region))?;
    }
    writeln!(out, "**Generated:** {}", format_timestamp(generated_at))?;

    writeln!(out, "\n## Executive Summary\n")?;
    writeln!(out, "{}", record.executive_summary.trim())?;

    write_list(out, "Key Findings", &record.key_findings)?;

    if let Some(market) = record.market_size.as_ref().filter(|m| m.has_figures()) {
        writeln!(out, "\n## Market Overview\n")?;
        let unit = market.unit.as_deref();
        if let Some(current) = market.current {
            writeln!(out, "- **Current Market Size:** {}", format_amount(current, unit))?;
        }
        if let Some(projected) = market.projected {
            writeln!(out, "- **Projected Size:** {}", format_amount(projected, unit))?;
        }
        if let Some(growth) = market.growth_rate {
            writeln!(out, "- **Growth Rate:** {}%", format_number(growth))?;
        }
    }

    if config.include_charts && !record.charts.is_empty() {
        writeln!(out, "\n## Data Visualizations")?;
        for chart in &record.charts {
            write_chart_table(out, chart)?;
        }
    }

    write_list(out, "Strategic Recommendations", &record.recommendations)?;

    if let Some(risks) = record.risk_factors.as_ref().filter(|r| !r.is_empty()) {
        write_list(out, "Risk Factors", risks)?;
    }
    if let Some(methodology) = &record.methodology {
        writeln!(out, "\n## Methodology\n")?;
        writeln!(out, "{}", methodology.trim())?;
    }
    Ok(())
}

fn write_list(out: &mut String, heading: &str, items: &[String]) -> std::fmt::Result {
    writeln!(out, "\n## {}\n", heading)?;
    for item in items {
        writeln!(out, "- {}", inline(item))?;
    }
    Ok(())
}

fn write_chart_table(out: &mut String, chart: &ChartSpec) -> std::fmt::Result {
    writeln!(out, "\n### {} ({})\n", inline(&chart.title), chart.chart_type.as_str())?;

    write!(out, "| |")?;
    for dataset in &chart.datasets {
        write!(out, " {} |", cell(&dataset.label))?;
    }
    writeln!(out)?;
    write!(out, "|---|")?;
    for _ in &chart.datasets {
        write!(out, "---:|")?;
    }
    writeln!(out)?;

    for (row, label) in chart.labels.iter().enumerate() {
        write!(out, "| {} |", cell(label))?;
        for dataset in &chart.datasets {
            let value = dataset
                .data
                .get(row)
                .map(|v| format_number(*v))
                .unwrap_or_default();
            write!(out, " {} |", value)?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Collapse line breaks so a value stays on one line.
fn inline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cell(text: &str) -> String {
    inline(text).replace('|', "\\|")
}
