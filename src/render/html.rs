//! Document renderer: report record + configuration to a styled HTML document.
//!
//! Rendering is a pure function of its inputs plus an explicitly supplied
//! generation timestamp, so identical inputs give byte-identical markup.
//! Sections whose backing field is absent are left out entirely.
//!
//! Charts are emitted as declarative Chart.js configurations; the browser (or
//! the exporter's headless engine) draws them. Once every chart is built the
//! page sets `window.__reportChartsSettled`, which the exporter waits on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tera::{Context, Tera};

use crate::error::RenderError;
use crate::pipeline::enrichment::options_for;
use crate::report::{ChartSpec, ChartType, MarketSize, ReportConfig, ReportRecord};

/// Chart.js build loaded by documents that contain charts.
pub const CHART_JS_URL: &str = "https://cdn.jsdelivr.net/npm/chart.js@4.4.0/dist/chart.umd.js";

/// Global flag set once all charts have been constructed.
pub const CHARTS_SETTLED_FLAG: &str = "__reportChartsSettled";

/// Fallback colours for series without colour hints.
pub const DEFAULT_PALETTE: [&str; 5] = ["#3498db", "#e74c3c", "#2ecc71", "#f39c12", "#9b59b6"];

const DEFAULT_BORDER_COLOR: &str = "#2c3e50";

const TEMPLATE_NAME: &str = "report.html";

const REPORT_TEMPLATE: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{{ title }}</title>
{% if charts %}<script src="{{ chart_js_url | safe }}"></script>
{% endif %}<style>
@page { size: A4; margin: 1in 0.75in; }
body { font-family: 'Arial', sans-serif; line-height: 1.6; color: #333; max-width: 1000px; margin: 0 auto; padding: 20px; }
h1 { color: #2c3e50; border-bottom: 3px solid #3498db; padding-bottom: 10px; margin-bottom: 4px; }
h2 { color: #34495e; margin-top: 30px; }
.subtitle { color: #555; font-size: 18px; margin-top: 0; }
.meta { color: #666; font-size: 14px; }
.meta p { margin: 2px 0; }
.section { margin: 20px 0; padding: 15px; border-radius: 8px; page-break-inside: avoid; }
.executive-summary { background: #f8f9fa; border-left: 4px solid #3498db; }
.key-findings { background: #fff; border: 1px solid #ddd; }
.market-figures { display: flex; gap: 20px; margin: 20px 0; }
.figure { flex: 1; padding: 15px; border-radius: 8px; text-align: center; }
.figure h3 { margin: 0 0 8px; font-size: 15px; }
.figure p { font-size: 20px; font-weight: bold; margin: 0; }
.figure.current { background: #e3f2fd; color: #1976d2; }
.figure.projected { background: #f3e5f5; color: #7b1fa2; }
.figure.growth { background: #e8f5e8; color: #388e3c; }
.chart-container { margin: 30px 0; padding: 20px; border: 1px solid #eee; border-radius: 8px; background: #fafafa; page-break-inside: avoid; }
.chart-wrapper { position: relative; height: 400px; width: 100%; }
.recommendations { background: #e8f5e8; border-left: 4px solid #27ae60; }
.risk-factors { background: #fdf2f2; border-left: 4px solid #e74c3c; }
.methodology { background: #f8f9fa; border: 1px solid #ddd; font-size: 14px; }
ul { padding-left: 20px; }
li { margin: 8px 0; }
@media print { body { max-width: none; padding: 0; } }
</style>
</head>
<body>
<header>
<h1>{{ title }}</h1>
{% if subtitle %}<p class="subtitle">{{ subtitle }}</p>
{% endif %}<div class="meta">
<p><strong>Analysis Type:</strong> {{ analysis_label }}</p>
{% if timeframe %}<p><strong>Timeframe:</strong> {{ timeframe }}</p>
{% endif %}{% if region %}<p><strong>Region:</strong> {{ region }}</p>
{% endif %}<p><strong>Generated:</strong> {{ generated_at }}</p>
</div>
</header>

<section class="section executive-summary">
<h2>Executive Summary</h2>
<p>{{ executive_summary }}</p>
</section>

<section class="section key-findings">
<h2>Key Findings</h2>
<ul>
{% for finding in key_findings %}<li>{{ finding }}</li>
{% endfor %}</ul>
</section>
{% if market %}
<section class="section market-overview">
<h2>Market Overview</h2>
<div class="market-figures">
{% if market.current %}<div class="figure current"><h3>Current Market Size</h3><p>{{ market.current }}</p></div>
{% endif %}{% if market.projected %}<div class="figure projected"><h3>Projected Size</h3><p>{{ market.projected }}</p></div>
{% endif %}{% if market.growth_rate %}<div class="figure growth"><h3>Growth Rate</h3><p>{{ market.growth_rate }}</p></div>
{% endif %}</div>
</section>
{% endif %}{% if charts %}
<section class="section visualizations">
<h2>Data Visualizations</h2>
{% for chart in charts %}<div class="chart-container">
<h3>{{ chart.title }}</h3>
<div class="chart-wrapper"><canvas id="{{ chart.id }}"></canvas></div>
</div>
{% endfor %}</section>
{% endif %}
<section class="section recommendations">
<h2>Strategic Recommendations</h2>
<ul>
{% for recommendation in recommendations %}<li>{{ recommendation }}</li>
{% endfor %}</ul>
</section>
{% if risk_factors %}
<section class="section risk-factors">
<h2>Risk Factors</h2>
<ul>
{% for risk in risk_factors %}<li>{{ risk }}</li>
{% endfor %}</ul>
</section>
{% endif %}{% if methodology %}
<section class="section methodology">
<h2>Methodology</h2>
<p>{{ methodology }}</p>
</section>
{% endif %}
<script>
(function () {
{% if charts %}  var configs = {{ charts_json | safe }};
  if (window.Chart) {
    Chart.defaults.animation = false;
    configs.forEach(function (entry) {
      try {
        new Chart(document.getElementById(entry.id), entry.config);
      } catch (e) {
        console.error('Chart ' + entry.id + ' error:', e);
      }
    });
  } else {
    console.error('Chart.js failed to load');
  }
{% endif %}  window.{{ settled_flag | safe }} = true;
})();
</script>
</body>
</html>
"##;

/// Self-contained, styled markup for one report.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupDocument {
    pub html: String,
    /// Plain document title, reused for running headers on export.
    pub title: String,
}

#[derive(Serialize)]
struct MarketView {
    current: Option<String>,
    projected: Option<String>,
    growth_rate: Option<String>,
}

#[derive(Serialize)]
struct ChartView {
    id: String,
    title: String,
}

/// Renders report records into HTML.
pub struct DocumentRenderer {
    tera: Tera,
}

impl DocumentRenderer {
    /// Create a renderer with the built-in report template.
    pub fn new() -> Result<Self, RenderError> {
        let mut tera = Tera::default();
        tera.add_raw_template(TEMPLATE_NAME, REPORT_TEMPLATE)?;
        Ok(Self { tera })
    }

    /// Render `record` for `config`, stamping it with `generated_at`.
    pub fn render(
        &self,
        record: &ReportRecord,
        config: &ReportConfig,
        generated_at: DateTime<Utc>,
    ) -> Result<MarkupDocument, RenderError> {
        let charts: &[ChartSpec] = if config.include_charts {
            &record.charts
        } else {
            &[]
        };

        let chart_views: Vec<ChartView> = charts
            .iter()
            .enumerate()
            .map(|(i, chart)| ChartView {
                id: canvas_id(i, chart),
                title: chart.title.clone(),
            })
            .collect();
        let chart_configs: Vec<Value> = charts
            .iter()
            .enumerate()
            .map(|(i, chart)| json!({ "id": canvas_id(i, chart), "config": chart_config(chart) }))
            .collect();

        let mut context = Context::new();
        context.insert("title", &config.title);
        context.insert("subtitle", &config.subtitle);
        context.insert("analysis_label", &config.analysis_type.heading_label());
        context.insert("timeframe", &config.timeframe);
        context.insert("region", &config.region);
        context.insert("generated_at", &format_timestamp(generated_at));
        context.insert("executive_summary", &record.executive_summary);
        context.insert("key_findings", &record.key_findings);
        context.insert(
            "market",
            &record
                .market_size
                .as_ref()
                .filter(|m| m.has_figures())
                .map(market_view),
        );
        context.insert("charts", &chart_views);
        context.insert("charts_json", &script_safe_json(&chart_configs)?);
        context.insert("chart_js_url", CHART_JS_URL);
        context.insert("settled_flag", CHARTS_SETTLED_FLAG);
        context.insert("recommendations", &record.recommendations);
        context.insert(
            "risk_factors",
            &record.risk_factors.as_ref().filter(|r| !r.is_empty()),
        );
        context.insert("methodology", &record.methodology);

        let html = self.tera.render(TEMPLATE_NAME, &context)?;
        Ok(MarkupDocument {
            html,
            title: config.title.clone(),
        })
    }
}

/// One-shot convenience over [`DocumentRenderer`].
pub fn render_html(
    record: &ReportRecord,
    config: &ReportConfig,
    generated_at: DateTime<Utc>,
) -> Result<MarkupDocument, RenderError> {
    DocumentRenderer::new()?.render(record, config, generated_at)
}

fn canvas_id(index: usize, chart: &ChartSpec) -> String {
    chart
        .id
        .clone()
        .unwrap_or_else(|| format!("chart-{}", index + 1))
}

pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format("%B %-d, %Y %H:%M UTC").to_string()
}

/// Compact number: integers without decimals, others to two places.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        let s = format!("{:.2}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub(crate) fn format_amount(value: f64, unit: Option<&str>) -> String {
    match unit.map(str::trim).filter(|u| !u.is_empty()) {
        Some(unit) => format!("{} {}", format_number(value), unit),
        None => format_number(value),
    }
}

fn market_view(market: &MarketSize) -> MarketView {
    let unit = market.unit.as_deref();
    MarketView {
        current: market.current.map(|v| format_amount(v, unit)),
        projected: market.projected.map(|v| format_amount(v, unit)),
        growth_rate: market.growth_rate.map(|v| format!("{}%", format_number(v))),
    }
}

/// Chart.js configuration for one chart, with palette defaults applied.
fn chart_config(chart: &ChartSpec) -> Value {
    let per_slice = matches!(chart.chart_type, ChartType::Pie | ChartType::Doughnut);
    let datasets: Vec<Value> = chart
        .datasets
        .iter()
        .enumerate()
        .map(|(i, dataset)| {
            let background = match &dataset.background_color {
                Some(colors) if !colors.is_empty() => json!(colors),
                _ if per_slice => json!((0..chart.labels.len())
                    .map(|j| DEFAULT_PALETTE[j % DEFAULT_PALETTE.len()])
                    .collect::<Vec<_>>()),
                _ => json!(DEFAULT_PALETTE[i % DEFAULT_PALETTE.len()]),
            };
            json!({
                "label": dataset.label,
                "data": dataset.data,
                "backgroundColor": background,
                "borderColor": dataset.border_color.as_deref().unwrap_or(DEFAULT_BORDER_COLOR),
                "borderWidth": dataset.border_width.unwrap_or(1.0),
            })
        })
        .collect();

    let options = chart.options.clone().unwrap_or_else(|| options_for(chart));
    json!({
        "type": chart.chart_type.as_str(),
        "data": { "labels": chart.labels, "datasets": datasets },
        "options": options,
    })
}

/// Serialize for inline `<script>` use: `</` cannot close the element.
fn script_safe_json(value: &impl Serialize) -> Result<String, RenderError> {
    Ok(serde_json::to_string(value)?
        .replace("</", "<\\/")
        .replace("<!--", "<\\!--"))
}
