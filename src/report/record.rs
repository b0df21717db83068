//! Structured report record produced by the extraction stage.

use serde::{Deserialize, Serialize};

/// Visualization kind for a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Doughnut,
    Radar,
}

impl ChartType {
    /// All chart types, in declaration order.
    pub const ALL: [ChartType; 5] = [
        ChartType::Bar,
        ChartType::Line,
        ChartType::Pie,
        ChartType::Doughnut,
        ChartType::Radar,
    ];

    /// Wire name, e.g. `doughnut`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Doughnut => "doughnut",
            ChartType::Radar => "radar",
        }
    }

    /// Parse a wire name.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }

    /// Only cartesian charts carry axis (`scales`) options.
    pub fn has_axes(&self) -> bool {
        matches!(self, ChartType::Bar | ChartType::Line)
    }
}

/// One named numeric series of a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDataset {
    pub label: String,
    pub data: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border_width: Option<f64>,
}

/// Font settings for a chart title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontOptions {
    pub size: u32,
    pub weight: String,
}

/// Title plugin options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TitleOptions {
    #[serde(default = "default_true")]
    pub display: bool,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font: Option<FontOptions>,
}

/// Legend plugin options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendOptions {
    #[serde(default = "default_true")]
    pub display: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
}

/// Plugin option block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PluginOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<TitleOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legend: Option<LegendOptions>,
}

/// Grid line options for an axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOptions {
    pub color: String,
}

/// Options for one axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxisOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub begin_at_zero: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridOptions>,
}

/// Axis option block, legal for bar and line charts only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaleOptions {
    pub x: AxisOptions,
    pub y: AxisOptions,
}

/// Rendering options attached to a chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartOptions {
    #[serde(default = "default_true")]
    pub responsive: bool,
    #[serde(default = "default_true")]
    pub maintain_aspect_ratio: bool,
    #[serde(default)]
    pub plugins: PluginOptions,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scales: Option<ScaleOptions>,
}

fn default_true() -> bool {
    true
}

/// One visualization: labels plus one or more series of equal length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub title: String,
    pub labels: Vec<String>,
    pub datasets: Vec<ChartDataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ChartOptions>,
}

/// Market size figures. Every field is independently optional; a missing
/// value means "not available", never zero.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketSize {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projected: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub growth_rate: Option<f64>,
}

impl MarketSize {
    /// True when at least one figure is available to display.
    pub fn has_figures(&self) -> bool {
        self.current.is_some() || self.projected.is_some() || self.growth_rate.is_some()
    }
}

/// The structured business report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub executive_summary: String,
    pub key_findings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_size: Option<MarketSize>,
    pub charts: Vec<ChartSpec>,
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_factors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub methodology: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_spec_wire_shape() {
        let chart = ChartSpec {
            id: None,
            chart_type: ChartType::Doughnut,
            title: "Share".to_string(),
            labels: vec!["A".to_string()],
            datasets: vec![ChartDataset {
                label: "Share".to_string(),
                data: vec![1.0],
                background_color: None,
                border_color: Some("#fff".to_string()),
                border_width: None,
            }],
            options: None,
        };
        let json = serde_json::to_value(&chart).expect("serialize");
        assert_eq!(json["type"], "doughnut");
        assert_eq!(json["datasets"][0]["borderColor"], "#fff");
        assert!(json.get("id").is_none());
        assert!(json.get("options").is_none());
    }

    #[test]
    fn test_chart_type_axes() {
        assert!(ChartType::Bar.has_axes());
        assert!(ChartType::Line.has_axes());
        assert!(!ChartType::Pie.has_axes());
        assert!(!ChartType::Radar.has_axes());
        assert_eq!(ChartType::parse("radar"), Some(ChartType::Radar));
        assert_eq!(ChartType::parse("scatter"), None);
    }

    #[test]
    fn test_market_size_presence() {
        assert!(!MarketSize::default().has_figures());
        let unit_only = MarketSize {
            unit: Some("USD billion".to_string()),
            ..Default::default()
        };
        assert!(!unit_only.has_figures());
        let zero = MarketSize {
            current: Some(0.0),
            ..Default::default()
        };
        assert!(zero.has_figures());
    }
}
