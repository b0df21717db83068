//! Report configuration: the immutable descriptor of one report request.

use serde::{Deserialize, Serialize};

/// Kind of analysis requested for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnalysisType {
    MarketAnalysis,
    CompetitiveAnalysis,
    TrendAnalysis,
    FinancialAnalysis,
}

impl AnalysisType {
    /// All accepted analysis types, in declaration order.
    pub const ALL: [AnalysisType; 4] = [
        AnalysisType::MarketAnalysis,
        AnalysisType::CompetitiveAnalysis,
        AnalysisType::TrendAnalysis,
        AnalysisType::FinancialAnalysis,
    ];

    /// Wire name, e.g. `market-analysis`.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::MarketAnalysis => "market-analysis",
            AnalysisType::CompetitiveAnalysis => "competitive-analysis",
            AnalysisType::TrendAnalysis => "trend-analysis",
            AnalysisType::FinancialAnalysis => "financial-analysis",
        }
    }

    /// Upper-case label used in document headers, e.g. `MARKET ANALYSIS`.
    pub fn heading_label(&self) -> String {
        self.as_str().replace('-', " ").to_uppercase()
    }

    /// Parse a wire name.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl std::fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Preferred output document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Pdf,
    Html,
    Markdown,
}

impl OutputFormat {
    /// Wire name, which is also the file extension stem.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "markdown",
        }
    }

    /// File extension for documents in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "pdf",
            OutputFormat::Html => "html",
            OutputFormat::Markdown => "md",
        }
    }

    /// MIME type for documents in this format.
    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Pdf => "application/pdf",
            OutputFormat::Html => "text/html; charset=utf-8",
            OutputFormat::Markdown => "text/markdown; charset=utf-8",
        }
    }

    /// Parse a wire name.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pdf" => Some(OutputFormat::Pdf),
            "html" => Some(OutputFormat::Html),
            "markdown" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable input descriptor for one report run.
///
/// Instances are produced by [`crate::validation::validate_config`], which
/// guarantees `title` and `topic` are non-empty after trimming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    pub topic: String,
    pub analysis_type: AnalysisType,
    pub timeframe: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub include_charts: bool,
    pub include_sources: bool,
    pub output_format: OutputFormat,
}

impl ReportConfig {
    /// Title reduced to ASCII letters and digits, for use in file names.
    ///
    /// Falls back to `report` when nothing survives the filter.
    pub fn file_stem(&self) -> String {
        let stem: String = self
            .title
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        if stem.is_empty() {
            "report".to_string()
        } else {
            stem
        }
    }
}
