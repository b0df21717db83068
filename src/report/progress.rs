//! Progress events emitted while a report is being generated.

use serde::{Deserialize, Serialize};

use super::record::ReportRecord;
use crate::error::{FieldError, ReportError};

/// Pipeline phase. The declaration order is the only legal emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Research,
    Analysis,
    Charts,
    Generation,
    Export,
}

impl Phase {
    /// Wire name of the phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Research => "research",
            Phase::Analysis => "analysis",
            Phase::Charts => "charts",
            Phase::Generation => "generation",
            Phase::Export => "export",
        }
    }
}

/// Point-in-time status of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub phase: Phase,
    /// Percentage complete, 0 to 100 inclusive.
    pub progress: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_found: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charts_generated: Option<usize>,
    /// Finished record; present only on the terminal event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportRecord>,
}

impl ProgressEvent {
    /// Create a plain status event.
    pub fn new(phase: Phase, progress: u8, message: impl Into<String>) -> Self {
        Self {
            phase,
            progress: progress.min(100),
            message: message.into(),
            sources_found: None,
            charts_generated: None,
            report: None,
        }
    }

    /// Attach a source counter.
    pub fn with_sources_found(mut self, count: usize) -> Self {
        self.sources_found = Some(count);
        self
    }

    /// Attach a chart counter.
    pub fn with_charts_generated(mut self, count: usize) -> Self {
        self.charts_generated = Some(count);
        self
    }

    /// Attach the finished record, making this the terminal success event.
    pub fn with_report(mut self, report: ReportRecord) -> Self {
        self.progress = 100;
        self.report = Some(report);
        self
    }

    /// Whether this is the terminal success event.
    pub fn is_terminal(&self) -> bool {
        self.report.is_some()
    }
}

/// Terminal failure of a pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineFailure {
    /// Phase that was active when the failure occurred.
    pub phase: Phase,
    /// Stable error code, see [`ReportError::code`].
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
    pub retryable: bool,
}

impl PipelineFailure {
    /// Describe a pipeline error that ended a run during `phase`.
    pub fn from_error(phase: Phase, error: &ReportError) -> Self {
        Self {
            phase,
            code: error.code().to_string(),
            message: error.to_string(),
            errors: error.field_errors().to_vec(),
            retryable: error.is_retryable(),
        }
    }
}

/// One item of a progress stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Failed(PipelineFailure),
}

impl PipelineEvent {
    /// Whether no further events can follow this one.
    pub fn is_terminal(&self) -> bool {
        match self {
            PipelineEvent::Progress(event) => event.is_terminal(),
            PipelineEvent::Failed(_) => true,
        }
    }
}
