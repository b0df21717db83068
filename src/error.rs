//! Error types for report-forge operations.
//!
//! Defines the error taxonomy shared by every stage of the report pipeline:
//! - Schema validation of configurations and report records
//! - LLM API interactions (research and extraction calls)
//! - Document rendering
//! - Document export through a headless rendering engine

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single structural problem found by the schema validator.
///
/// `path` uses dotted/indexed notation rooted at the validated document,
/// e.g. `charts[1].datasets[0].data`. The root itself is `$`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Location of the offending value.
    pub path: String,
    /// Human-readable reason the value was rejected.
    pub reason: String,
}

impl FieldError {
    /// Create a new field error.
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.reason)
    }
}

/// Joins field errors into a single line for error messages.
pub fn describe_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },

    #[error("LLM response contained no content")]
    EmptyResponse,
}

/// Errors that can occur while rendering a report into markup.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Template rendering error: {0}")]
    Template(#[from] tera::Error),

    #[error("Failed to serialize chart configuration: {0}")]
    ChartSerialization(#[from] serde_json::Error),
}

/// Errors that can occur while exporting markup to a paginated document.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Rendering engine failed to launch: {0}")]
    EngineLaunchFailure(String),

    #[error("Document did not settle within {seconds} seconds")]
    RenderTimeout { seconds: u64 },

    #[error("Pagination failed: {0}")]
    Pagination(String),

    #[error("Rendering engine protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ExportError::EngineLaunchFailure(_) => "engine_launch_failure",
            ExportError::RenderTimeout { .. } => "render_timeout",
            ExportError::Pagination(_) => "pagination_failed",
            ExportError::Protocol(_) => "engine_protocol_error",
            ExportError::Io(_) => "export_io_error",
        }
    }
}

/// Errors surfaced by the report pipeline and the service layer.
///
/// Generation failures (`ResearchUnavailable`, `ExtractionUnavailable`,
/// `ExtractionSchemaViolation`) are kept apart from `Export` so callers can
/// tell "the report exists but export failed" from "no report was produced".
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Validation failed: {}", describe_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Research stage unavailable: {0}")]
    ResearchUnavailable(String),

    #[error("Extraction stage unavailable: {0}")]
    ExtractionUnavailable(String),

    #[error("Extracted report violates the schema: {}", describe_field_errors(.0))]
    ExtractionSchemaViolation(Vec<FieldError>),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),

    #[error("Pipeline run was cancelled by the consumer")]
    Cancelled,
}

impl ReportError {
    /// Stable machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            ReportError::Validation(_) => "validation_error",
            ReportError::ResearchUnavailable(_) => "research_unavailable",
            ReportError::ExtractionUnavailable(_) => "extraction_unavailable",
            ReportError::ExtractionSchemaViolation(_) => "extraction_schema_violation",
            ReportError::Render(_) => "render_error",
            ReportError::Export(e) => e.code(),
            ReportError::Cancelled => "cancelled",
        }
    }

    /// Field-level details, when the error carries any.
    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ReportError::Validation(errors) | ReportError::ExtractionSchemaViolation(errors) => {
                errors
            }
            _ => &[],
        }
    }

    /// Whether a caller may reasonably retry the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ReportError::ResearchUnavailable(_)
                | ReportError::ExtractionUnavailable(_)
                | ReportError::ExtractionSchemaViolation(_)
                | ReportError::Export(ExportError::RenderTimeout { .. })
        )
    }
}
