//! Transport-agnostic request surface.
//!
//! Every entry point takes untyped JSON, validates it, and only then touches
//! the pipeline, the renderer or the exporter.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{info, instrument};

use crate::error::{FieldError, RenderError, ReportError};
use crate::export::DocumentExporter;
use crate::pipeline::{ProgressStream, ReportPipeline};
use crate::render::{render_markdown, DocumentRenderer};
use crate::report::{OutputFormat, ReportConfig, ReportRecord};
use crate::validation::{validate_config, validate_record};

/// An exported document ready to hand to a client.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportArtifact {
    /// Title reduced to `[A-Za-z0-9]` plus the format extension.
    pub filename: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl ExportArtifact {
    /// `Content-Disposition` value for an attachment download.
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

/// Generation, streaming and export behind one handle.
#[derive(Clone)]
pub struct ReportService {
    pipeline: ReportPipeline,
    renderer: Arc<DocumentRenderer>,
    exporter: DocumentExporter,
}

impl ReportService {
    pub fn new(pipeline: ReportPipeline, exporter: DocumentExporter) -> Result<Self, RenderError> {
        Ok(Self {
            pipeline,
            renderer: Arc::new(DocumentRenderer::new()?),
            exporter,
        })
    }

    pub fn pipeline(&self) -> &ReportPipeline {
        &self.pipeline
    }

    /// Validate `raw_config` and run the whole pipeline.
    pub async fn generate(&self, raw_config: &Value) -> Result<ReportRecord, ReportError> {
        let config = validate_config(raw_config).map_err(ReportError::Validation)?;
        self.pipeline.generate(&config).await
    }

    /// Validate `raw_config` and start a streamed run.
    ///
    /// Invalid input fails here, before any stream exists.
    pub fn generate_stream(&self, raw_config: &Value) -> Result<ProgressStream, ReportError> {
        let config = validate_config(raw_config).map_err(ReportError::Validation)?;
        Ok(self.pipeline.stream(config))
    }

    /// Validate a record, its config and the requested format, then export.
    ///
    /// A blank `format` falls back to the config's `outputFormat`.
    pub async fn export(
        &self,
        raw_record: &Value,
        raw_config: &Value,
        format: &str,
    ) -> Result<ExportArtifact, ReportError> {
        let mut errors = Vec::new();
        let config = validate_config(raw_config)
            .map_err(|e| errors.extend(prefixed("config", e)))
            .ok();
        let record = validate_record(raw_record)
            .map_err(|e| errors.extend(prefixed("record", e)))
            .ok();
        let format = match format.trim() {
            "" => config.as_ref().map(|c| c.output_format),
            requested => parse_format(requested).map_err(|e| errors.push(e)).ok(),
        };

        match (record, config, format) {
            (Some(record), Some(config), Some(format)) if errors.is_empty() => {
                self.export_record(&record, &config, format).await
            }
            _ => Err(ReportError::Validation(errors)),
        }
    }

    /// Export an already validated record. Only `pdf` launches the exporter.
    pub async fn export_record(
        &self,
        record: &ReportRecord,
        config: &ReportConfig,
        format: OutputFormat,
    ) -> Result<ExportArtifact, ReportError> {
        self.export_record_at(record, config, format, Utc::now())
            .await
    }

    /// [`Self::export_record`] with an explicit generation timestamp.
    #[instrument(skip_all, fields(format = format.as_str()))]
    pub async fn export_record_at(
        &self,
        record: &ReportRecord,
        config: &ReportConfig,
        format: OutputFormat,
        generated_at: DateTime<Utc>,
    ) -> Result<ExportArtifact, ReportError> {
        let body = match format {
            OutputFormat::Markdown => render_markdown(record, config, generated_at).into_bytes(),
            OutputFormat::Html => self.renderer.render(record, config, generated_at)?.html.into_bytes(),
            OutputFormat::Pdf => {
                let markup = self.renderer.render(record, config, generated_at)?;
                self.exporter.export_document(&markup).await?
            }
        };

        let artifact = ExportArtifact {
            filename: format!("{}.{}", config.file_stem(), format.extension()),
            content_type: format.content_type().to_string(),
            body,
        };
        info!(filename = %artifact.filename, bytes = artifact.body.len(), "Report exported");
        Ok(artifact)
    }
}

pub(crate) fn parse_format(requested: &str) -> Result<OutputFormat, FieldError> {
    OutputFormat::parse(&requested.to_lowercase()).ok_or_else(|| {
        FieldError::new(
            "format",
            format!(
                "unsupported format '{}', expected one of: pdf, html, markdown",
                requested
            ),
        )
    })
}

fn prefixed(prefix: &str, errors: Vec<FieldError>) -> Vec<FieldError> {
    errors
        .into_iter()
        .map(|e| {
            let path = if e.path == "$" {
                prefix.to_string()
            } else {
                format!("{}.{}", prefix, e.path)
            };
            FieldError::new(path, e.reason)
        })
        .collect()
}
