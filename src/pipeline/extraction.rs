//! Extraction stage: coerce research text into a validated [`ReportRecord`].
//!
//! The model is asked for schema-constrained JSON but its answer is never
//! trusted: it is recovered from the raw reply, then run through the schema
//! validator. A rejected answer gets at most one stricter re-prompt, sent in
//! the same conversation so the model can see what it produced.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use super::config::PipelineConfig;
use super::prompts::{
    analysis_prompt, record_json_schema, strict_retry_prompt, EXTRACTION_SYSTEM_PROMPT,
};
use crate::error::{FieldError, LlmError, ReportError};
use crate::llm::{GenerationRequest, LlmProvider, Message, ResponseFormat};
use crate::report::{ReportConfig, ReportRecord};
use crate::utils::extract_json_object;
use crate::validation::validate_record;

/// Issues the extraction call(s).
pub struct ExtractionStage {
    llm: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl ExtractionStage {
    pub fn new(llm: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    fn request(&self, messages: Vec<Message>) -> GenerationRequest {
        GenerationRequest::new(self.config.model_name(), messages)
            .with_temperature(self.config.temperature)
            .with_max_tokens(self.config.extraction_max_tokens)
            .with_response_format(ResponseFormat::json_schema(
                "report_record",
                record_json_schema(),
            ))
    }

    async fn call(&self, messages: Vec<Message>) -> Result<String, ReportError> {
        let timeout = self.config.extraction_timeout;
        let response = match tokio::time::timeout(timeout, self.llm.generate(self.request(messages)))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(ReportError::ExtractionUnavailable(e.to_string())),
            Err(_) => {
                return Err(ReportError::ExtractionUnavailable(
                    LlmError::Timeout {
                        seconds: timeout.as_secs(),
                    }
                    .to_string(),
                ))
            }
        };
        Ok(response
            .first_content()
            .map(str::to_string)
            .unwrap_or_default())
    }

    /// Convert `research` into a validated record.
    ///
    /// # Errors
    ///
    /// - [`ReportError::ExtractionUnavailable`] when a call fails or times out
    ///   (never retried)
    /// - [`ReportError::ExtractionSchemaViolation`] when the last permitted
    ///   attempt still does not validate
    pub async fn run(
        &self,
        research: &str,
        report: &ReportConfig,
    ) -> Result<ReportRecord, ReportError> {
        let started = Instant::now();
        let mut messages = vec![
            Message::system(EXTRACTION_SYSTEM_PROMPT),
            Message::user(analysis_prompt(research, report)),
        ];
        let attempts = 1 + self.config.extraction_retries;

        for attempt in 1..=attempts {
            let raw = self.call(messages.clone()).await?;
            match parse_record(&raw) {
                Ok(mut record) => {
                    if !report.include_charts {
                        record.charts.clear();
                    }
                    info!(
                        stage = "extraction",
                        attempt,
                        charts = record.charts.len(),
                        findings = record.key_findings.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Extraction produced a valid record"
                    );
                    return Ok(record);
                }
                Err(violations) if attempt < attempts => {
                    warn!(
                        stage = "extraction",
                        attempt,
                        violations = violations.len(),
                        "Extracted record rejected, re-prompting"
                    );
                    messages.push(Message::assistant(raw));
                    messages.push(Message::user(strict_retry_prompt(&violations)));
                }
                Err(violations) => {
                    warn!(
                        stage = "extraction",
                        attempt,
                        violations = violations.len(),
                        "Extracted record rejected, giving up"
                    );
                    return Err(ReportError::ExtractionSchemaViolation(violations));
                }
            }
        }

        // attempts >= 1, so the loop always returns
        Err(ReportError::ExtractionSchemaViolation(vec![FieldError::new(
            "$",
            "no extraction attempt was made",
        )]))
    }
}

/// Recover, parse and validate one raw extraction reply.
pub fn parse_record(raw: &str) -> Result<ReportRecord, Vec<FieldError>> {
    let json = extract_json_object(raw).map_err(|e| vec![FieldError::new("$", e.to_string())])?;
    let value: serde_json::Value = serde_json::from_str(&json)
        .map_err(|e| vec![FieldError::new("$", format!("invalid JSON: {}", e))])?;
    validate_record(&value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::{config, record_json, reply, MockLlmProvider, Step};
    use std::time::Duration;

    fn stage(mock: Arc<MockLlmProvider>, pipeline: PipelineConfig) -> ExtractionStage {
        ExtractionStage::new(mock, pipeline)
    }

    fn without_recommendations() -> String {
        let mut raw = record_json();
        raw.as_object_mut()
            .expect("object")
            .remove("recommendations");
        raw.to_string()
    }

    #[tokio::test]
    async fn test_valid_first_answer() {
        let mock = Arc::new(MockLlmProvider::new(vec![reply(format!(
            "```json\n{}\n```",
            record_json()
        ))]));
        let record = stage(mock.clone(), PipelineConfig::default())
            .run("research", &config())
            .await
            .expect("valid record");

        assert_eq!(record.charts.len(), 2);
        assert_eq!(mock.calls(), 1);
        let request = mock.request(0);
        assert_eq!(request.max_tokens, Some(3000));
        assert!(request.response_format.is_some());
        assert!(request.web_search.is_none());
    }

    #[tokio::test]
    async fn test_one_retry_with_stricter_prompt() {
        let mock = Arc::new(MockLlmProvider::new(vec![
            reply(without_recommendations()),
            reply(record_json().to_string()),
        ]));
        let record = stage(mock.clone(), PipelineConfig::default())
            .run("research", &config())
            .await
            .expect("second attempt validates");

        assert_eq!(record.recommendations, vec!["Expand barista lines".to_string()]);
        assert_eq!(mock.calls(), 2);
        let retry = mock.request(1);
        assert_eq!(retry.messages.len(), 4);
        assert_eq!(retry.messages[2].role, "assistant");
        assert!(retry.messages[3].content.contains("recommendations: is required"));
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let mock = Arc::new(MockLlmProvider::new(vec![
            reply(without_recommendations()),
            reply(without_recommendations()),
            reply(record_json().to_string()),
        ]));
        let err = stage(mock.clone(), PipelineConfig::default())
            .run("research", &config())
            .await
            .unwrap_err();

        assert_eq!(mock.calls(), 2);
        assert_eq!(err.field_errors()[0].path, "recommendations");
        assert!(matches!(err, ReportError::ExtractionSchemaViolation(_)));
    }

    #[tokio::test]
    async fn test_zero_retries() {
        let mock = Arc::new(MockLlmProvider::new(vec![reply("no json here")]));
        let err = stage(mock.clone(), PipelineConfig::default().with_extraction_retries(0))
            .run("research", &config())
            .await
            .unwrap_err();
        assert_eq!(mock.calls(), 1);
        assert_eq!(err.field_errors()[0].path, "$");
    }

    #[tokio::test]
    async fn test_transport_failure_is_unavailable_and_not_retried() {
        let mock = Arc::new(MockLlmProvider::new(vec![
            Step::Fail(LlmError::ApiError {
                code: 502,
                message: "bad gateway".into(),
            }),
            reply(record_json().to_string()),
        ]));
        let err = stage(mock.clone(), PipelineConfig::default())
            .run("research", &config())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::ExtractionUnavailable(_)));
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let mock = Arc::new(MockLlmProvider::new(vec![Step::Hang]));
        let pipeline =
            PipelineConfig::default().with_extraction_timeout(Duration::from_millis(50));
        let err = stage(mock, pipeline)
            .run("research", &config())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::ExtractionUnavailable(_)));
    }

    #[tokio::test]
    async fn test_charts_dropped_when_disabled() {
        let mock = Arc::new(MockLlmProvider::new(vec![reply(record_json().to_string())]));
        let mut report = config();
        report.include_charts = false;
        let record = stage(mock.clone(), PipelineConfig::default())
            .run("research", &report)
            .await
            .expect("valid");
        assert!(record.charts.is_empty());
        assert!(mock.request(0).messages[1].content.contains("No charts"));
    }

    #[test]
    fn test_parse_record_reports_truncation_at_root() {
        let errors = parse_record("{\"executiveSummary\": \"cut").unwrap_err();
        assert_eq!(errors[0].path, "$");
        assert!(errors[0].reason.contains("truncated"));
    }
}
