//! End-to-end tests through the public API with a scripted LLM and a fake
//! rendering engine. No network or browser is needed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::StreamExt;
use serde_json::{json, Value};

use report_forge::error::{ExportError, LlmError, ReportError};
use report_forge::export::{
    DocumentExporter, EngineSession, ExportConfig, PageSetup, RenderEngine,
};
use report_forge::llm::{Choice, GenerationRequest, GenerationResponse, LlmProvider, Message, Usage};
use report_forge::pipeline::{PipelineConfig, ReportPipeline};
use report_forge::render::{render_html, MarkupDocument};
use report_forge::report::{OutputFormat, Phase, PipelineEvent};
use report_forge::service::{encode_stream, ReportService};
use report_forge::validation::{validate_config, validate_record};

// ============================================================================
// Fixtures
// ============================================================================

enum Step {
    Reply(String),
    Fail(LlmError),
    Hang,
}

struct ScriptedLlm {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    async fn generate(&self, _request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self
            .steps
            .lock()
            .expect("lock not poisoned")
            .pop_front()
            .unwrap_or(Step::Fail(LlmError::EmptyResponse));
        match step {
            Step::Reply(content) => Ok(GenerationResponse {
                id: "scripted".to_string(),
                model: "scripted".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: Some("stop".to_string()),
                }],
                usage: Usage::default(),
                citations: vec!["https://example.com/report".to_string()],
            }),
            Step::Fail(e) => Err(e),
            Step::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(LlmError::EmptyResponse)
            }
        }
    }
}

#[derive(Default)]
struct RecordingEngine {
    launches: AtomicUsize,
    shutdowns: Arc<AtomicUsize>,
}

struct RecordingSession {
    shutdowns: Arc<AtomicUsize>,
    html: String,
}

#[async_trait]
impl RenderEngine for RecordingEngine {
    fn name(&self) -> &str {
        "recording"
    }

    async fn launch(&self) -> Result<Box<dyn EngineSession>, ExportError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingSession {
            shutdowns: self.shutdowns.clone(),
            html: String::new(),
        }))
    }
}

#[async_trait]
impl EngineSession for RecordingSession {
    async fn load(&mut self, markup: &MarkupDocument) -> Result<(), ExportError> {
        self.html = markup.html.clone();
        Ok(())
    }

    async fn paginate(&mut self, _setup: &PageSetup, _title: &str) -> Result<Vec<u8>, ExportError> {
        Ok(format!("%PDF-1.7\n{}", self.html.len()).into_bytes())
    }

    async fn shutdown(self: Box<Self>) {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
    }
}

fn brief() -> Value {
    json!({
        "title": "Oat Milk Report",
        "topic": "oat milk",
        "analysisType": "market-analysis",
        "timeframe": "2025"
    })
}

fn record() -> Value {
    json!({
        "executiveSummary": "Oat milk keeps taking share from dairy.",
        "keyFindings": ["Retail sales grew 12%", "Foodservice drives trial"],
        "marketSize": { "current": 2.5, "projected": 4.1, "unit": "USD billion", "growthRate": 9.8 },
        "charts": [{
            "type": "line",
            "title": "Retail sales",
            "labels": ["2023", "2024", "2025"],
            "datasets": [{ "label": "Sales", "data": [1.9, 2.2, 2.5] }]
        }],
        "recommendations": ["Invest in barista editions"],
        "riskFactors": ["Oat price volatility"]
    })
}

fn service(llm: Arc<ScriptedLlm>, config: PipelineConfig) -> (ReportService, Arc<RecordingEngine>) {
    let engine = Arc::new(RecordingEngine::default());
    let pipeline = ReportPipeline::new(llm, config);
    let exporter = DocumentExporter::new(engine.clone(), ExportConfig::default());
    let service = ReportService::new(pipeline, exporter).expect("service builds");
    (service, engine)
}

// ============================================================================
// Generation and export
// ============================================================================

#[test]
fn test_brief_validation_defaults_and_missing_title() {
    let config = validate_config(&brief()).expect("brief is valid");
    assert_eq!(config.title, "Oat Milk Report");
    assert!(config.include_charts);
    assert_eq!(config.output_format, OutputFormat::Pdf);

    let mut missing_title = brief();
    missing_title
        .as_object_mut()
        .expect("object")
        .remove("title");
    let errors = validate_config(&missing_title).unwrap_err();
    assert!(errors.iter().any(|e| e.path == "title"));
}

#[tokio::test]
async fn test_research_timeout_skips_extraction() {
    let llm = ScriptedLlm::new(vec![Step::Hang, Step::Reply(record().to_string())]);
    let config = PipelineConfig::default().with_research_timeout(Duration::from_millis(50));
    let (service, _) = service(llm.clone(), config);

    let err = service.generate(&brief()).await.unwrap_err();
    assert!(matches!(err, ReportError::ResearchUnavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_schema_violation_is_retried_once() {
    let mut incomplete = record();
    incomplete
        .as_object_mut()
        .expect("object")
        .remove("recommendations");
    let llm = ScriptedLlm::new(vec![
        Step::Reply("Research notes".to_string()),
        Step::Reply(incomplete.to_string()),
        Step::Reply(record().to_string()),
    ]);
    let (service, _) = service(llm.clone(), PipelineConfig::default());

    let record = service.generate(&brief()).await.expect("second attempt succeeds");
    assert_eq!(record.recommendations, vec!["Invest in barista editions"]);
    assert_eq!(llm.calls(), 3);

    let revalidated = validate_record(&serde_json::to_value(&record).expect("serialize"));
    assert!(revalidated.is_ok());
}

#[tokio::test]
async fn test_second_schema_violation_surfaces() {
    let mut incomplete = record();
    incomplete
        .as_object_mut()
        .expect("object")
        .remove("recommendations");
    let llm = ScriptedLlm::new(vec![
        Step::Reply("Research notes".to_string()),
        Step::Reply(incomplete.to_string()),
        Step::Reply(incomplete.to_string()),
        Step::Reply(record().to_string()),
    ]);
    let (service, _) = service(llm.clone(), PipelineConfig::default());

    let err = service.generate(&brief()).await.unwrap_err();
    assert_eq!(err.code(), "extraction_schema_violation");
    assert!(err.field_errors().iter().any(|e| e.path == "recommendations"));
    assert_eq!(llm.calls(), 3);
}

#[test]
fn test_no_charts_omits_visualization_section() {
    let config = validate_config(&brief()).expect("valid");
    let mut raw = record();
    raw["charts"] = json!([]);
    let record = validate_record(&raw).expect("valid record");

    let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).single().expect("timestamp");
    let html = render_html(&record, &config, at).expect("renders").html;
    assert!(!html.contains("Data Visualizations"));
    assert!(!html.contains("<canvas"));
    assert!(!html.contains("chart.js"));
}

#[tokio::test]
async fn test_html_export_bypasses_exporter() {
    let (service, engine) = service(ScriptedLlm::new(vec![]), PipelineConfig::default());
    let config = validate_config(&brief()).expect("valid");
    let record = validate_record(&record()).expect("valid");
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).single().expect("timestamp");

    let artifact = service
        .export_record_at(&record, &config, OutputFormat::Html, at)
        .await
        .expect("exports");
    let expected = render_html(&record, &config, at).expect("renders").html;

    assert_eq!(artifact.body, expected.into_bytes());
    assert_eq!(artifact.filename, "OatMilkReport.html");
    assert_eq!(engine.launches.load(Ordering::SeqCst), 0);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn test_pdf_export_releases_engine() {
    let (service, engine) = service(ScriptedLlm::new(vec![]), PipelineConfig::default());
    let artifact = service
        .export(&record(), &brief(), "pdf")
        .await
        .expect("exports");
    assert!(artifact.body.starts_with(b"%PDF"));
    assert_eq!(engine.launches.load(Ordering::SeqCst), 1);
    assert_eq!(engine.shutdowns.load(Ordering::SeqCst), 1);
}

#[test]
fn test_render_is_deterministic_for_fixed_timestamp() {
    let config = validate_config(&brief()).expect("valid");
    let record = validate_record(&record()).expect("valid");
    let at = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).single().expect("timestamp");

    let first = render_html(&record, &config, at).expect("renders");
    let second = render_html(&record, &config, at).expect("renders");
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_stream_is_monotonic_with_one_terminal_event() {
    let llm = ScriptedLlm::new(vec![
        Step::Reply("Research notes".to_string()),
        Step::Reply(record().to_string()),
    ]);
    let (service, _) = service(llm, PipelineConfig::default());
    let events: Vec<PipelineEvent> = service
        .generate_stream(&brief())
        .expect("valid brief")
        .collect()
        .await;

    let mut last_phase = Phase::Research;
    let mut last_progress = 0;
    for event in &events {
        if let PipelineEvent::Progress(p) = event {
            assert!(p.phase >= last_phase, "phase went backwards: {:?}", p.phase);
            assert!(p.progress >= last_progress, "progress went backwards");
            last_phase = p.phase;
            last_progress = p.progress;
        }
    }
    assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    assert!(events.last().map(|e| e.is_terminal()).unwrap_or(false));
    assert_eq!(last_progress, 100);
}

#[tokio::test]
async fn test_late_failure_is_an_error_frame() {
    let llm = ScriptedLlm::new(vec![
        Step::Reply("Research notes".to_string()),
        Step::Fail(LlmError::RateLimited("slow down".to_string())),
    ]);
    let (service, _) = service(llm, PipelineConfig::default());
    let stream = service.generate_stream(&brief()).expect("valid brief");
    let frames: Vec<String> = encode_stream(stream).collect().await;

    assert!(frames[0].starts_with("event: progress\n"));
    let last = frames.last().expect("frames");
    assert!(last.starts_with("event: error\n"));
    assert!(last.contains("extraction_unavailable"));
    assert!(frames.iter().all(|f| f.ends_with("\n\n")));
}

#[tokio::test]
async fn test_dropping_stream_stops_the_run() {
    let llm = ScriptedLlm::new(vec![Step::Hang, Step::Reply(record().to_string())]);
    let (service, _) = service(llm.clone(), PipelineConfig::default());

    let mut stream = service.generate_stream(&brief()).expect("valid brief");
    let first = stream.next().await.expect("first event");
    assert!(!first.is_terminal());
    drop(stream);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(llm.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let ok = ScriptedLlm::new(vec![
        Step::Reply("Research notes".to_string()),
        Step::Reply(record().to_string()),
    ]);
    let failing = ScriptedLlm::new(vec![Step::Fail(LlmError::Timeout { seconds: 120 })]);
    let (ok_service, _) = service(ok.clone(), PipelineConfig::default());
    let (failing_service, _) = service(failing.clone(), PipelineConfig::default());

    let brief = brief();
    let (a, b) = tokio::join!(ok_service.generate(&brief), failing_service.generate(&brief));
    assert!(a.is_ok());
    assert!(matches!(b, Err(ReportError::ResearchUnavailable(_))));
    assert_eq!(ok.calls(), 2);
    assert_eq!(failing.calls(), 1);
}
