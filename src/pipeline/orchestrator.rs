//! Pipeline orchestrator: research, extraction and enrichment in sequence.
//!
//! One [`ReportPipeline`] serves any number of concurrent runs; runs share
//! only the LLM provider (whose HTTP pool is safe for concurrent use) and an
//! immutable configuration.
//!
//! The same run logic backs both entry points. [`ReportPipeline::generate`]
//! runs silently and returns the record; [`ReportPipeline::stream`] spawns the
//! run as a producer task and hands back a [`ProgressStream`].

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

use super::config::PipelineConfig;
use super::enrichment::enrich;
use super::extraction::ExtractionStage;
use super::research::{
    research_progress, ResearchOutput, ResearchStage, ResearchUpdate, RESEARCH_START_PROGRESS,
};
use super::stream::ProgressStream;
use crate::error::{FieldError, LlmError, ReportError};
use crate::llm::LlmProvider;
use crate::report::{Phase, PipelineEvent, PipelineFailure, ProgressEvent, ReportConfig, ReportRecord};
use crate::validation::validate_record;

/// Progress sink for one run. Silent when there is no consumer.
struct Emitter {
    tx: Option<mpsc::Sender<PipelineEvent>>,
    phase: Phase,
}

impl Emitter {
    fn silent() -> Self {
        Self {
            tx: None,
            phase: Phase::Research,
        }
    }

    fn streaming(tx: mpsc::Sender<PipelineEvent>) -> Self {
        Self {
            tx: Some(tx),
            phase: Phase::Research,
        }
    }

    /// Record the phase and deliver the event. A gone consumer is cancellation.
    async fn emit(&mut self, event: ProgressEvent) -> Result<(), ReportError> {
        self.phase = event.phase;
        debug!(phase = event.phase.as_str(), progress = event.progress, "{}", event.message);
        match &self.tx {
            Some(tx) => tx
                .send(PipelineEvent::Progress(event))
                .await
                .map_err(|_| ReportError::Cancelled),
            None => Ok(()),
        }
    }

    /// Run `fut`, abandoning it as soon as the consumer goes away.
    ///
    /// Dropping the future drops any in-flight HTTP request with it.
    async fn guard<T, F>(&self, fut: F) -> Result<T, ReportError>
    where
        F: Future<Output = Result<T, ReportError>>,
    {
        match &self.tx {
            None => fut.await,
            Some(tx) => {
                tokio::select! {
                    biased;
                    _ = tx.closed() => Err(ReportError::Cancelled),
                    result = fut => result,
                }
            }
        }
    }

    /// Send the terminal event for a finished run.
    async fn finish(self, outcome: &Result<ReportRecord, ReportError>) {
        let Some(tx) = self.tx else {
            return;
        };
        let event = match outcome {
            Ok(record) => PipelineEvent::Progress(
                ProgressEvent::new(Phase::Generation, 100, "Report complete!")
                    .with_report(record.clone()),
            ),
            Err(ReportError::Cancelled) => return,
            Err(e) => PipelineEvent::Failed(PipelineFailure::from_error(self.phase, e)),
        };
        if tx.send(event).await.is_err() {
            debug!("Consumer left before the terminal event");
        }
    }
}

/// The report generation pipeline.
#[derive(Clone)]
pub struct ReportPipeline {
    llm: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl ReportPipeline {
    pub fn new(llm: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the whole pipeline and return the validated, enriched record.
    pub async fn generate(&self, report: &ReportConfig) -> Result<ReportRecord, ReportError> {
        let span = run_span(report);
        async {
            let mut emitter = Emitter::silent();
            self.run(report, &mut emitter).await
        }
        .instrument(span)
        .await
    }

    /// Run the pipeline as a background task, reporting progress.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream(&self, report: ReportConfig) -> ProgressStream {
        let (tx, rx) = mpsc::channel(self.config.stream_buffer);
        let pipeline = self.clone();
        let span = run_span(&report);

        tokio::spawn(
            async move {
                let mut emitter = Emitter::streaming(tx);
                let outcome = pipeline.run(&report, &mut emitter).await;
                if let Err(ReportError::Cancelled) = outcome {
                    info!("Run cancelled by consumer");
                }
                emitter.finish(&outcome).await;
            }
            .instrument(span),
        );

        ProgressStream::new(rx)
    }

    async fn run(
        &self,
        report: &ReportConfig,
        emitter: &mut Emitter,
    ) -> Result<ReportRecord, ReportError> {
        let started = Instant::now();
        let research_stage = ResearchStage::new(self.llm.clone(), self.config.clone());
        let extraction_stage = ExtractionStage::new(self.llm.clone(), self.config.clone());

        emitter
            .emit(ProgressEvent::new(
                Phase::Research,
                RESEARCH_START_PROGRESS,
                "Starting market research...",
            ))
            .await?;
        let research = self.research(&research_stage, report, emitter).await?;
        if !research.sources.is_empty() {
            let found = research.sources.len();
            emitter
                .emit(
                    ProgressEvent::new(Phase::Research, 35, format!("Found {} sources", found))
                        .with_sources_found(found),
                )
                .await?;
        }

        emitter
            .emit(ProgressEvent::new(Phase::Analysis, 40, "Analyzing research data..."))
            .await?;
        let mut record = emitter
            .guard(extraction_stage.run(&research.text, report))
            .await?;

        emitter
            .emit(ProgressEvent::new(Phase::Charts, 60, "Generating visualizations..."))
            .await?;
        record.charts = enrich(std::mem::take(&mut record.charts));
        let record = revalidate(&record)?;
        emitter
            .emit(
                ProgressEvent::new(Phase::Charts, 80, "Charts generated")
                    .with_charts_generated(record.charts.len()),
            )
            .await?;

        emitter
            .emit(ProgressEvent::new(Phase::Generation, 90, "Finalizing report..."))
            .await?;

        info!(
            charts = record.charts.len(),
            sources = research.sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Report generated"
        );
        Ok(record)
    }
}

impl ReportPipeline {
    /// Drive the research call, reporting progress as its text arrives.
    ///
    /// Progress only moves forward and stays below the sources event.
    async fn research(
        &self,
        stage: &ResearchStage,
        report: &ReportConfig,
        emitter: &mut Emitter,
    ) -> Result<ResearchOutput, ReportError> {
        let updates = stage.updates(report);
        tokio::pin!(updates);
        let mut reported = RESEARCH_START_PROGRESS;

        loop {
            let update = emitter
                .guard(async { updates.next().await.transpose() })
                .await?;
            match update {
                Some(ResearchUpdate::Received { chars }) => {
                    let percent = research_progress(chars);
                    if percent > reported {
                        reported = percent;
                        emitter
                            .emit(ProgressEvent::new(
                                Phase::Research,
                                percent,
                                "Gathering research data...",
                            ))
                            .await?;
                    }
                }
                Some(ResearchUpdate::Finished(output)) => return Ok(output),
                None => {
                    return Err(ReportError::ResearchUnavailable(
                        LlmError::EmptyResponse.to_string(),
                    ))
                }
            }
        }
    }
}

fn run_span(report: &ReportConfig) -> tracing::Span {
    tracing::info_span!(
        "report_run",
        run_id = %Uuid::new_v4(),
        topic = %report.topic,
        analysis_type = report.analysis_type.as_str(),
    )
}

/// The enriched record must still round-trip through the validator.
fn revalidate(record: &ReportRecord) -> Result<ReportRecord, ReportError> {
    let value = serde_json::to_value(record).map_err(|e| {
        ReportError::ExtractionSchemaViolation(vec![FieldError::new("$", e.to_string())])
    })?;
    validate_record(&value).map_err(|errors| {
        error!(violations = errors.len(), "Enriched record failed validation");
        ReportError::ExtractionSchemaViolation(errors)
    })
}
