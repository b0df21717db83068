//! Research stage: one long-form, optionally search-augmented generation call.
//!
//! The answer is read incrementally so a streamed run can report progress
//! while the research text arrives.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{Stream, StreamExt};
use tracing::{info, warn};

use super::config::PipelineConfig;
use super::prompts::{research_prompt, RESEARCH_SYSTEM_PROMPT};
use crate::error::{LlmError, ReportError};
use crate::llm::{GenerationRequest, LlmProvider, Message};
use crate::report::ReportConfig;

/// Progress reported when research starts.
pub const RESEARCH_START_PROGRESS: u8 = 10;
/// Ceiling for progress reported while research text arrives.
pub const RESEARCH_PROGRESS_CAP: u8 = 30;

/// Unstructured research text plus the sources the search step cited.
#[derive(Debug, Clone, PartialEq)]
pub struct ResearchOutput {
    pub text: String,
    /// Distinct cited URLs, in first-seen order.
    pub sources: Vec<String>,
}

/// One step of a research call in flight.
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchUpdate {
    /// More text arrived; `chars` is the total received so far.
    Received { chars: usize },
    /// The answer is complete.
    Finished(ResearchOutput),
}

/// Progress for `chars` of received research text: one point per hundred
/// characters on top of the starting value, capped below the sources event.
pub fn research_progress(chars: usize) -> u8 {
    (usize::from(RESEARCH_START_PROGRESS) + chars / 100).min(usize::from(RESEARCH_PROGRESS_CAP))
        as u8
}

/// Issues the research call. Never retries; retry policy belongs to the caller.
pub struct ResearchStage {
    llm: Arc<dyn LlmProvider>,
    config: PipelineConfig,
}

impl ResearchStage {
    pub fn new(llm: Arc<dyn LlmProvider>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Build the request for `report`. Exposed for inspection in tests.
    pub fn request(&self, report: &ReportConfig) -> GenerationRequest {
        let mut request = GenerationRequest::new(
            self.config.model_name(),
            vec![
                Message::system(RESEARCH_SYSTEM_PROMPT),
                Message::user(research_prompt(report)),
            ],
        )
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.research_max_tokens);
        if self.config.web_search {
            request = request.with_web_search(self.config.web_search_max_results);
        }
        request
    }

    /// Run the research call under the configured timeout.
    ///
    /// Transport failures, timeouts and empty answers all surface as
    /// [`ReportError::ResearchUnavailable`].
    pub async fn run(&self, report: &ReportConfig) -> Result<ResearchOutput, ReportError> {
        let updates = self.updates(report);
        tokio::pin!(updates);
        while let Some(update) = updates.next().await {
            if let ResearchUpdate::Finished(output) = update? {
                return Ok(output);
            }
        }
        Err(ReportError::ResearchUnavailable(LlmError::EmptyResponse.to_string()))
    }

    /// The research call as a stream of [`ResearchUpdate`]s ending in
    /// `Finished`, or in an error. The timeout covers the whole call.
    pub fn updates<'a>(
        &'a self,
        report: &'a ReportConfig,
    ) -> impl Stream<Item = Result<ResearchUpdate, ReportError>> + Send + 'a {
        async_stream::try_stream! {
            let started = Instant::now();
            let timeout = self.config.research_timeout;
            let deadline = tokio::time::Instant::now() + timeout;

            let mut chunks = within(deadline, timeout, self.llm.generate_stream(self.request(report)))
                .await?
                .map_err(unavailable)?;

            let mut text = String::new();
            let mut sources: Vec<String> = Vec::new();
            while let Some(chunk) = within(deadline, timeout, chunks.next()).await? {
                let chunk = chunk.map_err(unavailable)?;
                for url in chunk.citations {
                    if !sources.contains(&url) {
                        sources.push(url);
                    }
                }
                if !chunk.content.is_empty() {
                    text.push_str(&chunk.content);
                    yield ResearchUpdate::Received { chars: text.chars().count() };
                }
            }

            if text.trim().is_empty() {
                Err::<(), _>(ReportError::ResearchUnavailable(
                    LlmError::EmptyResponse.to_string(),
                ))?;
            }

            info!(
                stage = "research",
                chars = text.len(),
                sources = sources.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Research completed"
            );
            yield ResearchUpdate::Finished(ResearchOutput { text, sources });
        }
    }
}

/// Await `fut` unless `deadline` passes first.
async fn within<F: Future>(
    deadline: tokio::time::Instant,
    timeout: Duration,
    fut: F,
) -> Result<F::Output, ReportError> {
    tokio::time::timeout_at(deadline, fut).await.map_err(|_| {
        let e = LlmError::Timeout {
            seconds: timeout.as_secs(),
        };
        warn!(stage = "research", error = %e, "Research call timed out");
        ReportError::ResearchUnavailable(e.to_string())
    })
}

fn unavailable(e: LlmError) -> ReportError {
    warn!(stage = "research", error = %e, "Research call failed");
    ReportError::ResearchUnavailable(e.to_string())
}
