//! Scripted LLM provider shared by the pipeline unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::LlmError;
use crate::llm::{
    Choice, CompletionChunk, CompletionStream, GenerationRequest, GenerationResponse,
    LlmProvider, Message, Usage,
};
use crate::report::{AnalysisType, OutputFormat, ReportConfig};

pub(crate) enum Step {
    Reply(String, Vec<String>),
    /// Text delivered in pieces; citations arrive with the last piece.
    Chunks(Vec<String>, Vec<String>),
    Fail(LlmError),
    Hang,
}

pub(crate) struct MockLlmProvider {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockLlmProvider {
    pub(crate) fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().expect("lock not poisoned").len()
    }

    pub(crate) fn request(&self, index: usize) -> GenerationRequest {
        self.requests.lock().expect("lock not poisoned")[index].clone()
    }
}

impl MockLlmProvider {
    fn next_step(&self, request: GenerationRequest) -> Step {
        self.requests
            .lock()
            .expect("lock not poisoned")
            .push(request);
        self.steps
            .lock()
            .expect("lock not poisoned")
            .pop_front()
            .unwrap_or(Step::Fail(LlmError::RequestFailed("script exhausted".into())))
    }
}

fn response(content: String, citations: Vec<String>) -> GenerationResponse {
    GenerationResponse {
        id: "mock-id".to_string(),
        model: "mock-model".to_string(),
        choices: vec![Choice {
            index: 0,
            message: Message::assistant(content),
            finish_reason: Some("stop".to_string()),
        }],
        usage: Usage {
            prompt_tokens: 100,
            completion_tokens: 200,
            total_tokens: 300,
        },
        citations,
    }
}

async fn hang<T>() -> Result<T, LlmError> {
    tokio::time::sleep(Duration::from_secs(3600)).await;
    Err(LlmError::EmptyResponse)
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        match self.next_step(request) {
            Step::Reply(content, citations) => Ok(response(content, citations)),
            Step::Chunks(pieces, citations) => Ok(response(pieces.concat(), citations)),
            Step::Fail(e) => Err(e),
            Step::Hang => hang().await,
        }
    }

    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<CompletionStream, LlmError> {
        let chunks: Vec<CompletionChunk> = match self.next_step(request) {
            Step::Reply(content, citations) => vec![CompletionChunk { content, citations }],
            Step::Chunks(pieces, citations) => {
                let last = pieces.len().saturating_sub(1);
                pieces
                    .into_iter()
                    .enumerate()
                    .map(|(i, content)| CompletionChunk {
                        content,
                        citations: if i == last { citations.clone() } else { Vec::new() },
                    })
                    .collect()
            }
            Step::Fail(e) => return Err(e),
            Step::Hang => return hang().await,
        };
        Ok(Box::pin(futures::stream::iter(chunks.into_iter().map(Ok))))
    }
}

pub(crate) fn reply(content: impl Into<String>) -> Step {
    Step::Reply(content.into(), Vec::new())
}

pub(crate) fn config() -> ReportConfig {
    ReportConfig {
        title: "Oat Milk Report".to_string(),
        subtitle: None,
        topic: "oat milk".to_string(),
        analysis_type: AnalysisType::MarketAnalysis,
        timeframe: "2025".to_string(),
        region: None,
        include_charts: true,
        include_sources: true,
        output_format: OutputFormat::Pdf,
    }
}

pub(crate) fn record_json() -> Value {
    json!({
        "executiveSummary": "Oat milk is the fastest growing plant milk.",
        "keyFindings": ["Retail sales up 12% year over year"],
        "marketSize": { "current": 2.5, "projected": 4.1, "unit": "USD billion", "growthRate": 9.8 },
        "charts": [
            {
                "type": "bar",
                "title": "Revenue",
                "labels": ["2023", "2024", "2025"],
                "datasets": [{ "label": "Revenue", "data": [1.9, 2.2, 2.5] }]
            },
            {
                "type": "pie",
                "title": "Share",
                "labels": ["Oatly", "Others"],
                "datasets": [{ "label": "Share", "data": [45, 55] }]
            }
        ],
        "recommendations": ["Expand barista lines"]
    })
}
