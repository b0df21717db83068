//! LiteLLM-compatible client implementation for report-forge.
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (a LiteLLM
//! proxy, OpenRouter, ...). Besides plain chat completion it supports two
//! extensions used by the report pipeline: schema-constrained output through
//! `response_format`, and live web search through the `web` plugin, whose
//! `url_citation` annotations are surfaced as [`GenerationResponse::citations`].
//!
//! [`LlmProvider::generate_stream`] yields the answer incrementally as
//! [`CompletionChunk`]s read from the endpoint's `stream: true` event stream.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Default model used when neither the request nor the environment names one.
pub const DEFAULT_MODEL: &str = "anthropic/claude-sonnet-4";

/// HTTP-level timeout for a single completion call.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Structured-output constraint attached to a request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    /// Schema name reported to the provider.
    pub name: String,
    /// JSON Schema the output must follow.
    pub schema: Value,
    /// Ask the provider to enforce the schema strictly.
    pub strict: bool,
}

impl ResponseFormat {
    /// Strict JSON schema constraint.
    pub fn json_schema(name: impl Into<String>, schema: Value) -> Self {
        Self {
            name: name.into(),
            schema,
            strict: true,
        }
    }

    fn to_wire(&self) -> Value {
        serde_json::json!({
            "type": "json_schema",
            "json_schema": {
                "name": self.name,
                "strict": self.strict,
                "schema": self.schema,
            }
        })
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Model identifier to use for generation. Empty means the client default.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Schema constraint for structured output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
    /// Live web search with at most this many results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web_search: Option<u32>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            response_format: None,
            web_search: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Constrain the output to a JSON schema.
    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    /// Enable live web search.
    pub fn with_web_search(mut self, max_results: u32) -> Self {
        self.web_search = Some(max_results);
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResponse {
    /// Unique identifier for this response.
    pub id: String,
    /// Model that generated this response.
    pub model: String,
    /// Generated choices/completions.
    pub choices: Vec<Choice>,
    /// Token usage statistics.
    pub usage: Usage,
    /// Distinct URLs cited by web search, in first-seen order.
    #[serde(default)]
    pub citations: Vec<String>,
}

impl GenerationResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices
            .first()
            .map(|c| c.message.content.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// A single generated choice from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice in the response.
    pub index: u32,
    /// Generated message.
    pub message: Message,
    /// Reason the generation stopped (e.g., "stop", "length").
    pub finish_reason: Option<String>,
}

/// Token usage statistics for a generation request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,
    /// Number of tokens generated.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// A piece of an incrementally delivered answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionChunk {
    /// Text appended to the answer by this chunk.
    pub content: String,
    /// URLs cited by web search within this chunk.
    pub citations: Vec<String>,
}

/// Answer chunks in arrival order. Ends when the answer is complete.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<CompletionChunk, LlmError>> + Send>>;

/// Trait for LLM providers that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;

    /// Generate a response, delivering it chunk by chunk.
    ///
    /// Providers without incremental delivery answer with a single chunk.
    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<CompletionStream, LlmError> {
        let response = self.generate(request).await?;
        let chunk = CompletionChunk {
            content: response.first_content().unwrap_or_default().to_string(),
            citations: response.citations,
        };
        Ok(Box::pin(futures::stream::iter(vec![Ok(chunk)])))
    }
}

/// Client for LiteLLM-compatible APIs.
///
/// The inner `reqwest::Client` pools connections and is safe to share across
/// concurrent pipeline runs.
pub struct LiteLlmClient {
    /// Base URL for the API.
    api_base: String,
    /// Optional API key for authentication.
    api_key: Option<String>,
    /// Default model to use for requests.
    default_model: String,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl LiteLlmClient {
    /// Create a new LiteLLM client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL for the API (e.g., "http://localhost:4000")
    /// * `api_key` - Optional API key for authentication
    /// * `default_model` - Default model to use when none is specified
    pub fn new(
        api_base: String,
        api_key: Option<String>,
        default_model: String,
    ) -> Result<Self, LlmError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::ClientBuild(e.to_string()))?;
        Ok(Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            http_client,
        })
    }

    /// Create a new LiteLLM client from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `LITELLM_API_BASE`: Base URL for the API (required)
    /// - `LITELLM_API_KEY`: API key for authentication (optional)
    /// - `LITELLM_DEFAULT_MODEL`: Default model (defaults to [`DEFAULT_MODEL`])
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiBase` if `LITELLM_API_BASE` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("LITELLM_API_KEY").ok().filter(|k| !k.is_empty());
        let default_model =
            env::var("LITELLM_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(api_base, api_key, default_model)
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the default model.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_api_request(&self, request: GenerationRequest) -> ApiRequest {
        let model = if request.model.is_empty() {
            self.default_model.clone()
        } else {
            request.model
        };
        ApiRequest {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format: request.response_format.as_ref().map(ResponseFormat::to_wire),
            plugins: request
                .web_search
                .map(|max_results| vec![ApiPlugin::web(max_results)]),
            stream: false,
        }
    }

    /// POST `api_request` and turn a non-success status into an [`LlmError`].
    async fn send(&self, api_request: &ApiRequest) -> Result<reqwest::Response, LlmError> {
        let url = format!("{}/chat/completions", self.api_base);

        tracing::debug!(
            model = %api_request.model,
            web_search = api_request.plugins.is_some(),
            structured = api_request.response_format.is_some(),
            stream = api_request.stream,
            "Sending completion request"
        );

        let mut http_request = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("HTTP-Referer", "https://report-forge.local")
            .header("X-Title", "report-forge");

        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        let http_response = http_request
            .json(api_request)
            .send()
            .await
            .map_err(transport_error)?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();
            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
                .map(|r| r.error.message)
                .unwrap_or(error_text);

            if status_code == 429 {
                return Err(LlmError::RateLimited(message));
            }
            return Err(LlmError::ApiError {
                code: status_code,
                message,
            });
        }

        Ok(http_response)
    }
}

fn transport_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout {
            seconds: REQUEST_TIMEOUT_SECS,
        }
    } else {
        LlmError::RequestFailed(e.to_string())
    }
}

/// Internal request structure for the OpenAI-compatible API.
#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plugins: Option<Vec<ApiPlugin>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiPlugin {
    id: &'static str,
    max_results: u32,
}

impl ApiPlugin {
    fn web(max_results: u32) -> Self {
        Self {
            id: "web",
            max_results,
        }
    }
}

/// Internal response structure from the OpenAI-compatible API.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default = "assistant_role")]
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    annotations: Vec<ApiAnnotation>,
}

fn assistant_role() -> String {
    "assistant".to_string()
}

#[derive(Debug, Deserialize)]
struct ApiAnnotation {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url_citation: Option<ApiUrlCitation>,
}

#[derive(Debug, Deserialize)]
struct ApiUrlCitation {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// One `data:` payload of a streamed completion.
#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
    #[serde(default)]
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: ApiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    annotations: Vec<ApiAnnotation>,
}

/// Meaning of one line of a streamed completion.
#[derive(Debug, PartialEq)]
enum StreamLine {
    Chunk(CompletionChunk),
    Done,
    /// Blank lines, keep-alive comments and other fields.
    Ignored,
}

fn parse_stream_line(line: &str) -> Result<StreamLine, LlmError> {
    let Some(data) = line.trim().strip_prefix("data:") else {
        return Ok(StreamLine::Ignored);
    };
    let data = data.trim();
    if data == "[DONE]" {
        return Ok(StreamLine::Done);
    }
    if data.is_empty() {
        return Ok(StreamLine::Ignored);
    }

    let parsed: ApiStreamChunk = serde_json::from_str(data)
        .map_err(|e| LlmError::ParseError(format!("Failed to parse stream chunk: {}", e)))?;
    if let Some(error) = parsed.error {
        return Err(LlmError::RequestFailed(error.message));
    }

    let mut chunk = CompletionChunk::default();
    for choice in parsed.choices {
        if let Some(content) = choice.delta.content {
            chunk.content.push_str(&content);
        }
        collect_citations(&choice.delta.annotations, &mut chunk.citations);
    }
    Ok(StreamLine::Chunk(chunk))
}

/// Parse a streamed completion body into answer chunks.
///
/// Stops at `[DONE]` or when the body ends, whichever comes first.
fn completion_chunks<S, B, E>(
    body: S,
    transport: fn(E) -> LlmError,
) -> impl Stream<Item = Result<CompletionChunk, LlmError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Send,
{
    async_stream::try_stream! {
        tokio::pin!(body);
        let mut buffer: Vec<u8> = Vec::new();
        'read: while let Some(bytes) = body.next().await {
            let bytes = bytes.map_err(transport)?;
            buffer.extend_from_slice(bytes.as_ref());
            while let Some(line) = take_line(&mut buffer) {
                match parse_stream_line(&line)? {
                    StreamLine::Chunk(chunk) => {
                        yield chunk;
                    }
                    StreamLine::Done => break 'read,
                    StreamLine::Ignored => {}
                }
            }
        }
    }
}

/// Remove and return the next complete line from `buffer`, if any.
fn take_line(buffer: &mut Vec<u8>) -> Option<String> {
    let end = buffer.iter().position(|&b| b == b'\n')?;
    let line: Vec<u8> = buffer.drain(..=end).collect();
    Some(String::from_utf8_lossy(&line).into_owned())
}

fn collect_citations(annotations: &[ApiAnnotation], citations: &mut Vec<String>) {
    for annotation in annotations {
        if annotation.kind != "url_citation" {
            continue;
        }
        if let Some(citation) = &annotation.url_citation {
            if !citations.contains(&citation.url) {
                citations.push(citation.url.clone());
            }
        }
    }
}

impl ApiResponse {
    fn into_generation_response(self) -> GenerationResponse {
        let mut citations: Vec<String> = Vec::new();
        let choices = self
            .choices
            .into_iter()
            .map(|choice| {
                collect_citations(&choice.message.annotations, &mut citations);
                Choice {
                    index: choice.index,
                    message: Message {
                        role: choice.message.role,
                        content: choice.message.content.unwrap_or_default(),
                    },
                    finish_reason: choice.finish_reason,
                }
            })
            .collect();

        let usage = self
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        GenerationResponse {
            id: self.id,
            model: self.model,
            choices,
            usage,
            citations,
        }
    }
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let api_request = self.build_api_request(request);
        let http_response = self.send(&api_request).await?;

        let api_response: ApiResponse = http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

        Ok(api_response.into_generation_response())
    }

    async fn generate_stream(
        &self,
        request: GenerationRequest,
    ) -> Result<CompletionStream, LlmError> {
        let mut api_request = self.build_api_request(request);
        api_request.stream = true;
        let body = self.send(&api_request).await?.bytes_stream();
        let chunks = completion_chunks(body, transport_error);
        Ok(Box::pin(chunks))
    }
}
