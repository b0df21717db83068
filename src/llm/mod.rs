//! LLM integration for report-forge.
//!
//! The pipeline only ever talks to the [`LlmProvider`] trait; the default
//! implementation is [`LiteLlmClient`], an OpenAI-compatible HTTP client.
//!
//! ```ignore
//! use report_forge::llm::{GenerationRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = GenerationRequest::new("", vec![Message::user("Summarize the EV market")])
//!     .with_web_search(5)
//!     .with_max_tokens(4000);
//! let response = client.generate(request).await?;
//! println!("{} sources", response.citations.len());
//! ```

pub mod litellm;

pub use litellm::{
    Choice, CompletionChunk, CompletionStream, GenerationRequest, GenerationResponse,
    LiteLlmClient, LlmProvider, Message, ResponseFormat, Usage, DEFAULT_MODEL,
};
