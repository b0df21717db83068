//! Report generation pipeline.
//!
//! # Architecture
//!
//! - **Research**: one long-form LLM call, optionally search-augmented, read
//!   incrementally
//! - **Extraction**: a schema-constrained call whose answer is validated,
//!   with at most one stricter re-prompt
//! - **Enrichment**: deterministic chart ids and rendering options
//! - **Orchestrator**: runs the three in sequence, silently or streamed
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use report_forge::llm::LiteLlmClient;
//! use report_forge::pipeline::{PipelineConfig, ReportPipeline};
//!
//! let llm = Arc::new(LiteLlmClient::from_env()?);
//! let pipeline = ReportPipeline::new(llm, PipelineConfig::from_env()?);
//!
//! let mut events = pipeline.stream(config);
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod config;
pub mod enrichment;
pub mod extraction;
pub mod orchestrator;
pub mod prompts;
pub mod research;
pub mod stream;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, PipelineConfig, MAX_EXTRACTION_RETRIES};
pub use enrichment::enrich;
pub use extraction::{parse_record, ExtractionStage};
pub use orchestrator::ReportPipeline;
pub use research::{research_progress, ResearchOutput, ResearchStage, ResearchUpdate};
pub use stream::ProgressStream;
