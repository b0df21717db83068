//! report-forge: research a brief with an LLM, extract a validated business
//! report, and render it as HTML, Markdown or PDF.
//!
//! The pipeline runs Research, Extraction and Chart Enrichment in sequence,
//! either silently ([`pipeline::ReportPipeline::generate`]) or as a progress
//! stream ([`pipeline::ReportPipeline::stream`]). Rendering and export are
//! separate, deterministic steps over the finished record.

// Core modules
pub mod cli;
pub mod error;
pub mod export;
pub mod llm;
pub mod pipeline;
pub mod render;
pub mod report;
pub mod service;
pub mod utils;
pub mod validation;

// Re-export commonly used error types
pub use error::{ExportError, FieldError, LlmError, RenderError, ReportError};
