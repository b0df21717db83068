//! Request surface over the pipeline, renderer and exporter.
//!
//! [`ReportService`] exposes the three logical operations (`generate`,
//! `generate/stream`, `export`) without committing to a transport;
//! [`sse`] frames progress streams for an event-stream response.

pub mod report_service;
pub mod sse;

pub use report_service::{ExportArtifact, ReportService};
pub use sse::{encode_event, encode_stream, CACHE_CONTROL, CONTENT_TYPE};
