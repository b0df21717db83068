//! Document export: paginating rendered markup through a headless engine.
//!
//! [`DocumentExporter`] owns the state machine
//! `Idle -> EngineLaunching -> ContentLoading -> Paginating -> Done`, with
//! `Failed` reachable from every state. Each call launches its own
//! [`EngineSession`] and releases it before returning.
//!
//! # Example
//!
//! ```rust,ignore
//! use report_forge::export::{DocumentExporter, ExportConfig};
//!
//! let exporter = DocumentExporter::chromium(ExportConfig::from_env()?);
//! let pdf = exporter.export_document(&markup).await?;
//! ```

pub mod chromium;
pub mod config;
pub mod engine;
pub mod exporter;
pub mod page;

pub use chromium::{ChromiumEngine, ChromiumSession};
pub use config::ExportConfig;
pub use engine::{EngineSession, RenderEngine};
pub use exporter::{DocumentExporter, ExportState, ExportTrace};
pub use page::{PageSetup, PAGE_NUMBER_FOOTER};
