//! Rendering engine abstraction.
//!
//! An engine hands out one session per export call. Sessions are never
//! shared or pooled; the exporter shuts each one down before returning.

use async_trait::async_trait;

use super::page::PageSetup;
use crate::error::ExportError;
use crate::render::MarkupDocument;

/// Starts isolated rendering sessions.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Short engine name for logs.
    fn name(&self) -> &str;

    /// Start a fresh session.
    async fn launch(&self) -> Result<Box<dyn EngineSession>, ExportError>;
}

/// One live engine instance.
#[async_trait]
pub trait EngineSession: Send {
    /// Load the markup and wait until content and chart scripts have settled.
    ///
    /// Waits without bound; the exporter applies the load timeout.
    async fn load(&mut self, markup: &MarkupDocument) -> Result<(), ExportError>;

    /// Paginate the loaded document into a binary document.
    async fn paginate(&mut self, setup: &PageSetup, title: &str) -> Result<Vec<u8>, ExportError>;

    /// Release every resource held by the session.
    async fn shutdown(self: Box<Self>);
}
