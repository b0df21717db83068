//! Document exporter: markup in, paginated binary document out.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::chromium::ChromiumEngine;
use super::config::ExportConfig;
use super::engine::{EngineSession, RenderEngine};
use super::page::PageSetup;
use crate::error::ExportError;
use crate::render::MarkupDocument;

/// Lifecycle of one export call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportState {
    Idle,
    EngineLaunching,
    ContentLoading,
    Paginating,
    Done,
    /// Export failed with the given error code.
    Failed(String),
}

impl ExportState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportState::Done | ExportState::Failed(_))
    }
}

impl std::fmt::Display for ExportState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportState::Idle => write!(f, "idle"),
            ExportState::EngineLaunching => write!(f, "engine_launching"),
            ExportState::ContentLoading => write!(f, "content_loading"),
            ExportState::Paginating => write!(f, "paginating"),
            ExportState::Done => write!(f, "done"),
            ExportState::Failed(code) => write!(f, "failed: {}", code),
        }
    }
}

/// Every state an export call passed through, starting at `Idle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportTrace {
    states: Vec<ExportState>,
}

impl ExportTrace {
    pub fn new() -> Self {
        Self {
            states: vec![ExportState::Idle],
        }
    }

    pub fn states(&self) -> &[ExportState] {
        &self.states
    }

    pub fn current(&self) -> &ExportState {
        self.states.last().unwrap_or(&ExportState::Idle)
    }

    fn enter(&mut self, state: ExportState) {
        debug!(from = %self.current(), to = %state, "Export state transition");
        self.states.push(state);
    }
}

impl Default for ExportTrace {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives a [`RenderEngine`] through one scoped session per call.
#[derive(Clone)]
pub struct DocumentExporter {
    engine: Arc<dyn RenderEngine>,
    config: ExportConfig,
    page: PageSetup,
}

impl DocumentExporter {
    pub fn new(engine: Arc<dyn RenderEngine>, config: ExportConfig) -> Self {
        Self {
            engine,
            config,
            page: PageSetup::a4(),
        }
    }

    /// Exporter backed by headless Chromium.
    pub fn chromium(config: ExportConfig) -> Self {
        Self::new(Arc::new(ChromiumEngine::new(config.clone())), config)
    }

    pub fn with_page_setup(mut self, page: PageSetup) -> Self {
        self.page = page;
        self
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export `markup` to a paginated document.
    pub async fn export_document(&self, markup: &MarkupDocument) -> Result<Vec<u8>, ExportError> {
        let mut trace = ExportTrace::new();
        self.export_document_logged(markup, &mut trace).await
    }

    /// Like [`Self::export_document`], recording every state into `trace`.
    ///
    /// The session is shut down on every exit path once launched. If the
    /// returned future is dropped mid-call, the engine's own drop guards
    /// release the session instead.
    pub async fn export_document_logged(
        &self,
        markup: &MarkupDocument,
        trace: &mut ExportTrace,
    ) -> Result<Vec<u8>, ExportError> {
        let started = Instant::now();
        let result = self.run(markup, trace).await;

        match &result {
            Ok(bytes) => {
                trace.enter(ExportState::Done);
                info!(
                    engine = self.engine.name(),
                    bytes = bytes.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Document exported"
                );
            }
            Err(e) => {
                trace.enter(ExportState::Failed(e.code().to_string()));
                error!(engine = self.engine.name(), error = %e, "Document export failed");
            }
        }
        result
    }

    async fn run(
        &self,
        markup: &MarkupDocument,
        trace: &mut ExportTrace,
    ) -> Result<Vec<u8>, ExportError> {
        trace.enter(ExportState::EngineLaunching);
        let launch_timeout = self.config.launch_timeout;
        let mut session = match tokio::time::timeout(launch_timeout, self.engine.launch()).await {
            Ok(session) => session?,
            Err(_) => {
                return Err(ExportError::EngineLaunchFailure(format!(
                    "engine did not start within {} seconds",
                    launch_timeout.as_secs()
                )))
            }
        };

        let result = self.drive(session.as_mut(), markup, trace).await;
        session.shutdown().await;
        result
    }

    async fn drive(
        &self,
        session: &mut dyn EngineSession,
        markup: &MarkupDocument,
        trace: &mut ExportTrace,
    ) -> Result<Vec<u8>, ExportError> {
        trace.enter(ExportState::ContentLoading);
        let load_timeout = self.config.load_timeout;
        tokio::time::timeout(load_timeout, session.load(markup))
            .await
            .map_err(|_| ExportError::RenderTimeout {
                seconds: load_timeout.as_secs(),
            })??;

        trace.enter(ExportState::Paginating);
        let paginate_timeout = self.config.paginate_timeout;
        tokio::time::timeout(paginate_timeout, session.paginate(&self.page, &markup.title))
            .await
            .map_err(|_| {
                ExportError::Pagination(format!(
                    "engine did not produce a document within {} seconds",
                    paginate_timeout.as_secs()
                ))
            })?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Clone, Copy, PartialEq)]
    enum Behaviour {
        Succeed,
        FailLaunch,
        HangLaunch,
        HangLoad,
        FailPagination,
        HangPagination,
    }

    #[derive(Default)]
    struct Counters {
        launches: AtomicUsize,
        shutdowns: AtomicUsize,
        loads: AtomicUsize,
    }

    struct FakeEngine {
        behaviour: Behaviour,
        counters: Arc<Counters>,
    }

    struct FakeSession {
        behaviour: Behaviour,
        counters: Arc<Counters>,
        loaded: Option<String>,
    }

    #[async_trait]
    impl RenderEngine for FakeEngine {
        fn name(&self) -> &str {
            "fake"
        }

        async fn launch(&self) -> Result<Box<dyn EngineSession>, ExportError> {
            self.counters.launches.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::FailLaunch => Err(ExportError::EngineLaunchFailure("no browser".into())),
                Behaviour::HangLaunch => std::future::pending().await,
                _ => Ok(Box::new(FakeSession {
                    behaviour: self.behaviour,
                    counters: self.counters.clone(),
                    loaded: None,
                })),
            }
        }
    }

    #[async_trait]
    impl EngineSession for FakeSession {
        async fn load(&mut self, markup: &MarkupDocument) -> Result<(), ExportError> {
            self.counters.loads.fetch_add(1, Ordering::SeqCst);
            if self.behaviour == Behaviour::HangLoad {
                std::future::pending::<()>().await;
            }
            self.loaded = Some(markup.html.clone());
            Ok(())
        }

        async fn paginate(
            &mut self,
            setup: &PageSetup,
            title: &str,
        ) -> Result<Vec<u8>, ExportError> {
            if self.behaviour == Behaviour::FailPagination {
                return Err(ExportError::Pagination("printer on fire".into()));
            }
            if self.behaviour == Behaviour::HangPagination {
                std::future::pending::<()>().await;
            }
            let body = self.loaded.clone().unwrap_or_default();
            Ok(format!("%PDF {}x{} {} {}", setup.paper_width, setup.paper_height, title, body)
                .into_bytes())
        }

        async fn shutdown(self: Box<Self>) {
            self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn exporter(behaviour: Behaviour) -> (DocumentExporter, Arc<Counters>) {
        let counters = Arc::new(Counters::default());
        let engine = FakeEngine {
            behaviour,
            counters: counters.clone(),
        };
        let config = ExportConfig::new()
            .with_load_timeout(Duration::from_millis(50))
            .with_launch_timeout(Duration::from_millis(50))
            .with_paginate_timeout(Duration::from_millis(50));
        (DocumentExporter::new(Arc::new(engine), config), counters)
    }

    fn markup() -> MarkupDocument {
        MarkupDocument {
            html: "<html><body>report</body></html>".to_string(),
            title: "Quarterly Review".to_string(),
        }
    }

    #[tokio::test]
    async fn test_successful_export_walks_every_state() {
        let (exporter, counters) = exporter(Behaviour::Succeed);
        let mut trace = ExportTrace::new();
        let bytes = exporter
            .export_document_logged(&markup(), &mut trace)
            .await
            .expect("exported");

        let text = String::from_utf8(bytes).expect("utf8");
        assert!(text.starts_with("%PDF 8.27x11.69 Quarterly Review"));
        assert_eq!(
            trace.states(),
            &[
                ExportState::Idle,
                ExportState::EngineLaunching,
                ExportState::ContentLoading,
                ExportState::Paginating,
                ExportState::Done,
            ]
        );
        assert_eq!(counters.launches.load(Ordering::SeqCst), 1);
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_launch_failure() {
        let (exporter, counters) = exporter(Behaviour::FailLaunch);
        let mut trace = ExportTrace::new();
        let err = exporter
            .export_document_logged(&markup(), &mut trace)
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::EngineLaunchFailure(_)));
        assert_eq!(
            trace.current(),
            &ExportState::Failed("engine_launch_failure".to_string())
        );
        assert_eq!(counters.loads.load(Ordering::SeqCst), 0);
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_launch_timeout_is_launch_failure() {
        let (exporter, _) = exporter(Behaviour::HangLaunch);
        let err = exporter.export_document(&markup()).await.unwrap_err();
        assert!(matches!(err, ExportError::EngineLaunchFailure(_)));
    }

    #[tokio::test]
    async fn test_load_timeout_releases_session() {
        let (exporter, counters) = exporter(Behaviour::HangLoad);
        let mut trace = ExportTrace::new();
        let err = exporter
            .export_document_logged(&markup(), &mut trace)
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::RenderTimeout { .. }));
        assert_eq!(err.code(), "render_timeout");
        assert!(!trace.states().contains(&ExportState::Paginating));
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_pagination_failure_releases_session() {
        let (exporter, counters) = exporter(Behaviour::FailPagination);
        let mut trace = ExportTrace::new();
        let err = exporter
            .export_document_logged(&markup(), &mut trace)
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Pagination(_)));
        assert!(trace.states().contains(&ExportState::Paginating));
        assert!(trace.current().is_terminal());
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stalled_pagination_times_out_and_releases_session() {
        let (exporter, counters) = exporter(Behaviour::HangPagination);
        let mut trace = ExportTrace::new();
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            exporter.export_document_logged(&markup(), &mut trace),
        )
        .await
        .expect("export must not hang");

        let err = result.unwrap_err();
        assert_eq!(err.code(), "pagination_failed");
        assert_eq!(
            trace.current(),
            &ExportState::Failed("pagination_failed".to_string())
        );
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_exports_use_separate_sessions() {
        let (exporter, counters) = exporter(Behaviour::Succeed);
        let doc = markup();
        let (a, b) = tokio::join!(exporter.export_document(&doc), exporter.export_document(&doc));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(counters.launches.load(Ordering::SeqCst), 2);
        assert_eq!(counters.shutdowns.load(Ordering::SeqCst), 2);
    }
}
