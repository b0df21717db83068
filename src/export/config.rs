//! Exporter configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pipeline::config::{parse_env_bool, parse_env_value, ConfigError};

/// Executable names probed on `PATH` when no browser path is configured.
const CHROME_CANDIDATES: [&str; 5] = [
    "chromium",
    "chromium-browser",
    "google-chrome",
    "google-chrome-stable",
    "chrome",
];

/// Well-known install locations checked after `PATH`.
const CHROME_INSTALL_PATHS: [&str; 2] = [
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

/// Configuration for a [`super::DocumentExporter`].
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Browser executable. `None` means auto-detect.
    pub chrome_path: Option<PathBuf>,
    /// Bound on loading the document and waiting for charts to settle.
    pub load_timeout: Duration,
    /// Bound on starting the engine and connecting to it.
    pub launch_timeout: Duration,
    /// Bound on producing the paginated document once content has settled.
    pub paginate_timeout: Duration,
    /// Pass `--no-sandbox` to the browser (needed as root in containers).
    pub no_sandbox: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            load_timeout: Duration::from_secs(30),
            launch_timeout: Duration::from_secs(20),
            paginate_timeout: Duration::from_secs(60),
            no_sandbox: false,
        }
    }
}

impl ExportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `REPORT_CHROME_PATH` (auto-detected when unset)
    /// - `REPORT_EXPORT_LOAD_TIMEOUT_SECS` (default: 30)
    /// - `REPORT_EXPORT_LAUNCH_TIMEOUT_SECS` (default: 20)
    /// - `REPORT_EXPORT_PAGINATE_TIMEOUT_SECS` (default: 60)
    /// - `REPORT_CHROME_NO_SANDBOX` (default: false)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("REPORT_CHROME_PATH") {
            if !val.trim().is_empty() {
                config.chrome_path = Some(PathBuf::from(val.trim()));
            }
        }
        if let Ok(val) = std::env::var("REPORT_EXPORT_LOAD_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "REPORT_EXPORT_LOAD_TIMEOUT_SECS")?;
            config.load_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("REPORT_EXPORT_LAUNCH_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "REPORT_EXPORT_LAUNCH_TIMEOUT_SECS")?;
            config.launch_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("REPORT_EXPORT_PAGINATE_TIMEOUT_SECS") {
            let secs: u64 = parse_env_value(&val, "REPORT_EXPORT_PAGINATE_TIMEOUT_SECS")?;
            config.paginate_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = std::env::var("REPORT_CHROME_NO_SANDBOX") {
            config.no_sandbox = parse_env_bool(&val, "REPORT_CHROME_NO_SANDBOX")?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.load_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "load_timeout must be greater than 0".to_string(),
            ));
        }
        if self.launch_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "launch_timeout must be greater than 0".to_string(),
            ));
        }
        if self.paginate_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "paginate_timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_chrome_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn with_load_timeout(mut self, timeout: Duration) -> Self {
        self.load_timeout = timeout;
        self
    }

    pub fn with_launch_timeout(mut self, timeout: Duration) -> Self {
        self.launch_timeout = timeout;
        self
    }

    pub fn with_paginate_timeout(mut self, timeout: Duration) -> Self {
        self.paginate_timeout = timeout;
        self
    }

    pub fn with_no_sandbox(mut self, no_sandbox: bool) -> Self {
        self.no_sandbox = no_sandbox;
        self
    }

    /// The browser to launch: the configured path, else the first candidate
    /// found on `PATH`, else a well-known install location.
    pub fn resolve_chrome_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.chrome_path {
            return Some(path.clone());
        }
        let search = std::env::var_os("PATH")?;
        std::env::split_paths(&search)
            .flat_map(|dir| CHROME_CANDIDATES.iter().map(move |name| dir.join(name)))
            .find(|candidate| is_file(candidate))
            .or_else(|| {
                CHROME_INSTALL_PATHS
                    .iter()
                    .map(PathBuf::from)
                    .find(|candidate| is_file(candidate))
            })
    }
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}
