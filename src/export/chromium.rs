//! Headless Chromium driven over the DevTools protocol.
//!
//! Each session is a separate browser process with a private temporary
//! profile. The browser picks its own debugging port
//! (`--remote-debugging-port=0`) and announces the endpoint on stderr; the
//! session then talks to the single page target over a WebSocket.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace, warn};

use super::config::ExportConfig;
use super::engine::{EngineSession, RenderEngine};
use super::page::PageSetup;
use crate::error::ExportError;
use crate::render::{MarkupDocument, CHARTS_SETTLED_FLAG};

const DEVTOOLS_BANNER: &str = "DevTools listening on ";
const DOCUMENT_FILE: &str = "report.html";
const TARGET_POLL_ATTEMPTS: u32 = 50;
const TARGET_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Unsolicited events kept while waiting for a specific one.
const MAX_BUFFERED_EVENTS: usize = 256;

type DevToolsSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Launches one headless Chromium per session.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    config: ExportConfig,
}

impl ChromiumEngine {
    pub fn new(config: ExportConfig) -> Self {
        Self { config }
    }

    fn command(&self, binary: &Path, profile: &Path) -> Command {
        let mut command = Command::new(binary);
        command
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-extensions")
            .arg("--hide-scrollbars")
            .arg("--mute-audio")
            .arg("--remote-debugging-port=0")
            .arg(format!("--user-data-dir={}", profile.display()));
        if self.config.no_sandbox {
            command.arg("--no-sandbox");
        }
        command
            .arg("about:blank")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    fn name(&self) -> &str {
        "chromium"
    }

    async fn launch(&self) -> Result<Box<dyn EngineSession>, ExportError> {
        let binary = self.config.resolve_chrome_path().ok_or_else(|| {
            ExportError::EngineLaunchFailure(
                "no Chromium executable found; set REPORT_CHROME_PATH".to_string(),
            )
        })?;
        let profile = tempfile::Builder::new()
            .prefix("report-forge-")
            .tempdir()
            .map_err(|e| launch_failure("browser profile could not be created", e))?;

        // From here on, an early return kills the child and removes the profile.
        let mut child = self
            .command(&binary, profile.path())
            .spawn()
            .map_err(|e| launch_failure(&binary.display().to_string(), e))?;
        let stderr = child.stderr.take().ok_or_else(|| {
            ExportError::EngineLaunchFailure("browser stderr was not captured".to_string())
        })?;

        let mut lines = BufReader::new(stderr).lines();
        let browser_endpoint = loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| launch_failure("browser output unreadable", e))?;
            match line {
                Some(line) => match devtools_endpoint(&line) {
                    Some(endpoint) => break endpoint,
                    None => trace!(target: "chromium", "{}", line),
                },
                None => {
                    return Err(ExportError::EngineLaunchFailure(
                        "browser exited before opening the DevTools endpoint".to_string(),
                    ))
                }
            }
        };
        // Keep draining so the browser never blocks on a full pipe.
        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                trace!(target: "chromium", "{}", line);
            }
        });

        let page_endpoint = find_page_target(&browser_endpoint).await?;
        let (socket, _) = connect_async(page_endpoint.as_str()).await.map_err(|e| {
            ExportError::EngineLaunchFailure(format!("DevTools connection failed: {}", e))
        })?;

        debug!(pid = ?child.id(), browser = %binary.display(), "Chromium session ready");
        Ok(Box::new(ChromiumSession {
            child,
            profile,
            socket,
            next_id: 0,
            events: VecDeque::new(),
        }))
    }
}

/// A live browser process plus its DevTools connection.
pub struct ChromiumSession {
    child: Child,
    profile: TempDir,
    socket: DevToolsSocket,
    next_id: u64,
    events: VecDeque<Value>,
}

impl ChromiumSession {
    /// Send a command and wait for its reply, buffering events seen meanwhile.
    async fn call(&mut self, method: &str, params: Value) -> Result<Value, ExportError> {
        self.next_id += 1;
        let id = self.next_id;
        let frame = json!({ "id": id, "method": method, "params": params });
        self.socket
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| ExportError::Protocol(format!("{}: {}", method, e)))?;

        loop {
            let message = self.next_message().await?;
            match message.get("id").and_then(Value::as_u64) {
                Some(reply) if reply == id => return reply_result(method, message),
                Some(_) => continue,
                None => self.buffer_event(message),
            }
        }
    }

    async fn wait_for_event(&mut self, method: &str) -> Result<Value, ExportError> {
        if let Some(pos) = self.events.iter().position(|e| is_event(e, method)) {
            if let Some(event) = self.events.remove(pos) {
                return Ok(event);
            }
        }
        loop {
            let message = self.next_message().await?;
            if is_event(&message, method) {
                return Ok(message);
            }
            if message.get("id").is_none() {
                self.buffer_event(message);
            }
        }
    }

    fn buffer_event(&mut self, event: Value) {
        if self.events.len() == MAX_BUFFERED_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }

    async fn next_message(&mut self) -> Result<Value, ExportError> {
        loop {
            let parsed = match self.socket.next().await {
                Some(Ok(Message::Text(text))) => serde_json::from_str(&text),
                Some(Ok(Message::Binary(bytes))) => serde_json::from_slice(&bytes),
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ExportError::Protocol(
                        "DevTools connection closed".to_string(),
                    ))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ExportError::Protocol(e.to_string())),
            };
            return parsed
                .map_err(|e| ExportError::Protocol(format!("malformed DevTools message: {}", e)));
        }
    }
}

#[async_trait]
impl EngineSession for ChromiumSession {
    async fn load(&mut self, markup: &MarkupDocument) -> Result<(), ExportError> {
        let path = self.profile.path().join(DOCUMENT_FILE);
        tokio::fs::write(&path, markup.html.as_bytes()).await?;
        let url = reqwest::Url::from_file_path(&path).map_err(|_| {
            ExportError::Protocol(format!("cannot address {} as a file URL", path.display()))
        })?;

        self.call("Page.enable", json!({})).await?;
        let navigation = self
            .call("Page.navigate", json!({ "url": url.as_str() }))
            .await?;
        if let Some(error) = navigation.get("errorText").and_then(Value::as_str) {
            return Err(ExportError::Protocol(format!("navigation failed: {}", error)));
        }
        self.wait_for_event("Page.loadEventFired").await?;

        let expression = settle_expression();
        loop {
            let evaluated = self
                .call(
                    "Runtime.evaluate",
                    json!({ "expression": expression, "returnByValue": true }),
                )
                .await?;
            if evaluated["result"]["value"] == Value::Bool(true) {
                return Ok(());
            }
            tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
        }
    }

    async fn paginate(&mut self, setup: &PageSetup, title: &str) -> Result<Vec<u8>, ExportError> {
        let printed = self
            .call("Page.printToPDF", setup.print_params(title))
            .await
            .map_err(|e| ExportError::Pagination(e.to_string()))?;
        let data = printed
            .get("data")
            .and_then(Value::as_str)
            .ok_or_else(|| ExportError::Pagination("engine returned no document".to_string()))?;
        let bytes = BASE64
            .decode(data)
            .map_err(|e| ExportError::Pagination(format!("undecodable document: {}", e)))?;
        if bytes.is_empty() {
            return Err(ExportError::Pagination("engine returned an empty document".to_string()));
        }
        Ok(bytes)
    }

    async fn shutdown(self: Box<Self>) {
        let mut session = *self;
        if let Err(e) = session.socket.close(None).await {
            warn!(error = %e, "Failed to close DevTools connection");
        }
        if let Err(e) = session.child.kill().await {
            warn!(error = %e, "Failed to stop Chromium");
        }
        if let Err(e) = session.profile.close() {
            warn!(error = %e, "Failed to remove Chromium profile");
        }
    }
}

fn launch_failure(context: &str, error: impl std::fmt::Display) -> ExportError {
    ExportError::EngineLaunchFailure(format!("{}: {}", context, error))
}

/// The browser endpoint announced on stderr, if `line` is the banner.
fn devtools_endpoint(line: &str) -> Option<String> {
    line.trim()
        .strip_prefix(DEVTOOLS_BANNER)
        .map(str::trim)
        .filter(|url| url.starts_with("ws://"))
        .map(str::to_string)
}

/// `http://host:port` of the DevTools HTTP interface behind a WebSocket URL.
fn http_base(ws_endpoint: &str) -> Result<String, ExportError> {
    let url = reqwest::Url::parse(ws_endpoint)
        .map_err(|e| ExportError::EngineLaunchFailure(format!("bad DevTools endpoint: {}", e)))?;
    let host = url.host_str().ok_or_else(|| {
        ExportError::EngineLaunchFailure(format!("DevTools endpoint has no host: {}", ws_endpoint))
    })?;
    Ok(match url.port() {
        Some(port) => format!("http://{}:{}", host, port),
        None => format!("http://{}", host),
    })
}

/// WebSocket URL of the first page target in a `/json/list` answer.
fn page_target(targets: &Value) -> Option<String> {
    targets
        .as_array()?
        .iter()
        .find(|t| t.get("type").and_then(Value::as_str) == Some("page"))
        .and_then(|t| t.get("webSocketDebuggerUrl"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

async fn find_page_target(browser_endpoint: &str) -> Result<String, ExportError> {
    let list_url = format!("{}/json/list", http_base(browser_endpoint)?);
    let client = reqwest::Client::builder()
        .no_proxy()
        .build()
        .map_err(|e| ExportError::EngineLaunchFailure(e.to_string()))?;

    for attempt in 1..=TARGET_POLL_ATTEMPTS {
        match client.get(&list_url).send().await {
            Ok(response) => {
                if let Ok(targets) = response.json::<Value>().await {
                    if let Some(endpoint) = page_target(&targets) {
                        return Ok(endpoint);
                    }
                }
            }
            Err(e) => trace!(attempt, error = %e, "DevTools target list not ready"),
        }
        tokio::time::sleep(TARGET_POLL_INTERVAL).await;
    }
    Err(ExportError::EngineLaunchFailure(
        "browser exposed no page target".to_string(),
    ))
}

fn reply_result(method: &str, mut reply: Value) -> Result<Value, ExportError> {
    if let Some(error) = reply.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(ExportError::Protocol(format!("{} failed: {}", method, message)));
    }
    Ok(reply
        .get_mut("result")
        .map(Value::take)
        .unwrap_or(Value::Null))
}

fn is_event(message: &Value, method: &str) -> bool {
    message.get("method").and_then(Value::as_str) == Some(method)
}

fn settle_expression() -> String {
    format!(
        "document.readyState === 'complete' && window.{} === true",
        CHARTS_SETTLED_FLAG
    )
}
