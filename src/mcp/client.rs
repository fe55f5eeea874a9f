//! Notebook client: one long-lived MCP server process shared by all callers.
//!
//! This module implements the client lifecycle:
//!
//! 1. **Start**: launch the process lazily on first use
//! 2. **Handshake**: `initialize`, then the `notifications/initialized` notification
//! 3. **Discovery**: pick the notebook that questions are asked against
//! 4. **Operation**: multiplex concurrent calls over the single stdin/stdout pair
//!
//! Every request carries a fresh ID; responses may arrive in any order and are
//! matched back through [`PendingCalls`]. Calls are bounded by a timeout, and
//! an unexpected exit fails every outstanding call and leaves the client
//! [`SessionState::Dead`] until [`NotebookClient::restart`] is called.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::config::NotebookConfig;
use crate::error::{ClientError, ClientResult};
use crate::mcp::discovery::select_notebook;
use crate::mcp::pending::PendingCalls;
use crate::mcp::process::{CommandLauncher, LaunchedProcess, ProcessLauncher, SessionState};
use crate::mcp::protocol::{
    methods, tools, InitializeParams, OutgoingNotification, OutgoingRequest, ToolCallParams,
    ToolCallResult,
};
use crate::mcp::transport::{pump_output, BoxedReader, MessageWriter};

/// Text returned when a query produced no content.
pub const EMPTY_ANSWER: &str = "No response content";

/// How long to wait for an exit code after stdout closes.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// How long to keep reading stdout after the process has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Snapshot of the client for status reporting.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatus {
    /// Current lifecycle state.
    pub state: SessionState,
    /// Selected notebook, if any.
    pub notebook_id: Option<String>,
    /// Calls waiting for a response.
    pub pending_calls: usize,
    /// Age of the oldest waiting call, in milliseconds.
    pub oldest_call_ms: Option<u64>,
    /// OS process ID of the current process.
    pub pid: Option<u32>,
}

struct Lifecycle {
    state: SessionState,
    generation: u64,
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
}

/// State shared with the background task that watches each process.
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    registry: PendingCalls,
    connection: tokio::sync::Mutex<Option<Link>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::NotStarted,
                generation: 0,
                pid: None,
                kill: None,
            }),
            registry: PendingCalls::new(),
            connection: tokio::sync::Mutex::new(None),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> SessionState {
        self.lifecycle().state
    }

    /// Moves `from → to`; does nothing if the state has changed meanwhile.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut lifecycle = self.lifecycle();
        if lifecycle.state != from {
            return false;
        }
        lifecycle.state = to;
        drop(lifecycle);
        tracing::debug!(%from, %to, "Notebook session state changed");
        true
    }

    /// Starts a new generation in `Starting`.
    fn begin(&self) -> u64 {
        let mut lifecycle = self.lifecycle();
        lifecycle.generation += 1;
        lifecycle.state = SessionState::Starting;
        lifecycle.pid = None;
        lifecycle.kill = None;
        lifecycle.generation
    }

    /// Abandons the current generation, killing its process.
    ///
    /// The exit of a retired process is treated as expected.
    fn retire(&self, to: SessionState) {
        let kill = {
            let mut lifecycle = self.lifecycle();
            lifecycle.generation += 1;
            lifecycle.state = to;
            lifecycle.pid = None;
            lifecycle.kill.take()
        };
        drop(kill);
    }

    fn attach(&self, generation: u64, pid: Option<u32>, kill: oneshot::Sender<()>) {
        let mut lifecycle = self.lifecycle();
        if lifecycle.generation == generation {
            lifecycle.pid = pid;
            lifecycle.kill = Some(kill);
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.lifecycle().generation == generation
    }

    /// Marks the session dead if `generation` is current; returns whether it was.
    fn on_exit(&self, generation: u64, code: Option<i32>) -> bool {
        {
            let mut lifecycle = self.lifecycle();
            if lifecycle.generation != generation {
                tracing::debug!(?code, "Retired notebook process exited");
                return false;
            }
            lifecycle.state = SessionState::Dead;
        }

        let failed = self
            .registry
            .fail_all(&ClientError::ProcessExited { code });
        tracing::warn!(?code, failed_calls = failed, "Notebook process exited unexpectedly");
        true
    }

    /// Drops the writer of `generation`, if it is still in the slot.
    ///
    /// Runs after `on_exit`, so a start holding the slot is already failing.
    async fn release(&self, generation: u64) {
        let mut slot = self.connection.lock().await;
        if slot.as_ref().is_some_and(|link| link.generation == generation) {
            *slot = None;
            tracing::debug!(generation, "Released writer of exited notebook process");
        }
    }
}

/// Write side of one process generation.
#[derive(Clone)]
struct Link {
    writer: Arc<MessageWriter>,
    generation: u64,
}

/// Client for a notebook MCP server running as a child process.
///
/// Create one per application and share it behind an [`Arc`].
pub struct NotebookClient {
    config: NotebookConfig,
    launcher: Arc<dyn ProcessLauncher>,
    shared: Arc<Shared>,
    discovery: tokio::sync::Mutex<()>,
    notebook_id: RwLock<Option<String>>,
    consecutive_timeouts: AtomicU32,
}

impl NotebookClient {
    /// Creates a client that launches the configured command.
    #[must_use]
    pub fn new(config: NotebookConfig) -> Self {
        let launcher = Arc::new(CommandLauncher::from_config(&config));
        Self::with_launcher(config, launcher)
    }

    /// Creates a client that uses `launcher` to start the process.
    #[must_use]
    pub fn with_launcher(config: NotebookConfig, launcher: Arc<dyn ProcessLauncher>) -> Self {
        Self {
            config,
            launcher,
            shared: Arc::new(Shared::new()),
            discovery: tokio::sync::Mutex::new(()),
            notebook_id: RwLock::new(None),
            consecutive_timeouts: AtomicU32::new(0),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// The selected notebook, if discovery has found one.
    #[must_use]
    pub fn notebook_id(&self) -> Option<String> {
        self.notebook_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_notebook_id(&self, id: Option<String>) {
        *self
            .notebook_id
            .write()
            .unwrap_or_else(PoisonError::into_inner) = id;
    }

    /// Number of calls waiting for a response.
    #[must_use]
    pub fn pending_calls(&self) -> usize {
        self.shared.registry.len()
    }

    /// Snapshot for status reporting.
    #[must_use]
    pub fn status(&self) -> ClientStatus {
        let (state, pid) = {
            let lifecycle = self.shared.lifecycle();
            (lifecycle.state, lifecycle.pid)
        };
        ClientStatus {
            state,
            notebook_id: self.notebook_id(),
            pending_calls: self.pending_calls(),
            oldest_call_ms: self
                .shared
                .registry
                .oldest_age()
                .map(|age| u64::try_from(age.as_millis()).unwrap_or(u64::MAX)),
            pid,
        }
    }

    /// Starts the process and completes the handshake, if not already done.
    ///
    /// Concurrent callers share a single start.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Spawn`] or [`ClientError::Handshake`] if start-up
    /// fails, and [`ClientError::ProcessDead`] after an unexpected exit.
    pub async fn ensure_started(&self) -> ClientResult<()> {
        self.link().await.map(|_| ())
    }

    async fn link(&self) -> ClientResult<Link> {
        let mut slot = self.shared.connection.lock().await;

        if self.shared.state() == SessionState::Dead {
            return Err(ClientError::ProcessDead);
        }

        if let Some(link) = slot.as_ref() {
            if self.shared.is_current(link.generation) {
                return Ok(link.clone());
            }
        }

        self.start_locked(&mut slot).await
    }

    async fn start_locked(&self, slot: &mut Option<Link>) -> ClientResult<Link> {
        let generation = self.shared.begin();

        let LaunchedProcess {
            pid,
            stdin,
            stdout,
            exit,
            kill,
        } = match self.launcher.launch() {
            Ok(process) => process,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start notebook process");
                self.shared.retire(SessionState::NotStarted);
                return Err(e);
            }
        };
        self.shared.attach(generation, pid, kill);

        tokio::spawn(supervise(Arc::clone(&self.shared), generation, stdout, exit));

        let link = Link {
            writer: Arc::new(MessageWriter::new(stdin)),
            generation,
        };

        self.shared
            .transition(SessionState::Starting, SessionState::Handshaking);
        if let Err(e) = self.handshake(&link).await {
            tracing::error!(error = %e, "Notebook handshake failed");
            self.shared.retire(SessionState::NotStarted);
            return Err(ClientError::Handshake {
                source: Box::new(e),
            });
        }
        *slot = Some(link.clone());

        self.shared
            .transition(SessionState::Handshaking, SessionState::Discovering);
        if let Err(e) = self.discover_with(&link).await {
            tracing::warn!(error = %e, "No notebook selected after start-up");
        }

        if !self
            .shared
            .transition(SessionState::Discovering, SessionState::Ready)
        {
            return Err(match self.shared.state() {
                SessionState::Dead => ClientError::ProcessDead,
                _ => ClientError::ProcessExited { code: None },
            });
        }
        tracing::info!(?pid, notebook_id = ?self.notebook_id(), "Notebook session ready");

        Ok(link)
    }

    async fn handshake(&self, link: &Link) -> ClientResult<()> {
        let params = serde_json::to_value(InitializeParams::default()).map_err(|e| {
            ClientError::Serialize {
                message: e.to_string(),
            }
        })?;
        let result = self.request(link, methods::INITIALIZE, params).await?;
        tracing::debug!(
            server = ?result.get("serverInfo"),
            protocol = ?result.get("protocolVersion"),
            "Initialize response received"
        );

        link.writer
            .send(&OutgoingNotification::initialized())
            .await?;
        Ok(())
    }

    /// Kills the current process (if any) and fails its outstanding calls.
    fn reset(&self, to: SessionState) {
        self.shared.retire(to);
        let failed = self
            .shared
            .registry
            .fail_all(&ClientError::ProcessExited { code: None });
        if failed > 0 {
            tracing::info!(failed_calls = failed, "Abandoned calls on process reset");
        }
        self.consecutive_timeouts.store(0, Ordering::Release);
    }

    /// Kills the current process and starts a fresh one.
    ///
    /// This is the only way out of [`SessionState::Dead`].
    ///
    /// # Errors
    ///
    /// Returns an error if the new process fails to start.
    pub async fn restart(&self) -> ClientResult<()> {
        let mut slot = self.shared.connection.lock().await;
        tracing::info!(state = %self.shared.state(), "Restarting notebook process");
        *slot = None;
        self.reset(SessionState::NotStarted);
        self.set_notebook_id(None);
        self.start_locked(&mut slot).await.map(|_| ())
    }

    /// Kills the current process, if any.
    pub async fn shutdown(&self) {
        let mut slot = self.shared.connection.lock().await;
        if slot.take().is_some() {
            tracing::info!("Stopping notebook process");
        }
        self.reset(SessionState::NotStarted);
    }

    async fn request(&self, link: &Link, method: &str, params: Value) -> ClientResult<Value> {
        let registry = &self.shared.registry;
        let (id, receiver) = registry.register();

        // Registration must precede this check so a concurrent exit either
        // shows up here or fails the call through `fail_all`.
        if self.shared.state() == SessionState::Dead {
            registry.cancel(&id);
            return Err(ClientError::ProcessDead);
        }
        if !self.shared.is_current(link.generation) {
            registry.cancel(&id);
            return Err(ClientError::ProcessExited { code: None });
        }

        tracing::debug!(%id, method, "Sending request");
        let request = OutgoingRequest::new(id.clone(), method, params);
        if let Err(e) = link.writer.send(&request).await {
            registry.cancel(&id);
            return Err(e.into());
        }

        let after = self.config.call_timeout();
        let outcome = match tokio::time::timeout(after, receiver).await {
            Ok(Ok(outcome)) => outcome?,
            Ok(Err(_)) => return Err(ClientError::ProcessExited { code: None }),
            Err(_) => {
                registry.cancel(&id);
                self.note_timeout(link.generation);
                return Err(ClientError::Timeout {
                    method: method.to_string(),
                    after,
                });
            }
        };

        self.consecutive_timeouts.store(0, Ordering::Release);
        outcome.map_err(|error| ClientError::Rpc {
            method: method.to_string(),
            error,
        })
    }

    fn note_timeout(&self, generation: u64) {
        let count = self.consecutive_timeouts.fetch_add(1, Ordering::AcqRel) + 1;
        let limit = self.config.max_consecutive_timeouts;
        tracing::warn!(count, limit, "Notebook call timed out");

        if limit > 0 && count >= limit && self.shared.is_current(generation) {
            tracing::warn!("Recycling unresponsive notebook process");
            self.reset(SessionState::NotStarted);
        }
    }

    async fn tool_call(
        &self,
        link: &Link,
        name: &str,
        arguments: Value,
    ) -> ClientResult<ToolCallResult> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        let params = serde_json::to_value(params).map_err(|e| ClientError::Serialize {
            message: e.to_string(),
        })?;
        let value = self.request(link, methods::TOOLS_CALL, params).await?;

        let result: ToolCallResult =
            serde_json::from_value(value).map_err(|e| ClientError::UnexpectedResult {
                method: format!("{} {name}", methods::TOOLS_CALL),
                message: e.to_string(),
            })?;

        if result.is_error {
            return Err(ClientError::Tool {
                message: result
                    .first_text()
                    .unwrap_or("tool reported an error")
                    .to_string(),
            });
        }
        Ok(result)
    }

    /// Sends a request and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started, the write fails, the
    /// call times out, the process exits, or the server answers with an error.
    pub async fn call(&self, method: &str, params: Value) -> ClientResult<Value> {
        let link = self.link().await?;
        self.request(&link, method, params).await
    }

    /// Sends a one-way notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started or the write fails.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        let link = self.link().await?;
        link.writer
            .send(&OutgoingNotification::new(method, params))
            .await
            .map_err(ClientError::from)
    }

    /// Invokes a tool through `tools/call`.
    ///
    /// # Errors
    ///
    /// As for [`call`](Self::call), plus [`ClientError::Tool`] when the tool
    /// reports failure.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<ToolCallResult> {
        let link = self.link().await?;
        self.tool_call(&link, name, arguments).await
    }

    async fn discover_with(&self, link: &Link) -> ClientResult<String> {
        tracing::debug!("Discovering notebooks");
        let result = self
            .tool_call(link, tools::NOTEBOOK_LIST, json!({}))
            .await?;

        let text = result.first_text().ok_or_else(|| ClientError::Discovery {
            reason: "notebook list returned no text".to_string(),
        })?;

        let Some(selection) = select_notebook(text, &self.config.keyword) else {
            let sample: String = text.chars().take(200).collect();
            tracing::warn!(%sample, "Could not find a notebook id in the listing");
            return Err(ClientError::Discovery {
                reason: "no notebook id found in listing".to_string(),
            });
        };

        tracing::info!(
            notebook_id = %selection.id,
            title = ?selection.title,
            via = ?selection.via,
            "Selected notebook"
        );
        self.set_notebook_id(Some(selection.id.clone()));
        Ok(selection.id)
    }

    /// Re-runs notebook discovery against the running process.
    ///
    /// On failure any previously selected notebook is kept.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Discovery`] if no notebook could be identified,
    /// or any error from starting the process or calling the list tool.
    pub async fn discover(&self) -> ClientResult<String> {
        let link = self.link().await?;
        let _guard = self.discovery.lock().await;

        let entered = self
            .shared
            .transition(SessionState::Ready, SessionState::Discovering);
        let result = self.discover_with(&link).await;
        if entered {
            self.shared
                .transition(SessionState::Discovering, SessionState::Ready);
        }
        result
    }

    /// Runs discovery again, replacing the selection on success.
    ///
    /// # Errors
    ///
    /// As for [`discover`](Self::discover).
    pub async fn rediscover(&self) -> ClientResult<String> {
        tracing::info!(current = ?self.notebook_id(), "Rediscovering notebook");
        self.discover().await
    }

    /// Returns the selected notebook, running discovery once more if none is.
    ///
    /// # Errors
    ///
    /// Returns start-up errors as they are, and [`ClientError::NoNotebook`]
    /// if discovery still finds nothing.
    pub async fn ensure_notebook(&self) -> ClientResult<String> {
        self.ensure_started().await?;
        if let Some(id) = self.notebook_id() {
            return Ok(id);
        }

        tracing::info!("No notebook selected, retrying discovery");
        self.discover().await.map_err(|e| {
            tracing::warn!(error = %e, "Notebook discovery retry failed");
            ClientError::NoNotebook
        })
    }

    /// Asks a free-text question against the selected notebook.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoNotebook`] if no notebook can be selected, or
    /// any error from the query call itself.
    pub async fn ask(&self, message: &str) -> ClientResult<String> {
        let notebook_id = self.ensure_notebook().await?;
        tracing::debug!(%notebook_id, len = message.len(), "Querying notebook");

        let result = self
            .call_tool(
                tools::NOTEBOOK_QUERY,
                json!({
                    "notebook_id": notebook_id,
                    "query": message,
                }),
            )
            .await?;

        Ok(result
            .first_text()
            .filter(|text| !text.trim().is_empty())
            .map_or_else(|| EMPTY_ANSWER.to_string(), unwrap_answer))
    }
}

impl std::fmt::Debug for NotebookClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotebookClient")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Pumps one process's stdout and reports its exit.
async fn supervise(
    shared: Arc<Shared>,
    generation: u64,
    stdout: BoxedReader,
    mut exit: oneshot::Receiver<Option<i32>>,
) {
    let pump = pump_output(stdout, &shared.registry);
    tokio::pin!(pump);

    let code = tokio::select! {
        pumped = &mut pump => {
            log_pump_result(&pumped);
            tokio::time::timeout(EXIT_GRACE, &mut exit)
                .await
                .ok()
                .and_then(Result::ok)
                .flatten()
        }
        code = &mut exit => {
            if let Ok(pumped) = tokio::time::timeout(DRAIN_GRACE, &mut pump).await {
                log_pump_result(&pumped);
            }
            code.ok().flatten()
        }
    };

    if shared.on_exit(generation, code) {
        shared.release(generation).await;
    }
}

fn log_pump_result(result: &std::io::Result<crate::mcp::transport::PumpSummary>) {
    match result {
        Ok(summary) => tracing::debug!(
            settled = summary.settled,
            dropped = summary.dropped,
            malformed = summary.malformed,
            "Notebook stdout closed"
        ),
        Err(e) => tracing::warn!(error = %e, "Failed reading notebook stdout"),
    }
}

/// Unwraps an answer that arrived as a JSON envelope inside the text.
///
/// If `text` is a JSON object with a string `answer`, `text` or `content`
/// field (checked in that order), that field is returned; otherwise `text`
/// is returned unchanged.
#[must_use]
pub fn unwrap_answer(text: &str) -> String {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('{') {
        return text.to_string();
    }

    let Ok(Value::Object(envelope)) = serde_json::from_str::<Value>(trimmed) else {
        return text.to_string();
    };

    ["answer", "text", "content"]
        .iter()
        .find_map(|key| envelope.get(*key).and_then(Value::as_str))
        .map_or_else(|| text.to_string(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwrap_plain_text() {
        assert_eq!(unwrap_answer("Revenue grew 12%."), "Revenue grew 12%.");
    }

    #[test]
    fn unwrap_answer_field() {
        let text = r#"{"answer":"Liquidity is tight.","sources":[1,2]}"#;
        assert_eq!(unwrap_answer(text), "Liquidity is tight.");
    }

    #[test]
    fn unwrap_prefers_answer_over_text() {
        let text = r#"{"text":"second","answer":"first"}"#;
        assert_eq!(unwrap_answer(text), "first");
    }

    #[test]
    fn unwrap_falls_back_to_content() {
        assert_eq!(unwrap_answer(r#"{"content":"body"}"#), "body");
    }

    #[test]
    fn unwrap_keeps_unknown_envelope() {
        let text = r#"{"status":"ok"}"#;
        assert_eq!(unwrap_answer(text), text);
    }

    #[test]
    fn unwrap_keeps_broken_json() {
        let text = "{ this is prose in braces }";
        assert_eq!(unwrap_answer(text), text);
    }

    #[test]
    fn unwrap_ignores_non_string_answer() {
        let text = r#"{"answer":{"nested":true},"text":"flat"}"#;
        assert_eq!(unwrap_answer(text), "flat");
    }

    #[tokio::test]
    async fn exit_releases_current_writer() {
        let shared = Arc::new(Shared::new());
        let generation = shared.begin();
        let (stdin, _server_in) = tokio::io::duplex(64);
        let writer = Arc::new(MessageWriter::new(Box::new(stdin)));
        *shared.connection.lock().await = Some(Link {
            writer: Arc::clone(&writer),
            generation,
        });
        let (_id, receiver) = shared.registry.register();

        let (exit_tx, exit_rx) = oneshot::channel();
        exit_tx.send(Some(2)).unwrap();
        supervise(Arc::clone(&shared), generation, Box::new(tokio::io::empty()), exit_rx).await;

        assert_eq!(shared.state(), SessionState::Dead);
        assert!(shared.connection.lock().await.is_none());
        assert_eq!(Arc::strong_count(&writer), 1);
        assert!(matches!(
            receiver.await.unwrap(),
            Err(ClientError::ProcessExited { code: Some(2) })
        ));
    }

    #[tokio::test]
    async fn stale_exit_keeps_newer_writer() {
        let shared = Arc::new(Shared::new());
        let old = shared.begin();
        shared.retire(SessionState::NotStarted);
        let current = shared.begin();
        let (stdin, _server_in) = tokio::io::duplex(64);
        *shared.connection.lock().await = Some(Link {
            writer: Arc::new(MessageWriter::new(Box::new(stdin))),
            generation: current,
        });

        let (exit_tx, exit_rx) = oneshot::channel();
        exit_tx.send(Some(0)).unwrap();
        supervise(Arc::clone(&shared), old, Box::new(tokio::io::empty()), exit_rx).await;

        assert_eq!(shared.state(), SessionState::Starting);
        assert!(shared.connection.lock().await.is_some());
    }

    #[test]
    fn new_client_is_not_started() {
        let client = NotebookClient::new(NotebookConfig::default());
        let status = client.status();
        assert_eq!(status.state, SessionState::NotStarted);
        assert_eq!(status.notebook_id, None);
        assert_eq!(status.pending_calls, 0);
        assert_eq!(status.pid, None);
    }
}
