//! Scripted in-memory notebook server for integration tests.
//!
//! [`FakeNotebook`] implements [`ProcessLauncher`] with `tokio::io::duplex`
//! pipes instead of a child process. Each request is answered by a script
//! closure; everything received is recorded for assertions.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notebook_proxy::config::NotebookConfig;
use notebook_proxy::error::{ClientError, ClientResult};
use notebook_proxy::mcp::{LaunchedProcess, ProcessLauncher};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tokio::sync::oneshot;

/// How the fake server answers one request.
pub enum Reply {
    /// Respond with `result`.
    Result(Value),
    /// Respond with `result` after a delay, without blocking other requests.
    Delayed(Duration, Value),
    /// Respond with a JSON-RPC error.
    Error(i64, String),
    /// Respond with this object verbatim, plus the request's `id`.
    Envelope(Value),
    /// Never respond.
    Silent,
    /// Exit with the given code instead of responding.
    Exit(Option<i32>),
}

type Script = dyn Fn(&str, &Value) -> Reply + Send + Sync;

/// A request or notification seen by the fake server.
#[derive(Debug, Clone)]
pub struct Received {
    pub method: String,
    pub params: Value,
    pub is_request: bool,
}

pub struct FakeNotebook {
    script: Arc<Script>,
    launches: AtomicUsize,
    received: Arc<Mutex<Vec<Received>>>,
    fail_launch: bool,
}

impl FakeNotebook {
    pub fn new(script: impl Fn(&str, &Value) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(script),
            launches: AtomicUsize::new(0),
            received: Arc::new(Mutex::new(Vec::new())),
            fail_launch: false,
        })
    }

    /// A launcher whose every launch fails like a missing binary.
    pub fn unlaunchable() -> Arc<Self> {
        Arc::new(Self {
            script: Arc::new(|_: &str, _: &Value| Reply::Silent),
            launches: AtomicUsize::new(0),
            received: Arc::new(Mutex::new(Vec::new())),
            fail_launch: true,
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<Received> {
        self.received.lock().unwrap().clone()
    }

    /// Requests for `method`, in arrival order.
    pub fn requests(&self, method: &str) -> Vec<Value> {
        self.received()
            .into_iter()
            .filter(|r| r.is_request && r.method == method)
            .map(|r| r.params)
            .collect()
    }

    /// `tools/call` requests for `tool`, as their `arguments`.
    pub fn tool_calls(&self, tool: &str) -> Vec<Value> {
        self.requests("tools/call")
            .into_iter()
            .filter(|params| params["name"] == tool)
            .map(|params| params["arguments"].clone())
            .collect()
    }

    pub fn notifications(&self) -> Vec<String> {
        self.received()
            .into_iter()
            .filter(|r| !r.is_request)
            .map(|r| r.method)
            .collect()
    }
}

impl ProcessLauncher for FakeNotebook {
    fn launch(&self) -> ClientResult<LaunchedProcess> {
        let n = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_launch {
            return Err(ClientError::Spawn {
                program: "fake-notebook".to_string(),
                source: Arc::new(std::io::Error::from(std::io::ErrorKind::NotFound)),
            });
        }

        let (client_stdin, server_in) = tokio::io::duplex(64 * 1024);
        let (server_out, client_stdout) = tokio::io::duplex(64 * 1024);
        let (exit_tx, exit_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel();

        tokio::spawn(serve(
            server_in,
            server_out,
            Arc::clone(&self.script),
            Arc::clone(&self.received),
            exit_tx,
            kill_rx,
        ));

        Ok(LaunchedProcess {
            pid: Some(1000 + u32::try_from(n).unwrap()),
            stdin: Box::new(client_stdin),
            stdout: Box::new(client_stdout),
            exit: exit_rx,
            kill: kill_tx,
        })
    }
}

async fn write_line(out: &tokio::sync::Mutex<DuplexStream>, message: &Value) {
    let mut line = serde_json::to_string(message).unwrap();
    line.push('\n');
    let mut out = out.lock().await;
    let _ = out.write_all(line.as_bytes()).await;
    let _ = out.flush().await;
}

async fn serve(
    server_in: DuplexStream,
    server_out: DuplexStream,
    script: Arc<Script>,
    received: Arc<Mutex<Vec<Received>>>,
    exit_tx: oneshot::Sender<Option<i32>>,
    mut kill_rx: oneshot::Receiver<()>,
) {
    let out = Arc::new(tokio::sync::Mutex::new(server_out));
    let mut lines = BufReader::new(server_in).lines();

    let code = loop {
        let line = tokio::select! {
            _ = &mut kill_rx => break None,
            line = lines.next_line() => line,
        };
        let Ok(Some(line)) = line else {
            break Some(0);
        };

        let message: Value = serde_json::from_str(&line).unwrap();
        let method = message["method"].as_str().unwrap_or_default().to_string();
        let params = message.get("params").cloned().unwrap_or(Value::Null);
        let id = message.get("id").cloned();

        received.lock().unwrap().push(Received {
            method: method.clone(),
            params: params.clone(),
            is_request: id.is_some(),
        });

        let Some(id) = id else {
            continue;
        };

        match script(&method, &params) {
            Reply::Result(result) => {
                write_line(&out, &json!({"jsonrpc": "2.0", "id": id, "result": result})).await;
            }
            Reply::Delayed(delay, result) => {
                let out = Arc::clone(&out);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    write_line(&out, &json!({"jsonrpc": "2.0", "id": id, "result": result}))
                        .await;
                });
            }
            Reply::Error(code, message) => {
                let error = json!({"code": code, "message": message});
                write_line(&out, &json!({"jsonrpc": "2.0", "id": id, "error": error})).await;
            }
            Reply::Envelope(mut envelope) => {
                envelope["id"] = id;
                write_line(&out, &envelope).await;
            }
            Reply::Silent => {}
            Reply::Exit(code) => break code,
        }
    };

    drop(out);
    let _ = exit_tx.send(code);
}

/// A typical `initialize` result.
pub fn initialize_result() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "capabilities": {"tools": {}},
        "serverInfo": {"name": "fake-notebook", "version": "0.0.1"}
    })
}

/// A `tools/call` result carrying one text block.
pub fn tool_text(text: &str) -> Value {
    json!({"content": [{"type": "text", "text": text}]})
}

/// Name of the tool a `tools/call` request targets.
pub fn tool_name(params: &Value) -> &str {
    params["name"].as_str().unwrap_or_default()
}

/// The `query` argument of a `notebook_query` call.
pub fn query_text(params: &Value) -> &str {
    params["arguments"]["query"].as_str().unwrap_or_default()
}

/// A server that lists `listing` and answers every query with
/// `"answer to <query>"`.
pub fn echo_server(listing: &'static str) -> Arc<FakeNotebook> {
    FakeNotebook::new(move |method, params| match (method, tool_name(params)) {
        ("initialize", _) => Reply::Result(initialize_result()),
        ("tools/call", "notebook_list") => Reply::Result(tool_text(listing)),
        ("tools/call", "notebook_query") => {
            Reply::Result(tool_text(&format!("answer to {}", query_text(params))))
        }
        _ => Reply::Error(-32601, format!("Method not found: {method}")),
    })
}

/// Listing with one keyword match that is not first.
pub const NLT_LISTING: &str =
    r#"[{"id":"xyz","title":"Other"},{"id":"abc","title":"NLT Notebook"}]"#;

/// Notebook settings with a short call timeout.
pub fn test_config(call_timeout_secs: u64) -> NotebookConfig {
    NotebookConfig {
        command: "fake-notebook".to_string(),
        call_timeout_secs,
        ..NotebookConfig::default()
    }
}
