//! Model Context Protocol (MCP) client for the notebook server.
//!
//! The notebook server runs as a child process and speaks JSON-RPC 2.0 over
//! its stdin/stdout. This module owns that process and multiplexes concurrent
//! calls over the single pipe pair.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       NotebookClient                         │
//! │                                                              │
//! │   callers ──▶ register ──▶ MessageWriter ──▶ child stdin     │
//! │                  │                                           │
//! │                  ▼                                           │
//! │            PendingCalls ◀── pump_output ◀── child stdout     │
//! │                  ▲                                           │
//! │                  └──── fail_all ◀── exit watcher             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod client;
pub mod discovery;
pub mod framing;
pub mod pending;
pub mod process;
pub mod protocol;
pub mod transport;

pub use client::{unwrap_answer, ClientStatus, NotebookClient};
pub use discovery::{select_notebook, Selection, SelectionSource};
pub use process::{CommandLauncher, LaunchedProcess, ProcessLauncher, SessionState};
pub use protocol::{JsonRpcErrorData, RequestId, ToolCallResult, MCP_PROTOCOL_VERSION};
