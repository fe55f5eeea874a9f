//! notebook-proxy: HTTP backend that answers dashboard questions through a
//! notebook MCP server.
//!
//! The notebook server runs as a child process speaking JSON-RPC 2.0 over
//! stdio. One [`mcp::NotebookClient`] owns that process for the lifetime of
//! the application and multiplexes every caller's requests over it.
//!
//! # Architecture
//!
//! - **Client**: lazy start, `initialize` handshake, notebook discovery,
//!   concurrent calls matched by request ID, timeouts and exit handling
//! - **HTTP facade**: chat, status, notebook control, ratio report and
//!   executive summaries
//! - **Publish**: writes the same data as static JSON snapshots
//!
//! # Modules
//!
//! - [`api`] — HTTP routes
//! - [`config`] — Configuration loading and validation
//! - [`error`] — Error types
//! - [`mcp`] — MCP client and process supervision
//! - [`publish`] — Snapshot command
//! - [`report`] — Ratio report and executive summaries

pub mod api;
pub mod config;
pub mod error;
pub mod mcp;
pub mod publish;
pub mod report;
