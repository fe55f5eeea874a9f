//! stdio transport for the notebook client.
//!
//! This module implements the client side of the MCP stdio transport:
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives our requests
//! - stdout: carries the server's responses and notifications
//! - stderr: may be used for logging (not MCP messages)
//!
//! # Thread Safety
//!
//! Any number of tasks may send through one [`MessageWriter`]; each message
//! is written as a single line under a lock. Reading is done by one
//! [`pump_output`] task per process.

use std::io;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::mcp::framing::LineFramer;
use crate::mcp::pending::PendingCalls;
use crate::mcp::protocol::{parse_message, IncomingMessage};

/// Write half of a notebook process.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read half of a notebook process.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

const READ_CHUNK: usize = 8 * 1024;

/// Serialises messages onto the notebook's stdin, one line per message.
pub struct MessageWriter {
    writer: Mutex<BoxedWriter>,
}

impl MessageWriter {
    /// Wraps the write half of a process.
    #[must_use]
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Writes one message followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn send<T: Serialize + Sync>(&self, message: &T) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // MCP stdio framing: messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        let mut line = json.into_bytes();
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;

        Ok(())
    }
}

/// Counters reported when the output stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpSummary {
    /// Responses delivered to a waiting call.
    pub settled: usize,
    /// Well-formed messages nobody was waiting for.
    pub dropped: usize,
    /// Lines that were not usable JSON-RPC, including over-long ones.
    pub malformed: usize,
}

/// Reads the notebook's stdout until EOF, settling calls as responses arrive.
///
/// # Errors
///
/// Returns an error if reading from the stream fails.
pub async fn pump_output<R>(mut reader: R, registry: &PendingCalls) -> io::Result<PumpSummary>
where
    R: AsyncRead + Unpin,
{
    let mut framer = LineFramer::new();
    let mut summary = PumpSummary::default();
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let read = reader.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        for line in framer.push(&chunk[..read]) {
            dispatch_line(&line, registry, &mut summary);
        }
    }

    summary.malformed += framer.discarded();
    if let Some(tail) = framer.finish() {
        dispatch_line(&tail, registry, &mut summary);
    }

    Ok(summary)
}

fn dispatch_line(line: &str, registry: &PendingCalls, summary: &mut PumpSummary) {
    if line.trim().is_empty() {
        return;
    }

    match parse_message(line) {
        Ok(IncomingMessage::Response { id, outcome }) => {
            if registry.settle(&id, outcome) {
                summary.settled += 1;
            } else {
                tracing::debug!(%id, "Dropping response with no pending call");
                summary.dropped += 1;
            }
        }
        Ok(IncomingMessage::Notification { method, .. }) => {
            tracing::debug!(%method, "Ignoring notification from notebook");
            summary.dropped += 1;
        }
        Ok(IncomingMessage::Request { id, method }) => {
            tracing::warn!(%id, %method, "Ignoring request from notebook");
            summary.dropped += 1;
        }
        Err(reason) => {
            tracing::debug!(%reason, len = line.len(), "Discarding malformed line");
            summary.malformed += 1;
        }
    }
}
