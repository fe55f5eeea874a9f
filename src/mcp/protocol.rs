//! JSON-RPC 2.0 message types for talking to an MCP server.
//!
//! This module defines the envelopes the notebook client sends and receives.
//! All messages follow the JSON-RPC 2.0 specification with MCP-specific extensions.
//!
//! # Message Types
//!
//! - **Request**: A message expecting a response (has `id`)
//! - **Response**: A reply to a request (success or error)
//! - **Notification**: A one-way message (no `id`, no response expected)
//!
//! # MCP-Specific Constraints
//!
//! - Request IDs must be strings or integers (never `null`)
//! - Request IDs must be unique within a session

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The MCP protocol version this client requests.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Client name sent during capability negotiation.
pub const CLIENT_NAME: &str = "notebook-proxy";

/// Method names used by the client.
pub mod methods {
    /// Capability negotiation request.
    pub const INITIALIZE: &str = "initialize";
    /// Notification sent once the initialize response has arrived.
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Tool invocation request.
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Tool names exposed by the notebook server.
pub mod tools {
    /// Lists the notebooks available to the account.
    pub const NOTEBOOK_LIST: &str = "notebook_list";
    /// Asks a question against one notebook.
    pub const NOTEBOOK_QUERY: &str = "notebook_query";
}

/// A JSON-RPC 2.0 request ID.
///
/// Per the MCP specification, IDs must be strings or integers, never `null`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

/// An outgoing JSON-RPC 2.0 request (client to server).
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingRequest {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// Unique request identifier.
    pub id: RequestId,

    /// The method to invoke.
    pub method: String,

    /// Parameters for the method.
    pub params: Value,
}

impl OutgoingRequest {
    /// Creates a new request.
    #[must_use]
    pub fn new(id: RequestId, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// An outgoing JSON-RPC 2.0 notification (client to server).
#[derive(Debug, Clone, Serialize)]
pub struct OutgoingNotification {
    /// Always "2.0".
    pub jsonrpc: &'static str,

    /// The notification method.
    pub method: String,

    /// Optional parameters for the notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl OutgoingNotification {
    /// Creates a new outgoing notification.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }

    /// The `notifications/initialized` message that completes the handshake.
    #[must_use]
    pub fn initialized() -> Self {
        Self::new(methods::INITIALIZED, Some(Value::Object(Map::new())))
    }
}

/// A JSON-RPC 2.0 error object returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i64,

    /// A short description of the error.
    pub message: String,

    /// Additional information about the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcErrorData {
    /// Code given to `error` members that carry none of their own.
    pub const UNKNOWN_CODE: i64 = 0;

    /// Decodes an `error` member of any shape.
    ///
    /// A standard error object is taken as is. Anything else keeps the raw
    /// value in `data`, with a message taken from the value itself.
    #[must_use]
    pub fn from_value(raw: Value) -> Self {
        if let Ok(error) = Self::deserialize(&raw) {
            return error;
        }

        let message = match &raw {
            Value::String(text) => text.clone(),
            Value::Object(obj) => obj
                .get("message")
                .and_then(Value::as_str)
                .map_or_else(|| raw.to_string(), str::to_string),
            other => other.to_string(),
        };
        let code = raw
            .get("code")
            .and_then(Value::as_i64)
            .unwrap_or(Self::UNKNOWN_CODE);

        Self {
            code,
            message,
            data: Some(raw),
        }
    }
}

impl std::fmt::Display for JsonRpcErrorData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// A message received from the server, classified by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingMessage {
    /// A reply to one of our requests.
    Response {
        /// The ID of the request being answered.
        id: RequestId,
        /// `result` on success, `error` on failure.
        outcome: Result<Value, JsonRpcErrorData>,
    },
    /// A one-way message from the server.
    Notification {
        /// The notification method.
        method: String,
        /// Notification parameters, if any.
        params: Option<Value>,
    },
    /// A server-initiated request. This client does not serve any methods.
    Request {
        /// The server's request ID.
        id: RequestId,
        /// The requested method.
        method: String,
    },
}

/// Why a line from the server could not be used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedMessage {
    /// The line is not JSON.
    NotJson,
    /// The line is JSON but not an object.
    NotJsonRpc,
    /// A response carries no usable `id`.
    MissingId,
}

impl std::fmt::Display for MalformedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NotJson => "not valid JSON",
            Self::NotJsonRpc => "not a JSON-RPC message",
            Self::MissingId => "response without id",
        };
        f.write_str(text)
    }
}

/// Parses one framed line into an incoming message.
///
/// Responses are matched on `id` alone; a missing or wrong `jsonrpc` marker
/// is tolerated. An `error` member of any shape wins over `result`.
///
/// # Errors
///
/// Returns a [`MalformedMessage`] describing why the line was rejected.
pub fn parse_message(line: &str) -> Result<IncomingMessage, MalformedMessage> {
    let value: Value = serde_json::from_str(line).map_err(|_| MalformedMessage::NotJson)?;

    let Value::Object(mut obj) = value else {
        return Err(MalformedMessage::NotJsonRpc);
    };

    if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
        tracing::debug!("Message without jsonrpc 2.0 marker");
    }

    let id = match obj.remove("id") {
        None | Some(Value::Null) => None,
        Some(raw) => Some(
            serde_json::from_value::<RequestId>(raw).map_err(|_| MalformedMessage::MissingId)?,
        ),
    };

    if let Some(Value::String(method)) = obj.remove("method") {
        return Ok(match id {
            Some(id) => IncomingMessage::Request { id, method },
            None => IncomingMessage::Notification {
                method,
                params: obj.remove("params"),
            },
        });
    }

    let id = id.ok_or(MalformedMessage::MissingId)?;
    let outcome = match obj.remove("error").filter(|error| !error.is_null()) {
        Some(error) => Err(JsonRpcErrorData::from_value(error)),
        None => Ok(obj.remove("result").unwrap_or(Value::Null)),
    };

    Ok(IncomingMessage::Response { id, outcome })
}

/// Parameters for the `initialize` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by the client.
    pub protocol_version: &'static str,
    /// Client capabilities (none are advertised).
    pub capabilities: Value,
    /// Client information.
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION,
            capabilities: Value::Object(Map::new()),
            client_info: ClientInfo::default(),
        }
    }
}

/// Client information sent during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: CLIENT_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Parameters for a `tools/call` request.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    pub arguments: Value,
}

/// One content block of a tool result.
///
/// Servers are inconsistent about `type`, so every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContentBlock {
    /// Block type, usually `"text"`.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Text payload.
    #[serde(default)]
    pub text: Option<String>,
}

/// Result of a `tools/call` request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    /// Whether the tool call resulted in an error.
    #[serde(default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Returns the text of the first block that has any.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| block.text.as_deref())
    }
}
