//! JSON-RPC 2.0 envelope types and the envelope codec.
//!
//! Inbound frames are decoded exactly once, at the boundary, into a
//! [`RequestEnvelope`]. Decoding fails closed with a [`DecodeError`] and, where
//! possible, still recovers the caller's `id` so the error response can be
//! correlated.
//!
//! # Wire Shapes
//!
//! - Request: `{"jsonrpc":"2.0","id":<any|null>,"method":<string>,"params":<object>}`
//! - Success: `{"jsonrpc":"2.0","id":<echo>,"result":<object>}`
//! - Error: `{"jsonrpc":"2.0","id":<echo|null>,"error":{"code":<int>,"message":<string>}}`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name for capability negotiation.
pub const SERVER_NAME: &str = "whoop-mcp";

/// The only `jsonrpc` version accepted and emitted.
pub const JSONRPC_VERSION: &str = "2.0";

/// Largest frame, in bytes, that is parsed at all.
pub const MAX_MESSAGE_BYTES: usize = 10_000;

/// Method names are cut to this many characters before dispatch.
pub const MAX_METHOD_CHARS: usize = 100;

/// Stand-in for an absent or null `method`, so the not-found reply names it.
pub const MISSING_METHOD: &str = "None";

/// A JSON-RPC 2.0 request ID.
///
/// Carried through unmodified into the response. `Null` is used when the
/// request had no usable id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID (integer or float, preserved as sent).
    Number(Number),
    /// String request ID.
    String(String),
    /// Absent or unusable ID.
    #[default]
    Null,
}

impl RequestId {
    /// Extracts an ID from a decoded JSON value.
    ///
    /// Returns `None` for values that cannot be an ID (booleans, arrays, objects).
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            Value::Null => Some(Self::Null),
            _ => None,
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Null => write!(f, "null"),
        }
    }
}

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    /// Request identifier, echoed in the response.
    pub id: RequestId,
    /// Trimmed method name, at most [`MAX_METHOD_CHARS`] characters.
    pub method: String,
    /// Method parameters. Empty when absent.
    pub params: Map<String, Value>,
}

/// Standard JSON-RPC 2.0 error codes used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError,
    /// The method or tool does not exist.
    MethodNotFound,
    /// The request or its parameters were not acceptable.
    InvalidParams,
    /// Internal error, including tool failures.
    InternalError,
}

impl ErrorCode {
    /// Returns the numeric code for this error.
    #[must_use]
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// The error code.
    pub code: i32,
    /// A short description of the error.
    pub message: String,
}

impl ErrorObject {
    /// Creates a new error with a custom message.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
        }
    }

    /// Unknown method.
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Method not found: {method}"))
    }

    /// Unknown tool.
    #[must_use]
    pub fn tool_not_found(name: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("Tool not found: {name}"))
    }

    /// Invalid parameters.
    #[must_use]
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// Tool failure. The detail never reaches the caller.
    #[must_use]
    pub fn tool_failed() -> Self {
        Self::new(
            ErrorCode::InternalError,
            "Tool execution failed. Please check your authentication and try again.",
        )
    }
}

/// Exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Successful result.
    Result(Value),
    /// Error details.
    Error(ErrorObject),
}

/// An outbound JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Always "2.0".
    pub jsonrpc: String,
    /// The request ID this response corresponds to.
    pub id: RequestId,
    /// Result or error.
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ResponseEnvelope {
    /// Creates a new success response.
    #[must_use]
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Result(result),
        }
    }

    /// Creates a new error response.
    #[must_use]
    pub fn error(id: RequestId, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: Outcome::Error(error),
        }
    }

    /// Builds a response from a dispatch result.
    #[must_use]
    pub fn from_result(id: RequestId, result: Result<Value, ErrorObject>) -> Self {
        match result {
            Ok(value) => Self::success(id, value),
            Err(error) => Self::error(id, error),
        }
    }

    /// Returns the error object, if this is an error response.
    #[must_use]
    pub const fn error_object(&self) -> Option<&ErrorObject> {
        match &self.outcome {
            Outcome::Error(e) => Some(e),
            Outcome::Result(_) => None,
        }
    }
}

/// Why a frame was rejected before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame exceeded the byte limit and was not parsed.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    OversizedMessage {
        /// Size of the rejected frame.
        size: usize,
        /// Configured limit.
        limit: usize,
    },

    /// The frame was not valid JSON.
    #[error("malformed JSON")]
    MalformedSyntax,

    /// The JSON did not have the shape of a request.
    #[error("invalid request shape: {0}")]
    InvalidShape(&'static str),
}

impl DecodeError {
    /// The wire error code for this failure.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedSyntax => ErrorCode::ParseError,
            Self::OversizedMessage { .. } | Self::InvalidShape(_) => ErrorCode::InvalidParams,
        }
    }

    /// The message sent to the caller. Deliberately less specific than `Display`.
    #[must_use]
    pub const fn public_message(&self) -> &'static str {
        match self {
            Self::MalformedSyntax => "Invalid JSON format",
            Self::OversizedMessage { .. } | Self::InvalidShape(_) => "Invalid request format",
        }
    }
}

/// A decode error together with whatever `id` could be recovered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeFailure {
    /// Best-effort request id; `Null` when unrecoverable.
    pub id: RequestId,
    /// What went wrong.
    pub error: DecodeError,
}

impl DecodeFailure {
    const fn new(id: RequestId, error: DecodeError) -> Self {
        Self { id, error }
    }

    /// Converts the failure into the error envelope sent to the caller.
    #[must_use]
    pub fn into_response(self) -> ResponseEnvelope {
        let error = ErrorObject::new(self.error.code(), self.error.public_message());
        ResponseEnvelope::error(self.id, error)
    }
}

/// Decodes request frames and encodes responses.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeCodec {
    max_message_bytes: usize,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_BYTES)
    }
}

impl EnvelopeCodec {
    /// Creates a codec with the given frame size limit.
    #[must_use]
    pub const fn new(max_message_bytes: usize) -> Self {
        Self { max_message_bytes }
    }

    /// The frame size limit in bytes.
    #[must_use]
    pub const fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Decodes one inbound frame.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeFailure`] if the frame is oversized, not JSON, or not
    /// shaped like a request.
    pub fn decode(&self, frame: &[u8]) -> Result<RequestEnvelope, DecodeFailure> {
        if frame.len() > self.max_message_bytes {
            return Err(DecodeFailure::new(
                RequestId::Null,
                DecodeError::OversizedMessage {
                    size: frame.len(),
                    limit: self.max_message_bytes,
                },
            ));
        }

        let value: Value = serde_json::from_slice(frame)
            .map_err(|_| DecodeFailure::new(RequestId::Null, DecodeError::MalformedSyntax))?;

        let Value::Object(mut obj) = value else {
            return Err(DecodeFailure::new(
                RequestId::Null,
                DecodeError::InvalidShape("message is not an object"),
            ));
        };

        let id = match obj.get("id") {
            None => RequestId::Null,
            Some(raw) => RequestId::from_value(raw).ok_or_else(|| {
                DecodeFailure::new(RequestId::Null, DecodeError::InvalidShape("unsupported id type"))
            })?,
        };
        let fail = |reason| DecodeFailure::new(id.clone(), DecodeError::InvalidShape(reason));

        // A missing version is tolerated; a wrong one is not.
        if let Some(version) = obj.get("jsonrpc") {
            if version.as_str() != Some(JSONRPC_VERSION) {
                return Err(fail("jsonrpc field must be \"2.0\""));
            }
        }

        let method = match obj.get("method") {
            None | Some(Value::Null) => MISSING_METHOD.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => v.to_string(),
            Some(_) => return Err(fail("method is not a string")),
        };
        let method: String = method.trim().chars().take(MAX_METHOD_CHARS).collect();

        let params = match obj.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(fail("params is not an object")),
        };

        Ok(RequestEnvelope { id, method, params })
    }

    /// Encodes a response to its canonical JSON text.
    #[must_use]
    pub fn encode(response: &ResponseEnvelope) -> String {
        serde_json::to_string(response).unwrap_or_else(|e| {
            // Only reachable with a non-string map key inside a tool result.
            tracing::error!(error = %e, "Failed to serialise response envelope");
            let fallback = ResponseEnvelope::error(
                response.id.clone(),
                ErrorObject::new(ErrorCode::InternalError, "Internal server error"),
            );
            serde_json::to_string(&fallback).unwrap_or_default()
        })
    }
}
