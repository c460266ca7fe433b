//! Request dispatch for MCP sessions.
//!
//! The [`Dispatcher`] turns one inbound frame into exactly one response
//! envelope. Three methods are supported:
//!
//! 1. **`initialize`**: fixed protocol version and capability set
//! 2. **`tools/list`**: the registry's descriptors, in registration order
//! 3. **`tools/call`**: runs a registered tool and wraps its output as text
//!
//! Every failure while handling a frame is converted to an error envelope
//! here. Nothing a tool reports is relayed verbatim.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::mcp::protocol::{
    EnvelopeCodec, ErrorObject, RequestEnvelope, ResponseEnvelope, MCP_PROTOCOL_VERSION,
    SERVER_NAME,
};
use crate::tools::{ToolError, ToolRegistry};

/// Supported methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `initialize`
    Initialize,
    /// `tools/list`
    ListTools,
    /// `tools/call`
    CallTool,
}

impl Method {
    /// Resolves a method name. `None` for anything unsupported.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "initialize" => Some(Self::Initialize),
            "tools/list" => Some(Self::ListTools),
            "tools/call" => Some(Self::CallTool),
            _ => None,
        }
    }
}

/// An empty capability object, serialised as `{}`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct Capability {}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: Capability,
    /// Prompt-related capabilities.
    pub prompts: Capability,
    /// Resource-related capabilities.
    pub resources: Capability,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Result of the `initialize` method.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// Protocol version spoken by this server.
    pub protocol_version: &'static str,
    /// Advertised capabilities.
    pub capabilities: ServerCapabilities,
    /// Server identification.
    pub server_info: ServerInfo,
}

impl Default for InitializeResult {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION,
            capabilities: ServerCapabilities::default(),
            server_info: ServerInfo::default(),
        }
    }
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
}

impl ToolCallResult {
    /// Wraps a tool's output as a single text item.
    ///
    /// Strings are passed through; any other value is rendered as pretty JSON.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let text = match value {
            Value::String(s) => s,
            other => serde_json::to_string_pretty(&other).unwrap_or_else(|_| other.to_string()),
        };
        Self {
            content: vec![ToolContent::Text { text }],
        }
    }
}

/// How an absent or null tool name is reported.
const MISSING_TOOL_NAME: &str = "None";

/// Parameters for `tools/call`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    pub arguments: Map<String, Value>,
}

impl ToolCallParams {
    /// Extracts call parameters from a request's `params`.
    ///
    /// # Errors
    ///
    /// Returns a tool-not-found error naming the received value if `name` is
    /// missing or not a string, and an invalid-params error if `arguments`
    /// is present but not an object.
    pub fn parse(params: &mut Map<String, Value>) -> Result<Self, ErrorObject> {
        let name = match params.get("name") {
            Some(Value::String(name)) => name.clone(),
            None | Some(Value::Null) => return Err(ErrorObject::tool_not_found(MISSING_TOOL_NAME)),
            Some(other) => return Err(ErrorObject::tool_not_found(&other.to_string())),
        };
        let arguments = match params.remove("arguments") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(args)) => args,
            Some(_) => {
                return Err(ErrorObject::invalid_params(
                    "Invalid params: arguments must be an object",
                ))
            }
        };
        Ok(Self { name, arguments })
    }
}

/// Routes decoded requests to their handlers.
#[derive(Debug)]
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    codec: EnvelopeCodec,
}

impl Dispatcher {
    /// Creates a dispatcher over a frozen registry.
    #[must_use]
    pub const fn new(registry: Arc<ToolRegistry>, codec: EnvelopeCodec) -> Self {
        Self { registry, codec }
    }

    /// The tool registry.
    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Decodes and handles one raw frame.
    pub async fn handle_frame(&self, frame: &[u8]) -> ResponseEnvelope {
        match self.codec.decode(frame) {
            Ok(request) => self.dispatch(request).await,
            Err(failure) => {
                tracing::warn!(
                    id = %failure.id,
                    reason = %failure.error,
                    bytes = frame.len(),
                    "Rejected inbound frame"
                );
                failure.into_response()
            }
        }
    }

    /// Handles one decoded request.
    pub async fn dispatch(&self, request: RequestEnvelope) -> ResponseEnvelope {
        let RequestEnvelope { id, method, mut params } = request;
        tracing::debug!(%id, %method, "Dispatching request");

        let result = match Method::from_name(&method) {
            Some(Method::Initialize) => Ok(Self::handle_initialize()),
            Some(Method::ListTools) => Ok(self.handle_tools_list()),
            Some(Method::CallTool) => self.handle_tools_call(&mut params).await,
            None => Err(ErrorObject::method_not_found(&method)),
        };

        ResponseEnvelope::from_result(id, result)
    }

    /// Handles the initialize request.
    fn handle_initialize() -> Value {
        json!(InitializeResult::default())
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self) -> Value {
        json!({ "tools": self.registry.list() })
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(&self, params: &mut Map<String, Value>) -> Result<Value, ErrorObject> {
        let ToolCallParams { name, arguments } = ToolCallParams::parse(params)?;

        match self.registry.invoke(&name, arguments).await {
            Ok(value) => Ok(json!(ToolCallResult::from_value(value))),
            Err(ToolError::NotFound { name }) => {
                tracing::info!(tool = %name, "Call to unknown tool");
                Err(ErrorObject::tool_not_found(&name))
            }
            // Already logged in full by the registry.
            Err(_) => Err(ErrorObject::tool_failed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{ErrorCode, RequestId};
    use crate::tools::tests::registry;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(Arc::new(registry()), EnvelopeCodec::default())
    }

    async fn call(frame: &str) -> Value {
        let response = dispatcher().handle_frame(frame.as_bytes()).await;
        serde_json::to_value(response).unwrap()
    }

    #[test]
    fn method_names_are_exact() {
        assert_eq!(Method::from_name("tools/list"), Some(Method::ListTools));
        assert_eq!(Method::from_name("Tools/List"), None);
        assert_eq!(Method::from_name("ping"), None);
    }

    #[tokio::test]
    async fn initialize_ignores_params() {
        for params in [r"{}", r#"{"protocolVersion": "1999-01-01"}"#, "null"] {
            let frame = format!(r#"{{"jsonrpc":"2.0","id":1,"method":"initialize","params":{params}}}"#);
            let response = call(&frame).await;
            assert_eq!(response["result"]["protocolVersion"], MCP_PROTOCOL_VERSION);
            assert_eq!(
                response["result"]["capabilities"],
                json!({"tools": {}, "prompts": {}, "resources": {}})
            );
            assert_eq!(response["result"]["serverInfo"]["name"], SERVER_NAME);
        }
    }

    #[tokio::test]
    async fn tools_list_matches_registry() {
        let response =
            call(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list","params":{}}"#).await;
        assert_eq!(response["id"], 1);
        let tools = response["result"]["tools"].as_array().unwrap();
        assert_eq!(tools.len(), registry().len());
        assert_eq!(tools[0]["name"], "echo");
        assert!(tools[0]["inputSchema"].is_object());
    }

    #[tokio::test]
    async fn tools_call_wraps_result_as_text() {
        let response = call(
            r#"{"jsonrpc":"2.0","id":"c1","method":"tools/call","params":{"name":"echo","arguments":{"x":1}}}"#,
        )
        .await;
        assert_eq!(response["id"], "c1");
        let content = &response["result"]["content"][0];
        assert_eq!(content["type"], "text");
        let echoed: Value = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
        assert_eq!(echoed, json!({"x": 1}));
    }

    #[tokio::test]
    async fn tools_call_defaults_arguments() {
        let response =
            call(r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"echo"}}"#)
                .await;
        assert_eq!(response["result"]["content"][0]["text"], "{}");
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let response = call(
            r#"{"jsonrpc":"2.0","id":2,"method":"tools/call","params":{"name":"nonexistent","arguments":{}}}"#,
        )
        .await;
        assert_eq!(
            response,
            json!({
                "jsonrpc": "2.0",
                "id": 2,
                "error": {"code": -32601, "message": "Tool not found: nonexistent"}
            })
        );
    }

    #[tokio::test]
    async fn tool_failure_is_generic() {
        let response = call(
            r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"broken"}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], ErrorCode::InternalError.code());
        let message = response["error"]["message"].as_str().unwrap();
        assert!(!message.contains("abc123"));
        assert!(!message.contains("upstream"));
    }

    #[tokio::test]
    async fn missing_tool_name_is_tool_not_found() {
        for params in [r"{}", r#"{"name":null}"#, "null"] {
            let frame = format!(r#"{{"jsonrpc":"2.0","id":6,"method":"tools/call","params":{params}}}"#);
            let response = call(&frame).await;
            assert_eq!(
                response,
                json!({
                    "jsonrpc": "2.0",
                    "id": 6,
                    "error": {"code": -32601, "message": "Tool not found: None"}
                })
            );
        }

        let response = call(r#"{"jsonrpc":"2.0","id":6,"method":"tools/call"}"#).await;
        assert_eq!(response["error"]["message"], "Tool not found: None");
    }

    #[tokio::test]
    async fn non_string_tool_name_is_tool_not_found() {
        let response =
            call(r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":5}}"#).await;
        assert_eq!(response["id"], 7);
        assert_eq!(response["error"]["code"], ErrorCode::MethodNotFound.code());
        assert_eq!(response["error"]["message"], "Tool not found: 5");
    }

    #[tokio::test]
    async fn non_object_arguments_are_invalid_params() {
        let response = call(
            r#"{"jsonrpc":"2.0","id":7,"method":"tools/call","params":{"name":"echo","arguments":[1]}}"#,
        )
        .await;
        assert_eq!(response["error"]["code"], ErrorCode::InvalidParams.code());
    }

    #[tokio::test]
    async fn unknown_method_named_in_error() {
        let response = call(r#"{"jsonrpc":"2.0","id":8,"method":"resources/list"}"#).await;
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["message"], "Method not found: resources/list");

        let response = call(r#"{"jsonrpc":"2.0","id":8}"#).await;
        assert_eq!(response["error"]["message"], "Method not found: None");
    }

    #[tokio::test]
    async fn malformed_frame_gets_parse_error_with_null_id() {
        let response = call("{\"jsonrpc\":\"2.0\",\"id\":3,").await;
        assert_eq!(response["error"]["code"], -32700);
        assert_eq!(response["id"], Value::Null);
    }

    #[tokio::test]
    async fn oversized_frame_never_dispatched() {
        let padding = "x".repeat(10_001);
        let frame = format!(
            r#"{{"jsonrpc":"2.0","id":1,"method":"tools/call","params":{{"name":"broken","pad":"{padding}"}}}}"#
        );
        let response = dispatcher().handle_frame(frame.as_bytes()).await;
        let error = response.error_object().unwrap();
        assert_eq!(error.code, ErrorCode::InvalidParams.code());
        assert_eq!(response.id, RequestId::Null);
    }
}
