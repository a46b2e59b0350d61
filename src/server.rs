//! MCP server implementation.
//!
//! Handles JSON-RPC 2.0 messages according to the MCP protocol specification.
//! Transport-agnostic: the HTTP layer hands over the raw body and the
//! `mcp-session-id` header and renders the returned [`Reply`].

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{rpc_codes, McpError, Result};
use crate::gateway::DynamoGateway;
use crate::session::SessionManager;
use crate::tools::{ToolDef, ToolOutput, ToolRegistry};

/// Protocol versions we can speak, oldest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

/// Version offered when the client asks for one we don't know.
pub const LATEST_PROTOCOL_VERSION: &str = "2025-06-18";

/// Server information.
pub const SERVER_NAME: &str = "dynamodb-mcp-server";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    /// Protocol version; must be "2.0".
    pub jsonrpc: String,
    /// Request id. `None` only when the member is absent; `"id": null`
    /// is `Some(Null)`.
    #[serde(default, deserialize_with = "present_id")]
    pub id: Option<JsonValue>,
    /// Method name.
    pub method: String,
    /// Method parameters.
    #[serde(default)]
    pub params: Option<JsonValue>,
}

fn present_id<'de, D>(deserializer: D) -> std::result::Result<Option<JsonValue>, D::Error>
where
    D: Deserializer<'de>,
{
    JsonValue::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    /// Requests without an `id` member are notifications and get no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// JSON-RPC 2.0 response.
///
/// `id` is always serialized; it is `null` when the request id could not be read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Protocol version, always "2.0".
    pub jsonrpc: String,
    /// Id of the request being answered.
    pub id: Option<JsonValue>,
    /// Method result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    /// Error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code, see [`rpc_codes`].
    pub code: i32,
    /// Human-readable message.
    pub message: String,
    /// Extra error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<JsonValue>, result: JsonValue) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonValue>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
        }
    }

    /// Create an error response from an McpError.
    pub fn from_error(id: Option<JsonValue>, err: McpError) -> Self {
        Self::error(id, err.rpc_code(), err.to_string())
    }

    /// Error code, if this is an error response.
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// Outcome of handling one message.
#[derive(Debug, Clone)]
pub struct Reply {
    /// Response to send back; `None` for notifications.
    pub response: Option<JsonRpcResponse>,
    /// Session id issued by this message (set by `initialize` only).
    pub session_id: Option<String>,
    rejected: Option<i32>,
}

impl Reply {
    fn respond(response: JsonRpcResponse) -> Self {
        Self {
            response: Some(response),
            session_id: None,
            rejected: None,
        }
    }

    fn accepted() -> Self {
        Self {
            response: None,
            session_id: None,
            rejected: None,
        }
    }

    /// A notification that failed; there is no body, only the error code.
    fn rejected(err: &McpError) -> Self {
        Self {
            response: None,
            session_id: None,
            rejected: Some(err.rpc_code()),
        }
    }

    /// Error code of the response, or of a rejected notification.
    pub fn error_code(&self) -> Option<i32> {
        self.response
            .as_ref()
            .and_then(JsonRpcResponse::error_code)
            .or(self.rejected)
    }
}

/// Pick the protocol version to answer `initialize` with.
pub fn negotiate_protocol_version(requested: Option<&str>) -> &'static str {
    requested
        .and_then(|r| SUPPORTED_PROTOCOL_VERSIONS.iter().find(|v| **v == r))
        .copied()
        .unwrap_or(LATEST_PROTOCOL_VERSION)
}

/// Wrap a tool payload in the MCP tools/call result envelope.
pub fn tool_result(output: ToolOutput) -> JsonValue {
    let text = serde_json::to_string(&output.value).unwrap_or_else(|_| "null".to_string());
    serde_json::json!({
        "content": [{
            "type": "text",
            "text": text
        }],
        "structuredContent": output.value,
        "isError": output.is_error
    })
}

/// MCP server.
///
/// Cheap to share behind an `Arc`; every request is handled independently.
pub struct McpServer {
    registry: Arc<ToolRegistry>,
    sessions: Arc<SessionManager>,
    gateway: Arc<dyn DynamoGateway>,
}

impl McpServer {
    /// Create a new MCP server over the given gateway and session table.
    pub fn new(gateway: Arc<dyn DynamoGateway>, sessions: Arc<SessionManager>) -> Self {
        Self {
            registry: Arc::new(ToolRegistry::new()),
            sessions,
            gateway,
        }
    }

    /// Session table.
    pub fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Tool registry.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Handle a raw request body.
    ///
    /// Bodies that are not JSON, batches, and envelopes missing `method`
    /// produce an error response without touching any session.
    pub async fn handle_message(&self, session_id: Option<&str>, body: &[u8]) -> Reply {
        let raw: JsonValue = match serde_json::from_slice(body) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("unparseable request body: {}", e);
                return Reply::respond(JsonRpcResponse::from_error(
                    None,
                    McpError::Parse(e.to_string()),
                ));
            }
        };

        if raw.is_array() {
            return Reply::respond(JsonRpcResponse::from_error(
                None,
                McpError::Protocol("batch requests are not supported".to_string()),
            ));
        }

        let id = raw.get("id").cloned();
        match serde_json::from_value::<JsonRpcRequest>(raw) {
            Ok(request) => self.handle_request(session_id, request).await,
            Err(e) => {
                tracing::warn!("malformed JSON-RPC envelope: {}", e);
                Reply::respond(JsonRpcResponse::from_error(
                    id,
                    McpError::Protocol(e.to_string()),
                ))
            }
        }
    }

    /// Handle a single JSON-RPC request.
    pub async fn handle_request(&self, session_id: Option<&str>, request: JsonRpcRequest) -> Reply {
        // Validate JSON-RPC version
        if request.jsonrpc != "2.0" {
            return Reply::respond(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_REQUEST,
                "Invalid JSON-RPC version".to_string(),
            ));
        }
        if request.method.is_empty() {
            return Reply::respond(JsonRpcResponse::error(
                request.id,
                rpc_codes::INVALID_REQUEST,
                "Missing method".to_string(),
            ));
        }

        if request.method == "initialize" {
            return self.handle_initialize(request);
        }

        if let Err(err) = self.check_session(session_id) {
            tracing::warn!(method = %request.method, "rejected request: {}", err);
            if request.is_notification() {
                return Reply::rejected(&err);
            }
            return Reply::respond(JsonRpcResponse::from_error(request.id, err));
        }

        if request.is_notification() {
            tracing::debug!(method = %request.method, "notification received");
            return Reply::accepted();
        }

        // Route to appropriate handler
        let response = match request.method.as_str() {
            "ping" => JsonRpcResponse::success(request.id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(request),
            "tools/call" => self.handle_tools_call(request).await,
            _ => JsonRpcResponse::from_error(
                request.id,
                McpError::MethodNotFound(request.method.clone()),
            ),
        };
        Reply::respond(response)
    }

    fn check_session(&self, session_id: Option<&str>) -> Result<()> {
        match session_id {
            Some(id) => self.sessions.touch(id),
            None => Err(McpError::SessionNotFound(
                "missing mcp-session-id header".to_string(),
            )),
        }
    }

    /// Handle the initialize request.
    fn handle_initialize(&self, request: JsonRpcRequest) -> Reply {
        let requested = request
            .params
            .as_ref()
            .and_then(|p| p.get("protocolVersion"))
            .and_then(JsonValue::as_str);
        let version = negotiate_protocol_version(requested);
        let session = self.sessions.create();

        if request.is_notification() {
            return Reply {
                session_id: Some(session.id),
                ..Reply::accepted()
            };
        }

        let response = JsonRpcResponse::success(
            request.id,
            serde_json::json!({
                "protocolVersion": version,
                "capabilities": {
                    "tools": {
                        "listChanged": false
                    }
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": SERVER_VERSION
                }
            }),
        );
        Reply {
            session_id: Some(session.id),
            ..Reply::respond(response)
        }
    }

    /// Handle the tools/list request.
    fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let tools: Vec<JsonValue> = self.registry.tools().map(ToolDef::to_listing).collect();

        JsonRpcResponse::success(request.id, serde_json::json!({ "tools": tools }))
    }

    /// Handle the tools/call request.
    async fn handle_tools_call(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        // Extract name and arguments from params
        let params = match &request.params {
            Some(JsonValue::Object(obj)) => obj,
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "Missing params object".to_string(),
                )
            }
        };

        let name = match params.get("name").and_then(|v| v.as_str()) {
            Some(n) => n.to_string(),
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "Missing 'name' in params".to_string(),
                )
            }
        };

        let arguments = match params.get("arguments") {
            Some(JsonValue::Object(obj)) => obj.clone(),
            Some(JsonValue::Null) | None => Map::new(),
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    rpc_codes::INVALID_PARAMS,
                    "'arguments' must be an object".to_string(),
                )
            }
        };

        // Dispatch the tool call
        match self
            .registry
            .dispatch(self.gateway.as_ref(), &name, arguments)
            .await
        {
            Ok(output) => {
                if output.is_error {
                    tracing::warn!(tool = %name, "tool reported failure: {}", output.value);
                }
                JsonRpcResponse::success(request.id, tool_result(output))
            }
            Err(err) => {
                tracing::warn!(tool = %name, "tool call rejected: {}", err);
                JsonRpcResponse::from_error(request.id, err)
            }
        }
    }
}
