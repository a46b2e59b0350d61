//! Error types for the MCP server.
//!
//! Protocol, session and argument failures surface as JSON-RPC errors.
//! Remote DynamoDB failures are turned into tool payloads by the tool layer.

use serde::{Deserialize, Serialize};

use crate::gateway::GatewayError;

/// MCP server errors.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum McpError {
    /// Malformed JSON-RPC envelope.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Request body was not valid JSON.
    #[error("parse error: {0}")]
    Parse(String),

    /// Session id missing, never issued, expired or terminated.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// JSON-RPC method not served.
    #[error("unknown method: {0}")]
    MethodNotFound(String),

    /// Unknown tool requested.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// Tool registered twice under the same name.
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),

    /// Missing required argument.
    #[error("missing required argument: {0}")]
    MissingArg(String),

    /// Invalid argument value.
    #[error("invalid argument '{name}': {reason}")]
    InvalidArg {
        /// Argument name
        name: String,
        /// Reason why it's invalid
        reason: String,
    },

    /// DynamoDB rejected or failed the call.
    #[error("{0}")]
    Remote(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<GatewayError> for McpError {
    fn from(err: GatewayError) -> Self {
        McpError::Remote(err.message)
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        McpError::Protocol(format!("JSON error: {}", err))
    }
}

/// JSON-RPC error codes.
pub mod rpc_codes {
    /// Parse error - Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// Invalid Request - The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i32 = -32600;
    /// Method not found - The method does not exist / is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Invalid params - Invalid method parameter(s).
    pub const INVALID_PARAMS: i32 = -32602;
    /// Internal error - Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
    /// Server error - The session id is unknown or has expired.
    pub const SESSION_NOT_FOUND: i32 = -32001;
}

impl McpError {
    /// Convert to JSON-RPC error code.
    pub fn rpc_code(&self) -> i32 {
        match self {
            McpError::Parse(_) => rpc_codes::PARSE_ERROR,
            McpError::Protocol(_) => rpc_codes::INVALID_REQUEST,
            McpError::SessionNotFound(_) => rpc_codes::SESSION_NOT_FOUND,
            McpError::MethodNotFound(_) | McpError::UnknownTool(_) => rpc_codes::METHOD_NOT_FOUND,
            McpError::MissingArg(_) | McpError::InvalidArg { .. } => rpc_codes::INVALID_PARAMS,
            McpError::DuplicateTool(_)
            | McpError::Remote(_)
            | McpError::Io(_)
            | McpError::Internal(_) => rpc_codes::INTERNAL_ERROR,
        }
    }

    /// Whether this error describes bad tool input rather than a server fault.
    pub fn is_invalid_arguments(&self) -> bool {
        matches!(self, McpError::MissingArg(_) | McpError::InvalidArg { .. })
    }
}

/// Result type for MCP operations.
pub type Result<T> = std::result::Result<T, McpError>;
