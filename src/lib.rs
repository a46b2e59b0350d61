//! # dynamodb-mcp
//!
//! MCP (Model Context Protocol) server for Amazon DynamoDB.
//!
//! This crate exposes DynamoDB table, item, scan/query and index operations as
//! tools for AI agents. It implements MCP's streamable HTTP transport: JSON-RPC
//! 2.0 over `POST /mcp`, with sessions carried in the `mcp-session-id` header.
//!
//! ## Features
//!
//! - **12 tools**: list_tables, describe_table, create_table, update_capacity,
//!   put_item, get_item, update_item, scan_table, query_table, create_gsi,
//!   update_gsi, create_lsi
//! - **Plain JSON items**: tool arguments and results use ordinary JSON; the
//!   DynamoDB attribute encoding is handled internally
//! - **Sessions**: issued on `initialize`, expired after an idle window
//! - **JSON or SSE**: responses are framed per request from the `Accept` header
//!
//! ## Usage
//!
//! ```text
//! dynamodb-mcp --port 8000 --region us-east-1
//! dynamodb-mcp --endpoint-url http://localhost:8001   # DynamoDB Local
//! ```
//!
//! ## Library Usage
//!
//! For testing or embedding, assemble the server from its parts:
//!
//! ```no_run
//! use std::sync::Arc;
//! use dynamodb_mcp::{http, AwsGateway, AwsGatewayConfig, McpServer, ServerConfig, SessionManager};
//!
//! # async fn run() -> std::io::Result<()> {
//! let config = ServerConfig::default();
//! let gateway = AwsGateway::connect(AwsGatewayConfig::default()).await;
//! let sessions = Arc::new(SessionManager::new(config.session_idle_timeout));
//! let server = Arc::new(McpServer::new(Arc::new(gateway), sessions));
//!
//! let listener = tokio::net::TcpListener::bind(config.addr).await?;
//! http::serve(listener, http::router(server, &config)).await
//! # }
//! ```

#![warn(missing_docs)]

pub mod convert;
pub mod error;
pub mod gateway;
pub mod http;
pub mod server;
pub mod session;
pub mod tools;

pub use convert::{attr_to_json, item_to_json, json_to_attr};
pub use error::{McpError, Result};
pub use gateway::aws::AwsGatewayConfig;
pub use gateway::{AwsGateway, DynamoGateway, GatewayError};
pub use http::ServerConfig;
pub use server::{JsonRpcRequest, JsonRpcResponse, McpServer, Reply};
pub use session::SessionManager;
pub use tools::{ToolDef, ToolOutput, ToolRegistry};
