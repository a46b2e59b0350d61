//! MCP server for Amazon DynamoDB.
//!
//! Run with `dynamodb-mcp` to serve on `0.0.0.0:8000` against the default AWS
//! account, or `dynamodb-mcp --endpoint-url http://localhost:8001` for DynamoDB Local.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use dynamodb_mcp::{http, session, AwsGateway, AwsGatewayConfig, McpServer, ServerConfig, SessionManager};

/// MCP server for Amazon DynamoDB.
///
/// Exposes DynamoDB operations as MCP tools for AI agents.
/// Communicates via JSON-RPC 2.0 over streamable HTTP at /mcp.
#[derive(Parser)]
#[command(name = "dynamodb-mcp")]
#[command(version, about, long_about = None)]
struct Args {
    /// Address to bind.
    #[arg(long, env = "MCP_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "MCP_PORT", default_value_t = 8000)]
    port: u16,

    /// AWS region. Falls back to the SDK's default provider chain.
    #[arg(long, env = "AWS_REGION", value_name = "REGION")]
    region: Option<String>,

    /// Custom DynamoDB endpoint, e.g. DynamoDB Local.
    #[arg(long, env = "DYNAMODB_ENDPOINT_URL", value_name = "URL")]
    endpoint_url: Option<String>,

    /// Seconds of inactivity before a session expires.
    #[arg(long, env = "MCP_SESSION_IDLE_SECS", default_value_t = 1800)]
    session_idle_secs: u64,

    /// Deadline for a single DynamoDB call, in seconds.
    #[arg(long, env = "DYNAMODB_CALL_TIMEOUT_SECS", default_value_t = 30)]
    call_timeout_secs: u64,

    /// Always answer with application/json, never text/event-stream.
    #[arg(long, env = "MCP_JSON_RESPONSE")]
    json_response: bool,

    /// Enable debug logging to stderr.
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Set up logging
    let default_directives = if args.verbose {
        "dynamodb_mcp=debug,tower_http=debug"
    } else {
        "dynamodb_mcp=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives)),
        )
        .with_writer(std::io::stderr)
        .init();

    let addr: SocketAddr = match tokio::net::lookup_host((args.host.as_str(), args.port))
        .await
        .map(|mut addrs| addrs.next())
    {
        Ok(Some(addr)) => addr,
        Ok(None) => {
            eprintln!("Error: '{}' did not resolve to any address", args.host);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: Invalid listen address '{}:{}': {}", args.host, args.port, e);
            std::process::exit(1);
        }
    };

    let config = ServerConfig {
        addr,
        json_response: args.json_response,
        session_idle_timeout: Duration::from_secs(args.session_idle_secs),
    };

    // Connect to DynamoDB
    let gateway = AwsGateway::connect(AwsGatewayConfig {
        region: args.region,
        endpoint_url: args.endpoint_url,
        call_timeout: Some(Duration::from_secs(args.call_timeout_secs)),
    })
    .await;

    // Create sessions and server
    let sessions = Arc::new(SessionManager::new(config.session_idle_timeout));
    let _sweeper = session::spawn_sweeper(&sessions);
    let server = Arc::new(McpServer::new(Arc::new(gateway), sessions));
    let app = http::router(server, &config);

    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("Error: Failed to bind {}: {}", config.addr, e);
            std::process::exit(1);
        }
    };

    tracing::info!("web console: http://{}/", config.addr);
    tracing::info!("MCP endpoint: http://{}/mcp", config.addr);
    tracing::info!("health check: http://{}/health", config.addr);

    // Run the server
    if let Err(e) = http::serve(listener, app).await {
        eprintln!("Error: Server error: {}", e);
        std::process::exit(1);
    }
}
