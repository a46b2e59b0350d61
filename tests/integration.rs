//! Integration tests for the MCP server.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use parking_lot::Mutex;
use serde_json::{json, Map, Value as JsonValue};
use tower::ServiceExt;

use dynamodb_mcp::convert::Item;
use dynamodb_mcp::error::rpc_codes;
use dynamodb_mcp::gateway::{
    CreateGsiRequest, CreateTableRequest, DynamoGateway, GatewayError, ItemPage, KeyType,
    ListTablesRequest, Projection, QueryRequest, ReturnValues, ScanRequest, TableList, Throughput,
    UpdateItemRequest,
};
use dynamodb_mcp::{http, McpError, McpServer, ServerConfig, SessionManager, ToolOutput, ToolRegistry};

/// One remote call as seen by the fake gateway.
#[derive(Debug, Clone, PartialEq)]
enum Call {
    ListTables(ListTablesRequest),
    DescribeTable(String),
    CreateTable(CreateTableRequest),
    UpdateCapacity(String, Throughput),
    PutItem(String, Item),
    GetItem(String, Item),
    UpdateItem(UpdateItemRequest),
    Scan(ScanRequest),
    Query(QueryRequest),
    CreateGsi(CreateGsiRequest),
    UpdateGsi(String, String, Throughput),
}

/// In-memory gateway that records every call.
#[derive(Default)]
struct FakeGateway {
    tables: Vec<String>,
    items: Mutex<HashMap<String, Vec<Item>>>,
    calls: Mutex<Vec<Call>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl FakeGateway {
    fn new() -> Self {
        Self {
            tables: vec!["Orders".to_string(), "Users".to_string()],
            ..Self::default()
        }
    }

    fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new()
        }
    }

    fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new()
        }
    }

    fn seed(&self, table: &str, item: Item) {
        self.items
            .lock()
            .entry(table.to_string())
            .or_default()
            .push(item);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    async fn record(&self, call: Call) -> Result<(), GatewayError> {
        self.calls.lock().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(GatewayError::new(message.clone())),
            None => Ok(()),
        }
    }

    fn stored(&self, table: &str) -> Vec<Item> {
        self.items.lock().get(table).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl DynamoGateway for FakeGateway {
    async fn list_tables(&self, request: ListTablesRequest) -> Result<TableList, GatewayError> {
        self.record(Call::ListTables(request)).await?;
        Ok(TableList {
            table_names: self.tables.clone(),
            last_evaluated_table_name: None,
        })
    }

    async fn describe_table(&self, table_name: &str) -> Result<JsonValue, GatewayError> {
        self.record(Call::DescribeTable(table_name.to_string())).await?;
        Ok(json!({ "TableName": table_name, "TableStatus": "ACTIVE" }))
    }

    async fn create_table(&self, request: CreateTableRequest) -> Result<String, GatewayError> {
        let arn = format!("arn:aws:dynamodb:us-east-1:000000000000:table/{}", request.table_name);
        self.record(Call::CreateTable(request)).await?;
        Ok(arn)
    }

    async fn update_capacity(
        &self,
        table_name: &str,
        throughput: Throughput,
    ) -> Result<String, GatewayError> {
        self.record(Call::UpdateCapacity(table_name.to_string(), throughput))
            .await?;
        Ok(format!("arn:aws:dynamodb:us-east-1:000000000000:table/{}", table_name))
    }

    async fn put_item(&self, table_name: &str, item: Item) -> Result<(), GatewayError> {
        self.record(Call::PutItem(table_name.to_string(), item.clone()))
            .await?;
        self.seed(table_name, item);
        Ok(())
    }

    async fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, GatewayError> {
        self.record(Call::GetItem(table_name.to_string(), key.clone()))
            .await?;
        Ok(self
            .stored(table_name)
            .into_iter()
            .find(|item| key.iter().all(|(k, v)| item.get(k) == Some(v))))
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item, GatewayError> {
        let key = request.key.clone();
        self.record(Call::UpdateItem(request)).await?;
        let mut attrs = key;
        attrs.insert("qty".to_string(), AttributeValue::N("4".to_string()));
        Ok(attrs)
    }

    async fn scan(&self, request: ScanRequest) -> Result<ItemPage, GatewayError> {
        let items = self.stored(&request.table_name);
        self.record(Call::Scan(request)).await?;
        let count = items.len() as i32;
        Ok(ItemPage {
            items,
            count,
            scanned_count: count + 1,
        })
    }

    async fn query(&self, request: QueryRequest) -> Result<ItemPage, GatewayError> {
        let items = self.stored(&request.table_name);
        self.record(Call::Query(request)).await?;
        let count = items.len() as i32;
        Ok(ItemPage {
            items,
            count,
            scanned_count: count,
        })
    }

    async fn create_gsi(&self, request: CreateGsiRequest) -> Result<(), GatewayError> {
        self.record(Call::CreateGsi(request)).await
    }

    async fn update_gsi(
        &self,
        table_name: &str,
        index_name: &str,
        throughput: Throughput,
    ) -> Result<(), GatewayError> {
        self.record(Call::UpdateGsi(
            table_name.to_string(),
            index_name.to_string(),
            throughput,
        ))
        .await
    }
}

fn args_map(args: JsonValue) -> Map<String, JsonValue> {
    match args {
        JsonValue::Object(m) => m,
        _ => Map::new(),
    }
}

/// Helper to dispatch a tool call.
async fn call_tool(gateway: &FakeGateway, name: &str, args: JsonValue) -> ToolOutput {
    ToolRegistry::new()
        .dispatch(gateway, name, args_map(args))
        .await
        .unwrap_or_else(|e| panic!("Tool {} failed: {}", name, e))
}

/// Helper to dispatch a tool call and expect an error.
async fn call_tool_err(gateway: &FakeGateway, name: &str, args: JsonValue) -> McpError {
    match ToolRegistry::new()
        .dispatch(gateway, name, args_map(args))
        .await
    {
        Ok(output) => panic!("Expected tool {} to fail, got {:?}", name, output),
        Err(err) => err,
    }
}

fn s(value: &str) -> AttributeValue {
    AttributeValue::S(value.to_string())
}

fn n(value: &str) -> AttributeValue {
    AttributeValue::N(value.to_string())
}

// =============================================================================
// Table Tools
// =============================================================================

#[tokio::test]
async fn test_list_tables() {
    let gateway = FakeGateway::new();
    let output = call_tool(&gateway, "list_tables", json!({})).await;
    assert!(!output.is_error);
    assert_eq!(
        output.value,
        json!({"TableNames": ["Orders", "Users"], "LastEvaluatedTableName": null})
    );
    assert_eq!(gateway.calls(), vec![Call::ListTables(ListTablesRequest::default())]);
}

#[tokio::test]
async fn test_list_tables_ignores_empty_paging_args() {
    let gateway = FakeGateway::new();
    call_tool(
        &gateway,
        "list_tables",
        json!({"limit": 0, "exclusiveStartTableName": ""}),
    )
    .await;
    call_tool(
        &gateway,
        "list_tables",
        json!({"limit": 10, "exclusiveStartTableName": "Orders"}),
    )
    .await;
    assert_eq!(
        gateway.calls(),
        vec![
            Call::ListTables(ListTablesRequest::default()),
            Call::ListTables(ListTablesRequest {
                limit: Some(10),
                exclusive_start_table_name: Some("Orders".to_string()),
            }),
        ]
    );
}

#[tokio::test]
async fn test_describe_table() {
    let gateway = FakeGateway::new();
    let output = call_tool(&gateway, "describe_table", json!({"tableName": "Orders"})).await;
    assert_eq!(output.value["TableStatus"], "ACTIVE");
    assert_eq!(gateway.calls(), vec![Call::DescribeTable("Orders".to_string())]);
}

#[tokio::test]
async fn test_create_table_defaults() {
    let gateway = FakeGateway::new();
    let output = call_tool(
        &gateway,
        "create_table",
        json!({"tableName": "Orders", "partitionKey": "id", "partitionKeyType": "S"}),
    )
    .await;
    assert_eq!(output.value["status"], "creating");
    assert_eq!(
        output.value["tableArn"],
        "arn:aws:dynamodb:us-east-1:000000000000:table/Orders"
    );

    let Call::CreateTable(request) = &gateway.calls()[0] else {
        panic!("expected a create_table call");
    };
    assert_eq!(request.key_schema.partition.name, "id");
    assert_eq!(request.key_schema.partition.key_type, KeyType::S);
    assert!(request.key_schema.sort.is_none());
    assert_eq!(request.throughput, Throughput { read: 5, write: 5 });
}

#[tokio::test]
async fn test_create_table_with_sort_key() {
    let gateway = FakeGateway::new();
    call_tool(
        &gateway,
        "create_table",
        json!({
            "tableName": "Events",
            "partitionKey": "pk",
            "partitionKeyType": "S",
            "sortKey": "ts",
            "sortKeyType": "N",
            "readCapacity": "10",
            "writeCapacity": 2
        }),
    )
    .await;

    let Call::CreateTable(request) = &gateway.calls()[0] else {
        panic!("expected a create_table call");
    };
    let sort = request.key_schema.sort.as_ref().unwrap();
    assert_eq!(sort.name, "ts");
    assert_eq!(sort.key_type, KeyType::N);
    assert_eq!(request.throughput, Throughput { read: 10, write: 2 });
}

#[tokio::test]
async fn test_create_table_rejects_bad_keys() {
    let gateway = FakeGateway::new();
    let err = call_tool_err(
        &gateway,
        "create_table",
        json!({"tableName": "T", "partitionKey": "id", "partitionKeyType": "X"}),
    )
    .await;
    assert!(err.is_invalid_arguments());

    let err = call_tool_err(
        &gateway,
        "create_table",
        json!({"tableName": "T", "partitionKey": "id", "partitionKeyType": "S", "sortKey": "ts"}),
    )
    .await;
    assert!(err.is_invalid_arguments());
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_update_capacity() {
    let gateway = FakeGateway::new();
    let output = call_tool(
        &gateway,
        "update_capacity",
        json!({"tableName": "Orders", "readCapacity": 20, "writeCapacity": 15}),
    )
    .await;
    assert_eq!(output.value["status"], "updating");
    assert_eq!(
        gateway.calls(),
        vec![Call::UpdateCapacity(
            "Orders".to_string(),
            Throughput { read: 20, write: 15 }
        )]
    );
}

// =============================================================================
// Item Tools
// =============================================================================

#[tokio::test]
async fn test_put_item_encodes_attributes() {
    let gateway = FakeGateway::new();
    let output = call_tool(
        &gateway,
        "put_item",
        json!({"tableName": "Orders", "item": {"id": "42", "qty": 3, "paid": true}}),
    )
    .await;
    assert_eq!(output.value, json!({"status": "success"}));

    let expected: Item = [
        ("id".to_string(), s("42")),
        ("qty".to_string(), n("3")),
        ("paid".to_string(), AttributeValue::Bool(true)),
    ]
    .into_iter()
    .collect();
    assert_eq!(gateway.calls(), vec![Call::PutItem("Orders".to_string(), expected)]);
}

#[tokio::test]
async fn test_get_item_missing_returns_empty_object() {
    let gateway = FakeGateway::new();
    let output = call_tool(
        &gateway,
        "get_item",
        json!({"tableName": "Orders", "key": {"id": "nope"}}),
    )
    .await;
    assert!(!output.is_error);
    assert_eq!(output.value, json!({}));
}

#[tokio::test]
async fn test_put_then_get_item() {
    let gateway = FakeGateway::new();
    let item = json!({
        "id": "42",
        "qty": 3,
        "price": 9.5,
        "tags": ["a", "b"],
        "meta": {"gift": false, "note": null}
    });
    call_tool(&gateway, "put_item", json!({"tableName": "Orders", "item": item})).await;

    let output = call_tool(
        &gateway,
        "get_item",
        json!({"tableName": "Orders", "key": {"id": "42"}}),
    )
    .await;
    assert_eq!(output.value, item);
}

#[tokio::test]
async fn test_update_item() {
    let gateway = FakeGateway::new();
    let output = call_tool(
        &gateway,
        "update_item",
        json!({
            "tableName": "Orders",
            "key": {"id": "42"},
            "updateExpression": "SET #q = :q",
            "expressionAttributeNames": {"#q": "qty"},
            "expressionAttributeValues": {":q": 4}
        }),
    )
    .await;
    assert_eq!(output.value, json!({"id": "42", "qty": 4}));

    let Call::UpdateItem(request) = &gateway.calls()[0] else {
        panic!("expected an update_item call");
    };
    assert_eq!(request.return_values, ReturnValues::AllNew);
    assert_eq!(request.expression_attribute_values.get(":q"), Some(&n("4")));
    assert_eq!(request.expression_attribute_names.get("#q").map(String::as_str), Some("qty"));
    assert!(request.condition_expression.is_none());
}

#[tokio::test]
async fn test_update_item_rejects_unknown_return_values() {
    let gateway = FakeGateway::new();
    let err = call_tool_err(
        &gateway,
        "update_item",
        json!({
            "tableName": "Orders",
            "key": {"id": "42"},
            "updateExpression": "SET #q = :q",
            "expressionAttributeNames": {"#q": "qty"},
            "expressionAttributeValues": {":q": 4},
            "returnValues": "EVERYTHING"
        }),
    )
    .await;
    assert!(err.is_invalid_arguments());
    assert!(gateway.calls().is_empty());
}

// =============================================================================
// Scan / Query Tools
// =============================================================================

#[tokio::test]
async fn test_scan_table() {
    let gateway = FakeGateway::new();
    gateway.seed("Orders", [("id".to_string(), s("1"))].into_iter().collect());
    gateway.seed("Orders", [("id".to_string(), s("2"))].into_iter().collect());

    let output = call_tool(
        &gateway,
        "scan_table",
        json!({"tableName": "Orders", "filterExpression": "", "limit": -1}),
    )
    .await;
    assert_eq!(
        output.value,
        json!({"Items": [{"id": "1"}, {"id": "2"}], "Count": 2, "ScannedCount": 3})
    );
    assert_eq!(
        gateway.calls(),
        vec![Call::Scan(ScanRequest {
            table_name: "Orders".to_string(),
            ..ScanRequest::default()
        })]
    );
}

#[tokio::test]
async fn test_query_table() {
    let gateway = FakeGateway::new();
    gateway.seed(
        "Orders",
        [("id".to_string(), s("1")), ("qty".to_string(), n("2"))]
            .into_iter()
            .collect(),
    );

    let output = call_tool(
        &gateway,
        "query_table",
        json!({
            "tableName": "Orders",
            "keyConditionExpression": "id = :id",
            "expressionAttributeValues": {":id": "1"},
            "limit": 5
        }),
    )
    .await;
    assert_eq!(output.value, json!({"Items": [{"id": "1", "qty": 2}], "Count": 1}));

    let Call::Query(request) = &gateway.calls()[0] else {
        panic!("expected a query call");
    };
    assert_eq!(request.limit, Some(5));
    assert_eq!(request.expression_attribute_values.get(":id"), Some(&s("1")));
    assert!(request.expression_attribute_names.is_none());
}

// =============================================================================
// Index Tools
// =============================================================================

#[tokio::test]
async fn test_create_gsi() {
    let gateway = FakeGateway::new();
    let output = call_tool(
        &gateway,
        "create_gsi",
        json!({
            "tableName": "Orders",
            "indexName": "byCustomer",
            "partitionKey": "customer",
            "partitionKeyType": "S",
            "projectionType": "INCLUDE",
            "nonKeyAttributes": ["total"]
        }),
    )
    .await;
    assert_eq!(output.value, json!({"status": "creating", "indexName": "byCustomer"}));

    let Call::CreateGsi(request) = &gateway.calls()[0] else {
        panic!("expected a create_gsi call");
    };
    assert_eq!(request.projection, Projection::Include(vec!["total".to_string()]));
    assert_eq!(request.throughput, Throughput { read: 5, write: 5 });
}

#[tokio::test]
async fn test_create_gsi_default_projection() {
    let gateway = FakeGateway::new();
    call_tool(
        &gateway,
        "create_gsi",
        json!({
            "tableName": "Orders",
            "indexName": "byStatus",
            "partitionKey": "status",
            "partitionKeyType": "S",
            "nonKeyAttributes": ["total"]
        }),
    )
    .await;
    let Call::CreateGsi(request) = &gateway.calls()[0] else {
        panic!("expected a create_gsi call");
    };
    assert_eq!(request.projection, Projection::All);
}

#[tokio::test]
async fn test_update_gsi() {
    let gateway = FakeGateway::new();
    let output = call_tool(
        &gateway,
        "update_gsi",
        json!({"tableName": "Orders", "indexName": "byCustomer", "readCapacity": 8, "writeCapacity": 3}),
    )
    .await;
    assert_eq!(output.value, json!({"status": "updating", "indexName": "byCustomer"}));
    assert_eq!(
        gateway.calls(),
        vec![Call::UpdateGsi(
            "Orders".to_string(),
            "byCustomer".to_string(),
            Throughput { read: 8, write: 3 }
        )]
    );
}

#[tokio::test]
async fn test_create_lsi_always_fails() {
    let gateway = FakeGateway::new();
    for args in [
        json!({}),
        json!({
            "tableName": "Orders",
            "indexName": "byDate",
            "partitionKey": "id",
            "partitionKeyType": "S",
            "sortKey": "date",
            "sortKeyType": "S"
        }),
    ] {
        let output = call_tool(&gateway, "create_lsi", args).await;
        assert!(output.is_error);
        assert_eq!(
            output.value,
            json!({"error": "Local Secondary Indexes can only be created during table creation. Use create_table with LSI specification."})
        );
    }
    assert!(gateway.calls().is_empty());
}

// =============================================================================
// Error Handling
// =============================================================================

#[tokio::test]
async fn test_remote_failure_is_payload() {
    let gateway = FakeGateway::failing("ResourceNotFoundException: Requested resource not found");
    let output = call_tool(&gateway, "describe_table", json!({"tableName": "Ghost"})).await;
    assert!(output.is_error);
    assert_eq!(
        output.value,
        json!({"error": "ResourceNotFoundException: Requested resource not found"})
    );
}

#[tokio::test]
async fn test_unknown_tool() {
    let gateway = FakeGateway::new();
    let err = call_tool_err(&gateway, "drop_table", json!({"tableName": "Orders"})).await;
    assert!(matches!(err, McpError::UnknownTool(ref name) if name == "drop_table"));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_missing_required_arg() {
    let gateway = FakeGateway::new();
    let err = call_tool_err(&gateway, "put_item", json!({"tableName": "Orders"})).await;
    assert!(matches!(err, McpError::MissingArg(ref name) if name == "item"));
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_wrong_argument_type() {
    let gateway = FakeGateway::new();
    let err = call_tool_err(
        &gateway,
        "put_item",
        json!({"tableName": "Orders", "item": "not an object"}),
    )
    .await;
    assert!(err.is_invalid_arguments());
    assert!(gateway.calls().is_empty());
}

// =============================================================================
// Registry
// =============================================================================

#[test]
fn test_tool_count() {
    let registry = ToolRegistry::new();
    assert_eq!(registry.tools().len(), 12);
}

#[test]
fn test_tool_order() {
    let registry = ToolRegistry::new();
    let names: Vec<&str> = registry.tools().map(|t| t.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "list_tables",
            "describe_table",
            "create_table",
            "update_capacity",
            "put_item",
            "get_item",
            "update_item",
            "scan_table",
            "query_table",
            "create_gsi",
            "update_gsi",
            "create_lsi",
        ]
    );
}

#[test]
fn test_all_tools_have_required_fields() {
    let registry = ToolRegistry::new();
    for tool in registry.tools() {
        assert!(!tool.name.is_empty(), "Tool has empty name");
        assert!(!tool.description.is_empty(), "Tool {} has empty description", tool.name);
        let listing = tool.to_listing();
        assert_eq!(listing["inputSchema"]["type"], "object", "Tool {} schema", tool.name);
        assert!(listing["inputSchema"]["properties"].is_object());
        assert!(listing["inputSchema"]["required"].is_array());
    }
}

#[test]
fn test_no_duplicate_tool_names() {
    let registry = ToolRegistry::new();
    let mut names: Vec<&str> = registry.tools().map(|t| t.name.as_str()).collect();
    let total = names.len();
    names.sort_unstable();
    names.dedup();
    assert_eq!(names.len(), total, "Duplicate tool names found");
}

// =============================================================================
// Protocol
// =============================================================================

fn new_server(gateway: Arc<FakeGateway>) -> McpServer {
    McpServer::new(gateway, Arc::new(SessionManager::default()))
}

fn rpc(id: u64, method: &str, params: JsonValue) -> Vec<u8> {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
        .to_string()
        .into_bytes()
}

async fn initialize(server: &McpServer) -> String {
    let reply = server
        .handle_message(None, &rpc(0, "initialize", json!({"protocolVersion": "2024-11-05"})))
        .await;
    reply.session_id.expect("initialize should issue a session")
}

#[tokio::test]
async fn test_initialize() {
    let server = new_server(Arc::new(FakeGateway::new()));
    let reply = server
        .handle_message(
            Some("stale-id"),
            &rpc(1, "initialize", json!({"protocolVersion": "2025-03-26"})),
        )
        .await;
    let session_id = reply.session_id.clone().unwrap();
    assert!(server.sessions().validate(&session_id).is_ok());

    let result = reply.response.unwrap().result.unwrap();
    assert_eq!(result["protocolVersion"], "2025-03-26");
    assert_eq!(result["serverInfo"]["name"], "dynamodb-mcp-server");
    assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
}

#[tokio::test]
async fn test_tools_list_and_call() {
    let gateway = Arc::new(FakeGateway::new());
    let server = new_server(gateway.clone());
    let session_id = initialize(&server).await;

    let reply = server
        .handle_message(Some(&session_id), &rpc(2, "tools/list", json!({})))
        .await;
    let result = reply.response.unwrap().result.unwrap();
    assert_eq!(result["tools"].as_array().unwrap().len(), 12);
    assert_eq!(result["tools"][0]["name"], "list_tables");

    let reply = server
        .handle_message(
            Some(&session_id),
            &rpc(3, "tools/call", json!({"name": "list_tables"})),
        )
        .await;
    let response = reply.response.unwrap();
    assert_eq!(response.id, Some(json!(3)));
    let result = response.result.unwrap();
    assert_eq!(result["isError"], false);
    assert_eq!(
        result["structuredContent"],
        json!({"TableNames": ["Orders", "Users"], "LastEvaluatedTableName": null})
    );
    let text: JsonValue =
        serde_json::from_str(result["content"][0]["text"].as_str().unwrap()).unwrap();
    assert_eq!(text, result["structuredContent"]);
}

#[tokio::test]
async fn test_tools_call_remote_failure_sets_is_error() {
    let server = new_server(Arc::new(FakeGateway::failing("AccessDeniedException: no")));
    let session_id = initialize(&server).await;
    let reply = server
        .handle_message(
            Some(&session_id),
            &rpc(4, "tools/call", json!({"name": "describe_table", "arguments": {"tableName": "T"}})),
        )
        .await;
    let result = reply.response.unwrap().result.unwrap();
    assert_eq!(result["isError"], true);
    assert_eq!(result["structuredContent"]["error"], "AccessDeniedException: no");
}

#[tokio::test]
async fn test_tools_call_errors() {
    let gateway = Arc::new(FakeGateway::new());
    let server = new_server(gateway.clone());
    let session_id = initialize(&server).await;

    let cases = [
        (json!({"name": "nope"}), rpc_codes::METHOD_NOT_FOUND),
        (json!({"name": "get_item", "arguments": {"tableName": "T"}}), rpc_codes::INVALID_PARAMS),
        (json!({"name": "list_tables", "arguments": [1, 2]}), rpc_codes::INVALID_PARAMS),
        (json!({"arguments": {}}), rpc_codes::INVALID_PARAMS),
    ];
    for (params, code) in cases {
        let reply = server
            .handle_message(Some(&session_id), &rpc(5, "tools/call", params.clone()))
            .await;
        assert_eq!(reply.response.unwrap().error_code(), Some(code), "params {}", params);
    }
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_session_is_rejected() {
    let gateway = Arc::new(FakeGateway::new());
    let server = new_server(gateway.clone());
    initialize(&server).await;

    let reply = server
        .handle_message(
            Some("never-issued"),
            &rpc(6, "tools/call", json!({"name": "list_tables"})),
        )
        .await;
    let response = reply.response.unwrap();
    assert_eq!(response.error_code(), Some(rpc_codes::SESSION_NOT_FOUND));
    assert_eq!(response.id, Some(json!(6)));
    assert!(gateway.calls().is_empty());

    let reply = server
        .handle_message(None, &rpc(7, "tools/list", json!({})))
        .await;
    assert_eq!(
        reply.response.unwrap().error_code(),
        Some(rpc_codes::SESSION_NOT_FOUND)
    );
}

#[tokio::test]
async fn test_expired_session_is_rejected() {
    let server = McpServer::new(
        Arc::new(FakeGateway::new()),
        Arc::new(SessionManager::new(Duration::ZERO)),
    );
    let session_id = initialize(&server).await;
    let reply = server
        .handle_message(Some(&session_id), &rpc(1, "ping", json!({})))
        .await;
    assert_eq!(
        reply.response.unwrap().error_code(),
        Some(rpc_codes::SESSION_NOT_FOUND)
    );
}

#[tokio::test]
async fn test_malformed_envelopes() {
    let server = new_server(Arc::new(FakeGateway::new()));
    let session_id = initialize(&server).await;

    let cases: [(&[u8], i32); 4] = [
        (b"{not json", rpc_codes::PARSE_ERROR),
        (br#"{"jsonrpc": "1.0", "id": 1, "method": "ping"}"#, rpc_codes::INVALID_REQUEST),
        (br#"{"jsonrpc": "2.0", "id": 1}"#, rpc_codes::INVALID_REQUEST),
        (br#"[{"jsonrpc": "2.0", "id": 1, "method": "ping"}]"#, rpc_codes::INVALID_REQUEST),
    ];
    for (body, code) in cases {
        let reply = server.handle_message(Some(&session_id), body).await;
        assert_eq!(reply.response.unwrap().error_code(), Some(code));
        assert!(reply.session_id.is_none());
    }

    let reply = server
        .handle_message(Some(&session_id), br#"{"jsonrpc": "2.0", "id": 9}"#)
        .await;
    assert_eq!(reply.response.unwrap().id, Some(json!(9)));
}

#[tokio::test]
async fn test_ping_notification_and_unknown_method() {
    let server = new_server(Arc::new(FakeGateway::new()));
    let session_id = initialize(&server).await;

    let reply = server
        .handle_message(Some(&session_id), &rpc(1, "ping", json!({})))
        .await;
    assert_eq!(reply.response.unwrap().result, Some(json!({})));

    let reply = server
        .handle_message(
            Some(&session_id),
            br#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#,
        )
        .await;
    assert!(reply.response.is_none());

    let reply = server
        .handle_message(Some(&session_id), &rpc(2, "resources/list", json!({})))
        .await;
    assert_eq!(
        reply.response.unwrap().error_code(),
        Some(rpc_codes::METHOD_NOT_FOUND)
    );
}

#[tokio::test]
async fn test_notification_requires_known_session() {
    let server = new_server(Arc::new(FakeGateway::new()));
    initialize(&server).await;
    let notification = br#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;

    let reply = server
        .handle_message(Some("never-issued"), notification)
        .await;
    assert!(reply.response.is_none());
    assert_eq!(reply.error_code(), Some(rpc_codes::SESSION_NOT_FOUND));

    let reply = server.handle_message(None, notification).await;
    assert!(reply.response.is_none());
    assert_eq!(reply.error_code(), Some(rpc_codes::SESSION_NOT_FOUND));
}

#[tokio::test]
async fn test_null_id_is_a_request() {
    let server = new_server(Arc::new(FakeGateway::new()));
    let session_id = initialize(&server).await;
    let message = br#"{"jsonrpc": "2.0", "id": null, "method": "tools/list"}"#;

    let reply = server.handle_message(Some(&session_id), message).await;
    let response = reply.response.unwrap();
    assert_eq!(response.id, Some(JsonValue::Null));
    assert_eq!(response.result.unwrap()["tools"].as_array().unwrap().len(), 12);

    let reply = server.handle_message(Some("never-issued"), message).await;
    let response = reply.response.unwrap();
    assert_eq!(response.id, Some(JsonValue::Null));
    assert_eq!(response.error_code(), Some(rpc_codes::SESSION_NOT_FOUND));
}

#[tokio::test]
async fn test_concurrent_calls_keep_their_ids() {
    let gateway = Arc::new(FakeGateway::with_delay(Duration::from_millis(20)));
    let server = new_server(gateway.clone());
    let session_id = initialize(&server).await;

    let first = rpc(
        101,
        "tools/call",
        json!({"name": "describe_table", "arguments": {"tableName": "Orders"}}),
    );
    let second = rpc(
        202,
        "tools/call",
        json!({"name": "describe_table", "arguments": {"tableName": "Users"}}),
    );
    let (a, b) = tokio::join!(
        server.handle_message(Some(&session_id), &first),
        server.handle_message(Some(&session_id), &second),
    );

    let a = a.response.unwrap();
    let b = b.response.unwrap();
    assert_eq!(a.id, Some(json!(101)));
    assert_eq!(b.id, Some(json!(202)));
    assert_eq!(a.result.unwrap()["structuredContent"]["TableName"], "Orders");
    assert_eq!(b.result.unwrap()["structuredContent"]["TableName"], "Users");
    assert_eq!(gateway.calls().len(), 2);
}

// =============================================================================
// HTTP Transport
// =============================================================================

fn test_router(gateway: Arc<FakeGateway>) -> axum::Router {
    let server = Arc::new(new_server(gateway));
    http::router(server, &ServerConfig::default())
}

fn post_mcp(session_id: Option<&str>, accept: &str, body: JsonValue) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json")
        .header("accept", accept);
    if let Some(id) = session_id {
        builder = builder.header(http::MCP_SESSION_ID_HEADER, id);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn http_initialize(app: &axum::Router) -> String {
    let response = app
        .clone()
        .oneshot(post_mcp(
            None,
            "application/json",
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    response
        .headers()
        .get(http::MCP_SESSION_ID_HEADER)
        .expect("session header")
        .to_str()
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn test_http_health() {
    let app = test_router(Arc::new(FakeGateway::new()));
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: JsonValue = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(body, json!({"status": "healthy", "service": "dynamodb-mcp-server"}));
}

#[tokio::test]
async fn test_http_console() {
    let app = test_router(Arc::new(FakeGateway::new()));
    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("/mcp"));
    assert!(html.contains("list_tables"));
}

#[tokio::test]
async fn test_http_json_and_sse_carry_same_payload() {
    let app = test_router(Arc::new(FakeGateway::new()));
    let session_id = http_initialize(&app).await;
    let call = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {"name": "list_tables", "arguments": {}}
    });

    let response = app
        .clone()
        .oneshot(post_mcp(Some(&session_id), "application/json", call.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
    let json_body = body_text(response).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            Some(&session_id),
            "application/json, text/event-stream",
            call,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let sse_body = body_text(response).await;
    assert!(sse_body.contains("event: message"));
    let data: Vec<&str> = sse_body
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect();
    assert_eq!(data, vec![json_body.as_str()]);
}

#[tokio::test]
async fn test_http_status_mapping() {
    let app = test_router(Arc::new(FakeGateway::new()));
    let session_id = http_initialize(&app).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            Some("never-issued"),
            "application/json",
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(post_mcp(
            Some(&session_id),
            "application/json",
            json!({"jsonrpc": "2.0", "id": 2}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post_mcp(
            Some(&session_id),
            "application/json",
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(post_mcp(
            Some(&session_id),
            "application/json",
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "nope"}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/mcp").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_http_notification_with_unknown_session() {
    let app = test_router(Arc::new(FakeGateway::new()));
    http_initialize(&app).await;

    let response = app
        .clone()
        .oneshot(post_mcp(
            Some("never-issued"),
            "application/json",
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.is_empty());

    let response = app
        .oneshot(post_mcp(
            Some("never-issued"),
            "application/json, text/event-stream",
            json!({"jsonrpc": "2.0", "id": null, "method": "tools/list"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(body_text(response).await.contains("\"id\":null"));
}

#[tokio::test]
async fn test_http_delete_terminates_session() {
    let app = test_router(Arc::new(FakeGateway::new()));
    let session_id = http_initialize(&app).await;

    let delete = |id: &str| {
        Request::delete("/mcp")
            .header(http::MCP_SESSION_ID_HEADER, id)
            .body(Body::empty())
            .unwrap()
    };

    let response = app.clone().oneshot(delete(&session_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app.clone().oneshot(delete(&session_id)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .oneshot(post_mcp(
            Some(&session_id),
            "application/json",
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_http_forced_json_response() {
    let server = Arc::new(new_server(Arc::new(FakeGateway::new())));
    let config = ServerConfig {
        json_response: true,
        ..ServerConfig::default()
    };
    let app = http::router(server, &config);

    let response = app
        .oneshot(post_mcp(
            None,
            "text/event-stream",
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"}),
        ))
        .await
        .unwrap();
    assert!(response.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("application/json"));
}
