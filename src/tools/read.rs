//! Scan and query tools.
//!
//! Tools: scan_table, query_table
//!
//! Each call returns a single page exactly as DynamoDB produced it; there is
//! no pagination loop.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::convert::{item_to_json, json_object_to_item};
use crate::error::{McpError, Result};
use crate::gateway::{DynamoGateway, ItemPage, QueryRequest, ScanRequest};
use crate::params;
use crate::tools::{
    entry, non_blank, parse_args, positive_limit, remote_result, ToolDef, ToolKind, ToolOutput,
};

/// Get all scan/query tool definitions.
pub fn tools() -> Vec<(ToolKind, ToolDef)> {
    vec![
        entry(
            ToolKind::ScanTable,
            "Scans an entire table with an optional filter expression. Returns Items, \
             Count and ScannedCount for a single page.",
            params! {
                required: { "tableName": String },
                optional: {
                    "filterExpression": String,
                    "expressionAttributeValues": Object,
                    "expressionAttributeNames": StringMap,
                    "limit": Integer
                }
            },
        ),
        entry(
            ToolKind::QueryTable,
            "Queries a table using a key condition expression and an optional filter. \
             Returns Items and Count for a single page.",
            params! {
                required: {
                    "tableName": String,
                    "keyConditionExpression": String,
                    "expressionAttributeValues": Object
                },
                optional: {
                    "expressionAttributeNames": StringMap,
                    "filterExpression": String,
                    "limit": Integer
                }
            },
        ),
    ]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScanArgs {
    table_name: String,
    filter_expression: Option<String>,
    expression_attribute_values: Option<Map<String, JsonValue>>,
    expression_attribute_names: Option<HashMap<String, String>>,
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryArgs {
    table_name: String,
    key_condition_expression: String,
    expression_attribute_values: Map<String, JsonValue>,
    expression_attribute_names: Option<HashMap<String, String>>,
    filter_expression: Option<String>,
    limit: Option<i64>,
}

fn items_to_json(page: &ItemPage) -> JsonValue {
    page.items.iter().map(item_to_json).collect()
}

/// Dispatch a scan/query tool call.
pub async fn dispatch(
    gateway: &dyn DynamoGateway,
    kind: ToolKind,
    args: Map<String, JsonValue>,
) -> Result<ToolOutput> {
    match kind {
        ToolKind::ScanTable => {
            let args: ScanArgs = parse_args(args)?;
            let request = ScanRequest {
                table_name: args.table_name,
                filter_expression: non_blank(args.filter_expression),
                expression_attribute_values: args
                    .expression_attribute_values
                    .filter(|values| !values.is_empty())
                    .map(|values| json_object_to_item(&values)),
                expression_attribute_names: args
                    .expression_attribute_names
                    .filter(|names| !names.is_empty()),
                limit: positive_limit(args.limit),
            };
            Ok(remote_result(gateway.scan(request).await.map(|page| {
                json!({
                    "Items": items_to_json(&page),
                    "Count": page.count,
                    "ScannedCount": page.scanned_count,
                })
            })))
        }

        ToolKind::QueryTable => {
            let args: QueryArgs = parse_args(args)?;
            let request = QueryRequest {
                table_name: args.table_name,
                key_condition_expression: args.key_condition_expression,
                expression_attribute_values: json_object_to_item(&args.expression_attribute_values),
                expression_attribute_names: args
                    .expression_attribute_names
                    .filter(|names| !names.is_empty()),
                filter_expression: non_blank(args.filter_expression),
                limit: positive_limit(args.limit),
            };
            Ok(remote_result(gateway.query(request).await.map(|page| {
                json!({
                    "Items": items_to_json(&page),
                    "Count": page.count,
                })
            })))
        }

        _ => Err(McpError::UnknownTool(kind.name().to_string())),
    }
}
