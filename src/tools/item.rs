//! Item tools.
//!
//! Tools: put_item, get_item, update_item

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::convert::{item_to_json, json_object_to_item};
use crate::error::{McpError, Result};
use crate::gateway::{DynamoGateway, ReturnValues, UpdateItemRequest};
use crate::params;
use crate::tools::{entry, non_blank, parse_args, remote_result, ToolDef, ToolKind, ToolOutput};

/// Get all item tool definitions.
pub fn tools() -> Vec<(ToolKind, ToolDef)> {
    vec![
        entry(
            ToolKind::PutItem,
            "Inserts or replaces an item in a table. The item is a plain JSON object; \
             strings, numbers, booleans, null, lists and nested objects are supported.",
            params! {
                required: { "tableName": String, "item": Object }
            },
        ),
        entry(
            ToolKind::GetItem,
            "Retrieves an item from a table by its primary key. Returns an empty object \
             when no item matches.",
            params! {
                required: { "tableName": String, "key": Object }
            },
        ),
        entry(
            ToolKind::UpdateItem,
            "Updates specific attributes of an item using an update expression. \
             returnValues is one of NONE, ALL_OLD, UPDATED_OLD, ALL_NEW, UPDATED_NEW.",
            params! {
                required: {
                    "tableName": String,
                    "key": Object,
                    "updateExpression": String,
                    "expressionAttributeNames": StringMap,
                    "expressionAttributeValues": Object
                },
                optional: {
                    "conditionExpression": String,
                    "returnValues": String = "ALL_NEW"
                }
            },
        ),
    ]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PutItemArgs {
    table_name: String,
    item: Map<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetItemArgs {
    table_name: String,
    key: Map<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateItemArgs {
    table_name: String,
    key: Map<String, JsonValue>,
    update_expression: String,
    expression_attribute_names: HashMap<String, String>,
    expression_attribute_values: Map<String, JsonValue>,
    condition_expression: Option<String>,
    #[serde(default)]
    return_values: ReturnValues,
}

/// Dispatch an item tool call.
pub async fn dispatch(
    gateway: &dyn DynamoGateway,
    kind: ToolKind,
    args: Map<String, JsonValue>,
) -> Result<ToolOutput> {
    match kind {
        ToolKind::PutItem => {
            let args: PutItemArgs = parse_args(args)?;
            let item = json_object_to_item(&args.item);
            Ok(remote_result(
                gateway
                    .put_item(&args.table_name, item)
                    .await
                    .map(|()| json!({ "status": "success" })),
            ))
        }

        ToolKind::GetItem => {
            let args: GetItemArgs = parse_args(args)?;
            let key = json_object_to_item(&args.key);
            Ok(remote_result(
                gateway
                    .get_item(&args.table_name, key)
                    .await
                    .map(|found| found.as_ref().map_or_else(|| json!({}), item_to_json)),
            ))
        }

        ToolKind::UpdateItem => {
            let args: UpdateItemArgs = parse_args(args)?;
            let request = UpdateItemRequest {
                table_name: args.table_name,
                key: json_object_to_item(&args.key),
                update_expression: args.update_expression,
                expression_attribute_names: args.expression_attribute_names,
                expression_attribute_values: json_object_to_item(&args.expression_attribute_values),
                condition_expression: non_blank(args.condition_expression),
                return_values: args.return_values,
            };
            Ok(remote_result(
                gateway.update_item(request).await.map(|attrs| item_to_json(&attrs)),
            ))
        }

        _ => Err(McpError::UnknownTool(kind.name().to_string())),
    }
}
