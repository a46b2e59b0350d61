//! Table lifecycle tools.
//!
//! Tools: list_tables, describe_table, create_table, update_capacity

use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::gateway::{
    CreateTableRequest, DynamoGateway, KeyAttribute, KeySchema, KeyType, ListTablesRequest,
    Throughput,
};
use crate::params;
use crate::tools::{
    entry, non_blank, parse_args, positive_limit, remote_result, ToolDef, ToolKind, ToolOutput,
};

/// Get all table tool definitions.
pub fn tools() -> Vec<(ToolKind, ToolDef)> {
    vec![
        entry(
            ToolKind::ListTables,
            "Lists all DynamoDB tables in the account. Returns TableNames and \
             LastEvaluatedTableName; pass it back as exclusiveStartTableName for the next page.",
            params! {
                optional: { "limit": Integer, "exclusiveStartTableName": String }
            },
        ),
        entry(
            ToolKind::DescribeTable,
            "Gets detailed information about a DynamoDB table: key schema, attribute \
             definitions, status, throughput and secondary indexes.",
            params! {
                required: { "tableName": String }
            },
        ),
        entry(
            ToolKind::CreateTable,
            "Creates a new DynamoDB table with provisioned capacity. Key types are S, N or B. \
             Creation is asynchronous: poll describe_table until TableStatus is ACTIVE.",
            params! {
                required: { "tableName": String, "partitionKey": String, "partitionKeyType": String },
                optional: {
                    "sortKey": String,
                    "sortKeyType": String,
                    "readCapacity": Integer = 5,
                    "writeCapacity": Integer = 5
                }
            },
        ),
        entry(
            ToolKind::UpdateCapacity,
            "Updates the provisioned read/write capacity of a table.",
            params! {
                required: { "tableName": String, "readCapacity": Integer, "writeCapacity": Integer }
            },
        ),
    ]
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListTablesArgs {
    limit: Option<i64>,
    exclusive_start_table_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DescribeTableArgs {
    table_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTableArgs {
    table_name: String,
    partition_key: String,
    partition_key_type: KeyType,
    sort_key: Option<String>,
    sort_key_type: Option<KeyType>,
    read_capacity: i64,
    write_capacity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateCapacityArgs {
    table_name: String,
    read_capacity: i64,
    write_capacity: i64,
}

/// Assemble a partition key plus optional sort key.
///
/// A sort key name without its type is rejected; a type without a name is ignored.
pub(crate) fn key_schema(
    partition_key: String,
    partition_key_type: KeyType,
    sort_key: Option<String>,
    sort_key_type: Option<KeyType>,
) -> Result<KeySchema> {
    let sort = match (non_blank(sort_key), sort_key_type) {
        (Some(name), Some(key_type)) => Some(KeyAttribute { name, key_type }),
        (Some(_), None) => {
            return Err(McpError::InvalidArg {
                name: "sortKeyType".to_string(),
                reason: "required when sortKey is given".to_string(),
            })
        }
        (None, _) => None,
    };

    Ok(KeySchema {
        partition: KeyAttribute {
            name: partition_key,
            key_type: partition_key_type,
        },
        sort,
    })
}

/// Dispatch a table tool call.
pub async fn dispatch(
    gateway: &dyn DynamoGateway,
    kind: ToolKind,
    args: Map<String, JsonValue>,
) -> Result<ToolOutput> {
    match kind {
        ToolKind::ListTables => {
            let args: ListTablesArgs = parse_args(args)?;
            let request = ListTablesRequest {
                limit: positive_limit(args.limit),
                exclusive_start_table_name: non_blank(args.exclusive_start_table_name),
            };
            Ok(remote_result(gateway.list_tables(request).await.map(|list| {
                json!({
                    "TableNames": list.table_names,
                    "LastEvaluatedTableName": list.last_evaluated_table_name,
                })
            })))
        }

        ToolKind::DescribeTable => {
            let args: DescribeTableArgs = parse_args(args)?;
            Ok(remote_result(gateway.describe_table(&args.table_name).await))
        }

        ToolKind::CreateTable => {
            let args: CreateTableArgs = parse_args(args)?;
            let request = CreateTableRequest {
                table_name: args.table_name,
                key_schema: key_schema(
                    args.partition_key,
                    args.partition_key_type,
                    args.sort_key,
                    args.sort_key_type,
                )?,
                throughput: Throughput {
                    read: args.read_capacity,
                    write: args.write_capacity,
                },
            };
            Ok(remote_result(gateway.create_table(request).await.map(|arn| {
                json!({ "status": "creating", "tableArn": arn })
            })))
        }

        ToolKind::UpdateCapacity => {
            let args: UpdateCapacityArgs = parse_args(args)?;
            let throughput = Throughput {
                read: args.read_capacity,
                write: args.write_capacity,
            };
            Ok(remote_result(
                gateway
                    .update_capacity(&args.table_name, throughput)
                    .await
                    .map(|arn| json!({ "status": "updating", "tableArn": arn })),
            ))
        }

        _ => Err(McpError::UnknownTool(kind.name().to_string())),
    }
}
