//! Secondary index tools.
//!
//! Tools: create_gsi, update_gsi, create_lsi

use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::gateway::{CreateGsiRequest, DynamoGateway, KeyType, Projection, Throughput};
use crate::params;
use crate::tools::table::key_schema;
use crate::tools::{entry, parse_args, remote_result, ToolDef, ToolKind, ToolOutput};

/// Returned by create_lsi for every call.
pub const LSI_UNSUPPORTED: &str = "Local Secondary Indexes can only be created during table \
     creation. Use create_table with LSI specification.";

/// Get all index tool definitions.
pub fn tools() -> Vec<(ToolKind, ToolDef)> {
    vec![
        entry(
            ToolKind::CreateGsi,
            "Creates a global secondary index on a table. projectionType is ALL, KEYS_ONLY \
             or INCLUDE (with nonKeyAttributes). Index creation runs in the background.",
            params! {
                required: {
                    "tableName": String,
                    "indexName": String,
                    "partitionKey": String,
                    "partitionKeyType": String
                },
                optional: {
                    "sortKey": String,
                    "sortKeyType": String,
                    "projectionType": String = "ALL",
                    "nonKeyAttributes": StringArray,
                    "readCapacity": Integer = 5,
                    "writeCapacity": Integer = 5
                }
            },
        ),
        entry(
            ToolKind::UpdateGsi,
            "Updates the provisioned capacity of a global secondary index.",
            params! {
                required: {
                    "tableName": String,
                    "indexName": String,
                    "readCapacity": Integer,
                    "writeCapacity": Integer
                }
            },
        ),
        entry(
            ToolKind::CreateLsi,
            "Creates a local secondary index on a table. DynamoDB only accepts local \
             secondary indexes at table creation, so this always reports an error.",
            params! {
                required: {
                    "tableName": String,
                    "indexName": String,
                    "partitionKey": String,
                    "partitionKeyType": String,
                    "sortKey": String,
                    "sortKeyType": String
                },
                optional: {
                    "projectionType": String = "ALL",
                    "nonKeyAttributes": StringArray,
                    "readCapacity": Integer = 5,
                    "writeCapacity": Integer = 5
                }
            },
        ),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum ProjectionType {
    All,
    KeysOnly,
    Include,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGsiArgs {
    table_name: String,
    index_name: String,
    partition_key: String,
    partition_key_type: KeyType,
    sort_key: Option<String>,
    sort_key_type: Option<KeyType>,
    projection_type: ProjectionType,
    non_key_attributes: Option<Vec<String>>,
    read_capacity: i64,
    write_capacity: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateGsiArgs {
    table_name: String,
    index_name: String,
    read_capacity: i64,
    write_capacity: i64,
}

/// The fixed create_lsi answer.
pub fn lsi_unsupported() -> ToolOutput {
    ToolOutput::failure(LSI_UNSUPPORTED)
}

/// Non-key attributes only apply to INCLUDE projections.
fn projection(kind: ProjectionType, non_key_attributes: Option<Vec<String>>) -> Projection {
    match kind {
        ProjectionType::All => Projection::All,
        ProjectionType::KeysOnly => Projection::KeysOnly,
        ProjectionType::Include => Projection::Include(non_key_attributes.unwrap_or_default()),
    }
}

/// Dispatch an index tool call.
pub async fn dispatch(
    gateway: &dyn DynamoGateway,
    kind: ToolKind,
    args: Map<String, JsonValue>,
) -> Result<ToolOutput> {
    match kind {
        ToolKind::CreateGsi => {
            let args: CreateGsiArgs = parse_args(args)?;
            let index_name = args.index_name.clone();
            let request = CreateGsiRequest {
                table_name: args.table_name,
                index_name: args.index_name,
                key_schema: key_schema(
                    args.partition_key,
                    args.partition_key_type,
                    args.sort_key,
                    args.sort_key_type,
                )?,
                projection: projection(args.projection_type, args.non_key_attributes),
                throughput: Throughput {
                    read: args.read_capacity,
                    write: args.write_capacity,
                },
            };
            Ok(remote_result(gateway.create_gsi(request).await.map(|()| {
                json!({ "status": "creating", "indexName": index_name })
            })))
        }

        ToolKind::UpdateGsi => {
            let args: UpdateGsiArgs = parse_args(args)?;
            let throughput = Throughput {
                read: args.read_capacity,
                write: args.write_capacity,
            };
            Ok(remote_result(
                gateway
                    .update_gsi(&args.table_name, &args.index_name, throughput)
                    .await
                    .map(|()| json!({ "status": "updating", "indexName": args.index_name })),
            ))
        }

        ToolKind::CreateLsi => Ok(lsi_unsupported()),

        _ => Err(McpError::UnknownTool(kind.name().to_string())),
    }
}
