//! [`DynamoGateway`] backed by the AWS SDK.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::retry::RetryConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::primitives::DateTimeFormat;
use aws_sdk_dynamodb::types::{
    self as ddb, AttributeDefinition, BillingMode, CreateGlobalSecondaryIndexAction,
    GlobalSecondaryIndexUpdate, KeySchemaElement, ProjectionType, ProvisionedThroughput,
    ProvisionedThroughputDescription, ReturnValue, ScalarAttributeType, TableDescription,
    UpdateGlobalSecondaryIndexAction,
};
use aws_sdk_dynamodb::Client;
use serde_json::{json, Map, Value as JsonValue};

use super::{
    CreateGsiRequest, CreateTableRequest, DynamoGateway, GatewayError, ItemPage, KeyAttribute,
    KeySchema, KeyType, ListTablesRequest, Projection, QueryRequest, ScanRequest, TableList,
    Throughput, UpdateItemRequest,
};
use crate::convert::Item;

/// Default per-call deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for [`AwsGateway::connect`].
#[derive(Debug, Clone, Default)]
pub struct AwsGatewayConfig {
    /// Region override; falls back to the SDK's environment chain.
    pub region: Option<String>,
    /// Endpoint override (DynamoDB Local, LocalStack).
    pub endpoint_url: Option<String>,
    /// Per-call deadline; [`DEFAULT_CALL_TIMEOUT`] when unset.
    pub call_timeout: Option<Duration>,
}

/// DynamoDB gateway over `aws_sdk_dynamodb::Client`.
#[derive(Debug, Clone)]
pub struct AwsGateway {
    client: Client,
    call_timeout: Duration,
}

impl AwsGateway {
    /// Load AWS configuration from the environment and build a client.
    ///
    /// Credentials come from the default provider chain. The SDK's retry
    /// layer is disabled so each tool call makes exactly one attempt.
    pub async fn connect(config: AwsGatewayConfig) -> Self {
        let mut loader =
            aws_config::defaults(BehaviorVersion::latest()).retry_config(RetryConfig::disabled());
        if let Some(region) = &config.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        let shared_config = loader.load().await;
        let client = Client::new(&shared_config);
        Self::from_client(client, config.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT))
    }

    /// Wrap an existing client.
    pub fn from_client(client: Client, call_timeout: Duration) -> Self {
        Self {
            client,
            call_timeout,
        }
    }

    /// Await one SDK call under the per-call deadline.
    async fn call<T, E, F>(&self, operation: &'static str, fut: F) -> Result<T, GatewayError>
    where
        F: Future<Output = Result<T, E>>,
        E: std::error::Error,
    {
        with_deadline(operation, self.call_timeout, fut).await
    }
}

/// Run `fut` for at most `timeout`, flattening SDK errors into their full
/// display chain.
async fn with_deadline<T, E, F>(
    operation: &'static str,
    timeout: Duration,
    fut: F,
) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => {
            let message = DisplayErrorContext(&err).to_string();
            tracing::warn!(operation, error = %message, "DynamoDB call failed");
            Err(GatewayError::new(message))
        }
        Err(_) => {
            tracing::warn!(operation, ?timeout, "DynamoDB call timed out");
            Err(GatewayError::new(format!(
                "operation {} timed out after {:?}",
                operation, timeout
            )))
        }
    }
}

#[async_trait]
impl DynamoGateway for AwsGateway {
    async fn list_tables(&self, request: ListTablesRequest) -> Result<TableList, GatewayError> {
        let output = self
            .call(
                "ListTables",
                self.client
                    .list_tables()
                    .set_limit(request.limit)
                    .set_exclusive_start_table_name(request.exclusive_start_table_name)
                    .send(),
            )
            .await?;

        Ok(TableList {
            table_names: output.table_names().to_vec(),
            last_evaluated_table_name: output.last_evaluated_table_name().map(str::to_string),
        })
    }

    async fn describe_table(&self, table_name: &str) -> Result<JsonValue, GatewayError> {
        let output = self
            .call(
                "DescribeTable",
                self.client.describe_table().table_name(table_name).send(),
            )
            .await?;

        Ok(output
            .table()
            .map_or_else(|| json!({}), table_description_to_json))
    }

    async fn create_table(&self, request: CreateTableRequest) -> Result<String, GatewayError> {
        let (key_schema, attribute_definitions) = build_key_schema(&request.key_schema)?;
        let output = self
            .call(
                "CreateTable",
                self.client
                    .create_table()
                    .table_name(request.table_name)
                    .set_key_schema(Some(key_schema))
                    .set_attribute_definitions(Some(attribute_definitions))
                    .billing_mode(BillingMode::Provisioned)
                    .provisioned_throughput(build_throughput(request.throughput)?)
                    .send(),
            )
            .await?;

        Ok(output
            .table_description()
            .and_then(TableDescription::table_arn)
            .unwrap_or_default()
            .to_string())
    }

    async fn update_capacity(
        &self,
        table_name: &str,
        throughput: Throughput,
    ) -> Result<String, GatewayError> {
        let output = self
            .call(
                "UpdateTable",
                self.client
                    .update_table()
                    .table_name(table_name)
                    .provisioned_throughput(build_throughput(throughput)?)
                    .send(),
            )
            .await?;

        Ok(output
            .table_description()
            .and_then(TableDescription::table_arn)
            .unwrap_or_default()
            .to_string())
    }

    async fn put_item(&self, table_name: &str, item: Item) -> Result<(), GatewayError> {
        self.call(
            "PutItem",
            self.client
                .put_item()
                .table_name(table_name)
                .set_item(Some(item))
                .send(),
        )
        .await?;
        Ok(())
    }

    async fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, GatewayError> {
        let output = self
            .call(
                "GetItem",
                self.client
                    .get_item()
                    .table_name(table_name)
                    .set_key(Some(key))
                    .send(),
            )
            .await?;
        Ok(output.item().cloned())
    }

    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item, GatewayError> {
        let output = self
            .call(
                "UpdateItem",
                self.client
                    .update_item()
                    .table_name(request.table_name)
                    .set_key(Some(request.key))
                    .update_expression(request.update_expression)
                    .set_expression_attribute_names(non_empty(request.expression_attribute_names))
                    .set_expression_attribute_values(non_empty(
                        request.expression_attribute_values,
                    ))
                    .set_condition_expression(request.condition_expression)
                    .return_values(ReturnValue::from(request.return_values.as_str()))
                    .send(),
            )
            .await?;
        Ok(output.attributes().cloned().unwrap_or_default())
    }

    async fn scan(&self, request: ScanRequest) -> Result<ItemPage, GatewayError> {
        let output = self
            .call(
                "Scan",
                self.client
                    .scan()
                    .table_name(request.table_name)
                    .set_filter_expression(request.filter_expression)
                    .set_expression_attribute_values(request.expression_attribute_values)
                    .set_expression_attribute_names(request.expression_attribute_names)
                    .set_limit(request.limit)
                    .send(),
            )
            .await?;

        Ok(ItemPage {
            items: output.items().to_vec(),
            count: output.count(),
            scanned_count: output.scanned_count(),
        })
    }

    async fn query(&self, request: QueryRequest) -> Result<ItemPage, GatewayError> {
        let output = self
            .call(
                "Query",
                self.client
                    .query()
                    .table_name(request.table_name)
                    .key_condition_expression(request.key_condition_expression)
                    .set_expression_attribute_values(Some(request.expression_attribute_values))
                    .set_expression_attribute_names(request.expression_attribute_names)
                    .set_filter_expression(request.filter_expression)
                    .set_limit(request.limit)
                    .send(),
            )
            .await?;

        Ok(ItemPage {
            items: output.items().to_vec(),
            count: output.count(),
            scanned_count: output.scanned_count(),
        })
    }

    async fn create_gsi(&self, request: CreateGsiRequest) -> Result<(), GatewayError> {
        let (key_schema, attribute_definitions) = build_key_schema(&request.key_schema)?;
        let action = CreateGlobalSecondaryIndexAction::builder()
            .index_name(request.index_name)
            .set_key_schema(Some(key_schema))
            .projection(build_projection(&request.projection))
            .provisioned_throughput(build_throughput(request.throughput)?)
            .build()
            .map_err(build_error)?;

        self.call(
            "UpdateTable",
            self.client
                .update_table()
                .table_name(request.table_name)
                .set_attribute_definitions(Some(attribute_definitions))
                .global_secondary_index_updates(
                    GlobalSecondaryIndexUpdate::builder().create(action).build(),
                )
                .send(),
        )
        .await?;
        Ok(())
    }

    async fn update_gsi(
        &self,
        table_name: &str,
        index_name: &str,
        throughput: Throughput,
    ) -> Result<(), GatewayError> {
        let action = UpdateGlobalSecondaryIndexAction::builder()
            .index_name(index_name)
            .provisioned_throughput(build_throughput(throughput)?)
            .build()
            .map_err(build_error)?;

        self.call(
            "UpdateTable",
            self.client
                .update_table()
                .table_name(table_name)
                .global_secondary_index_updates(
                    GlobalSecondaryIndexUpdate::builder().update(action).build(),
                )
                .send(),
        )
        .await?;
        Ok(())
    }
}

fn build_error(err: aws_sdk_dynamodb::error::BuildError) -> GatewayError {
    GatewayError::new(format!("invalid request: {}", err))
}

fn non_empty<K, V>(map: std::collections::HashMap<K, V>) -> Option<std::collections::HashMap<K, V>> {
    (!map.is_empty()).then_some(map)
}

fn scalar_type(key_type: KeyType) -> ScalarAttributeType {
    match key_type {
        KeyType::S => ScalarAttributeType::S,
        KeyType::N => ScalarAttributeType::N,
        KeyType::B => ScalarAttributeType::B,
    }
}

fn build_key_schema(
    schema: &KeySchema,
) -> Result<(Vec<KeySchemaElement>, Vec<AttributeDefinition>), GatewayError> {
    let mut elements = Vec::with_capacity(2);
    let mut definitions = Vec::with_capacity(2);

    let mut push = |attr: &KeyAttribute, role: ddb::KeyType| -> Result<(), GatewayError> {
        elements.push(
            KeySchemaElement::builder()
                .attribute_name(&attr.name)
                .key_type(role)
                .build()
                .map_err(build_error)?,
        );
        definitions.push(
            AttributeDefinition::builder()
                .attribute_name(&attr.name)
                .attribute_type(scalar_type(attr.key_type))
                .build()
                .map_err(build_error)?,
        );
        Ok(())
    };

    push(&schema.partition, ddb::KeyType::Hash)?;
    if let Some(sort) = &schema.sort {
        push(sort, ddb::KeyType::Range)?;
    }
    Ok((elements, definitions))
}

fn build_throughput(throughput: Throughput) -> Result<ProvisionedThroughput, GatewayError> {
    ProvisionedThroughput::builder()
        .read_capacity_units(throughput.read)
        .write_capacity_units(throughput.write)
        .build()
        .map_err(build_error)
}

fn build_projection(projection: &Projection) -> ddb::Projection {
    match projection {
        Projection::All => ddb::Projection::builder()
            .projection_type(ProjectionType::All)
            .build(),
        Projection::KeysOnly => ddb::Projection::builder()
            .projection_type(ProjectionType::KeysOnly)
            .build(),
        Projection::Include(attributes) => ddb::Projection::builder()
            .projection_type(ProjectionType::Include)
            .set_non_key_attributes((!attributes.is_empty()).then(|| attributes.clone()))
            .build(),
    }
}

// =============================================================================
// TableDescription rendering
// =============================================================================

fn insert_opt(obj: &mut Map<String, JsonValue>, key: &str, value: Option<JsonValue>) {
    if let Some(value) = value {
        obj.insert(key.to_string(), value);
    }
}

fn key_schema_to_json(elements: &[KeySchemaElement]) -> JsonValue {
    elements
        .iter()
        .map(|e| {
            json!({
                "AttributeName": e.attribute_name(),
                "KeyType": e.key_type().as_str(),
            })
        })
        .collect()
}

fn throughput_to_json(pt: &ProvisionedThroughputDescription) -> JsonValue {
    let mut obj = Map::new();
    insert_opt(&mut obj, "ReadCapacityUnits", pt.read_capacity_units().map(JsonValue::from));
    insert_opt(&mut obj, "WriteCapacityUnits", pt.write_capacity_units().map(JsonValue::from));
    insert_opt(
        &mut obj,
        "NumberOfDecreasesToday",
        pt.number_of_decreases_today().map(JsonValue::from),
    );
    JsonValue::Object(obj)
}

fn projection_to_json(projection: &ddb::Projection) -> JsonValue {
    let mut obj = Map::new();
    insert_opt(
        &mut obj,
        "ProjectionType",
        projection.projection_type().map(|p| json!(p.as_str())),
    );
    if !projection.non_key_attributes().is_empty() {
        obj.insert(
            "NonKeyAttributes".to_string(),
            json!(projection.non_key_attributes()),
        );
    }
    JsonValue::Object(obj)
}

/// Render a table description with DynamoDB's own field names, skipping absent fields.
fn table_description_to_json(table: &TableDescription) -> JsonValue {
    let mut obj = Map::new();
    insert_opt(&mut obj, "TableName", table.table_name().map(|s| json!(s)));
    insert_opt(&mut obj, "TableArn", table.table_arn().map(|s| json!(s)));
    insert_opt(&mut obj, "TableId", table.table_id().map(|s| json!(s)));
    insert_opt(&mut obj, "TableStatus", table.table_status().map(|s| json!(s.as_str())));
    insert_opt(
        &mut obj,
        "CreationDateTime",
        table
            .creation_date_time()
            .and_then(|dt| dt.fmt(DateTimeFormat::DateTime).ok())
            .map(JsonValue::String),
    );
    insert_opt(&mut obj, "ItemCount", table.item_count().map(JsonValue::from));
    insert_opt(&mut obj, "TableSizeBytes", table.table_size_bytes().map(JsonValue::from));
    obj.insert("KeySchema".to_string(), key_schema_to_json(table.key_schema()));
    obj.insert(
        "AttributeDefinitions".to_string(),
        table
            .attribute_definitions()
            .iter()
            .map(|d| {
                json!({
                    "AttributeName": d.attribute_name(),
                    "AttributeType": d.attribute_type().as_str(),
                })
            })
            .collect(),
    );
    insert_opt(
        &mut obj,
        "ProvisionedThroughput",
        table.provisioned_throughput().map(throughput_to_json),
    );
    insert_opt(
        &mut obj,
        "BillingModeSummary",
        table
            .billing_mode_summary()
            .and_then(|s| s.billing_mode())
            .map(|mode| json!({ "BillingMode": mode.as_str() })),
    );

    if !table.global_secondary_indexes().is_empty() {
        let indexes: Vec<JsonValue> = table
            .global_secondary_indexes()
            .iter()
            .map(|gsi| {
                let mut idx = Map::new();
                insert_opt(&mut idx, "IndexName", gsi.index_name().map(|s| json!(s)));
                insert_opt(&mut idx, "IndexArn", gsi.index_arn().map(|s| json!(s)));
                insert_opt(&mut idx, "IndexStatus", gsi.index_status().map(|s| json!(s.as_str())));
                idx.insert("KeySchema".to_string(), key_schema_to_json(gsi.key_schema()));
                insert_opt(&mut idx, "Projection", gsi.projection().map(projection_to_json));
                insert_opt(
                    &mut idx,
                    "ProvisionedThroughput",
                    gsi.provisioned_throughput().map(throughput_to_json),
                );
                insert_opt(&mut idx, "ItemCount", gsi.item_count().map(JsonValue::from));
                JsonValue::Object(idx)
            })
            .collect();
        obj.insert("GlobalSecondaryIndexes".to_string(), JsonValue::Array(indexes));
    }

    if !table.local_secondary_indexes().is_empty() {
        let indexes: Vec<JsonValue> = table
            .local_secondary_indexes()
            .iter()
            .map(|lsi| {
                let mut idx = Map::new();
                insert_opt(&mut idx, "IndexName", lsi.index_name().map(|s| json!(s)));
                insert_opt(&mut idx, "IndexArn", lsi.index_arn().map(|s| json!(s)));
                idx.insert("KeySchema".to_string(), key_schema_to_json(lsi.key_schema()));
                insert_opt(&mut idx, "Projection", lsi.projection().map(projection_to_json));
                insert_opt(&mut idx, "ItemCount", lsi.item_count().map(JsonValue::from));
                JsonValue::Object(idx)
            })
            .collect();
        obj.insert("LocalSecondaryIndexes".to_string(), JsonValue::Array(indexes));
    }

    insert_opt(
        &mut obj,
        "StreamSpecification",
        table.stream_specification().map(|spec| {
            let mut s = Map::new();
            s.insert("StreamEnabled".to_string(), json!(spec.stream_enabled()));
            insert_opt(
                &mut s,
                "StreamViewType",
                spec.stream_view_type().map(|v| json!(v.as_str())),
            );
            JsonValue::Object(s)
        }),
    );

    JsonValue::Object(obj)
}
