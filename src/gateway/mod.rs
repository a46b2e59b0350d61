//! Narrow capability interface over DynamoDB.
//!
//! Tools talk to the database only through [`DynamoGateway`]. Every method
//! maps to exactly one remote call: no retries, no pagination loops, no
//! batching. Requests arrive already validated and encoded.

pub mod aws;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::convert::Item;

pub use aws::AwsGateway;

/// Failure reported by the remote database.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct GatewayError {
    /// Remote error message, passed through verbatim.
    pub message: String,
}

impl GatewayError {
    /// Create a gateway error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Scalar type of a key attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum KeyType {
    /// String.
    S,
    /// Number.
    N,
    /// Binary.
    B,
}

/// One key attribute: name plus scalar type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    /// Attribute name.
    pub name: String,
    /// Attribute scalar type.
    pub key_type: KeyType,
}

/// Partition key with an optional sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// HASH key.
    pub partition: KeyAttribute,
    /// RANGE key.
    pub sort: Option<KeyAttribute>,
}

/// Provisioned read/write capacity units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Throughput {
    /// Read capacity units.
    pub read: i64,
    /// Write capacity units.
    pub write: i64,
}

/// Index projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// Project every attribute.
    All,
    /// Project only key attributes.
    KeysOnly,
    /// Project keys plus the listed attributes.
    Include(Vec<String>),
}

/// What `UpdateItem` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnValues {
    /// Nothing.
    None,
    /// The item as it was before the update.
    AllOld,
    /// Only updated attributes, old values.
    UpdatedOld,
    /// The item as it is after the update.
    #[default]
    AllNew,
    /// Only updated attributes, new values.
    UpdatedNew,
}

impl ReturnValues {
    /// Wire name of the option.
    pub fn as_str(self) -> &'static str {
        match self {
            ReturnValues::None => "NONE",
            ReturnValues::AllOld => "ALL_OLD",
            ReturnValues::UpdatedOld => "UPDATED_OLD",
            ReturnValues::AllNew => "ALL_NEW",
            ReturnValues::UpdatedNew => "UPDATED_NEW",
        }
    }
}

/// `ListTables` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListTablesRequest {
    /// Maximum number of names to return.
    pub limit: Option<i32>,
    /// Name to continue after.
    pub exclusive_start_table_name: Option<String>,
}

/// `ListTables` result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableList {
    /// Table names in this page.
    pub table_names: Vec<String>,
    /// Continuation token for the next page, if any.
    pub last_evaluated_table_name: Option<String>,
}

/// `CreateTable` parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTableRequest {
    /// Table name.
    pub table_name: String,
    /// Primary key.
    pub key_schema: KeySchema,
    /// Provisioned capacity.
    pub throughput: Throughput,
}

/// `UpdateItem` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateItemRequest {
    /// Table name.
    pub table_name: String,
    /// Primary key of the item.
    pub key: Item,
    /// Update expression.
    pub update_expression: String,
    /// `#name` placeholders.
    pub expression_attribute_names: HashMap<String, String>,
    /// `:value` placeholders.
    pub expression_attribute_values: Item,
    /// Optional guard expression.
    pub condition_expression: Option<String>,
    /// What to return.
    pub return_values: ReturnValues,
}

/// `Scan` parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanRequest {
    /// Table name.
    pub table_name: String,
    /// Filter expression.
    pub filter_expression: Option<String>,
    /// `:value` placeholders.
    pub expression_attribute_values: Option<Item>,
    /// `#name` placeholders.
    pub expression_attribute_names: Option<HashMap<String, String>>,
    /// Maximum number of items to evaluate.
    pub limit: Option<i32>,
}

/// `Query` parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    /// Table name.
    pub table_name: String,
    /// Key condition expression.
    pub key_condition_expression: String,
    /// `:value` placeholders.
    pub expression_attribute_values: Item,
    /// `#name` placeholders.
    pub expression_attribute_names: Option<HashMap<String, String>>,
    /// Filter expression.
    pub filter_expression: Option<String>,
    /// Maximum number of items to evaluate.
    pub limit: Option<i32>,
}

/// A page of items returned by `Scan` or `Query`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemPage {
    /// Matching items.
    pub items: Vec<Item>,
    /// Number of items returned.
    pub count: i32,
    /// Number of items evaluated before filtering.
    pub scanned_count: i32,
}

/// Global secondary index creation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateGsiRequest {
    /// Table name.
    pub table_name: String,
    /// Index name.
    pub index_name: String,
    /// Index key.
    pub key_schema: KeySchema,
    /// Index projection.
    pub projection: Projection,
    /// Provisioned capacity for the index.
    pub throughput: Throughput,
}

/// Remote DynamoDB operations used by the tools.
#[async_trait]
pub trait DynamoGateway: Send + Sync {
    /// List table names.
    async fn list_tables(&self, request: ListTablesRequest) -> Result<TableList, GatewayError>;

    /// Describe a table; the description is rendered with DynamoDB field names.
    async fn describe_table(&self, table_name: &str) -> Result<JsonValue, GatewayError>;

    /// Request table creation. Returns the table ARN.
    async fn create_table(&self, request: CreateTableRequest) -> Result<String, GatewayError>;

    /// Request a provisioned capacity change. Returns the table ARN.
    async fn update_capacity(
        &self,
        table_name: &str,
        throughput: Throughput,
    ) -> Result<String, GatewayError>;

    /// Insert or replace an item.
    async fn put_item(&self, table_name: &str, item: Item) -> Result<(), GatewayError>;

    /// Fetch an item by primary key. `None` when absent.
    async fn get_item(&self, table_name: &str, key: Item) -> Result<Option<Item>, GatewayError>;

    /// Update an item. Returns the attributes selected by `return_values`.
    async fn update_item(&self, request: UpdateItemRequest) -> Result<Item, GatewayError>;

    /// Scan a table.
    async fn scan(&self, request: ScanRequest) -> Result<ItemPage, GatewayError>;

    /// Query a table.
    async fn query(&self, request: QueryRequest) -> Result<ItemPage, GatewayError>;

    /// Request creation of a global secondary index.
    async fn create_gsi(&self, request: CreateGsiRequest) -> Result<(), GatewayError>;

    /// Request a provisioned capacity change on a global secondary index.
    async fn update_gsi(
        &self,
        table_name: &str,
        index_name: &str,
        throughput: Throughput,
    ) -> Result<(), GatewayError>;
}
