//! Tool registry and category definitions.
//!
//! Provides the infrastructure for registering, validating and dispatching
//! MCP tools. The tool set is closed ([`ToolKind`]); the registry maps names
//! to descriptors once at startup and is read-only afterwards.

pub mod index;
pub mod item;
pub mod read;
pub mod table;

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::gateway::{DynamoGateway, GatewayError};

/// Every tool this server can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// list_tables
    ListTables,
    /// describe_table
    DescribeTable,
    /// create_table
    CreateTable,
    /// update_capacity
    UpdateCapacity,
    /// put_item
    PutItem,
    /// get_item
    GetItem,
    /// update_item
    UpdateItem,
    /// scan_table
    ScanTable,
    /// query_table
    QueryTable,
    /// create_gsi
    CreateGsi,
    /// update_gsi
    UpdateGsi,
    /// create_lsi
    CreateLsi,
}

impl ToolKind {
    /// Client-facing tool name.
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::ListTables => "list_tables",
            ToolKind::DescribeTable => "describe_table",
            ToolKind::CreateTable => "create_table",
            ToolKind::UpdateCapacity => "update_capacity",
            ToolKind::PutItem => "put_item",
            ToolKind::GetItem => "get_item",
            ToolKind::UpdateItem => "update_item",
            ToolKind::ScanTable => "scan_table",
            ToolKind::QueryTable => "query_table",
            ToolKind::CreateGsi => "create_gsi",
            ToolKind::UpdateGsi => "update_gsi",
            ToolKind::CreateLsi => "create_lsi",
        }
    }
}

/// Argument type as advertised and checked before a handler runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// JSON string.
    String,
    /// Whole number; integral floats and numeric strings are coerced.
    Integer,
    /// JSON object with arbitrary values.
    Object,
    /// JSON object whose values are strings.
    StringMap,
    /// JSON array of strings.
    StringArray,
}

impl ParamType {
    fn json_schema(self) -> JsonValue {
        match self {
            ParamType::String => serde_json::json!({"type": "string"}),
            ParamType::Integer => serde_json::json!({"type": "integer"}),
            ParamType::Object => serde_json::json!({"type": "object"}),
            ParamType::StringMap => serde_json::json!({
                "type": "object",
                "additionalProperties": {"type": "string"}
            }),
            ParamType::StringArray => serde_json::json!({"type": "array", "items": {"type": "string"}}),
        }
    }

    /// Check `value` against this type, returning the coerced value.
    fn coerce(self, name: &str, value: JsonValue) -> Result<JsonValue> {
        let invalid = |reason: &str| McpError::InvalidArg {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        match (self, value) {
            (ParamType::String, v @ JsonValue::String(_)) => Ok(v),
            (ParamType::String, _) => Err(invalid("expected a string")),

            (ParamType::Integer, JsonValue::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Ok(JsonValue::from(i))
                } else if let Some(f) = n.as_f64().filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
                {
                    Ok(JsonValue::from(f as i64))
                } else {
                    Err(invalid("expected an integer"))
                }
            }
            (ParamType::Integer, JsonValue::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(JsonValue::from)
                .map_err(|_| invalid("expected an integer")),
            (ParamType::Integer, _) => Err(invalid("expected an integer")),

            (ParamType::Object, v @ JsonValue::Object(_)) => Ok(v),
            (ParamType::Object, _) => Err(invalid("expected an object")),

            (ParamType::StringMap, JsonValue::Object(map)) => {
                if map.values().all(JsonValue::is_string) {
                    Ok(JsonValue::Object(map))
                } else {
                    Err(invalid("expected an object of string values"))
                }
            }
            (ParamType::StringMap, _) => Err(invalid("expected an object of string values")),

            (ParamType::StringArray, JsonValue::Array(items)) => {
                if items.iter().all(JsonValue::is_string) {
                    Ok(JsonValue::Array(items))
                } else {
                    Err(invalid("expected an array of strings"))
                }
            }
            (ParamType::StringArray, _) => Err(invalid("expected an array of strings")),
        }
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Argument name as sent by clients.
    pub name: String,
    /// Expected type.
    #[serde(rename = "type")]
    pub kind: ParamType,
    /// Whether the argument must be present and non-null.
    pub required: bool,
    /// Value applied when the argument is absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<JsonValue>,
}

/// A tool definition for the MCP tools/list response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool name (e.g., "put_item")
    pub name: String,
    /// Tool description
    pub description: String,
    /// Ordered parameter schema
    pub params: Vec<ParamSpec>,
}

impl ToolDef {
    /// Create a new tool definition.
    pub fn new(kind: ToolKind, description: &str, params: Vec<ParamSpec>) -> Self {
        Self {
            name: kind.name().to_string(),
            description: description.to_string(),
            params,
        }
    }

    /// JSON Schema for the input parameters, properties in declaration order.
    pub fn input_schema(&self) -> JsonValue {
        let mut props = Map::new();
        let mut required = Vec::new();
        for param in &self.params {
            let mut schema = param.kind.json_schema();
            if let (Some(default), Some(obj)) = (&param.default, schema.as_object_mut()) {
                obj.insert("default".to_string(), default.clone());
            }
            props.insert(param.name.clone(), schema);
            if param.required {
                required.push(JsonValue::String(param.name.clone()));
            }
        }

        serde_json::json!({
            "type": "object",
            "properties": props,
            "required": required
        })
    }

    /// Client-facing projection used by tools/list.
    pub fn to_listing(&self) -> JsonValue {
        serde_json::json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema()
        })
    }

    /// Check arguments against the parameter schema.
    ///
    /// Required arguments must be present and non-null; present values must
    /// be coercible to their declared type. Defaults are filled in; nulls for
    /// optional arguments are treated as absent. Unknown arguments are dropped.
    pub fn validate(&self, mut args: Map<String, JsonValue>) -> Result<Map<String, JsonValue>> {
        let mut checked = Map::new();
        for param in &self.params {
            match args.remove(&param.name) {
                Some(JsonValue::Null) | None => {
                    if param.required {
                        return Err(McpError::MissingArg(param.name.clone()));
                    }
                    if let Some(default) = &param.default {
                        checked.insert(param.name.clone(), default.clone());
                    }
                }
                Some(value) => {
                    let value = param.kind.coerce(&param.name, value)?;
                    checked.insert(param.name.clone(), value);
                }
            }
        }
        Ok(checked)
    }
}

/// Build an ordered parameter list.
///
/// ```ignore
/// params! {
///     required: { "tableName": String },
///     optional: { "readCapacity": Integer = 5 }
/// }
/// ```
#[macro_export]
macro_rules! params {
    (@default) => { None };
    (@default $default:expr) => { Some(serde_json::json!($default)) };

    (
        $(required: { $($req_name:literal : $req_type:ident),* $(,)? })? $(,)?
        $(optional: { $($opt_name:literal : $opt_type:ident $(= $default:expr)?),* $(,)? })? $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut params: Vec<$crate::tools::ParamSpec> = Vec::new();
        $($(
            params.push($crate::tools::ParamSpec {
                name: $req_name.to_string(),
                kind: $crate::tools::ParamType::$req_type,
                required: true,
                default: None,
            });
        )*)?
        $($(
            params.push($crate::tools::ParamSpec {
                name: $opt_name.to_string(),
                kind: $crate::tools::ParamType::$opt_type,
                required: false,
                default: $crate::params!(@default $($default)?),
            });
        )*)?
        params
    }};
}

/// Pair a descriptor with the handler it registers under.
pub(crate) fn entry(kind: ToolKind, description: &str, params: Vec<ParamSpec>) -> (ToolKind, ToolDef) {
    (kind, ToolDef::new(kind, description, params))
}

/// Deserialize validated arguments into a tool's typed argument struct.
pub(crate) fn parse_args<T: DeserializeOwned>(args: Map<String, JsonValue>) -> Result<T> {
    serde_json::from_value(JsonValue::Object(args)).map_err(|e| McpError::InvalidArg {
        name: "arguments".to_string(),
        reason: e.to_string(),
    })
}

/// Result of a tool that ran.
///
/// Remote failures are data, not protocol faults: they arrive here as an
/// `{"error": message}` value with `is_error` set.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Tool payload.
    pub value: JsonValue,
    /// Whether the payload describes a failure.
    pub is_error: bool,
}

impl ToolOutput {
    /// Successful payload.
    pub fn success(value: JsonValue) -> Self {
        Self {
            value,
            is_error: false,
        }
    }

    /// Failure payload carrying `message`.
    pub fn failure(message: &str) -> Self {
        Self {
            value: serde_json::json!({ "error": message }),
            is_error: true,
        }
    }
}

/// Convert a gateway result into a tool payload.
pub(crate) fn remote_result(result: std::result::Result<JsonValue, GatewayError>) -> ToolOutput {
    match result {
        Ok(value) => ToolOutput::success(value),
        Err(err) => ToolOutput::failure(&err.message),
    }
}

/// Map a non-positive limit to "no limit", and clamp to the SDK's range.
pub(crate) fn positive_limit(limit: Option<i64>) -> Option<i32> {
    limit
        .filter(|l| *l > 0)
        .map(|l| i32::try_from(l).unwrap_or(i32::MAX))
}

/// Drop empty strings so they never reach the remote request.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// A registered tool: its descriptor plus the handler it maps to.
#[derive(Debug, Clone)]
pub struct RegisteredTool {
    /// Descriptor advertised to clients.
    pub def: ToolDef,
    /// Handler selector.
    pub kind: ToolKind,
}

/// Registry of all available tools.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    entries: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    /// Create a new registry with all tools registered.
    pub fn new() -> Self {
        let mut registry = Self::empty();

        // Register all tool categories
        let defs = table::tools()
            .into_iter()
            .chain(item::tools())
            .chain(read::tools())
            .chain(index::tools());
        for (kind, def) in defs {
            if let Err(err) = registry.register(def, kind) {
                tracing::error!("tool registration failed: {}", err);
            }
        }

        registry
    }

    /// Create a registry with no tools.
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Register a tool. Names must be unique.
    pub fn register(&mut self, def: ToolDef, kind: ToolKind) -> Result<()> {
        if self.by_name.contains_key(&def.name) {
            return Err(McpError::DuplicateTool(def.name));
        }
        self.by_name.insert(def.name.clone(), self.entries.len());
        self.entries.push(RegisteredTool { def, kind });
        Ok(())
    }

    /// Look up a tool by name.
    pub fn resolve(&self, name: &str) -> Result<&RegisteredTool> {
        self.by_name
            .get(name)
            .and_then(|&i| self.entries.get(i))
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))
    }

    /// Get all tool definitions, in registration order.
    pub fn tools(&self) -> impl ExactSizeIterator<Item = &ToolDef> + '_ {
        self.entries.iter().map(|entry| &entry.def)
    }

    /// Validate arguments and dispatch a tool call to its handler.
    ///
    /// Unknown tools and argument mismatches fail before the handler runs.
    /// Remote failures come back as `Ok` with [`ToolOutput::is_error`] set.
    pub async fn dispatch(
        &self,
        gateway: &dyn DynamoGateway,
        name: &str,
        args: Map<String, JsonValue>,
    ) -> Result<ToolOutput> {
        let tool = self.resolve(name)?;

        // LSIs can only be declared at table creation; the answer never depends on the arguments.
        if tool.kind == ToolKind::CreateLsi {
            return Ok(index::lsi_unsupported());
        }

        let args = tool.def.validate(args)?;
        tracing::debug!(tool = name, "dispatching tool call");

        match tool.kind {
            ToolKind::ListTables
            | ToolKind::DescribeTable
            | ToolKind::CreateTable
            | ToolKind::UpdateCapacity => table::dispatch(gateway, tool.kind, args).await,
            ToolKind::PutItem | ToolKind::GetItem | ToolKind::UpdateItem => {
                item::dispatch(gateway, tool.kind, args).await
            }
            ToolKind::ScanTable | ToolKind::QueryTable => {
                read::dispatch(gateway, tool.kind, args).await
            }
            ToolKind::CreateGsi | ToolKind::UpdateGsi | ToolKind::CreateLsi => {
                index::dispatch(gateway, tool.kind, args).await
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
