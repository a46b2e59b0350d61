//! Conversion utilities between JSON and DynamoDB attribute values.
//!
//! Provides bidirectional conversion between serde_json::Value and
//! aws_sdk_dynamodb's tagged AttributeValue, for single values and whole items.

use std::collections::HashMap;

use aws_sdk_dynamodb::types::AttributeValue;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{Map, Number, Value as JsonValue};

/// A DynamoDB item, key or expression value map in wire form.
pub type Item = HashMap<String, AttributeValue>;

/// Convert a JSON value to a DynamoDB attribute value.
///
/// Total: every JSON shape has a tag. Numbers keep their textual form so
/// integers and decimals travel unchanged.
pub fn json_to_attr(json: &JsonValue) -> AttributeValue {
    match json {
        JsonValue::Null => AttributeValue::Null(true),
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => AttributeValue::N(n.to_string()),
        JsonValue::String(s) => AttributeValue::S(s.clone()),
        JsonValue::Array(arr) => AttributeValue::L(arr.iter().map(json_to_attr).collect()),
        JsonValue::Object(map) => AttributeValue::M(json_object_to_item(map)),
    }
}

/// Convert a DynamoDB attribute value to JSON.
///
/// Binary values are rendered as base64 strings, sets as arrays.
pub fn attr_to_json(attr: &AttributeValue) -> JsonValue {
    match attr {
        AttributeValue::S(s) => JsonValue::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n),
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Null(_) => JsonValue::Null,
        AttributeValue::L(list) => JsonValue::Array(list.iter().map(attr_to_json).collect()),
        AttributeValue::M(map) => JsonValue::Object(item_to_json_object(map)),
        AttributeValue::B(blob) => JsonValue::String(BASE64.encode(blob.as_ref())),
        AttributeValue::Ss(set) => set.iter().cloned().map(JsonValue::String).collect(),
        AttributeValue::Ns(set) => set.iter().map(|n| number_to_json(n)).collect(),
        AttributeValue::Bs(set) => set
            .iter()
            .map(|blob| JsonValue::String(BASE64.encode(blob.as_ref())))
            .collect(),
        _ => JsonValue::Null,
    }
}

/// Convert a JSON object (item, key, expression values) to wire form.
pub fn json_object_to_item(map: &Map<String, JsonValue>) -> Item {
    map.iter()
        .map(|(k, v)| (k.clone(), json_to_attr(v)))
        .collect()
}

/// Convert a wire-form item to a JSON object.
pub fn item_to_json_object(item: &Item) -> Map<String, JsonValue> {
    item.iter()
        .map(|(k, v)| (k.clone(), attr_to_json(v)))
        .collect()
}

/// Convert a wire-form item to a JSON value.
pub fn item_to_json(item: &Item) -> JsonValue {
    JsonValue::Object(item_to_json_object(item))
}

/// Parse a DynamoDB number string back into a JSON number.
///
/// Integers stay integers; anything JSON cannot hold (e.g. 38-digit
/// decimals beyond f64) is returned as its string form.
fn number_to_json(n: &str) -> JsonValue {
    if let Ok(i) = n.parse::<i64>() {
        return JsonValue::Number(i.into());
    }
    if let Ok(u) = n.parse::<u64>() {
        return JsonValue::Number(u.into());
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map_or_else(|| JsonValue::String(n.to_string()), JsonValue::Number)
}
