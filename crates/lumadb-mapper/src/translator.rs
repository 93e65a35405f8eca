//! DynamoDB JSON format translator
//!
//! Handles conversion between DynamoDB's JSON attribute value format and the
//! mapper's wire types, so a transport speaking the DynamoDB HTTP API can
//! reuse the same codec.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Map, Value as JsonValue};

use crate::core::{
    AttributeValue, ConditionalOperator, Conditions, IndexDescription,
    IndexProjection, KeySchemaElement, KeyType, Number, QueryOptions, Record, ResponsePage,
    TableDescription,
};
use crate::error::{MapperError, Result};

fn invalid(message: impl Into<String>) -> MapperError {
    MapperError::Serialization(message.into())
}

/// Parse DynamoDB attribute value format into a wire value
pub fn parse_attribute_value(attr: &JsonValue) -> Result<AttributeValue> {
    let obj = attr
        .as_object()
        .ok_or_else(|| invalid("Attribute value must be an object"))?;

    // Single-key objects like {"S": "value"} or {"N": "123"}
    let (type_key, type_val) = obj
        .iter()
        .next()
        .ok_or_else(|| invalid("Empty attribute value"))?;

    match type_key.as_str() {
        "S" => type_val
            .as_str()
            .map(|s| AttributeValue::S(s.to_string()))
            .ok_or_else(|| invalid("S value must be a string")),
        "N" => parse_number(type_val).map(AttributeValue::N),
        "B" => parse_binary(type_val).map(AttributeValue::B),
        "SS" => parse_list(type_val, "SS", |v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| invalid("SS items must be strings"))
        })
        .map(AttributeValue::Ss),
        "NS" => parse_list(type_val, "NS", parse_number).map(AttributeValue::Ns),
        "BS" => parse_list(type_val, "BS", parse_binary).map(AttributeValue::Bs),
        "BOOL" | "NULL" | "L" | "M" => Err(invalid(format!(
            "{type_key} values are not part of the wire model"
        ))),
        other => Err(invalid(format!("Unknown type: {other}"))),
    }
}

fn parse_number(value: &JsonValue) -> Result<Number> {
    let text = value
        .as_str()
        .ok_or_else(|| invalid("N value must be a number string"))?;
    Number::parse(text).ok_or_else(|| invalid(format!("Invalid number: {text}")))
}

fn parse_binary(value: &JsonValue) -> Result<Vec<u8>> {
    let b64 = value
        .as_str()
        .ok_or_else(|| invalid("B value must be a base64 string"))?;
    STANDARD
        .decode(b64)
        .map_err(|e| invalid(format!("Invalid base64: {e}")))
}

fn parse_list<T>(
    value: &JsonValue,
    type_key: &str,
    parse: impl Fn(&JsonValue) -> Result<T>,
) -> Result<Vec<T>> {
    value
        .as_array()
        .ok_or_else(|| invalid(format!("{type_key} value must be an array")))?
        .iter()
        .map(parse)
        .collect()
}

/// Convert a wire value to DynamoDB attribute value format
#[must_use]
pub fn attribute_value_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::S(s) => json!({"S": s}),
        AttributeValue::N(n) => json!({"N": n.to_string()}),
        AttributeValue::B(b) => json!({"B": STANDARD.encode(b)}),
        AttributeValue::Ss(ss) => json!({"SS": ss}),
        AttributeValue::Ns(ns) => {
            let strs: Vec<String> = ns.iter().map(ToString::to_string).collect();
            json!({"NS": strs})
        }
        AttributeValue::Bs(bs) => {
            let strs: Vec<String> = bs.iter().map(|b| STANDARD.encode(b)).collect();
            json!({"BS": strs})
        }
    }
}

/// Convert a DynamoDB item to a record
pub fn item_to_record(item: &Map<String, JsonValue>) -> Result<Record> {
    item.iter()
        .map(|(name, attr)| Ok((name.clone(), parse_attribute_value(attr)?)))
        .collect()
}

/// Convert a record to DynamoDB item format
#[must_use]
pub fn record_to_item(record: &Record) -> JsonValue {
    let item: Map<String, JsonValue> = record
        .iter()
        .map(|(name, value)| (name.clone(), attribute_value_to_json(value)))
        .collect();
    JsonValue::Object(item)
}

fn conditions_to_json(conditions: &Conditions) -> JsonValue {
    let map: Map<String, JsonValue> = conditions
        .iter()
        .map(|(name, condition)| {
            let mut entry = Map::new();
            entry.insert(
                "ComparisonOperator".into(),
                json!(condition.comparison_operator.as_str()),
            );
            if let Some(values) = &condition.attribute_value_list {
                let list: Vec<JsonValue> = values.iter().map(attribute_value_to_json).collect();
                entry.insert("AttributeValueList".into(), JsonValue::Array(list));
            }
            (name.clone(), JsonValue::Object(entry))
        })
        .collect();
    JsonValue::Object(map)
}

/// Build a Query or Scan request body from request options.
///
/// Unset options are left out so the store applies its defaults.
#[must_use]
pub fn options_to_request(table: &str, options: &QueryOptions) -> JsonValue {
    let mut request = Map::new();
    request.insert("TableName".into(), json!(table));

    let groups = [
        ("KeyConditions", &options.key_conditions),
        ("QueryFilter", &options.query_filter),
        ("ScanFilter", &options.scan_filter),
    ];
    for (field, conditions) in groups {
        if !conditions.is_empty() {
            request.insert(field.into(), conditions_to_json(conditions));
        }
    }

    if let Some(op) = options.conditional_operator {
        let op = match op {
            ConditionalOperator::And => "AND",
            ConditionalOperator::Or => "OR",
        };
        request.insert("ConditionalOperator".into(), json!(op));
    }
    if let Some(select) = options.select {
        request.insert("Select".into(), json!(select.as_str()));
    }
    if let Some(attributes) = &options.attributes_to_get {
        request.insert("AttributesToGet".into(), json!(attributes));
    }
    if let Some(forward) = options.scan_index_forward {
        request.insert("ScanIndexForward".into(), json!(forward));
    }
    if let Some(limit) = options.limit {
        request.insert("Limit".into(), json!(limit));
    }
    if let Some(start) = &options.exclusive_start_key {
        request.insert("ExclusiveStartKey".into(), record_to_item(start));
    }
    if let Some(consistent) = options.consistent_read {
        request.insert("ConsistentRead".into(), json!(consistent));
    }
    if let Some(index) = &options.index_name {
        request.insert("IndexName".into(), json!(index));
    }

    JsonValue::Object(request)
}

/// Parse a Query or Scan response body into a page
pub fn parse_response_page(response: &JsonValue) -> Result<ResponsePage> {
    let obj = response
        .as_object()
        .ok_or_else(|| invalid("Response must be an object"))?;

    let items = obj
        .get("Items")
        .map(|items| {
            items
                .as_array()
                .ok_or_else(|| invalid("Items must be an array"))?
                .iter()
                .map(|item| {
                    item.as_object()
                        .ok_or_else(|| invalid("Item must be an object"))
                        .and_then(item_to_record)
                })
                .collect::<Result<Vec<_>>>()
        })
        .transpose()?;

    let last_evaluated_key = obj
        .get("LastEvaluatedKey")
        .map(|key| {
            key.as_object()
                .ok_or_else(|| invalid("LastEvaluatedKey must be an object"))
                .and_then(item_to_record)
        })
        .transpose()?;

    let count = obj
        .get("Count")
        .and_then(JsonValue::as_u64)
        .map_or_else(|| items.as_ref().map_or(0, Vec::len), |c| c as usize);
    let scanned_count = obj
        .get("ScannedCount")
        .and_then(JsonValue::as_u64)
        .map_or(count, |c| c as usize);

    Ok(ResponsePage {
        count,
        scanned_count,
        items,
        last_evaluated_key,
    })
}

// ===== DescribeTable =====

fn parse_key_schema(value: Option<&JsonValue>) -> Result<Vec<KeySchemaElement>> {
    let elements = value
        .and_then(JsonValue::as_array)
        .ok_or_else(|| invalid("KeySchema must be an array"))?;

    elements
        .iter()
        .map(|element| {
            let name = element
                .get("AttributeName")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| invalid("KeySchema element needs an AttributeName"))?;
            let key_type = match element.get("KeyType").and_then(JsonValue::as_str) {
                Some("HASH") => KeyType::Hash,
                Some("RANGE") => KeyType::Range,
                other => return Err(invalid(format!("Invalid KeyType: {other:?}"))),
            };
            Ok(KeySchemaElement {
                attribute_name: name.to_string(),
                key_type,
            })
        })
        .collect()
}

fn parse_projection(value: Option<&JsonValue>) -> IndexProjection {
    let Some(projection) = value else {
        return IndexProjection::All;
    };
    match projection.get("ProjectionType").and_then(JsonValue::as_str) {
        Some("KEYS_ONLY") => IndexProjection::KeysOnly,
        Some("INCLUDE") => IndexProjection::Include(
            projection
                .get("NonKeyAttributes")
                .and_then(JsonValue::as_array)
                .map(|attrs| {
                    attrs
                        .iter()
                        .filter_map(JsonValue::as_str)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        ),
        _ => IndexProjection::All,
    }
}

fn parse_indexes(value: Option<&JsonValue>) -> Result<Vec<IndexDescription>> {
    let Some(indexes) = value else {
        return Ok(Vec::new());
    };
    indexes
        .as_array()
        .ok_or_else(|| invalid("Secondary indexes must be an array"))?
        .iter()
        .map(|index| {
            let name = index
                .get("IndexName")
                .and_then(JsonValue::as_str)
                .ok_or_else(|| invalid("Index needs an IndexName"))?;
            Ok(IndexDescription {
                index_name: name.to_string(),
                key_schema: parse_key_schema(index.get("KeySchema"))?,
                projection: parse_projection(index.get("Projection")),
            })
        })
        .collect()
}

/// Parse a DescribeTable response, or its `Table` member, into a description
pub fn parse_table_description(document: &JsonValue) -> Result<TableDescription> {
    let table = document.get("Table").unwrap_or(document);

    let table_name = table
        .get("TableName")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| invalid("Table needs a TableName"))?;

    Ok(TableDescription {
        table_name: table_name.to_string(),
        key_schema: parse_key_schema(table.get("KeySchema"))?,
        local_secondary_indexes: parse_indexes(table.get("LocalSecondaryIndexes"))?,
        global_secondary_indexes: parse_indexes(table.get("GlobalSecondaryIndexes"))?,
    })
}
