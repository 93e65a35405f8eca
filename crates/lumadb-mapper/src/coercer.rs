//! Coercion between application values and wire values.
//!
//! Each [`AttributeType`] maps to a [`Converter`], a pair of plain function
//! pointers. A [`Coercer`] builds the converter table for a schema once and
//! uses it to turn entity attributes into records and back.
//!
//! | Type | Wire |
//! |------|------|
//! | `String`, `Integer`, `Float`, `Binary` | `S`, `N`, `N`, `B` as-is |
//! | `Set` | `SS` / `NS` / `BS`, omitted when empty |
//! | `Boolean` | `N` 1 or 0 |
//! | `Array`, `Hash` | `S` holding JSON text |
//! | `Date` | `N` integer epoch seconds at UTC midnight |
//! | `DateTime`, `Time` | `N` fractional epoch seconds |
//!
//! Null values never reach the wire.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::core::{AttributeValue, Number, Record};
use crate::error::{MapperError, Result};
use crate::schema::{AttributeDef, AttributeType, Schema};
use crate::value::{Attributes, Value};

type Encode = fn(&str, &Value) -> Result<Option<AttributeValue>>;
type Decode = fn(&str, AttributeValue) -> Result<Value>;

/// Bidirectional conversion for one attribute type.
#[derive(Clone, Copy)]
pub struct Converter {
    encode: Encode,
    decode: Decode,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter").finish_non_exhaustive()
    }
}

impl Converter {
    /// Converter for a declared type.
    ///
    /// Fails with [`MapperError::UnsupportedCoercion`] for types with no wire
    /// representation.
    pub fn for_type(attribute: &str, attribute_type: &AttributeType) -> Result<Self> {
        let (encode, decode): (Encode, Decode) = match attribute_type {
            AttributeType::String => (encode_string, decode_string),
            AttributeType::Integer => (encode_integer, decode_integer),
            AttributeType::Float => (encode_float, decode_float),
            AttributeType::Boolean => (encode_boolean, decode_boolean),
            AttributeType::Date => (encode_date, decode_date),
            AttributeType::DateTime => (encode_datetime, decode_datetime),
            AttributeType::Time => (encode_time, decode_time),
            AttributeType::List => (encode_json, decode_list),
            AttributeType::Map => (encode_json, decode_map),
            AttributeType::Set => (encode_set, decode_set),
            AttributeType::Binary => (encode_binary, decode_binary),
            AttributeType::Unsupported(name) => {
                return Err(MapperError::UnsupportedCoercion {
                    attribute: attribute.to_string(),
                    type_name: name.clone(),
                })
            }
        };
        Ok(Self { encode, decode })
    }

    /// Converter driven by the value itself, for attributes outside a schema
    #[must_use]
    pub fn dynamic() -> Self {
        Self {
            encode: encode_dynamic,
            decode: decode_dynamic,
        }
    }

    /// Application value to wire value; `None` means the attribute is omitted
    pub fn to_wire(&self, attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
        if value.is_null() {
            return Ok(None);
        }
        (self.encode)(attribute, value)
    }

    /// Wire value to application value
    pub fn from_wire(&self, attribute: &str, value: AttributeValue) -> Result<Value> {
        (self.decode)(attribute, value)
    }
}

/// Convert one value of a declared type to its wire form.
pub fn to_wire(attribute_type: &AttributeType, value: &Value) -> Result<Option<AttributeValue>> {
    Converter::for_type("value", attribute_type)?.to_wire("value", value)
}

/// Convert one wire value back into a value of a declared type.
pub fn from_wire(attribute_type: &AttributeType, value: AttributeValue) -> Result<Value> {
    Converter::for_type("value", attribute_type)?.from_wire("value", value)
}

/// Record serializer built once from a schema.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use lumadb_mapper::{AttributeType, Attributes, Coercer, Schema};
///
/// let schema = Schema::builder()
///     .mapped("id", AttributeType::String, "uuid")
///     .attribute("paid", AttributeType::Boolean)
///     .identity("id")
///     .build()?;
/// let coercer = Coercer::new(Arc::new(schema))?;
///
/// let record = coercer.entity_to_record(&Attributes::new().with("paid", true))?;
/// assert!(!record.contains_key("uuid"));
/// assert_eq!(record["paid"].as_number().map(|n| n.as_i64()), Some(1));
/// # Ok::<(), lumadb_mapper::MapperError>(())
/// ```
#[derive(Debug, Clone)]
pub struct Coercer {
    schema: Arc<Schema>,
    converters: HashMap<String, Converter>,
}

impl Coercer {
    /// Build the converter table, failing on the first unsupported type
    pub fn new(schema: Arc<Schema>) -> Result<Self> {
        let converters = schema
            .attributes()
            .iter()
            .map(|a| Ok((a.name.clone(), Converter::for_type(&a.name, &a.attribute_type)?)))
            .collect::<Result<HashMap<_, _>>>()?;

        Ok(Self { schema, converters })
    }

    /// The schema this coercer was built from
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Attribute definition and converter for a logical or physical name
    #[must_use]
    pub fn converter(&self, name: &str) -> Option<(&AttributeDef, Converter)> {
        let attribute = self.schema.resolve(name)?;
        let converter = *self.converters.get(&attribute.name)?;
        Some((attribute, converter))
    }

    /// Coerce a single value for an attribute.
    ///
    /// Names outside the schema fall back to value-driven coercion.
    pub fn coerce_value(&self, name: &str, value: &Value) -> Result<Option<AttributeValue>> {
        match self.converter(name) {
            Some((attribute, converter)) => converter.to_wire(&attribute.name, value),
            None => Converter::dynamic().to_wire(name, value),
        }
    }

    /// Serialize entity attributes into a record.
    ///
    /// The identity is left out while unset; attributes whose wire value is
    /// absent are left out too.
    pub fn entity_to_record(&self, attributes: &Attributes) -> Result<Record> {
        let identity = &self.schema.identity().name;
        let mut record = Record::new();

        for attribute in self.schema.attributes() {
            let Some(value) = attributes.get(&attribute.name) else {
                continue;
            };
            if &attribute.name == identity && value.is_blank() {
                continue;
            }
            if let Some(wire) = self.converters[&attribute.name].to_wire(&attribute.name, value)? {
                record.insert(attribute.physical_name.clone(), wire);
            }
        }

        Ok(record)
    }

    /// Deserialize a record into entity attributes.
    ///
    /// Every schema attribute is present in the result; those missing from
    /// the record are [`Value::Null`].
    pub fn record_to_entity(&self, mut record: Record) -> Result<Attributes> {
        let mut attributes = Attributes::new();

        for attribute in self.schema.attributes() {
            let value = match record.remove(&attribute.physical_name) {
                Some(wire) => self.converters[&attribute.name].from_wire(&attribute.name, wire)?,
                None => Value::Null,
            };
            attributes.insert(attribute.name.clone(), value);
        }

        Ok(attributes)
    }
}

// ===== Encoders =====

fn mismatch(attribute: &str, expected: &str, value: &Value) -> MapperError {
    MapperError::coercion(attribute, expected, value.type_name())
}

fn wire_mismatch(attribute: &str, expected: &str, value: &AttributeValue) -> MapperError {
    MapperError::coercion(attribute, expected, value.type_name())
}

fn encode_string(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    match value {
        Value::String(s) => Ok(Some(AttributeValue::S(s.clone()))),
        other => Err(mismatch(attribute, "String", other)),
    }
}

fn encode_integer(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    match value {
        Value::Integer(i) => Ok(Some(AttributeValue::N(Number::Integer(*i)))),
        other => Err(mismatch(attribute, "Integer", other)),
    }
}

fn encode_float(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    match value {
        Value::Float(f) if f.is_finite() => Ok(Some(AttributeValue::N(Number::Float(*f)))),
        Value::Integer(_) => Ok(value.as_f64().map(|f| AttributeValue::N(Number::Float(f)))),
        other => Err(mismatch(attribute, "Float", other)),
    }
}

fn encode_boolean(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    match value {
        Value::Bool(b) => Ok(Some(AttributeValue::N(Number::Integer(i64::from(*b))))),
        other => Err(mismatch(attribute, "Boolean", other)),
    }
}

fn midnight_timestamp(date: NaiveDate) -> i64 {
    date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp()
}

#[allow(clippy::cast_precision_loss)]
fn fractional_timestamp(time: DateTime<Utc>) -> f64 {
    time.timestamp() as f64 + f64::from(time.timestamp_subsec_micros()) / 1_000_000.0
}

fn encode_date(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    match value {
        Value::Date(d) => Ok(Some(AttributeValue::N(Number::Integer(midnight_timestamp(*d))))),
        other => Err(mismatch(attribute, "Date", other)),
    }
}

fn encode_datetime(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    match value {
        Value::DateTime(dt) => Ok(Some(AttributeValue::N(Number::Float(fractional_timestamp(
            dt.with_timezone(&Utc),
        ))))),
        Value::Time(t) => Ok(Some(AttributeValue::N(Number::Float(fractional_timestamp(*t))))),
        other => Err(mismatch(attribute, "DateTime", other)),
    }
}

fn encode_time(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    match value {
        Value::Time(t) => Ok(Some(AttributeValue::N(Number::Float(fractional_timestamp(*t))))),
        Value::DateTime(dt) => Ok(Some(AttributeValue::N(Number::Float(fractional_timestamp(
            dt.with_timezone(&Utc),
        ))))),
        other => Err(mismatch(attribute, "Time", other)),
    }
}

fn encode_json(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    let text = match value {
        Value::List(items) => serde_json::to_string(items)?,
        Value::Map(map) => serde_json::to_string(map)?,
        other => return Err(mismatch(attribute, "Array or Hash", other)),
    };
    Ok(Some(AttributeValue::S(text)))
}

fn encode_set(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    let wire = match value {
        Value::StringSet(s) if s.is_empty() => None,
        Value::NumberSet(s) if s.is_empty() => None,
        Value::BinarySet(s) if s.is_empty() => None,
        Value::StringSet(s) => Some(AttributeValue::Ss(s.iter().cloned().collect())),
        Value::NumberSet(s) => Some(AttributeValue::Ns(s.iter().copied().collect())),
        Value::BinarySet(s) => Some(AttributeValue::Bs(s.iter().cloned().collect())),
        other => return Err(mismatch(attribute, "Set", other)),
    };
    Ok(wire)
}

fn encode_binary(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    match value {
        Value::Binary(b) => Ok(Some(AttributeValue::B(b.clone()))),
        other => Err(mismatch(attribute, "Binary", other)),
    }
}

fn encode_dynamic(attribute: &str, value: &Value) -> Result<Option<AttributeValue>> {
    match value {
        Value::Null => Ok(None),
        Value::Bool(_) => encode_boolean(attribute, value),
        Value::Integer(_) => encode_integer(attribute, value),
        Value::Float(_) => encode_float(attribute, value),
        Value::String(_) => encode_string(attribute, value),
        Value::Binary(_) => encode_binary(attribute, value),
        Value::StringSet(_) | Value::NumberSet(_) | Value::BinarySet(_) => {
            encode_set(attribute, value)
        }
        Value::List(_) | Value::Map(_) => encode_json(attribute, value),
        Value::Date(_) => encode_date(attribute, value),
        Value::DateTime(_) => encode_datetime(attribute, value),
        Value::Time(_) => encode_time(attribute, value),
    }
}

// ===== Decoders =====

fn decode_string(attribute: &str, value: AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::S(s) => Ok(Value::String(s)),
        AttributeValue::N(n) => Ok(Value::String(n.to_string())),
        other => Err(wire_mismatch(attribute, "String", &other)),
    }
}

fn parse_number(attribute: &str, expected: &str, value: &AttributeValue) -> Result<Number> {
    match value {
        AttributeValue::N(n) => Ok(*n),
        AttributeValue::S(s) => {
            Number::parse(s.trim()).ok_or_else(|| wire_mismatch(attribute, expected, value))
        }
        other => Err(wire_mismatch(attribute, expected, other)),
    }
}

fn decode_integer(attribute: &str, value: AttributeValue) -> Result<Value> {
    parse_number(attribute, "Integer", &value).map(|n| Value::Integer(n.as_i64()))
}

fn decode_float(attribute: &str, value: AttributeValue) -> Result<Value> {
    parse_number(attribute, "Float", &value).map(|n| Value::Float(n.as_f64()))
}

fn decode_boolean(attribute: &str, value: AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::N(n) => Ok(Value::Bool(n.as_i64() == 1)),
        AttributeValue::S(s) => Ok(Value::Bool(s.trim().parse::<i64>() == Ok(1))),
        other => Err(wire_mismatch(attribute, "Boolean", &other)),
    }
}

/// Split fractional epoch seconds into whole seconds and microseconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn timestamp_from_number(attribute: &str, expected: &str, n: Number) -> Result<DateTime<Utc>> {
    let parsed = match n {
        Number::Integer(secs) => DateTime::from_timestamp(secs, 0),
        Number::Float(f) => {
            let mut secs = f.floor() as i64;
            let mut micros = ((f - f.floor()) * 1_000_000.0).round() as u32;
            if micros >= 1_000_000 {
                secs += 1;
                micros -= 1_000_000;
            }
            DateTime::from_timestamp(secs, micros * 1_000)
        }
    };
    parsed.ok_or_else(|| MapperError::coercion(attribute, expected, format!("N {n}")))
}

fn decode_date(attribute: &str, value: AttributeValue) -> Result<Value> {
    let n = parse_number(attribute, "Date", &value)?;
    timestamp_from_number(attribute, "Date", n).map(|t| Value::Date(t.date_naive()))
}

fn decode_datetime(attribute: &str, value: AttributeValue) -> Result<Value> {
    let n = parse_number(attribute, "DateTime", &value)?;
    timestamp_from_number(attribute, "DateTime", n).map(|t| Value::DateTime(t.fixed_offset()))
}

fn decode_time(attribute: &str, value: AttributeValue) -> Result<Value> {
    let n = parse_number(attribute, "Time", &value)?;
    timestamp_from_number(attribute, "Time", n).map(Value::Time)
}

fn decode_list(attribute: &str, value: AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::S(s) => Ok(Value::List(serde_json::from_str(&s)?)),
        other => Err(wire_mismatch(attribute, "Array", &other)),
    }
}

fn decode_map(attribute: &str, value: AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::S(s) => Ok(Value::Map(serde_json::from_str(&s)?)),
        other => Err(wire_mismatch(attribute, "Hash", &other)),
    }
}

fn decode_set(attribute: &str, value: AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::Ss(v) => Ok(Value::StringSet(v.into_iter().collect())),
        AttributeValue::Ns(v) => Ok(Value::NumberSet(v.into_iter().collect())),
        AttributeValue::Bs(v) => Ok(Value::BinarySet(v.into_iter().collect())),
        other => Err(wire_mismatch(attribute, "Set", &other)),
    }
}

fn decode_binary(attribute: &str, value: AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::B(b) => Ok(Value::Binary(b)),
        AttributeValue::S(s) => Ok(Value::Binary(s.into_bytes())),
        other => Err(wire_mismatch(attribute, "Binary", &other)),
    }
}

fn decode_dynamic(_attribute: &str, value: AttributeValue) -> Result<Value> {
    Ok(match value {
        AttributeValue::S(s) => Value::String(s),
        AttributeValue::N(Number::Integer(i)) => Value::Integer(i),
        AttributeValue::N(Number::Float(f)) => Value::Float(f),
        AttributeValue::B(b) => Value::Binary(b),
        AttributeValue::Ss(v) => Value::StringSet(v.into_iter().collect::<BTreeSet<_>>()),
        AttributeValue::Ns(v) => Value::NumberSet(v.into_iter().collect()),
        AttributeValue::Bs(v) => Value::BinarySet(v.into_iter().collect()),
    })
}
