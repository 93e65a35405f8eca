//! Collection schemas.
//!
//! A [`Schema`] is the ordered list of logical attributes of a collection,
//! each with a declared [`AttributeType`] and a physical attribute name, plus
//! the logical name of the identity attribute. Schemas are immutable once
//! built and shared behind an `Arc` by the coercer, gateway and queries.

use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::error::{MapperError, Result};

/// Declared application type of an attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AttributeType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Time,
    /// Ordered JSON list
    List,
    /// JSON object
    Map,
    /// String, number or binary set
    Set,
    Binary,
    /// A type with no wire coercion, kept by name for error reporting
    Unsupported(String),
}

impl AttributeType {
    /// Declared type name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            AttributeType::String => "String",
            AttributeType::Integer => "Integer",
            AttributeType::Float => "Float",
            AttributeType::Boolean => "Boolean",
            AttributeType::Date => "Date",
            AttributeType::DateTime => "DateTime",
            AttributeType::Time => "Time",
            AttributeType::List => "Array",
            AttributeType::Map => "Hash",
            AttributeType::Set => "Set",
            AttributeType::Binary => "Binary",
            AttributeType::Unsupported(name) => name,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AttributeType {
    type Err = Infallible;

    /// Parse a type name. Unknown names become [`AttributeType::Unsupported`].
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let name = s.trim();
        let parsed = match name.to_ascii_lowercase().as_str() {
            "string" | "symbol" => AttributeType::String,
            "integer" | "int" => AttributeType::Integer,
            "float" | "decimal" => AttributeType::Float,
            "boolean" | "bool" => AttributeType::Boolean,
            "date" => AttributeType::Date,
            "datetime" => AttributeType::DateTime,
            "time" => AttributeType::Time,
            "array" | "list" => AttributeType::List,
            "hash" | "map" => AttributeType::Map,
            "set" => AttributeType::Set,
            "binary" => AttributeType::Binary,
            lower => match lower
                .strip_prefix("set<")
                .and_then(|rest| rest.strip_suffix('>'))
            {
                Some("string" | "integer" | "float" | "binary") => AttributeType::Set,
                _ => AttributeType::Unsupported(name.to_string()),
            },
        };
        Ok(parsed)
    }
}

/// One declared attribute of a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    /// Logical name, as seen by entities
    pub name: String,
    /// Declared type
    pub attribute_type: AttributeType,
    /// Physical name, as stored
    pub physical_name: String,
}

/// Immutable collection schema.
///
/// # Invariants
///
/// - logical and physical names are unique
/// - the identity attribute is declared
#[derive(Debug, Clone)]
pub struct Schema {
    attributes: Vec<AttributeDef>,
    identity: usize,
    by_logical: HashMap<String, usize>,
    by_physical: HashMap<String, usize>,
}

impl Schema {
    /// Start declaring a schema
    #[must_use]
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// Attributes in declaration order
    #[must_use]
    pub fn attributes(&self) -> &[AttributeDef] {
        &self.attributes
    }

    /// The identity attribute
    #[must_use]
    pub fn identity(&self) -> &AttributeDef {
        &self.attributes[self.identity]
    }

    /// Look up an attribute by logical name
    #[must_use]
    pub fn get(&self, logical: &str) -> Option<&AttributeDef> {
        self.by_logical.get(logical).map(|&i| &self.attributes[i])
    }

    /// Look up an attribute by physical name
    #[must_use]
    pub fn get_physical(&self, physical: &str) -> Option<&AttributeDef> {
        self.by_physical.get(physical).map(|&i| &self.attributes[i])
    }

    /// Look up an attribute by logical name, falling back to physical name
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&AttributeDef> {
        self.get(name).or_else(|| self.get_physical(name))
    }

    /// Physical name for a logical or physical attribute name.
    ///
    /// Names outside the schema are returned unchanged.
    #[must_use]
    pub fn physical_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.resolve(name).map_or(name, |a| a.physical_name.as_str())
    }

    /// Number of declared attributes
    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Always false for a built schema, which declares at least its identity
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Builder for [`Schema`].
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    attributes: Vec<AttributeDef>,
    identity: Option<String>,
}

impl SchemaBuilder {
    /// Declare an attribute stored under its logical name
    #[must_use]
    pub fn attribute(self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        let name = name.into();
        let physical = name.clone();
        self.mapped(name, attribute_type, physical)
    }

    /// Declare an attribute stored under a different physical name
    #[must_use]
    pub fn mapped(
        mut self,
        name: impl Into<String>,
        attribute_type: AttributeType,
        physical_name: impl Into<String>,
    ) -> Self {
        self.attributes.push(AttributeDef {
            name: name.into(),
            attribute_type,
            physical_name: physical_name.into(),
        });
        self
    }

    /// Mark the identity attribute by logical name
    #[must_use]
    pub fn identity(mut self, name: impl Into<String>) -> Self {
        self.identity = Some(name.into());
        self
    }

    /// Validate and build the schema
    pub fn build(self) -> Result<Schema> {
        let mut by_logical = HashMap::with_capacity(self.attributes.len());
        let mut by_physical = HashMap::with_capacity(self.attributes.len());

        for (i, attribute) in self.attributes.iter().enumerate() {
            if by_logical.insert(attribute.name.clone(), i).is_some() {
                return Err(MapperError::Schema(format!(
                    "attribute '{}' declared twice",
                    attribute.name
                )));
            }
            if by_physical.insert(attribute.physical_name.clone(), i).is_some() {
                return Err(MapperError::Schema(format!(
                    "physical name '{}' used by more than one attribute",
                    attribute.physical_name
                )));
            }
        }

        let identity_name = self
            .identity
            .ok_or_else(|| MapperError::Schema("no identity attribute declared".into()))?;
        let identity = *by_logical.get(&identity_name).ok_or_else(|| {
            MapperError::Schema(format!(
                "identity attribute '{identity_name}' is not declared"
            ))
        })?;
        let declared = &self.attributes[identity].attribute_type;
        if *declared != AttributeType::String {
            return Err(MapperError::Schema(format!(
                "identity attribute '{identity_name}' must be a String, got {declared}"
            )));
        }

        Ok(Schema {
            attributes: self.attributes,
            identity,
            by_logical,
            by_physical,
        })
    }
}
