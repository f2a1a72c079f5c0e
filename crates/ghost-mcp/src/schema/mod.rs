//! Declarative input schemas
//!
//! A typed subset of JSON Schema: `type`, `properties`, `required`, `enum`,
//! `minimum`/`maximum`, `pattern`, `minItems`/`maxItems`, `items` and
//! `additionalProperties`. Schemas deserialize from and serialize back to
//! their JSON Schema form, so the same value is used for validation and for
//! advertising tools and resources.

mod validator;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{McpError, Result};

pub use validator::{validate, ValidationReport};

/// JSON value type a schema node accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
    Null,
}

impl SchemaType {
    /// Check type compatibility of a value
    pub fn matches(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;

        match (self, value) {
            (SchemaType::String, Value::String(_)) => true,
            (SchemaType::Number, Value::Number(_)) => true,
            (SchemaType::Integer, Value::Number(n)) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (SchemaType::Boolean, Value::Bool(_)) => true,
            (SchemaType::Array, Value::Array(_)) => true,
            (SchemaType::Object, Value::Object(_)) => true,
            (SchemaType::Null, Value::Null) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Array => "array",
            SchemaType::Object => "object",
            SchemaType::Null => "null",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Schema node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<SchemaType>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,

    #[serde(rename = "enum", default, skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,

    #[serde(skip)]
    compiled: PatternCache,
}

/// Lazily compiled `pattern`, shared by every validation against the node
#[derive(Clone, Default)]
struct PatternCache(OnceLock<Regex>);

impl PartialEq for PatternCache {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl fmt::Debug for PatternCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PatternCache")
    }
}

impl Schema {
    fn typed(schema_type: SchemaType) -> Self {
        Self {
            schema_type: Some(schema_type),
            ..Self::default()
        }
    }

    pub fn object() -> Self {
        Self::typed(SchemaType::Object)
    }

    pub fn string() -> Self {
        Self::typed(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::typed(SchemaType::Number)
    }

    pub fn integer() -> Self {
        Self::typed(SchemaType::Integer)
    }

    pub fn boolean() -> Self {
        Self::typed(SchemaType::Boolean)
    }

    pub fn array(items: Schema) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::typed(SchemaType::Array)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.properties.insert(name.into(), schema);
        self
    }

    /// Declare a property and mark it required
    pub fn with_required(mut self, name: impl Into<String>, schema: Schema) -> Self {
        let name = name.into();
        self.required.push(name.clone());
        self.properties.insert(name, schema);
        self
    }

    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self.compiled = PatternCache::default();
        self
    }

    /// The compiled `pattern`, if any.
    ///
    /// Compiled on first use and cached. A `pattern` edited after caching is
    /// compiled fresh on every call.
    pub(crate) fn compiled_pattern(&self) -> Option<std::result::Result<Cow<'_, Regex>, regex::Error>> {
        let pattern = self.pattern.as_deref()?;
        if let Some(re) = self.compiled.0.get() {
            if re.as_str() == pattern {
                return Some(Ok(Cow::Borrowed(re)));
            }
            return Some(Regex::new(pattern).map(Cow::Owned));
        }
        Some(Regex::new(pattern).map(|re| {
            let _ = self.compiled.0.set(re.clone());
            Cow::Owned(re)
        }))
    }

    pub fn with_enum<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<serde_json::Value>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_range(mut self, minimum: Option<f64>, maximum: Option<f64>) -> Self {
        self.minimum = minimum;
        self.maximum = maximum;
        self
    }

    pub fn with_item_bounds(mut self, min_items: Option<usize>, max_items: Option<usize>) -> Self {
        self.min_items = min_items;
        self.max_items = max_items;
        self
    }

    pub fn deny_additional(mut self) -> Self {
        self.additional_properties = Some(false);
        self
    }

    /// Check the schema itself is usable.
    ///
    /// Every `pattern` must compile and numeric/array bounds must be ordered.
    pub fn check(&self) -> Result<()> {
        self.check_at("input")
    }

    fn check_at(&self, path: &str) -> Result<()> {
        if let Some(Err(e)) = self.compiled_pattern() {
            return Err(McpError::InvalidSchema(format!(
                "{}: invalid pattern: {}",
                path, e
            )));
        }

        if let (Some(min), Some(max)) = (self.minimum, self.maximum) {
            if min > max {
                return Err(McpError::InvalidSchema(format!(
                    "{}: minimum {} exceeds maximum {}",
                    path, min, max
                )));
            }
        }

        if let (Some(min), Some(max)) = (self.min_items, self.max_items) {
            if min > max {
                return Err(McpError::InvalidSchema(format!(
                    "{}: minItems {} exceeds maxItems {}",
                    path, min, max
                )));
            }
        }

        for (name, property) in &self.properties {
            property.check_at(&validator::child_path(path, name))?;
        }

        if let Some(items) = &self.items {
            items.check_at(&format!("{}[]", path))?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_deserializes_json_schema() {
        let schema: Schema = serde_json::from_value(serde_json::json!({
            "type": "object",
            "properties": {
                "wallet_address": { "type": "string", "pattern": "^[1-9A-HJ-NP-Za-km-z]{32,44}$" },
                "tags": { "type": "array", "items": { "type": "string" }, "minItems": 1, "maxItems": 3 }
            },
            "required": ["wallet_address"],
            "additionalProperties": false
        }))
        .unwrap();

        assert_eq!(schema.schema_type, Some(SchemaType::Object));
        assert_eq!(schema.required, vec!["wallet_address".to_string()]);
        assert_eq!(schema.properties["tags"].max_items, Some(3));
        assert_eq!(schema.additional_properties, Some(false));
    }

    #[test]
    fn test_schema_serializes_camel_case() {
        let schema = Schema::object()
            .with_required("level", Schema::string().with_enum(["low", "high"]))
            .with_property("ids", Schema::array(Schema::integer()).with_item_bounds(Some(1), None))
            .deny_additional();

        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["type"], "object");
        assert_eq!(json["properties"]["level"]["enum"][1], "high");
        assert_eq!(json["properties"]["ids"]["minItems"], 1);
        assert_eq!(json["additionalProperties"], false);
        assert!(json["properties"]["ids"].get("maxItems").is_none());
    }

    #[test]
    fn test_check_rejects_bad_pattern() {
        let schema = Schema::object().with_property("a", Schema::string().with_pattern("(unclosed"));
        let err = schema.check().unwrap_err();
        assert!(err.to_string().contains("a: invalid pattern"));
    }

    #[test]
    fn test_check_rejects_inverted_bounds() {
        assert!(Schema::number().with_range(Some(5.0), Some(1.0)).check().is_err());
        assert!(Schema::array(Schema::string())
            .with_item_bounds(Some(3), Some(2))
            .check()
            .is_err());
        assert!(Schema::number().with_range(Some(0.0), Some(1.0)).check().is_ok());
    }
}
