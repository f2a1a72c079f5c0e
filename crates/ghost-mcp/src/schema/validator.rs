//! Fail-soft schema validation
//!
//! Every violation is collected as a field-qualified message; validation never
//! stops at the first problem.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Schema;

const ROOT: &str = "input";

/// Outcome of validating one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn into_result(self) -> Result<(), Vec<String>> {
        if self.valid {
            Ok(())
        } else {
            Err(self.errors)
        }
    }
}

/// Validate `input` against `schema`
pub fn validate(schema: &Schema, input: &Value) -> ValidationReport {
    let mut errors = Vec::new();
    validate_at(schema, input, ROOT, &mut errors);

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

/// Qualified name of a property below `parent`
pub(crate) fn child_path(parent: &str, name: &str) -> String {
    if parent == ROOT {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn validate_at(schema: &Schema, value: &Value, path: &str, errors: &mut Vec<String>) {
    if let Some(expected) = schema.schema_type {
        if !expected.matches(value) {
            errors.push(format!(
                "{}: expected {}, got {}",
                path,
                expected,
                type_name(value)
            ));
            // Constraints below assume the declared type
            return;
        }
    }

    if let Some(allowed) = &schema.enum_values {
        if !allowed.contains(value) {
            let choices = allowed
                .iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            errors.push(format!("{}: {} is not one of [{}]", path, value, choices));
        }
    }

    match value {
        Value::String(s) => check_pattern(schema, s, path, errors),
        Value::Number(n) => {
            if let Some(x) = n.as_f64() {
                check_range(schema, x, path, errors);
            }
        }
        Value::Array(items) => check_array(schema, items, path, errors),
        Value::Object(map) => check_object(schema, map, path, errors),
        Value::Null | Value::Bool(_) => {}
    }
}

fn check_pattern(schema: &Schema, s: &str, path: &str, errors: &mut Vec<String>) {
    let (Some(pattern), Some(compiled)) = (&schema.pattern, schema.compiled_pattern()) else {
        return;
    };

    match compiled {
        Ok(re) => {
            if !re.is_match(s) {
                errors.push(format!("{}: does not match pattern {}", path, pattern));
            }
        }
        Err(e) => errors.push(format!("{}: invalid pattern {}: {}", path, pattern, e)),
    }
}

fn check_range(schema: &Schema, x: f64, path: &str, errors: &mut Vec<String>) {
    if let Some(min) = schema.minimum {
        if x < min {
            errors.push(format!("{}: {} is less than minimum {}", path, x, min));
        }
    }
    if let Some(max) = schema.maximum {
        if x > max {
            errors.push(format!("{}: {} is greater than maximum {}", path, x, max));
        }
    }
}

fn check_array(schema: &Schema, items: &[Value], path: &str, errors: &mut Vec<String>) {
    if let Some(min) = schema.min_items {
        if items.len() < min {
            errors.push(format!(
                "{}: has {} items, fewer than minItems {}",
                path,
                items.len(),
                min
            ));
        }
    }
    if let Some(max) = schema.max_items {
        if items.len() > max {
            errors.push(format!(
                "{}: has {} items, more than maxItems {}",
                path,
                items.len(),
                max
            ));
        }
    }

    if let Some(item_schema) = &schema.items {
        for (index, item) in items.iter().enumerate() {
            validate_at(item_schema, item, &format!("{}[{}]", path, index), errors);
        }
    }
}

fn check_object(
    schema: &Schema,
    map: &serde_json::Map<String, Value>,
    path: &str,
    errors: &mut Vec<String>,
) {
    for field in &schema.required {
        if !map.contains_key(field) {
            errors.push(format!("{}: required field missing", child_path(path, field)));
        }
    }

    for (name, value) in map {
        match schema.properties.get(name) {
            Some(property) => validate_at(property, value, &child_path(path, name), errors),
            None if schema.additional_properties == Some(false) => {
                errors.push(format!("{}: unknown field", child_path(path, name)));
            }
            None => {}
        }
    }
}
