//! Tool specifications and the JSON-Schema subset validator.
//!
//! The subset supported is `{null, boolean, object, array, number, integer, string}` with
//! recursive validation over `properties`, `items`, and `additionalProperties`.

use serde_json::Value;

use crate::error::RegistryError;

/// Tool specification, the unit read from the startup manifest and handed to agent wrappers.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

const KNOWN_TYPES: &[&str] = &[
    "null", "boolean", "object", "array", "number", "integer", "string",
];

/// Validates a tool spec's `input_schema` recursively. Unknown or malformed schemas abort
/// startup per, so this is called once at registration time, not per-call.
pub fn validate_schema(schema: &Value) -> Result<(), RegistryError> {
    validate_node(schema)
}

fn validate_node(node: &Value) -> Result<(), RegistryError> {
    let obj = node.as_object().ok_or_else(|| RegistryError::Manifest(
        "schema node must be a JSON object".to_string(),
    ))?;

    if let Some(ty) = obj.get("type") {
        match ty {
            Value::String(s) => check_known_type(s)?,
            Value::Array(items) => {
                for item in items {
                    let s = item.as_str().ok_or_else(|| {
                        RegistryError::Manifest("type array entries must be strings".to_string())
                    })?;
                    check_known_type(s)?;
                }
            }
            _ => {
                return Err(RegistryError::Manifest(
                    "'type' must be a string or array of strings".to_string(),
                ))
            }
        }
    }

    if let Some(props) = obj.get("properties") {
        let props = props.as_object().ok_or_else(|| {
            RegistryError::Manifest("'properties' must be an object".to_string())
        })?;
        for (_, child) in props {
            validate_node(child)?;
        }
    }

    if let Some(items) = obj.get("items") {
        validate_node(items)?;
    }

    if let Some(additional) = obj.get("additionalProperties") {
        if !additional.is_boolean() {
            validate_node(additional)?;
        }
    }

    if let Some(required) = obj.get("required") {
        let required = required.as_array().ok_or_else(|| {
            RegistryError::Manifest("'required' must be an array".to_string())
        })?;
        for name in required {
            if !name.is_string() {
                return Err(RegistryError::Manifest(
                    "'required' entries must be strings".to_string(),
                ));
            }
        }
    }

    if let Some(values) = obj.get("enum") {
        if !values.is_array() {
            return Err(RegistryError::Manifest("'enum' must be an array".to_string()));
        }
    }

    Ok(())
}

fn check_known_type(s: &str) -> Result<(), RegistryError> {
    if KNOWN_TYPES.contains(&s) {
        Ok(())
    } else {
        Err(RegistryError::Manifest(format!("unknown schema type '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_well_formed_object_schema() {
        let schema = json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["path"],
            "additionalProperties": false
        });
        assert!(validate_schema(&schema).is_ok());
    }

    #[test]
    fn rejects_unknown_type() {
        let schema = json!({"type": "date"});
        assert!(validate_schema(&schema).is_err());
    }

    #[test]
    fn rejects_non_object_properties_entry() {
        let schema = json!({"type": "object", "properties": {"path": "string"}});
        assert!(validate_schema(&schema).is_err());
    }

    #[test]
    fn recurses_into_items() {
        let schema = json!({"type": "array", "items": {"type": "nope"}});
        assert!(validate_schema(&schema).is_err());
    }
}
