//! Argument validation against a capability's JSON Schema
//!
//! Covers the subset MCP servers actually publish: `type` (single or union),
//! `required`, `properties`, `items`, `enum`. Unknown keywords are ignored.

use serde_json::Value;

/// Validate `args` against `schema`, collecting every violation.
pub fn validate_arguments(schema: &Value, args: &Value) -> Result<(), Vec<String>> {
    let mut errors = Vec::new();
    check(schema, args, "$", &mut errors);
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check(schema: &Value, value: &Value, path: &str, errors: &mut Vec<String>) {
    let Some(schema) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema.get("type") {
        let ok = match expected {
            Value::String(t) => type_matches(t, value),
            Value::Array(ts) => ts
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(t, value)),
            _ => true,
        };
        if !ok {
            errors.push(format!(
                "{}: expected {}, got {}",
                path,
                expected_label(expected),
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum") {
        if !allowed.contains(value) {
            errors.push(format!("{}: value {} is not one of {:?}", path, value, allowed));
        }
    }

    if let Value::Object(map) = value {
        if let Some(Value::Array(required)) = schema.get("required") {
            for key in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(key) {
                    errors.push(format!("{}: missing required property '{}'", path, key));
                }
            }
        }
        if let Some(Value::Object(props)) = schema.get("properties") {
            for (key, sub) in props {
                if let Some(v) = map.get(key) {
                    check(sub, v, &format!("{}.{}", path, key), errors);
                }
            }
        }
    }

    if let (Value::Array(items), Some(item_schema)) = (value, schema.get("items")) {
        for (i, item) in items.iter().enumerate() {
            check(item_schema, item, &format!("{}[{}]", path, i), errors);
        }
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        // 10.0도 정수
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value.as_f64().map(|f| f.is_finite() && f.fract() == 0.0).unwrap_or(false)
        }
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn expected_label(expected: &Value) -> String {
    match expected {
        Value::String(s) => s.clone(),
        Value::Array(ts) => ts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" | "),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn read_file_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "limit": { "type": "integer" },
                "mode": { "type": "string", "enum": ["text", "binary"] },
                "tags": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["path"]
        })
    }

    #[test]
    fn test_valid_arguments() {
        let args = json!({"path": "/tmp/a", "limit": 10, "mode": "text", "tags": ["x"]});
        assert!(validate_arguments(&read_file_schema(), &args).is_ok());
    }

    #[test]
    fn test_missing_required() {
        let errors = validate_arguments(&read_file_schema(), &json!({})).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("'path'"));
    }

    #[test]
    fn test_wrong_types_are_not_coerced() {
        let args = json!({"path": 42, "limit": "10", "tags": ["ok", 3]});
        let errors = validate_arguments(&read_file_schema(), &args).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.starts_with("$.path")));
        assert!(errors.iter().any(|e| e.starts_with("$.limit")));
        assert!(errors.iter().any(|e| e.starts_with("$.tags[1]")));
    }

    #[test]
    fn test_integer_accepts_whole_floats() {
        let schema = json!({"type": "integer"});
        assert!(validate_arguments(&schema, &json!(10.0)).is_ok());
        assert!(validate_arguments(&schema, &json!(-3)).is_ok());

        let errors = validate_arguments(&schema, &json!(10.5)).unwrap_err();
        assert_eq!(errors, vec!["$: expected integer, got number".to_string()]);
    }

    #[test]
    fn test_enum_violation() {
        let args = json!({"path": "a", "mode": "hex"});
        let errors = validate_arguments(&read_file_schema(), &args).unwrap_err();
        assert!(errors[0].contains("not one of"));
    }

    #[test]
    fn test_non_object_arguments() {
        let errors = validate_arguments(&read_file_schema(), &json!("path")).unwrap_err();
        assert_eq!(errors, vec!["$: expected object, got string".to_string()]);
    }

    #[test]
    fn test_union_types_and_empty_schema() {
        let schema = json!({"type": ["string", "null"]});
        assert!(validate_arguments(&schema, &Value::Null).is_ok());
        assert!(validate_arguments(&schema, &json!(1)).is_err());
        assert!(validate_arguments(&json!({}), &json!({"anything": true})).is_ok());
    }
}
