//! Validate resource and provider configuration against a [`Schema`].
//!
//! ```
//! use upcloud_provider::schema::{Attribute, Schema};
//! use upcloud_provider::validation::validate;
//! use serde_json::json;
//!
//! let schema = Schema::v0()
//!     .with_attribute("name", Attribute::required_string())
//!     .with_attribute("plan", Attribute::optional_string().with_allowed_strings(&["development", "production"]));
//!
//! assert!(validate(&schema, &json!({"name": "gw", "plan": "production"})).is_empty());
//!
//! let diagnostics = validate(&schema, &json!({"name": "gw", "plan": "huge"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute.as_deref(), Some("plan"));
//! ```

use serde_json::{Map, Value};

use crate::schema::{
    Attribute, AttributeType, Block, BlockNestingMode, Diagnostic, NestedBlock, Schema,
};

/// Validate `value` against `schema`.
///
/// Rules:
/// - required attributes must be present and non-null
/// - read-only (computed only) attributes are not checked
/// - values must match the attribute type and, when set, its allowed values
/// - keys that are neither attributes nor blocks are rejected
/// - nested blocks are checked recursively, with their item limits
///
/// An empty result means the value is valid.
pub fn validate(schema: &Schema, value: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    validate_block(&schema.block, value, "", &mut diagnostics);
    diagnostics
}

/// Like [`validate`], but as a `Result`.
pub fn validate_result(schema: &Schema, value: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(schema, value);
    if diagnostics.is_empty() {
        Ok(())
    } else {
        Err(diagnostics)
    }
}

/// Whether `value` is valid against `schema`.
pub fn is_valid(schema: &Schema, value: &Value) -> bool {
    validate(schema, value).is_empty()
}

fn validate_block(block: &Block, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    let obj = match value {
        Value::Object(map) => map,
        Value::Null => return,
        _ => {
            diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", value_type_name(value)))
                    .with_attribute_if_not_empty(path),
            );
            return;
        },
    };

    check_unknown_keys(block, obj, path, diagnostics);

    for (name, attr) in &block.attributes {
        let attr_path = join_path(path, name);
        validate_attribute(attr, obj.get(name), &attr_path, diagnostics);
    }

    for (name, nested) in &block.blocks {
        let block_path = join_path(path, name);
        validate_nested_block(nested, obj.get(name), &block_path, diagnostics);
    }
}

fn check_unknown_keys(
    block: &Block,
    obj: &Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for key in obj.keys() {
        if !block.attributes.contains_key(key) && !block.blocks.contains_key(key) {
            let key_path = join_path(path, key);
            diagnostics.push(
                Diagnostic::error(format!("Unsupported argument '{}'", key_path))
                    .with_detail("An argument with this name is not expected here")
                    .with_attribute(key_path),
            );
        }
    }
}

fn validate_attribute(
    attr: &Attribute,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if attr.is_read_only() {
        return;
    }

    match value {
        None | Some(Value::Null) => {
            if attr.flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
        },
        Some(v) => {
            let before = diagnostics.len();
            validate_attribute_type(&attr.attr_type, v, path, diagnostics);
            if diagnostics.len() == before
                && !attr.allowed_values.is_empty()
                && !attr.allowed_values.contains(v)
            {
                diagnostics.push(not_allowed(path, v, &attr.allowed_values));
            }
        },
    }
}

fn validate_attribute_type(
    attr_type: &AttributeType,
    value: &Value,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match attr_type {
        AttributeType::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, "string", value));
            }
        },
        AttributeType::Int64 => {
            if !is_int64(value) {
                diagnostics.push(type_error(path, "int64", value));
            }
        },
        AttributeType::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, "bool", value));
            }
        },
        AttributeType::List(element_type) | AttributeType::Set(element_type) => {
            match value.as_array() {
                Some(items) => {
                    for (i, item) in items.iter().enumerate() {
                        let item_path = format!("{}.{}", path, i);
                        validate_attribute_type(element_type, item, &item_path, diagnostics);
                    }
                },
                None => {
                    let expected = if matches!(attr_type, AttributeType::Set(_)) {
                        "set"
                    } else {
                        "list"
                    };
                    diagnostics.push(type_error(path, expected, value));
                },
            }
        },
        AttributeType::Map(value_type) => match value.as_object() {
            Some(obj) => {
                for (key, val) in obj {
                    let key_path = format!("{}.{}", path, key);
                    validate_attribute_type(value_type, val, &key_path, diagnostics);
                }
            },
            None => diagnostics.push(type_error(path, "map", value)),
        },
    }
}

fn validate_nested_block(
    nested: &NestedBlock,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    match (nested.nesting_mode, value) {
        (_, None | Some(Value::Null)) => {
            if nested.min_items > 0 {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s)",
                        path, nested.min_items
                    ))
                    .with_attribute(path),
                );
            }
        },
        (BlockNestingMode::Single, Some(v)) => {
            validate_block(&nested.block, v, path, diagnostics);
        },
        (BlockNestingMode::List | BlockNestingMode::Set, Some(Value::Array(items))) => {
            let len = items.len() as u32;
            if len < nested.min_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' requires at least {} item(s), got {}",
                        path, nested.min_items, len
                    ))
                    .with_attribute(path),
                );
            }
            if nested.max_items > 0 && len > nested.max_items {
                diagnostics.push(
                    Diagnostic::error(format!(
                        "Block '{}' allows at most {} item(s), got {}",
                        path, nested.max_items, len
                    ))
                    .with_attribute(path),
                );
            }
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{}.{}", path, i);
                validate_block(&nested.block, item, &item_path, diagnostics);
            }
        },
        (_, Some(v)) => {
            diagnostics.push(
                Diagnostic::error(format!("Expected list for block '{}'", path))
                    .with_detail(format!("Got {}", value_type_name(v)))
                    .with_attribute(path),
            );
        },
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_int64(value: &Value) -> bool {
    match value {
        Value::Number(n) => {
            n.is_i64()
                || n.as_f64()
                    .is_some_and(|f| f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
        },
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, value_type_name(got)))
        .with_attribute(path)
}

fn not_allowed(path: &str, got: &Value, allowed: &[Value]) -> Diagnostic {
    let allowed = allowed
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    Diagnostic::error(format!("Invalid value for attribute '{}'", path))
        .with_detail(format!("Expected one of [{}], got {}", allowed, got))
        .with_attribute(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Attribute, Block, NestedBlock, Schema};
    use serde_json::json;

    fn gateway_schema() -> Schema {
        Schema::v0()
            .with_id("UUID")
            .with_attribute("name", Attribute::required_string())
            .with_attribute("zone", Attribute::required_string())
            .with_attribute(
                "features",
                Attribute::new(
                    AttributeType::set(AttributeType::String),
                    crate::schema::AttributeFlags::required(),
                ),
            )
            .with_attribute("configured_status", Attribute::optional_string().with_allowed_strings(&["started", "stopped"]))
            .with_attribute("labels", Attribute::optional_labels())
            .with_block(
                "router",
                NestedBlock::single(Block::new().with_attribute("id", Attribute::required_string()))
                    .with_min_items(1),
            )
    }

    #[test]
    fn test_valid_gateway() {
        let config = json!({
            "name": "gw",
            "zone": "pl-waw1",
            "features": ["nat"],
            "configured_status": "started",
            "labels": {"env": "test"},
            "router": {"id": "0a1b"}
        });
        assert!(is_valid(&gateway_schema(), &config));
    }

    #[test]
    fn test_missing_required_and_null() {
        let diagnostics = validate(
            &gateway_schema(),
            &json!({"name": null, "zone": "pl-waw1", "features": [], "router": {"id": "r"}}),
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("name"));
        assert!(diagnostics[0].summary.contains("Missing required"));
    }

    #[test]
    fn test_computed_id_not_checked() {
        let config = json!({"id": 42, "name": "gw", "zone": "z", "features": [], "router": {"id": "r"}});
        assert!(validate(&gateway_schema(), &config).is_empty());
    }

    #[test]
    fn test_wrong_types() {
        let config = json!({
            "name": 1,
            "zone": "z",
            "features": ["nat", 7],
            "labels": {"env": true},
            "router": {"id": "r"}
        });
        let diagnostics = validate(&gateway_schema(), &config);
        let paths: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.clone()).collect();
        assert!(paths.contains(&"name".to_string()));
        assert!(paths.contains(&"features.1".to_string()));
        assert!(paths.contains(&"labels.env".to_string()));
        assert_eq!(diagnostics.len(), 3);
    }

    #[test]
    fn test_allowed_values() {
        let config = json!({"name": "gw", "zone": "z", "features": [], "configured_status": "paused", "router": {"id": "r"}});
        let diagnostics = validate(&gateway_schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].summary.contains("Invalid value"));
        assert!(diagnostics[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("\"started\", \"stopped\""));
    }

    #[test]
    fn test_unknown_argument() {
        let config = json!({"name": "gw", "zone": "z", "features": [], "router": {"id": "r", "ip": "x"}, "size": 3});
        let diagnostics = validate(&gateway_schema(), &config);
        let paths: Vec<_> = diagnostics.iter().filter_map(|d| d.attribute.clone()).collect();
        assert_eq!(paths, vec!["size".to_string(), "router.ip".to_string()]);
    }

    #[test]
    fn test_required_single_block() {
        let config = json!({"name": "gw", "zone": "z", "features": []});
        let diagnostics = validate(&gateway_schema(), &config);
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("router"));
    }

    #[test]
    fn test_list_block_limits() {
        let schema = Schema::v0().with_block(
            "node",
            NestedBlock::list(Block::new().with_attribute("count", Attribute::required_int64()))
                .with_min_items(1)
                .with_max_items(2),
        );

        assert!(validate(&schema, &json!({"node": [{"count": 1}]})).is_empty());
        assert_eq!(validate(&schema, &json!({"node": []})).len(), 1);
        assert_eq!(
            validate(&schema, &json!({"node": [{"count": 1}, {"count": 2}, {"count": 3}]})).len(),
            1
        );

        let diagnostics = validate(&schema, &json!({"node": [{"count": "two"}]}));
        assert_eq!(diagnostics[0].attribute.as_deref(), Some("node.0.count"));

        let diagnostics = validate(&schema, &json!({"node": {"count": 1}}));
        assert!(diagnostics[0].summary.contains("Expected list"));
    }

    #[test]
    fn test_int64_accepts_integral_floats() {
        let schema = Schema::v0().with_attribute("port", Attribute::optional_int64());
        assert!(is_valid(&schema, &json!({"port": 443})));
        assert!(is_valid(&schema, &json!({"port": 443.0})));
        assert!(!is_valid(&schema, &json!({"port": 443.5})));
    }

    #[test]
    fn test_root_not_object() {
        let diagnostics = validate(&gateway_schema(), &json!("nope"));
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].attribute.is_none());
    }

    #[test]
    fn test_validate_result_helper() {
        let schema = Schema::v0().with_attribute("name", Attribute::required_string());
        assert!(validate_result(&schema, &json!({"name": "x"})).is_ok());
        assert_eq!(validate_result(&schema, &json!({})).unwrap_err().len(), 1);
    }
}
