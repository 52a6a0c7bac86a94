//! Shared type-inference rules (spec §4.3c), applied both to patch values
//! after substitution and to base manifest scalars by the Document Loader,
//! so that patched and base scalars end up with uniform Rust types.

use serde_yaml_ng::Value;

/// Field-name suffixes/exact names that Kubernetes manifests conventionally
/// use for integer values, even when authored as a quoted string.
const INTEGER_FIELD_NAMES: &[&str] = &[
    "port",
    "replicas",
    "runAsUser",
    "runAsGroup",
    "fsGroup",
    "weight",
    "priority",
    "containerPort",
    "targetPort",
    "nodePort",
];

fn is_known_integer_field(field: &str) -> bool {
    INTEGER_FIELD_NAMES.contains(&field) || field.ends_with("Seconds")
}

/// Infer the type of a scalar string `s` that was read under key `field`.
///
/// `"true"`/`"false"` become booleans; a string that parses as a 64-bit
/// integer *and* whose field name matches a known Kubernetes integer field
/// becomes an integer; everything else is left as a string.
#[must_use]
pub fn infer_scalar(field: &str, s: &str) -> Value {
    match s {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if is_known_integer_field(field) {
        if let Ok(n) = s.parse::<i64>() {
            return Value::Number(n.into());
        }
    }
    Value::String(s.to_string())
}

/// Recursively walk `value`, applying [`infer_scalar`] to every string
/// scalar found directly under a mapping key (list elements inherit the
/// field name of their containing key).
pub fn infer_types_in_value(value: &mut Value) {
    walk(value, "");
}

fn walk(value: &mut Value, field: &str) {
    match value {
        Value::String(s) => {
            *value = infer_scalar(field, s);
        }
        Value::Mapping(map) => {
            let keys: Vec<Value> = map.keys().cloned().collect();
            for key in keys {
                let field_name = key.as_str().unwrap_or_default().to_string();
                if let Some(v) = map.get_mut(&key) {
                    walk(v, &field_name);
                }
            }
        }
        Value::Sequence(items) => {
            for item in items {
                walk(item, field);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::Tagged(_) => {}
    }
}
