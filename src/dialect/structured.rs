//! Structured dialect loader (spec §4.3b): a nested YAML dialect whose top
//! value is either a flat mapping of field-level patches, or a sequence of
//! explicitly targeted entries.

use serde_yaml_ng::{Mapping, Value};

use super::{PatchSpec, VariableContext};
use crate::error::{Error, Result};
use crate::patchop;
use crate::typeinfer;

/// Parse Structured-dialect patch bytes into a `PatchSpec` stream.
///
/// # Errors
///
/// Returns [`Error::Yaml`] on malformed YAML, or [`Error::Parse`] if a
/// sequence entry is missing `target`, has an empty `patch` for a
/// strategic entry, or names an unknown `type`.
pub fn load(raw: &str, vars: &VariableContext) -> Result<Vec<PatchSpec>> {
    let top: Value = serde_yaml_ng::from_str(raw)?;
    match top {
        Value::Mapping(map) => load_flat_mapping(map, vars),
        Value::Sequence(entries) => load_sequence(entries, vars),
        Value::Null => Ok(Vec::new()),
        other => Err(Error::Parse(format!(
            "structured dialect top value must be a mapping or a sequence, got {other:?}"
        ))),
    }
}

fn load_flat_mapping(map: Mapping, vars: &VariableContext) -> Result<Vec<PatchSpec>> {
    let mut specs = Vec::with_capacity(map.len());
    for (key, value) in map {
        let key = key
            .as_str()
            .ok_or_else(|| Error::Parse("flat-mapping patch keys must be strings".to_string()))?;
        let value = prepare_value(key, value, vars);
        let op = patchop::parse_line(key, value)?;
        specs.push(PatchSpec::Field { op, target: None });
    }
    Ok(specs)
}

fn load_sequence(entries: Vec<Value>, vars: &VariableContext) -> Result<Vec<PatchSpec>> {
    let mut specs = Vec::new();
    for entry in entries {
        let Value::Mapping(entry) = entry else {
            return Err(Error::Parse(
                "structured dialect sequence entries must be mappings".to_string(),
            ));
        };

        let target = entry
            .get("target")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Parse("sequence entry is missing 'target'".to_string()))?
            .to_string();

        let patch_type = entry.get("type").and_then(Value::as_str).unwrap_or("");
        let Some(Value::Mapping(patch)) = entry.get("patch").cloned() else {
            return Err(Error::Parse(format!(
                "sequence entry for target '{target}' is missing a mapping 'patch'"
            )));
        };

        match patch_type {
            "strategic" => {
                if patch.is_empty() {
                    return Err(Error::Parse(format!(
                        "strategic patch for target '{target}' must be non-empty"
                    )));
                }
                let mut patch_value = Value::Mapping(patch);
                super::substitution::substitute_value(&mut patch_value, vars);
                typeinfer::infer_types_in_value(&mut patch_value);
                let Value::Mapping(patch) = patch_value else {
                    unreachable!("substitution/inference preserve the mapping variant")
                };
                specs.push(PatchSpec::Strategic { patch, target });
            }
            "" => {
                for (key, value) in patch {
                    let key = key.as_str().ok_or_else(|| {
                        Error::Parse("patch keys must be strings".to_string())
                    })?;
                    let value = prepare_value(key, value, vars);
                    let op = patchop::parse_line(key, value)?;
                    specs.push(PatchSpec::Field {
                        op,
                        target: Some(target.clone()),
                    });
                }
            }
            other => {
                return Err(Error::Parse(format!(
                    "unknown patch 'type': '{other}' (expected '' or 'strategic')"
                )))
            }
        }
    }
    Ok(specs)
}

/// Substitute variables into `value`, then apply type inference. Maps and
/// sequences infer per-field using their own keys; bare scalars infer
/// using `key`'s terminal field name.
fn prepare_value(key: &str, mut value: Value, vars: &VariableContext) -> Value {
    super::substitution::substitute_value(&mut value, vars);
    match &value {
        Value::String(s) => typeinfer::infer_scalar(terminal_field_name(key), s),
        Value::Mapping(_) | Value::Sequence(_) => {
            typeinfer::infer_types_in_value(&mut value);
            value
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::Tagged(_) => value,
    }
}

fn terminal_field_name(key: &str) -> &str {
    // Strip past the last bracket group, not the first one: a key like
    // `spec.ports[name=http].port` must yield `port`, not `ports`.
    let after_bracket = key.rfind(']').map_or(key, |i| &key[i + 1..]);
    let after_bracket = after_bracket.trim_start_matches('.');
    if !after_bracket.is_empty() {
        return after_bracket.rsplit('.').next().unwrap_or(after_bracket);
    }
    let before_bracket = key.rfind('[').map_or(key, |i| &key[..i]);
    before_bracket.rsplit('.').next().unwrap_or(before_bracket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn flat_mapping_yields_untargeted_field_specs() {
        let raw = "data.foo: baz\nmetadata.labels.env: prod\n";
        let specs = load(raw, &VariableContext::default()).unwrap();
        assert_eq!(specs.len(), 2);
        assert!(matches!(specs[0], PatchSpec::Field { target: None, .. }));
    }

    #[test]
    fn sequence_entry_with_explicit_target() {
        let raw = "- target: demo\n  patch:\n    data.foo: baz\n    metadata.labels.env: prod\n";
        let specs = load(raw, &VariableContext::default()).unwrap();
        assert_eq!(specs.len(), 2);
        for spec in &specs {
            let PatchSpec::Field { target, .. } = spec else {
                panic!("expected field spec")
            };
            assert_eq!(target.as_deref(), Some("demo"));
        }
    }

    #[test]
    fn strategic_entry_requires_nonempty_patch() {
        let raw = "- target: demo\n  type: strategic\n  patch: {}\n";
        assert!(load(raw, &VariableContext::default()).is_err());
    }

    #[test]
    fn strategic_entry_parses_into_strategic_spec() {
        let raw = "- target: demo\n  type: strategic\n  patch:\n    spec:\n      replicas: 3\n";
        let specs = load(raw, &VariableContext::default()).unwrap();
        assert_eq!(specs.len(), 1);
        assert!(matches!(specs[0], PatchSpec::Strategic { .. }));
    }

    #[test]
    fn unknown_type_is_fatal() {
        let raw = "- target: demo\n  type: json\n  patch:\n    a: b\n";
        assert!(load(raw, &VariableContext::default()).is_err());
    }

    #[test]
    fn missing_target_is_fatal() {
        let raw = "- patch:\n    a: b\n";
        assert!(load(raw, &VariableContext::default()).is_err());
    }

    #[test]
    fn substitutes_and_infers_types_in_flat_mapping() {
        let mut values = HashMap::new();
        values.insert("replicas".to_string(), Value::String("3".to_string()));
        let vars = VariableContext {
            values,
            features: HashMap::new(),
        };
        let raw = "spec.replicas: \"${values.replicas}\"\n";
        let specs = load(raw, &vars).unwrap();
        let PatchSpec::Field { op, .. } = &specs[0] else {
            panic!("expected field spec")
        };
        let value = op.value.clone().unwrap().into_plain();
        assert_eq!(value, Value::Number(3.into()));
    }
}
