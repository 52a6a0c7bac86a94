//! Variable substitution (spec §4.3c, part 1).
//!
//! Substitution runs on raw string values, before type inference, and
//! recurses into nested maps and lists — including inside a strategic
//! merge patch's nested shape (spec §9 "Variable substitution locus").

use std::collections::HashMap;

use serde_yaml_ng::Value;

/// Variable context supplied to the Dialect Loaders: a `values.*` map of
/// arbitrary scalars and a `features.*` map of booleans (spec §6 inputs).
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// `${values.<key>}` lookup table.
    pub values: HashMap<String, Value>,
    /// `${features.<key>}` lookup table.
    pub features: HashMap<String, bool>,
}

impl VariableContext {
    fn lookup(&self, namespace: &str, key: &str) -> Option<String> {
        match namespace {
            "values" => self.values.get(key).map(scalar_text),
            "features" => self.features.get(key).map(bool::to_string),
            _ => None,
        }
    }
}

fn scalar_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => String::new(),
    }
}

/// Replace every `${values.<key>}` / `${features.<key>}` token in `s`.
/// Unknown variables (unknown namespace, or a key absent from the
/// context) are left literal, token and all.
#[must_use]
pub fn substitute_string(s: &str, vars: &VariableContext) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let Some(end) = rest[start..].find('}') else {
            out.push_str(rest);
            return out;
        };
        let end = start + end;
        out.push_str(&rest[..start]);
        let token = &rest[start + 2..end];
        match token.split_once('.') {
            Some((ns, key)) => match vars.lookup(ns, key) {
                Some(replacement) => out.push_str(&replacement),
                None => out.push_str(&rest[start..=end]),
            },
            None => out.push_str(&rest[start..=end]),
        }
        rest = &rest[end + 1..];
    }
    out.push_str(rest);
    out
}

/// Recursively substitute every string scalar within `value`.
pub fn substitute_value(value: &mut Value, vars: &VariableContext) {
    match value {
        Value::String(s) => {
            *s = substitute_string(s, vars);
        }
        Value::Mapping(map) => {
            for (_, v) in map.iter_mut() {
                substitute_value(v, vars);
            }
        }
        Value::Sequence(items) => {
            for item in items {
                substitute_value(item, vars);
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::Tagged(_) => {}
    }
}
