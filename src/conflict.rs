//! Conflict Detector (spec §4.8).

use serde_yaml_ng::Value;

use crate::scheme::{Gvk, MergeSchema, SchemeLookup};

/// Per-resource conflict findings: the index pairs (into the resource's
/// SMP list, in received order) whose patches conflict, with a
/// human-readable description of what conflicted.
#[derive(Debug, Clone, Default)]
pub struct ConflictReport {
    /// `(index_a, index_b, description)` for every conflicting pair.
    pub conflicts: Vec<(usize, usize, String)>,
}

impl ConflictReport {
    /// Whether any pair conflicts.
    #[must_use]
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Pairwise-check every SMP in `patches` against every other. Zero or one
/// patch never conflicts.
#[must_use]
pub fn detect(patches: &[Value], gvk: &Gvk, lookup: &dyn SchemeLookup) -> ConflictReport {
    let mut conflicts = Vec::new();
    if patches.len() < 2 {
        return ConflictReport { conflicts };
    }

    let schema = lookup.merge_schema(gvk);
    for i in 0..patches.len() {
        for j in (i + 1)..patches.len() {
            let found = match schema {
                Some(schema) => schema_conflict(&patches[i], &patches[j], schema, ""),
                None => simple_conflict(&patches[i], &patches[j], ""),
            };
            if let Some(description) = found {
                conflicts.push((i, j, description));
            }
        }
    }
    ConflictReport { conflicts }
}

/// Simple key-overlap fallback: two maps conflict if they set the same
/// top-level key (recursively) to values that are not deeply, type-aware
/// equal. `Value::eq` already distinguishes `Number(1)` from `String("1")`.
fn simple_conflict(a: &Value, b: &Value, path: &str) -> Option<String> {
    let (Value::Mapping(ma), Value::Mapping(mb)) = (a, b) else {
        return if a == b {
            None
        } else {
            Some(format!("{path} differs: {a:?} vs {b:?}"))
        };
    };

    for (key, va) in ma {
        let Some(vb) = mb.get(key) else { continue };
        let field = key.as_str().unwrap_or_default();
        let nested_path = join_path(path, field);
        if let Some(desc) = simple_conflict(va, vb, &nested_path) {
            return Some(desc);
        }
    }
    None
}

/// Schema-aware conflict check: lists with a known merge key only conflict
/// when both patches touch the *same* keyed item with differing values;
/// everything else falls back to the simple recursive comparison.
fn schema_conflict(a: &Value, b: &Value, schema: &MergeSchema, path: &str) -> Option<String> {
    let (Value::Mapping(ma), Value::Mapping(mb)) = (a, b) else {
        return if a == b {
            None
        } else {
            Some(format!("{path} differs: {a:?} vs {b:?}"))
        };
    };

    for (key, va) in ma {
        let Some(vb) = mb.get(key) else { continue };
        let field = key.as_str().unwrap_or_default();
        let nested_path = join_path(path, field);

        if let (Value::Sequence(la), Value::Sequence(lb)) = (va, vb) {
            if let Some(merge_key) = schema.merge_key_for(field) {
                if let Some(desc) = list_conflict_by_key(la, lb, merge_key, schema, &nested_path) {
                    return Some(desc);
                }
                continue;
            }
        }

        if let Some(desc) = schema_conflict(va, vb, schema, &nested_path) {
            return Some(desc);
        }
    }
    None
}

fn list_conflict_by_key(
    a: &[Value],
    b: &[Value],
    merge_key: &str,
    schema: &MergeSchema,
    path: &str,
) -> Option<String> {
    for item_a in a {
        let Some(key_value) = item_a.as_mapping().and_then(|m| m.get(merge_key)) else {
            continue;
        };
        let Some(item_b) = b
            .iter()
            .find(|item| item.as_mapping().and_then(|m| m.get(merge_key)) == Some(key_value))
        else {
            continue;
        };
        let item_path = format!("{path}[{merge_key}={key_value:?}]");
        if let Some(desc) = schema_conflict(item_a, item_b, schema, &item_path) {
            return Some(desc);
        }
    }
    None
}

fn join_path(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::BuiltinSchemeRegistry;

    fn yaml(s: &str) -> Value {
        serde_yaml_ng::from_str(s).unwrap()
    }

    #[test]
    fn single_patch_never_conflicts() {
        let registry = BuiltinSchemeRegistry::new();
        let gvk = Gvk::from_api_version("example.com/v1", "MyCRD");
        let report = detect(&[yaml("spec:\n  replicas: 1\n")], &gvk, &registry);
        assert!(!report.has_conflicts());
    }

    #[test]
    fn type_aware_inequality_is_a_conflict_for_unknown_kind() {
        let registry = BuiltinSchemeRegistry::new();
        let gvk = Gvk::from_api_version("example.com/v1", "MyCRD");
        let patches = vec![
            yaml("spec:\n  replicas: 1\n"),
            yaml("spec:\n  replicas: \"1\"\n"),
        ];
        let report = detect(&patches, &gvk, &registry);
        assert!(report.has_conflicts());
    }

    #[test]
    fn identical_values_do_not_conflict() {
        let registry = BuiltinSchemeRegistry::new();
        let gvk = Gvk::from_api_version("example.com/v1", "MyCRD");
        let patches = vec![
            yaml("spec:\n  replicas: 1\n"),
            yaml("spec:\n  replicas: 1\n"),
        ];
        let report = detect(&patches, &gvk, &registry);
        assert!(!report.has_conflicts());
    }

    #[test]
    fn schema_aware_merge_on_different_items_does_not_conflict() {
        let registry = BuiltinSchemeRegistry::new();
        let gvk = Gvk::from_api_version("apps/v1", "Deployment");
        let patches = vec![
            yaml("containers:\n  - name: main\n    image: nginx:1.25\n"),
            yaml("containers:\n  - name: sidecar\n    image: envoy:v1.28\n"),
        ];
        let report = detect(&patches, &gvk, &registry);
        assert!(!report.has_conflicts());
    }

    #[test]
    fn schema_aware_merge_on_same_item_conflicting_field_conflicts() {
        let registry = BuiltinSchemeRegistry::new();
        let gvk = Gvk::from_api_version("apps/v1", "Deployment");
        let patches = vec![
            yaml("containers:\n  - name: main\n    image: nginx:1.25\n"),
            yaml("containers:\n  - name: main\n    image: nginx:1.26\n"),
        ];
        let report = detect(&patches, &gvk, &registry);
        assert!(report.has_conflicts());
    }
}
