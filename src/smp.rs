//! Strategic Merge Engine (spec §4.7).

use serde_yaml_ng::{Mapping, Value};

use crate::error::{Error, Result};
use crate::jsonmerge;
use crate::scheme::{Gvk, MergeSchema, SchemeLookup};

/// Apply a strategic merge patch to `resource`.
///
/// `patch` is deep-copied before use (merge engines are allowed to mutate
/// their inputs; `Value::clone` is a full deep copy here). If `lookup`
/// resolves a [`MergeSchema`] for `gvk`, lists are merged by their known
/// merge key; otherwise the patch falls back to RFC 7386 JSON merge, which
/// replaces whole lists (spec §4.7 point 3).
///
/// On error the caller's `resource` reference is left untouched: this
/// function takes `resource` by value and returns the merged result, so a
/// failure simply means the `Result::Err` is propagated without the
/// resource having been partially mutated anywhere.
///
/// # Errors
///
/// Returns [`Error::StrategicMerge`] if the JSON-merge fallback fails to
/// round-trip through `serde_json::Value`.
pub fn apply(
    resource: &Value,
    patch: &Value,
    gvk: &Gvk,
    lookup: &dyn SchemeLookup,
    resource_name: &str,
) -> Result<Value> {
    let patch = patch.clone();

    match lookup.merge_schema(gvk) {
        Some(schema) => Ok(merge_value(resource, &patch, schema)),
        None => jsonmerge::apply(resource, &patch).map_err(|e| Error::StrategicMerge {
            resource: resource_name.to_string(),
            cause: e.to_string(),
        }),
    }
}

/// Schema-aware deep merge: object fields merge recursively, lists merge
/// by key when the schema knows one for that field name, and everything
/// else is replaced wholesale by the patch value.
fn merge_value(orig: &Value, patch: &Value, schema: &MergeSchema) -> Value {
    let Some(patch_map) = patch.as_mapping() else {
        return patch.clone();
    };

    let mut out = orig.as_mapping().cloned().unwrap_or_default();
    for (key, patch_value) in patch_map {
        let field = key.as_str().unwrap_or_default();
        let existing = out.get(key).cloned();
        let merged = match (&existing, patch_value) {
            (Some(Value::Sequence(orig_list)), Value::Sequence(patch_list)) => {
                match schema.merge_key_for(field) {
                    Some(merge_key) => {
                        Value::Sequence(merge_list_by_key(orig_list, patch_list, merge_key, schema))
                    }
                    None => patch_value.clone(),
                }
            }
            (Some(existing_value), _) => merge_value(existing_value, patch_value, schema),
            (None, _) => patch_value.clone(),
        };
        out.insert(key.clone(), merged);
    }
    Value::Mapping(out)
}

/// Merge two lists by `merge_key`: items present in both are merged field
/// by field (patch wins on conflicts); items only in the original are kept
/// in their original position; items only in the patch are appended in
/// patch order. Items without the merge key are matched positionally by
/// equality and otherwise treated as patch-only.
fn merge_list_by_key(
    orig_list: &[Value],
    patch_list: &[Value],
    merge_key: &str,
    schema: &MergeSchema,
) -> Vec<Value> {
    let mut used_patch = vec![false; patch_list.len()];
    let mut out = Vec::with_capacity(orig_list.len() + patch_list.len());

    for orig_item in orig_list {
        let key_value = key_value_of(orig_item, merge_key);
        let matched = key_value.as_ref().and_then(|kv| {
            patch_list
                .iter()
                .enumerate()
                .find(|(idx, p)| !used_patch[*idx] && key_value_of(p, merge_key).as_ref() == Some(kv))
        });
        match matched {
            Some((idx, patch_item)) => {
                used_patch[idx] = true;
                out.push(merge_value(orig_item, patch_item, schema));
            }
            None => out.push(orig_item.clone()),
        }
    }

    for (idx, patch_item) in patch_list.iter().enumerate() {
        if !used_patch[idx] {
            out.push(patch_item.clone());
        }
    }

    out
}

fn key_value_of(item: &Value, merge_key: &str) -> Option<Value> {
    item.as_mapping()?.get(merge_key).cloned()
}

/// Build an empty mapping, used by callers seeding a resource with no
/// prior state for a field the merge schema expects to be a mapping.
#[must_use]
pub fn empty_object() -> Value {
    Value::Mapping(Mapping::new())
}
