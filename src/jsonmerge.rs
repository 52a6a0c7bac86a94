//! RFC 7386 JSON Merge Patch, the Strategic Merge Engine's fallback for
//! kinds the Scheme Lookup doesn't know (spec §4.7 point 3).

use serde_yaml_ng::Value;

use crate::error::Result;

/// Apply an RFC 7386 merge of `patch` onto `doc`, serializing both through
/// `serde_json::Value` as spec §4.7 requires (this is the one boundary in
/// the crate where YAML values cross into JSON: the int/string distinction
/// RFC 7386 needs survives the round trip because `serde_yaml_ng::Value`'s
/// `Number` variant maps onto JSON's number type either way).
///
/// # Errors
///
/// Returns [`Error::Json`] if either side fails to convert through
/// `serde_json::Value`.
pub fn apply(doc: &Value, patch: &Value) -> Result<Value> {
    let mut doc_json = serde_json::to_value(doc)?;
    let patch_json = serde_json::to_value(patch)?;
    merge(&mut doc_json, &patch_json);
    Ok(serde_json::from_value(doc_json)?)
}

/// The canonical recursive RFC 7386 algorithm: a `null` in the patch
/// removes the key, a non-object patch value replaces wholesale, and an
/// object patch value merges key by key (including replacing whole lists,
/// which is the fallback's documented precision loss vs. schema-aware
/// merge-by-key).
fn merge(doc: &mut serde_json::Value, patch: &serde_json::Value) {
    let Some(patch_obj) = patch.as_object() else {
        *doc = patch.clone();
        return;
    };
    if !doc.is_object() {
        *doc = serde_json::Value::Object(serde_json::Map::new());
    }
    let map = doc.as_object_mut().expect("just ensured doc is an object");
    for (key, value) in patch_obj {
        if value.is_null() {
            map.remove(key.as_str());
        } else {
            merge(map.entry(key.as_str()).or_insert(serde_json::Value::Null), value);
        }
    }
}
