//! Field Operation Engine (spec §4.6).

use serde_yaml_ng::{Mapping, Value};

use crate::error::{Error, Result};
use crate::patchop::{Op, PatchOp, PatchOpValue};
use crate::path::{MatchType, PathSegment};

/// Apply `op` against `root` (a resource's untyped object), identifying the
/// resource as `resource_name` in any error produced.
///
/// # Errors
///
/// Returns [`Error::Operation`] carrying the op, path, resource, and cause
/// for any failure (missing path, out-of-bounds index, selector miss,
/// patching a scalar as a list).
pub fn apply(root: &mut Value, op: &PatchOp, resource_name: &str) -> Result<()> {
    let fail = |cause: String| {
        Error::Operation {
            op: op_name(op.op).to_string(),
            path: op.path.clone(),
            resource: resource_name.to_string(),
            cause,
        }
    };

    match op.op {
        Op::Replace if op.selector.is_none() => {
            let value = op
                .value
                .clone()
                .ok_or_else(|| fail("replace requires a value".to_string()))?
                .into_plain();
            set_path(root, &op.segments, normalize(value)).map_err(|e| fail(e.to_string()))
        }
        Op::Replace => {
            let selector = op.selector.as_deref().unwrap_or_default();
            let list = navigate_to_list(root, &op.segments).map_err(|e| fail(e.to_string()))?;
            let idx =
                resolve_index(list, selector, IndexKind::ReplaceOrDelete).map_err(|e| fail(e))?;
            match op
                .value
                .clone()
                .ok_or_else(|| fail("replace requires a value".to_string()))?
            {
                PatchOpValue::Nested {
                    remaining_path,
                    value,
                } => {
                    let segments =
                        crate::path::parse_path(&remaining_path).map_err(|e| fail(e.to_string()))?;
                    set_path(&mut list[idx], &segments, normalize(value.into_plain()))
                        .map_err(|e| fail(e.to_string()))
                }
                PatchOpValue::Plain(v) => {
                    list[idx] = normalize(v);
                    Ok(())
                }
            }
        }
        Op::Delete if op.selector.is_none() => {
            delete_path(root, &op.segments).map_err(|e| fail(e.to_string()))
        }
        Op::Delete => {
            let selector = op.selector.as_deref().unwrap_or_default();
            let list = navigate_to_list(root, &op.segments).map_err(|e| fail(e.to_string()))?;
            let idx =
                resolve_index(list, selector, IndexKind::ReplaceOrDelete).map_err(|e| fail(e))?;
            list.remove(idx);
            Ok(())
        }
        Op::Append => {
            let value = op
                .value
                .clone()
                .ok_or_else(|| fail("append requires a value".to_string()))?
                .into_plain();
            let list = navigate_to_list(root, &op.segments).map_err(|e| fail(e.to_string()))?;
            list.push(normalize(value));
            Ok(())
        }
        Op::InsertBefore | Op::InsertAfter => {
            let selector = op.selector.as_deref().unwrap_or_default();
            let value = op
                .value
                .clone()
                .ok_or_else(|| fail("insert requires a value".to_string()))?
                .into_plain();
            let list = navigate_to_list(root, &op.segments).map_err(|e| fail(e.to_string()))?;
            let kind = if op.op == Op::InsertBefore {
                IndexKind::InsertBefore
            } else {
                IndexKind::InsertAfter
            };
            let resolved = resolve_index(list, selector, kind).map_err(|e| fail(e))?;
            // `resolved == list.len()` only passes bounds for InsertAfter, where it
            // already means "append" (spec §9: insertAfter at i=len is
            // append-equivalent; insertBefore at i=len is out of range and rejected
            // by `resolve_index` before reaching here).
            let idx = if op.op == Op::InsertAfter && resolved < list.len() {
                resolved + 1
            } else {
                resolved
            };
            list.insert(idx, normalize(value));
            Ok(())
        }
    }
}

fn op_name(op: Op) -> &'static str {
    match op {
        Op::Replace => "replace",
        Op::Delete => "delete",
        Op::Append => "append",
        Op::InsertBefore => "insertBefore",
        Op::InsertAfter => "insertAfter",
    }
}

/// Whether a path resolves to an existing node suitable for `op`, without
/// mutating `root`. Used by the Target Resolver's smart-match fallback
/// (spec §4.5) to tentatively validate a field-level spec against each
/// untargeted candidate resource.
#[must_use]
pub fn path_resolves(root: &Value, op: &PatchOp) -> bool {
    match op.op {
        Op::Replace if op.selector.is_none() => navigate_get(root, &op.segments).is_some(),
        Op::Append => navigate_get(root, &op.segments)
            .is_some_and(serde_yaml_ng::Value::is_sequence),
        Op::Delete if op.selector.is_none() => navigate_get(root, &op.segments).is_some(),
        Op::Replace | Op::Delete | Op::InsertBefore | Op::InsertAfter => {
            let Some(Value::Sequence(list)) = navigate_get(root, &op.segments) else {
                return false;
            };
            let selector = op.selector.as_deref().unwrap_or_default();
            let kind = match op.op {
                Op::InsertBefore => IndexKind::InsertBefore,
                Op::InsertAfter => IndexKind::InsertAfter,
                _ => IndexKind::ReplaceOrDelete,
            };
            resolve_index(list, selector, kind).is_ok()
        }
    }
}

fn navigate_get<'a>(root: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    let mut current = root;
    for seg in segments {
        current = current.get(seg.field.as_str())?;
        if seg.match_type != MatchType::None {
            let Value::Sequence(list) = current else {
                return None;
            };
            let idx = resolve_index(list, &seg.match_value, IndexKind::ReplaceOrDelete).ok()?;
            current = list.get(idx)?;
        }
    }
    Some(current)
}

fn navigate_to_list<'a>(
    root: &'a mut Value,
    segments: &[PathSegment],
) -> std::result::Result<&'a mut Vec<Value>, String> {
    let target = navigate_to_mut(root, segments)?;
    match target {
        Value::Sequence(list) => Ok(list),
        Value::Null => Err("path does not exist".to_string()),
        _ => Err("path does not address a list".to_string()),
    }
}

/// Navigate to the mutable node at `segments`, creating intermediate maps
/// on demand (never creating intermediate lists). Segments with a selector
/// descend into the matched list element.
fn navigate_to_mut<'a>(
    root: &'a mut Value,
    segments: &[PathSegment],
) -> std::result::Result<&'a mut Value, String> {
    let mut current = root;
    for seg in segments {
        if !matches!(current, Value::Mapping(_)) && !matches!(current, Value::Null) {
            return Err(format!("cannot descend into non-map field '{}'", seg.field));
        }
        if matches!(current, Value::Null) {
            *current = Value::Mapping(Mapping::new());
        }
        let Value::Mapping(map) = current else {
            unreachable!()
        };
        let key = Value::String(seg.field.clone());
        current = map.entry(key).or_insert(Value::Null);

        if seg.match_type != MatchType::None {
            let Value::Sequence(list) = current else {
                return Err(format!("field '{}' is not a list", seg.field));
            };
            let idx = resolve_index(list, &seg.match_value, IndexKind::ReplaceOrDelete)?;
            current = &mut list[idx];
        }
    }
    Ok(current)
}

fn set_path(
    root: &mut Value,
    segments: &[PathSegment],
    value: Value,
) -> std::result::Result<(), String> {
    if segments.is_empty() {
        *root = value;
        return Ok(());
    }
    let (last, head) = segments.split_last().expect("checked non-empty above");
    if last.match_type != MatchType::None {
        // The terminal segment itself carries a selector: handled by the
        // `Replace`-with-selector branch in `apply`, not here.
        return Err("set_path does not support a selector on the terminal segment".to_string());
    }
    let parent = navigate_to_mut(root, head)?;
    if !matches!(parent, Value::Mapping(_)) && !matches!(parent, Value::Null) {
        return Err(format!(
            "cannot set field '{}' on a non-map parent",
            last.field
        ));
    }
    if matches!(parent, Value::Null) {
        *parent = Value::Mapping(Mapping::new());
    }
    let Value::Mapping(map) = parent else {
        unreachable!()
    };
    map.insert(Value::String(last.field.clone()), value);
    Ok(())
}

fn delete_path(root: &mut Value, segments: &[PathSegment]) -> std::result::Result<(), String> {
    if segments.is_empty() {
        return Err("cannot delete the document root".to_string());
    }
    let (last, head) = segments.split_last().expect("checked non-empty above");
    let parent = navigate_get_mut_no_create(root, head)?;
    let Value::Mapping(map) = parent else {
        return Err("cannot delete a field from a non-map parent".to_string());
    };
    let key = Value::String(last.field.clone());
    if map.shift_remove(&key).is_none() {
        return Err(format!("path does not exist: field '{}'", last.field));
    }
    Ok(())
}

/// Like `navigate_to_mut`, but never creates intermediate maps — used by
/// delete, where a missing intermediate is a fatal "path missing" error.
fn navigate_get_mut_no_create<'a>(
    root: &'a mut Value,
    segments: &[PathSegment],
) -> std::result::Result<&'a mut Value, String> {
    let mut current = root;
    for seg in segments {
        let Value::Mapping(map) = current else {
            return Err(format!("path does not exist: field '{}'", seg.field));
        };
        let key = Value::String(seg.field.clone());
        current = map
            .get_mut(&key)
            .ok_or_else(|| format!("path does not exist: field '{}'", seg.field))?;
        if seg.match_type != MatchType::None {
            let Value::Sequence(list) = current else {
                return Err(format!("field '{}' is not a list", seg.field));
            };
            let idx = resolve_index(list, &seg.match_value, IndexKind::ReplaceOrDelete)?;
            current = &mut list[idx];
        }
    }
    Ok(current)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum IndexKind {
    /// `0 <= i < len` required.
    ReplaceOrDelete,
    /// `0 <= i < len` required; `i == len` is out of range and rejected
    /// (spec §9: insertBefore at `i == len` has nothing to insert before).
    InsertBefore,
    /// `0 <= i <= len` accepted; `i == len` means append (spec §9:
    /// insertAfter at `i == len` is append-equivalent).
    InsertAfter,
}

/// Resolve a selector (`k=v` or an integer, possibly negative) against
/// `list` into a concrete index, per spec §4.6a.
fn resolve_index(
    list: &[Value],
    selector: &str,
    kind: IndexKind,
) -> std::result::Result<usize, String> {
    if let Some((key, value)) = selector.split_once('=') {
        return list
            .iter()
            .position(|item| key_matches(item, key, value))
            .ok_or_else(|| format!("no list element matches selector '{selector}'"));
    }

    let i: i64 = selector
        .parse()
        .map_err(|_| format!("selector '{selector}' is not an integer or key=value pair"))?;
    let len = list.len() as i64;
    let resolved = if i < 0 { len + i } else { i };

    let in_bounds = match kind {
        IndexKind::ReplaceOrDelete | IndexKind::InsertBefore => resolved >= 0 && resolved < len,
        IndexKind::InsertAfter => resolved >= 0 && resolved <= len,
    };
    if !in_bounds {
        return Err(format!(
            "index {i} (resolved to {resolved}) out of range for list of length {len}"
        ));
    }
    Ok(resolved as usize)
}

fn key_matches(item: &Value, key: &str, value: &str) -> bool {
    let Value::Mapping(map) = item else {
        return false;
    };
    map.get(Value::String(key.to_string()))
        .is_some_and(|v| scalar_string(v) == value)
}

fn scalar_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => String::new(),
    }
}

/// Normalize a freshly-written scalar/object/list value: widen integers to
/// 64-bit and recurse into nested maps/lists (spec §4.6 "replace without
/// selector" normalization clause). `serde_yaml_ng::Value`'s `Number` type
/// is already a tagged i64/u64/f64, so this is close to a no-op beyond
/// recursing — kept as an explicit pass so future numeric-widening rules
/// have one place to live.
fn normalize(value: Value) -> Value {
    match value {
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(normalize).collect()),
        Value::Mapping(map) => {
            let mut out = Mapping::new();
            for (k, v) in map {
                out.insert(k, normalize(v));
            }
            Value::Mapping(out)
        }
        other => other,
    }
}
