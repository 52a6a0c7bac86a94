//! Field-level patch operations and the Patch Line Parser (spec §4.2).

use serde_yaml_ng::Value;

use crate::error::{Error, Result};
use crate::path::{self, PathSegment};

/// A single addressed field-level mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Write a value at a path, replacing whatever was there.
    Replace,
    /// Remove the value at a path.
    Delete,
    /// Push a value onto the end of a list.
    Append,
    /// Splice a value into a list before the resolved index.
    InsertBefore,
    /// Splice a value into a list at (or one past) the resolved index.
    InsertAfter,
}

/// The value carried by a [`PatchOp`].
///
/// The `Nested` shape models the mid-path-selector rewrite from spec §4.2
/// rule 4: `base[sel].rest: v` becomes a `replace` on `base` with selector
/// `sel` and a value that means "set `v` at `rest` inside the selected
/// element."
#[derive(Debug, Clone)]
pub enum PatchOpValue {
    /// A plain scalar, object, or list value to write verbatim.
    Plain(Value),
    /// "Inside the selected list element, set `remaining_path` to `value`."
    Nested {
        /// Dotted path inside the selected element.
        remaining_path: String,
        /// The value to set there.
        value: Box<PatchOpValue>,
    },
}

impl PatchOpValue {
    /// Unwrap to the leaf scalar/object/list value, discarding any nesting
    /// wrapper. Used where the caller already knows there is no nesting.
    #[must_use]
    pub fn into_plain(self) -> Value {
        match self {
            Self::Plain(v) => v,
            Self::Nested { value, .. } => value.into_plain(),
        }
    }
}

/// One parsed, addressed mutation: the output of the Patch Line Parser.
#[derive(Debug, Clone)]
pub struct PatchOp {
    /// Which mutation to apply.
    pub op: Op,
    /// Canonical dotted path (may end at a scalar, object, or list).
    pub path: String,
    /// `path` parsed through the Path Model; cached so callers don't
    /// re-parse on every apply.
    pub segments: Vec<PathSegment>,
    /// Selector attached to the *terminal* field, if any (used by list ops).
    pub selector: Option<String>,
    /// The value to write. `None` for `Delete`.
    pub value: Option<PatchOpValue>,
}

/// Parse one `key: value` patch line into a [`PatchOp`].
///
/// `key` is the raw patch-file key (which may carry a `[...]` suffix);
/// `value` is the already-substituted, type-inferred scalar/object value.
/// This parser is purely syntactic: it never consults a resource.
///
/// # Errors
///
/// Returns [`Error::Parse`] if `key` doesn't match any recognized shape, or
/// if the resulting path fails [`path::parse_path`].
pub fn parse_line(key: &str, value: Value) -> Result<PatchOp> {
    // Rule 1: trailing `[-]` is append.
    if let Some(base) = key.strip_suffix("[-]") {
        return finish(base.to_string(), Op::Append, None, Some(PatchOpValue::Plain(value)));
    }

    // Rule 2: `<path>[delete]` or `<path>[delete=<sel>]`.
    if let Some(rest) = strip_terminal_bracket(key) {
        let (base, inner) = rest;
        if inner == "delete" {
            return finish(base.to_string(), Op::Delete, None, None);
        }
        if let Some(sel) = inner.strip_prefix("delete=") {
            return finish(base.to_string(), Op::Delete, Some(sel.to_string()), None);
        }

        // Rule 3: terminal selector.
        if let Some(kv) = inner.strip_prefix('-') {
            if is_key_value(kv) {
                return finish(
                    base.to_string(),
                    Op::InsertBefore,
                    Some(kv.to_string()),
                    Some(PatchOpValue::Plain(value)),
                );
            }
            if kv.parse::<i64>().is_ok() {
                return finish(
                    base.to_string(),
                    Op::InsertBefore,
                    Some(kv.to_string()),
                    Some(PatchOpValue::Plain(value)),
                );
            }
            return Err(Error::Parse(format!(
                "path {key:?} has an insertBefore selector that is neither `k=v` nor an integer"
            )));
        }
        if let Some(kv) = inner.strip_prefix('+') {
            if is_key_value(kv) {
                return finish(
                    base.to_string(),
                    Op::InsertAfter,
                    Some(kv.to_string()),
                    Some(PatchOpValue::Plain(value)),
                );
            }
            if kv.parse::<i64>().is_ok() {
                return finish(
                    base.to_string(),
                    Op::InsertAfter,
                    Some(kv.to_string()),
                    Some(PatchOpValue::Plain(value)),
                );
            }
            return Err(Error::Parse(format!(
                "path {key:?} has an insertAfter selector that is neither `k=v` nor an integer"
            )));
        }

        // Plain terminal selector -> replace with index/key selector.
        return finish(
            base.to_string(),
            Op::Replace,
            Some(inner.to_string()),
            Some(PatchOpValue::Plain(value)),
        );
    }

    // Rule 4: mid-path selector `<base>[<sel>].<rest>`.
    if let Some((base_path, sel, rest)) = find_mid_path_selector(key) {
        let nested = PatchOpValue::Nested {
            remaining_path: rest.to_string(),
            value: Box::new(PatchOpValue::Plain(value)),
        };
        return finish(base_path, Op::Replace, Some(sel), Some(nested));
    }

    // Rule 5: plain replace.
    finish(key.to_string(), Op::Replace, None, Some(PatchOpValue::Plain(value)))
}

fn finish(
    path: String,
    op: Op,
    selector: Option<String>,
    value: Option<PatchOpValue>,
) -> Result<PatchOp> {
    let segments = path::parse_path(&path)?;
    Ok(PatchOp {
        op,
        path,
        segments,
        selector,
        value,
    })
}

/// If `key` ends with `field[selector]` where `[selector]` is the last
/// bracket group and nothing follows it, return `(base, selector)`.
fn strip_terminal_bracket(key: &str) -> Option<(&str, &str)> {
    if !key.ends_with(']') {
        return None;
    }
    let open = find_matching_open_bracket(key)?;
    let base = &key[..open];
    let inner = &key[open + 1..key.len() - 1];
    if base.is_empty() || inner.is_empty() {
        return None;
    }
    Some((base, inner))
}

/// Find a mid-path selector `<base>[<sel>].<rest>` where `<sel>` is
/// followed immediately by `.` and more path. Returns `(base_with_selector,
/// selector, rest)` where `base_with_selector` is `base` (the selector is
/// threaded through as the returned op's `selector`, not embedded in path).
fn find_mid_path_selector(key: &str) -> Option<(String, String, String)> {
    let open = key.find('[')?;
    let close = key[open..].find(']')? + open;
    // Must be followed by exactly `.` then more content (the "rest").
    let after = &key[close + 1..];
    let rest = after.strip_prefix('.')?;
    if rest.is_empty() {
        return None;
    }
    let base = &key[..open];
    let selector = &key[open + 1..close];
    if base.is_empty() || selector.is_empty() {
        return None;
    }
    Some((base.to_string(), selector.to_string(), rest.to_string()))
}

/// Find the `[` that opens the *last* bracket group in `key`, i.e. the one
/// whose matching `]` is the final character.
fn find_matching_open_bracket(key: &str) -> Option<usize> {
    if !key.ends_with(']') {
        return None;
    }
    // Selectors never nest brackets, so the last `[` before the trailing
    // `]` is the opener, as long as there's no `.` after it (else it's a
    // mid-path selector, not terminal).
    let last_open = key.rfind('[')?;
    Some(last_open)
}

fn is_key_value(s: &str) -> bool {
    match s.split_once('=') {
        Some((k, _)) => !k.is_empty(),
        None => false,
    }
}
