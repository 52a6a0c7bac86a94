//! Orchestrator (spec §4.10): drives load, resolve, apply, emit.

use std::collections::HashMap;

use serde_yaml_ng::{Mapping, Value};
use tracing::{debug, warn};

use crate::conflict::{self, ConflictReport};
use crate::dialect::{self, PatchSpec, VariableContext};
use crate::document::DocumentSet;
use crate::error::{Error, Result};
use crate::fieldop;
use crate::path;
use crate::resolve;
use crate::scheme::SchemeLookup;
use crate::smp;
use crate::tree;

/// Load every patch source, resolve each spec's target, and apply strategic
/// merges followed by field-level ops, in the order received, to `docs`.
///
/// Returns the (possibly empty) conflict reports for resources that
/// received two or more strategic merge patches with detected conflicts;
/// conflict detection is advisory and never blocks the apply (spec §4.8).
///
/// # Errors
///
/// Propagates any [`Error`] from parsing, resolution, strategic merge, or
/// field-op application. The caller decides whether to treat a
/// [`Error::is_skippable_not_found`] error as a warning (spec §4.10
/// per-patch-file mode) or abort (every other case, and every case in a
/// single-file run).
pub fn apply(
    docs: &mut DocumentSet,
    patch_sources: &[&str],
    vars: &VariableContext,
    scheme: &dyn SchemeLookup,
) -> Result<HashMap<String, ConflictReport>> {
    let mut field_ops: HashMap<String, Vec<crate::patchop::PatchOp>> = HashMap::new();
    let mut strategic: HashMap<String, Vec<Mapping>> = HashMap::new();

    for source in patch_sources {
        for spec in dialect::load_patches(source, vars)? {
            match spec {
                PatchSpec::Field { op, target } => {
                    let (key, resolved_op) = resolve_field_target(docs, op, target)?;
                    debug!(target = %key, path = %resolved_op.path, "resolved field-level patch");
                    field_ops.entry(key).or_default().push(resolved_op);
                }
                PatchSpec::Strategic { patch, target } => {
                    let key = resolve::resolve_designator(docs, &target)?;
                    debug!(target = %key, "resolved strategic merge patch");
                    strategic.entry(key).or_default().push(patch);
                }
            }
        }
    }

    let mut conflicts = HashMap::new();

    for doc in &mut docs.documents {
        let Some(key) = doc.canonical_key() else {
            continue;
        };

        if let Some(patches) = strategic.get(&key) {
            let gvk = doc.gvk().ok_or_else(|| {
                Error::Validation(format!(
                    "resource '{key}' has no apiVersion/kind, cannot apply a strategic merge"
                ))
            })?;

            let patch_values: Vec<Value> =
                patches.iter().cloned().map(Value::Mapping).collect();
            let report = conflict::detect(&patch_values, &gvk, scheme);
            if report.has_conflicts() {
                conflicts.insert(key.clone(), report);
            }

            for patch_value in &patch_values {
                doc.object = smp::apply(&doc.object, patch_value, &gvk, scheme, &key)?;
            }
        }

        if let Some(ops) = field_ops.get(&key) {
            for op in ops {
                fieldop::apply(&mut doc.object, op, &key)?;
            }
        }
    }

    Ok(conflicts)
}

fn resolve_field_target(
    docs: &DocumentSet,
    op: crate::patchop::PatchOp,
    target: Option<String>,
) -> Result<(String, crate::patchop::PatchOp)> {
    if let Some(designator) = target {
        let key = resolve::resolve_designator(docs, &designator)?;
        return Ok((key, op));
    }

    if let Some((key, remaining_path)) = resolve::infer_from_path_prefix(docs, &op.path) {
        let mut inferred = op;
        inferred.segments = path::parse_path(&remaining_path)?;
        inferred.path = remaining_path;
        return Ok((key, inferred));
    }

    let key = resolve::smart_match(docs, &op)?;
    Ok((key, op))
}

/// Serialize `docs` to a multi-document YAML stream. When
/// `structure_preserving` is set, each mutated document's untyped object
/// is re-serialized and re-projected onto its original comment/order/style
/// tree via the Emitter (spec §4.9) before being written out.
///
/// # Errors
///
/// Returns [`Error::Yaml`] if a document's object fails to serialize, or
/// [`Error::Parse`]/[`Error::Internal`] if structure-preserving
/// re-projection fails to round-trip.
pub fn emit(docs: &DocumentSet, structure_preserving: bool) -> Result<String> {
    let mut parts = Vec::with_capacity(docs.documents.len());
    for doc in &docs.documents {
        let text = if structure_preserving {
            let serialized = serde_yaml_ng::to_string(&doc.object)?;
            let patched_tree = tree::parse_document(&serialized)?;
            let merged = tree::reproject(&doc.tree, &patched_tree);
            tree::serialize(&merged)
        } else {
            serde_yaml_ng::to_string(&doc.object)?
        };
        parts.push(text.trim_end().to_string());
    }
    let mut out = parts.join("\n---\n");
    out.push('\n');
    Ok(out)
}

/// One per-patch-file output: the written file's base name and contents.
pub struct PatchFileOutput {
    /// `<manifests-base>-patch-<patch-base>.yaml`, sanitized to
    /// `[A-Za-z0-9_-]`.
    pub filename: String,
    /// Serialized multi-document YAML for this patch file's output.
    pub content: String,
}

/// Per-patch-file output mode (spec §4.10): apply each patch source to an
/// independent deep copy of `base`, writing one output per source. A
/// source whose targets are entirely absent from the base is skipped with
/// a warning; every other error aborts the whole run.
///
/// # Errors
///
/// Returns the first non-skippable [`Error`] encountered.
pub fn apply_per_patch_file(
    base: &DocumentSet,
    manifests_base: &str,
    patch_sources: &[(String, String)],
    vars: &VariableContext,
    scheme: &dyn SchemeLookup,
    structure_preserving: bool,
) -> Result<Vec<PatchFileOutput>> {
    let mut outputs = Vec::new();
    let sanitized_manifests_base = sanitize_filename_component(manifests_base);

    for (patch_base, raw) in patch_sources {
        let mut docs = base.deep_copy();
        match apply(&mut docs, &[raw.as_str()], vars, scheme) {
            Ok(_) => {
                let content = emit(&docs, structure_preserving)?;
                outputs.push(PatchFileOutput {
                    filename: format!(
                        "{sanitized_manifests_base}-patch-{}.yaml",
                        sanitize_filename_component(patch_base)
                    ),
                    content,
                });
            }
            Err(e) if e.is_skippable_not_found() => {
                warn!(patch_file = %patch_base, error = %e, "skipping patch file: target not found in base");
            }
            Err(e) => return Err(e),
        }
    }

    Ok(outputs)
}

fn sanitize_filename_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
