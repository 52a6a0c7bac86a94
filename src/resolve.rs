//! Target Resolver (spec §4.5).

use crate::document::DocumentSet;
use crate::error::{Error, Result};
use crate::fieldop;
use crate::patchop::PatchOp;

/// Resolve a designator string (`name`, `kind.name`, or `namespace/kind.name`)
/// against `docs` to a single canonical key.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if nothing matches, or [`Error::Ambiguous`]
/// if more than one resource matches — the two are never conflated.
pub fn resolve_designator(docs: &DocumentSet, designator: &str) -> Result<String> {
    if let Some((namespace, rest)) = designator.split_once('/') {
        return resolve_namespaced(docs, designator, namespace, rest);
    }
    resolve_kind_or_short(docs, designator)
}

fn resolve_namespaced(
    docs: &DocumentSet,
    designator: &str,
    namespace: &str,
    rest: &str,
) -> Result<String> {
    let (kind, name) = split_kind_name(rest)?;
    let matches: Vec<_> = docs
        .documents
        .iter()
        .filter(|d| {
            d.kind_lower() == kind.to_ascii_lowercase()
                && d.name() == Some(name)
                && d.namespace() == Some(namespace)
        })
        .collect();

    match matches.len() {
        0 => Err(Error::NotFound {
            target: designator.to_string(),
        }),
        1 => Ok(matches[0]
            .canonical_key()
            .expect("matched document has a name")),
        _ => Err(Error::Ambiguous {
            target: designator.to_string(),
            candidates: matches
                .iter()
                .filter_map(|d| d.canonical_key())
                .collect(),
            hint: "multiple resources share this namespace/kind.name".to_string(),
        }),
    }
}

fn resolve_kind_or_short(docs: &DocumentSet, designator: &str) -> Result<String> {
    if let Ok((kind, name)) = split_kind_name(designator) {
        let matches: Vec<_> = docs
            .documents
            .iter()
            .filter(|d| d.kind_lower() == kind.to_ascii_lowercase() && d.name() == Some(name))
            .collect();
        match matches.len() {
            0 => {}
            1 => {
                return Ok(matches[0]
                    .canonical_key()
                    .expect("matched document has a name"))
            }
            _ => {
                return Err(Error::Ambiguous {
                    target: designator.to_string(),
                    candidates: matches.iter().filter_map(|d| d.canonical_key()).collect(),
                    hint: "use namespace/kind.name to disambiguate".to_string(),
                })
            }
        }
    }

    let matches: Vec<_> = docs
        .documents
        .iter()
        .filter(|d| d.name() == Some(designator))
        .collect();
    match matches.len() {
        0 => Err(Error::NotFound {
            target: designator.to_string(),
        }),
        1 => Ok(matches[0]
            .canonical_key()
            .expect("matched document has a name")),
        _ => Err(Error::Ambiguous {
            target: designator.to_string(),
            candidates: matches
                .iter()
                .map(|d| format!("{}.{}", d.kind_lower(), designator))
                .collect(),
            hint: "use kind.name or namespace/kind.name to disambiguate".to_string(),
        }),
    }
}

fn split_kind_name(s: &str) -> std::result::Result<(&str, &str), ()> {
    s.split_once('.').ok_or(())
}

/// Path-prefix inference (spec §4.5 fallback a): if the first path segment
/// of an untargeted field-level spec names a resource (by short name or
/// `kind.name`, case-insensitive), that resource is the target and the
/// first segment is stripped from the path.
///
/// Returns `(canonical_key, path_without_first_segment)`.
#[must_use]
pub fn infer_from_path_prefix(docs: &DocumentSet, path: &str) -> Option<(String, String)> {
    let (first, rest) = path.split_once('.')?;
    let first_lower = first.to_ascii_lowercase();

    for doc in &docs.documents {
        let name = doc.name()?;
        let kind = doc.kind_lower();
        let matches_short = name.to_ascii_lowercase() == first_lower;
        let matches_kind_name = format!("{kind}.{name}").to_ascii_lowercase() == first_lower;
        if matches_short || matches_kind_name {
            return Some((doc.canonical_key()?, rest.to_string()));
        }
    }
    None
}

/// Smart-match fallback (spec §4.5 fallback b): tentatively validate an
/// untargeted field-level op against every candidate resource's object;
/// if exactly one accepts it, that resource is the target.
///
/// # Errors
///
/// Returns [`Error::NotFound`] if no candidate accepts the op, or
/// [`Error::Ambiguous`] if more than one does.
pub fn smart_match(docs: &DocumentSet, op: &PatchOp) -> Result<String> {
    let matches: Vec<_> = docs
        .documents
        .iter()
        .filter(|d| fieldop::path_resolves(&d.object, op))
        .collect();

    match matches.len() {
        0 => Err(Error::NotFound {
            target: op.path.clone(),
        }),
        1 => Ok(matches[0]
            .canonical_key()
            .expect("matched document has a name")),
        _ => Err(Error::Ambiguous {
            target: op.path.clone(),
            candidates: matches.iter().filter_map(|d| d.canonical_key()).collect(),
            hint: "specify an explicit target to disambiguate".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patchop::parse_line;
    use serde_yaml_ng::Value;

    fn two_namespaced_deployments() -> DocumentSet {
        let raw = "kind: Deployment\nmetadata:\n  name: my-app\n  namespace: staging\n---\nkind: Deployment\nmetadata:\n  name: my-app\n  namespace: production\n";
        DocumentSet::load(raw).unwrap()
    }

    #[test]
    fn kind_name_ambiguous_across_namespaces() {
        let docs = two_namespaced_deployments();
        let err = resolve_designator(&docs, "deployment.my-app").unwrap_err();
        assert!(matches!(err, Error::Ambiguous { .. }));
    }

    #[test]
    fn namespaced_designator_resolves_uniquely() {
        let docs = two_namespaced_deployments();
        let key = resolve_designator(&docs, "staging/deployment.my-app").unwrap();
        assert_eq!(key, "staging/deployment.my-app");
    }

    #[test]
    fn not_found_is_distinct_from_ambiguous() {
        let docs = two_namespaced_deployments();
        let err = resolve_designator(&docs, "deployment.missing").unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn short_name_resolves_when_unique() {
        let raw = "kind: ConfigMap\nmetadata:\n  name: demo\n";
        let docs = DocumentSet::load(raw).unwrap();
        let key = resolve_designator(&docs, "demo").unwrap();
        assert_eq!(key, "configmap.demo");
    }

    #[test]
    fn path_prefix_inference_strips_leading_segment() {
        let raw = "kind: ConfigMap\nmetadata:\n  name: demo\ndata:\n  foo: bar\n";
        let docs = DocumentSet::load(raw).unwrap();
        let (key, rest) = infer_from_path_prefix(&docs, "demo.data.foo").unwrap();
        assert_eq!(key, "configmap.demo");
        assert_eq!(rest, "data.foo");
    }

    #[test]
    fn smart_match_picks_the_only_resource_with_the_path() {
        let raw = "kind: ConfigMap\nmetadata:\n  name: a\ndata:\n  foo: bar\n---\nkind: ConfigMap\nmetadata:\n  name: b\ndata:\n  baz: qux\n";
        let docs = DocumentSet::load(raw).unwrap();
        let op = parse_line("data.foo", Value::String("new".into())).unwrap();
        let key = smart_match(&docs, &op).unwrap();
        assert_eq!(key, "configmap.a");
    }
}
