//! Document Loader (spec §4.4).

use serde_yaml_ng::Value;

use crate::error::{Error, Result};
use crate::scheme::Gvk;
use crate::tree::{self, Node};
use crate::typeinfer;

/// One parsed Kubernetes document: the two synchronized representations
/// described by spec §3's `StructuredDocument`.
#[derive(Debug, Clone)]
pub struct StructuredDocument {
    /// Comment/order/style-preserving tree, source of truth for emission.
    pub tree: Node,
    /// Untyped map, source of truth for patching.
    pub object: Value,
    /// Position in the original multi-document stream.
    pub order: usize,
}

impl StructuredDocument {
    /// `apiVersion`/`kind` of this document, if present.
    #[must_use]
    pub fn gvk(&self) -> Option<Gvk> {
        let api_version = self.object.get("apiVersion")?.as_str()?;
        let kind = self.object.get("kind")?.as_str()?;
        Some(Gvk::from_api_version(api_version, kind))
    }

    /// `metadata.name`, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.object.get("metadata")?.get("name")?.as_str()
    }

    /// `metadata.namespace`, if present (cluster-scoped resources have none).
    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.object.get("metadata")?.get("namespace")?.as_str()
    }

    /// `kind`, lowercased, or empty string if absent.
    #[must_use]
    pub fn kind_lower(&self) -> String {
        self.object
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_ascii_lowercase()
    }

    /// This document's canonical key (spec §3 `CanonicalKey`).
    ///
    /// Returns `None` if the document has no `metadata.name`.
    #[must_use]
    pub fn canonical_key(&self) -> Option<String> {
        let name = self.name()?;
        let kind = self.kind_lower();
        Some(match self.namespace() {
            Some(ns) => format!("{ns}/{kind}.{name}"),
            None => format!("{kind}.{name}"),
        })
    }
}

/// An ordered set of documents, as loaded from one multi-document YAML
/// stream, plus the literal separator used between them on output.
#[derive(Debug, Clone)]
pub struct DocumentSet {
    /// Documents in their original stream order.
    pub documents: Vec<StructuredDocument>,
}

impl DocumentSet {
    /// Parse a multi-document YAML byte stream into a `DocumentSet`.
    ///
    /// Documents are split on lines that are exactly `---`; empty documents
    /// (blank, or containing only comments) are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Yaml`] or [`Error::Parse`] if any chunk fails to
    /// parse under either representation.
    pub fn load(raw: &str) -> Result<Self> {
        let mut documents = Vec::new();
        let mut order = 0usize;

        for chunk in split_documents(raw) {
            if chunk.trim().is_empty() {
                continue;
            }

            let mut object: Value = serde_yaml_ng::from_str(&chunk)?;
            if is_empty_document(&object) {
                continue;
            }
            typeinfer::infer_types_in_value(&mut object);

            let node = tree::parse_document(&chunk)?;

            documents.push(StructuredDocument {
                tree: node,
                object,
                order,
            });
            order += 1;
        }

        Ok(Self { documents })
    }

    /// Deep-copy this document set (spec §5 deep-copy discipline for
    /// multi-output modes).
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        self.clone()
    }

    /// Find the document matching `namespace`/`kind`/`name` as specifically
    /// as possible: `(kind, name, namespace)`, then `(kind, name)`, then
    /// `name` alone (spec §4.9's document lookup preference for emission).
    #[must_use]
    pub fn find_for_emission(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Option<usize> {
        let kind = kind.to_ascii_lowercase();
        if let Some(ns) = namespace {
            if let Some(idx) = self.documents.iter().position(|d| {
                d.kind_lower() == kind && d.name() == Some(name) && d.namespace() == Some(ns)
            }) {
                return Some(idx);
            }
        }
        if let Some(idx) = self
            .documents
            .iter()
            .position(|d| d.kind_lower() == kind && d.name() == Some(name))
        {
            return Some(idx);
        }
        self.documents.iter().position(|d| d.name() == Some(name))
    }
}

/// Split `raw` on lines that are exactly `---`, returning each chunk
/// (including its own leading/trailing content but excluding the
/// separator lines themselves).
fn split_documents(raw: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for line in raw.lines() {
        if line == "---" {
            chunks.push(std::mem::take(&mut current));
            continue;
        }
        current.push_str(line);
        current.push('\n');
    }
    chunks.push(current);
    chunks
}

fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Mapping(m) => m.is_empty(),
        _ => false,
    }
}
