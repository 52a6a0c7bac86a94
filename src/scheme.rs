//! Scheme Registry (SPEC_FULL.md §4.0).
//!
//! Stands in for a full typed Kubernetes object model: a table from group/
//! version/kind to the merge-key metadata the Strategic Merge Engine and
//! Conflict Detector need to do schema-aware list merging. A real
//! integration would back [`SchemeLookup`] with generated `Deployment`,
//! `Service`, etc. types; this registry covers the well-known workload,
//! networking, and RBAC kinds by their documented `patchMergeKey` tags.

use std::collections::HashMap;

/// A group/version/kind triple. `group` is empty for core API kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvk {
    /// API group, e.g. `"apps"`. Empty string for the core group.
    pub group: String,
    /// API version, e.g. `"v1"`.
    pub version: String,
    /// Kind, e.g. `"Deployment"`. Compared case-sensitively; callers should
    /// pass the document's `kind` field verbatim.
    pub kind: String,
}

impl Gvk {
    /// Build a `Gvk` from an `apiVersion` string (`"group/version"` or
    /// just `"version"` for the core group) and a `kind`.
    #[must_use]
    pub fn from_api_version(api_version: &str, kind: &str) -> Self {
        let (group, version) = match api_version.split_once('/') {
            Some((g, v)) => (g.to_string(), v.to_string()),
            None => (String::new(), api_version.to_string()),
        };
        Self {
            group,
            version,
            kind: kind.to_string(),
        }
    }
}

/// Per-kind merge-key metadata: field name (as it appears directly under
/// its containing object, not a full path) to the key field identifying
/// list items of that field across merges.
#[derive(Debug, Clone, Default)]
pub struct MergeSchema {
    merge_keys: HashMap<String, String>,
}

impl MergeSchema {
    /// Build from `(field, merge_key)` pairs.
    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self {
            merge_keys: pairs
                .iter()
                .map(|(f, k)| ((*f).to_string(), (*k).to_string()))
                .collect(),
        }
    }

    /// The merge key for `field`, if this schema knows it.
    #[must_use]
    pub fn merge_key_for(&self, field: &str) -> Option<&str> {
        self.merge_keys.get(field).map(String::as_str)
    }
}

/// Looks up merge-key metadata for a GVK. A typed scheme integration would
/// implement this over generated object definitions; [`BuiltinSchemeRegistry`]
/// is a table-driven default covering well-known kinds.
pub trait SchemeLookup {
    /// Return this GVK's merge schema, or `None` if the kind is unknown to
    /// this lookup (routes callers to the JSON-merge / key-overlap fallback).
    fn merge_schema(&self, gvk: &Gvk) -> Option<&MergeSchema>;
}

const WORKLOAD_CONTAINERS: &[(&str, &str)] = &[
    ("containers", "name"),
    ("initContainers", "name"),
    ("ephemeralContainers", "name"),
    ("volumes", "name"),
    ("ports", "containerPort"),
    ("env", "name"),
    ("envFrom", "prefix"),
    ("volumeMounts", "mountPath"),
    ("imagePullSecrets", "name"),
    ("tolerations", "key"),
];

/// Default, table-driven [`SchemeLookup`] covering the kinds whose
/// `patchMergeKey` tags are widely relied upon in practice: Deployment,
/// StatefulSet, DaemonSet, ReplicaSet, Job, CronJob, Pod, Service, Ingress,
/// Role/ClusterRole (and their binding counterparts).
pub struct BuiltinSchemeRegistry {
    schemas: HashMap<Gvk, MergeSchema>,
}

impl Default for BuiltinSchemeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinSchemeRegistry {
    /// Build the registry with its built-in entries.
    #[must_use]
    pub fn new() -> Self {
        let mut schemas = HashMap::new();

        for (group, kind) in [
            ("apps", "Deployment"),
            ("apps", "StatefulSet"),
            ("apps", "DaemonSet"),
            ("apps", "ReplicaSet"),
            ("batch", "Job"),
            ("batch", "CronJob"),
        ] {
            schemas.insert(
                Gvk {
                    group: group.to_string(),
                    version: "v1".to_string(),
                    kind: kind.to_string(),
                },
                MergeSchema::from_pairs(WORKLOAD_CONTAINERS),
            );
        }

        schemas.insert(
            Gvk {
                group: String::new(),
                version: "v1".to_string(),
                kind: "Pod".to_string(),
            },
            MergeSchema::from_pairs(WORKLOAD_CONTAINERS),
        );

        schemas.insert(
            Gvk {
                group: String::new(),
                version: "v1".to_string(),
                kind: "Service".to_string(),
            },
            MergeSchema::from_pairs(&[("ports", "port"), ("selector", "key")]),
        );

        schemas.insert(
            Gvk {
                group: "networking.k8s.io".to_string(),
                version: "v1".to_string(),
                kind: "Ingress".to_string(),
            },
            MergeSchema::from_pairs(&[("rules", "host"), ("tls", "secretName")]),
        );

        for kind in ["Role", "ClusterRole"] {
            schemas.insert(
                Gvk {
                    group: "rbac.authorization.k8s.io".to_string(),
                    version: "v1".to_string(),
                    kind: kind.to_string(),
                },
                MergeSchema::from_pairs(&[("rules", "apiGroups")]),
            );
        }

        for kind in ["RoleBinding", "ClusterRoleBinding"] {
            schemas.insert(
                Gvk {
                    group: "rbac.authorization.k8s.io".to_string(),
                    version: "v1".to_string(),
                    kind: kind.to_string(),
                },
                MergeSchema::from_pairs(&[("subjects", "name")]),
            );
        }

        Self { schemas }
    }

    /// Register or overwrite the schema for `gvk`. Lets a project config
    /// extend the registry with CRD merge-key metadata.
    pub fn register(&mut self, gvk: Gvk, schema: MergeSchema) {
        self.schemas.insert(gvk, schema);
    }
}

impl SchemeLookup for BuiltinSchemeRegistry {
    fn merge_schema(&self, gvk: &Gvk) -> Option<&MergeSchema> {
        self.schemas.get(gvk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gvk_from_api_version_splits_group() {
        let gvk = Gvk::from_api_version("apps/v1", "Deployment");
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Deployment");
    }

    #[test]
    fn gvk_from_core_api_version_has_empty_group() {
        let gvk = Gvk::from_api_version("v1", "Service");
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
    }

    #[test]
    fn deployment_merge_schema_knows_containers() {
        let reg = BuiltinSchemeRegistry::new();
        let gvk = Gvk::from_api_version("apps/v1", "Deployment");
        let schema = reg.merge_schema(&gvk).expect("deployment schema");
        assert_eq!(schema.merge_key_for("containers"), Some("name"));
        assert_eq!(schema.merge_key_for("ports"), Some("containerPort"));
    }

    #[test]
    fn unknown_kind_returns_none() {
        let reg = BuiltinSchemeRegistry::new();
        let gvk = Gvk::from_api_version("example.com/v1", "MyCRD");
        assert!(reg.merge_schema(&gvk).is_none());
    }

    #[test]
    fn register_extends_registry() {
        let mut reg = BuiltinSchemeRegistry::new();
        let gvk = Gvk::from_api_version("example.com/v1", "MyCRD");
        reg.register(gvk.clone(), MergeSchema::from_pairs(&[("items", "id")]));
        assert_eq!(
            reg.merge_schema(&gvk).unwrap().merge_key_for("items"),
            Some("id")
        );
    }
}
