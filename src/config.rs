//! Project-level configuration loaded from YAML (SPEC_FULL.md §2, §6).
//!
//! Supplies the Dialect Loaders' variable context (`values.*`, `features.*`)
//! and a list of merge-key overrides to register into a
//! [`BuiltinSchemeRegistry`], the way `tonic-rest-openapi`'s `ProjectConfig`
//! externalizes project-specific knobs into a YAML file next to the source.
//!
//! # File format
//!
//! ```yaml
//! values:
//!   replicas: 3
//!   tag: "1.25"
//! features:
//!   canary: true
//! schemas:
//!   - group: example.com
//!     version: v1
//!     kind: Widget
//!     merge_keys:
//!       items: id
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use serde_yaml_ng::Value;

use crate::dialect::VariableContext;
use crate::error::Result;
use crate::scheme::{BuiltinSchemeRegistry, Gvk, MergeSchema};

/// Project-level `kpatch` configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    /// `${values.<key>}` lookup table.
    pub values: HashMap<String, Value>,
    /// `${features.<key>}` lookup table.
    pub features: HashMap<String, bool>,
    /// Merge-key overrides to register into the default scheme registry.
    pub schemas: Vec<SchemaOverride>,
}

/// One CRD (or overridden built-in kind)'s merge-key metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct SchemaOverride {
    /// API group. Empty string for the core group.
    #[serde(default)]
    pub group: String,
    /// API version, e.g. `"v1"`.
    pub version: String,
    /// Kind, e.g. `"Widget"`.
    pub kind: String,
    /// Field name to merge key, e.g. `{"items": "id"}`.
    pub merge_keys: HashMap<String, String>,
}

impl ProjectConfig {
    /// Load config from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](crate::error::Error::Io) if the file cannot be
    /// read, or [`Error::Yaml`](crate::error::Error::Yaml) if it fails to
    /// parse.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml_ng::from_str(&content)?;
        Ok(config)
    }

    /// Build the [`VariableContext`] the Dialect Loaders need from this
    /// config's `values`/`features` tables.
    #[must_use]
    pub fn variable_context(&self) -> VariableContext {
        VariableContext {
            values: self.values.clone(),
            features: self.features.clone(),
        }
    }

    /// Register every `schemas` entry into `registry`.
    pub fn apply_to_registry(&self, registry: &mut BuiltinSchemeRegistry) {
        for over in &self.schemas {
            let gvk = Gvk {
                group: over.group.clone(),
                version: over.version.clone(),
                kind: over.kind.clone(),
            };
            let pairs: Vec<(&str, &str)> = over
                .merge_keys
                .iter()
                .map(|(field, key)| (field.as_str(), key.as_str()))
                .collect();
            registry.register(gvk, MergeSchema::from_pairs(&pairs));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_defaults() {
        let config: ProjectConfig = serde_yaml_ng::from_str("{}").unwrap();
        assert!(config.values.is_empty());
        assert!(config.features.is_empty());
        assert!(config.schemas.is_empty());
    }

    #[test]
    fn deserialize_full() {
        let yaml = r#"
values:
  replicas: 3
  tag: "1.25"
features:
  canary: true
schemas:
  - group: example.com
    version: v1
    kind: Widget
    merge_keys:
      items: id
"#;
        let config: ProjectConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.values.get("replicas"), Some(&Value::Number(3.into())));
        assert_eq!(
            config.values.get("tag"),
            Some(&Value::String("1.25".to_string()))
        );
        assert_eq!(config.features.get("canary"), Some(&true));
        assert_eq!(config.schemas.len(), 1);
        assert_eq!(config.schemas[0].kind, "Widget");
        assert_eq!(
            config.schemas[0].merge_keys.get("items"),
            Some(&"id".to_string())
        );
    }

    #[test]
    fn apply_to_registry_registers_overrides() {
        let config: ProjectConfig = serde_yaml_ng::from_str(
            "schemas:\n  - group: example.com\n    version: v1\n    kind: Widget\n    merge_keys:\n      items: id\n",
        )
        .unwrap();
        let mut registry = BuiltinSchemeRegistry::new();
        config.apply_to_registry(&mut registry);
        let gvk = Gvk {
            group: "example.com".to_string(),
            version: "v1".to_string(),
            kind: "Widget".to_string(),
        };
        assert_eq!(
            registry.merge_schema(&gvk).unwrap().merge_key_for("items"),
            Some("id")
        );
    }

    #[test]
    fn load_from_file() {
        let dir = std::env::temp_dir().join("kpatch-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(&path, "features:\n  canary: true\n").unwrap();

        let config = ProjectConfig::load(&path).unwrap();
        assert_eq!(config.features.get("canary"), Some(&true));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_nonexistent_file_returns_error() {
        let result = ProjectConfig::load(Path::new("/nonexistent/kpatch-config.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_invalid_yaml_returns_error() {
        let dir = std::env::temp_dir().join("kpatch-config-test-invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.yaml");
        std::fs::write(&path, "values: [[[invalid").unwrap();

        let result = ProjectConfig::load(&path);
        assert!(result.is_err());

        std::fs::remove_dir_all(&dir).ok();
    }
}
