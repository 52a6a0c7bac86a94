//! End-to-end fixture tests for the full patch pipeline: load manifests,
//! apply patch sources, emit. Each test mirrors one of the literal
//! scenarios the patch engine is expected to handle.

use std::collections::HashMap;

use pretty_assertions::assert_eq;
use serde_yaml_ng::Value;

use kpatch::{BuiltinSchemeRegistry, DocumentSet, Error, VariableContext};

fn run(manifests: &str, patches: &[&str]) -> (DocumentSet, HashMap<String, kpatch::ConflictReport>) {
    let mut docs = DocumentSet::load(manifests).expect("manifests should parse");
    let registry = BuiltinSchemeRegistry::new();
    let vars = VariableContext::default();
    let conflicts = kpatch::apply(&mut docs, patches, &vars, &registry).expect("apply should succeed");
    (docs, conflicts)
}

#[test]
fn field_replace_pipeline() {
    let manifests = "kind: ConfigMap\nmetadata:\n  name: demo\ndata:\n  foo: bar\n";
    let patch = "- target: demo\n  patch:\n    data.foo: baz\n    metadata.labels.env: prod\n";

    let (docs, _) = run(manifests, &[patch]);

    let doc = &docs.documents[0];
    assert_eq!(doc.object["data"]["foo"].as_str(), Some("baz"));
    assert_eq!(doc.object["metadata"]["labels"]["env"].as_str(), Some("prod"));
    assert_eq!(docs.documents.len(), 1);
}

#[test]
fn header_dialect_with_type_inference_pipeline() {
    let manifests = "kind: Service\nmetadata:\n  name: my-service # the public entrypoint\nspec:\n  ports:\n    - name: http\n      port: \"80\"\n";
    let patch = "[service.my-service.ports.name=http]\nport: 8888\n";

    let (docs, _) = run(manifests, &[patch]);

    let doc = &docs.documents[0];
    let port = doc.object["spec"]["ports"].as_sequence().unwrap()[0]["port"].clone();
    assert_eq!(port, Value::Number(8888.into()));
    assert_eq!(doc.name(), Some("my-service"));

    let emitted = kpatch::emit(&docs, true).unwrap();
    assert!(emitted.contains("the public entrypoint"));
}

#[test]
fn insert_by_index_at_boundary_pipeline() {
    let manifests = "kind: ConfigMap\nmetadata:\n  name: demo\nitems:\n  - a\n  - b\n  - c\n";
    let patch = "items[+2]: d\n";

    let (docs, _) = run(manifests, &[patch]);

    let items: Vec<&str> = docs.documents[0].object["items"]
        .as_sequence()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(items, vec!["a", "b", "c", "d"]);
}

#[test]
fn smp_merge_by_name_pipeline() {
    let manifests = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  template:\n    spec:\n      containers:\n        - name: main\n          image: nginx:1.24\n        - name: logger\n          image: fluentd:latest\n";
    let patch = "- target: web\n  type: strategic\n  patch:\n    spec:\n      template:\n        spec:\n          containers:\n            - name: main\n              image: nginx:1.25\n            - name: sidecar\n              image: envoy:v1.28\n";

    let (docs, conflicts) = run(manifests, &[patch]);
    assert!(conflicts.is_empty());

    let containers = docs.documents[0].object["spec"]["template"]["spec"]["containers"]
        .as_sequence()
        .unwrap();
    assert_eq!(containers.len(), 3);

    let by_name = |name: &str| {
        containers
            .iter()
            .find(|c| c["name"].as_str() == Some(name))
            .unwrap()
    };
    assert_eq!(by_name("main")["image"].as_str(), Some("nginx:1.25"));
    assert_eq!(by_name("logger")["image"].as_str(), Some("fluentd:latest"));
    assert_eq!(by_name("sidecar")["image"].as_str(), Some("envoy:v1.28"));
}

#[test]
fn conflict_detection_for_unknown_kind_pipeline() {
    let manifests = "apiVersion: example.com/v1\nkind: MyCRD\nmetadata:\n  name: widget\nspec: {}\n";

    let mut docs = DocumentSet::load(manifests).unwrap();
    let registry = BuiltinSchemeRegistry::new();
    let vars = VariableContext::default();

    let patch_a = "- target: widget\n  type: strategic\n  patch:\n    spec:\n      replicas: 1\n";
    let patch_b = "- target: widget\n  type: strategic\n  patch:\n    spec:\n      replicas: \"1\"\n";
    let conflicts = kpatch::apply(&mut docs, &[patch_a, patch_b], &vars, &registry).unwrap();

    assert!(conflicts.get("mycrd.widget").unwrap().has_conflicts());
}

#[test]
fn ambiguity_pipeline() {
    let manifests = "kind: Deployment\nmetadata:\n  name: my-app\n  namespace: staging\n---\nkind: Deployment\nmetadata:\n  name: my-app\n  namespace: production\n";

    let mut docs = DocumentSet::load(manifests).unwrap();
    let registry = BuiltinSchemeRegistry::new();
    let vars = VariableContext::default();

    let ambiguous_patch = "- target: deployment.my-app\n  patch:\n    spec.replicas: 3\n";
    let err = kpatch::apply(&mut docs, &[ambiguous_patch], &vars, &registry).unwrap_err();
    let Error::Ambiguous { candidates, .. } = err else {
        panic!("expected Error::Ambiguous, got {err:?}")
    };
    assert_eq!(candidates.len(), 2);
    assert!(candidates.contains(&"staging/deployment.my-app".to_string()));
    assert!(candidates.contains(&"production/deployment.my-app".to_string()));

    let qualified_patch = "- target: staging/deployment.my-app\n  patch:\n    spec.replicas: 3\n";
    let (docs, _) = run(manifests, &[qualified_patch]);
    assert_eq!(
        docs.documents[0].object["spec"]["replicas"],
        Value::Number(3.into())
    );
    assert!(docs.documents[1].object.get("spec").is_none());
}

#[test]
fn round_trip_without_patches_preserves_parseable_output() {
    let manifests = "kind: ConfigMap\nmetadata:\n  name: demo\ndata:\n  foo: bar\n";
    let docs = DocumentSet::load(manifests).unwrap();
    let emitted = kpatch::emit(&docs, false).unwrap();

    let original: Value = serde_yaml_ng::from_str(manifests).unwrap();
    let round_tripped: Value = serde_yaml_ng::from_str(&emitted).unwrap();
    assert_eq!(original, round_tripped);
}

#[test]
fn idempotent_field_replace_pipeline() {
    let manifests = "kind: ConfigMap\nmetadata:\n  name: demo\ndata:\n  foo: bar\n";
    let patch = "- target: demo\n  patch:\n    data.foo: baz\n";

    let (once, _) = run(manifests, &[patch]);
    let once_yaml = kpatch::emit(&once, false).unwrap();
    let (twice, _) = run(once_yaml.as_str(), &[patch]);
    let twice_yaml = kpatch::emit(&twice, false).unwrap();

    assert_eq!(once_yaml, twice_yaml);
}

#[test]
fn commuting_non_conflicting_smps_pipeline() {
    let manifests = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  template:\n    spec:\n      containers:\n        - name: main\n          image: nginx:1.24\n";
    let patch_main = "- target: web\n  type: strategic\n  patch:\n    spec:\n      template:\n        spec:\n          containers:\n            - name: main\n              image: nginx:1.25\n";
    let patch_sidecar = "- target: web\n  type: strategic\n  patch:\n    spec:\n      template:\n        spec:\n          containers:\n            - name: sidecar\n              image: envoy:v1.28\n";

    let (forward, conflicts_forward) = run(manifests, &[patch_main, patch_sidecar]);
    let (backward, conflicts_backward) = run(manifests, &[patch_sidecar, patch_main]);
    assert!(conflicts_forward.is_empty());
    assert!(conflicts_backward.is_empty());

    let forward_yaml = kpatch::emit(&forward, false).unwrap();
    let backward_yaml = kpatch::emit(&backward, false).unwrap();
    let forward_value: Value = serde_yaml_ng::from_str(&forward_yaml).unwrap();
    let backward_value: Value = serde_yaml_ng::from_str(&backward_yaml).unwrap();
    assert_eq!(forward_value, backward_value);
}

#[test]
fn missing_target_is_skippable_not_found() {
    let manifests = "kind: ConfigMap\nmetadata:\n  name: demo\ndata:\n  foo: bar\n";
    let mut docs = DocumentSet::load(manifests).unwrap();
    let registry = BuiltinSchemeRegistry::new();
    let vars = VariableContext::default();

    let patch = "- target: nonexistent\n  patch:\n    data.foo: baz\n";
    let err = kpatch::apply(&mut docs, &[patch], &vars, &registry).unwrap_err();
    assert!(err.is_skippable_not_found());
}
