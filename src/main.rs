//! CLI for `kpatch`.
//!
//! Standalone binary; the patch engine lives in the library and is driven
//! through [`kpatch::apply`]/[`kpatch::emit`].
//!
//! # Subcommands
//!
//! ```text
//! # Apply one or more patch files to a manifest, writing the merged result
//! kpatch apply --manifests deploy.yaml --patch patches/replicas.yaml \
//!   --output deploy.patched.yaml
//!
//! # Apply every patch file in a directory, one output file per patch
//! kpatch apply-dir --manifests deploy.yaml --patches-dir patches/ \
//!   --output-dir out/
//!
//! # Parse and resolve patches without writing output; reports conflicts
//! kpatch check --manifests deploy.yaml --patch patches/replicas.yaml
//! ```

#![forbid(unsafe_code)]

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use kpatch::{BuiltinSchemeRegistry, DocumentSet, ProjectConfig, VariableContext};

/// Declarative, schema-aware patch engine for Kubernetes manifests.
#[derive(Parser)]
#[command(name = "kpatch", version, about)]
enum Cli {
    /// Apply patch files to a manifest and write the merged result.
    Apply(ApplyArgs),

    /// Apply every patch file in a directory, one output file per patch.
    ApplyDir(ApplyDirArgs),

    /// Parse and resolve patches against a manifest without writing output.
    ///
    /// Reports the targets each patch resolves to and any detected
    /// strategic-merge conflicts. Exits non-zero on any patch error.
    Check(CheckArgs),
}

#[derive(Parser)]
struct ApplyArgs {
    /// Path to the base manifest YAML (may be multi-document).
    #[arg(short, long)]
    manifests: PathBuf,

    /// Path to a patch file. May be repeated; patches apply in order given.
    #[arg(short, long, required = true)]
    patch: Vec<PathBuf>,

    /// Path to a project config YAML file (variable context, scheme overrides).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to write the patched manifest. Defaults to overwriting `--manifests`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Re-project the patched result onto the original document's comments,
    /// key order, and scalar styles instead of emitting a plain dump.
    #[arg(long)]
    structure_preserving: bool,
}

#[derive(Parser)]
struct ApplyDirArgs {
    /// Path to the base manifest YAML (may be multi-document).
    #[arg(short, long)]
    manifests: PathBuf,

    /// Directory of patch files, each applied independently to the base.
    #[arg(long)]
    patches_dir: PathBuf,

    /// Directory to write one output file per patch file into.
    #[arg(long)]
    output_dir: PathBuf,

    /// Path to a project config YAML file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Re-project each patched result onto the original document's
    /// comments, key order, and scalar styles.
    #[arg(long)]
    structure_preserving: bool,
}

#[derive(Parser)]
struct CheckArgs {
    /// Path to the base manifest YAML (may be multi-document).
    #[arg(short, long)]
    manifests: PathBuf,

    /// Path to a patch file. May be repeated.
    #[arg(short, long, required = true)]
    patch: Vec<PathBuf>,

    /// Path to a project config YAML file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli {
        Cli::Apply(args) => run_apply(&args),
        Cli::ApplyDir(args) => run_apply_dir(&args),
        Cli::Check(args) => run_check(&args),
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("KPATCH_DEBUG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_project(config: Option<&PathBuf>) -> anyhow::Result<ProjectConfig> {
    match config {
        Some(path) => {
            eprintln!("Loading config: {}", path.display());
            ProjectConfig::load(path)
                .with_context(|| format!("Failed to load config: {}", path.display()))
        }
        None => Ok(ProjectConfig::default()),
    }
}

fn registry_for(project: &ProjectConfig) -> BuiltinSchemeRegistry {
    let mut registry = BuiltinSchemeRegistry::new();
    project.apply_to_registry(&mut registry);
    registry
}

fn read_patch_sources(paths: &[PathBuf]) -> anyhow::Result<Vec<String>> {
    paths
        .iter()
        .map(|path| {
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read patch file: {}", path.display()))
        })
        .collect()
}

fn run_apply(args: &ApplyArgs) -> anyhow::Result<()> {
    let project = load_project(args.config.as_ref())?;
    let vars = project.variable_context();
    let registry = registry_for(&project);

    let manifest_yaml = fs::read_to_string(&args.manifests)
        .with_context(|| format!("Failed to read manifests: {}", args.manifests.display()))?;
    let mut docs = DocumentSet::load(&manifest_yaml)
        .with_context(|| format!("Failed to parse manifests: {}", args.manifests.display()))?;

    let patch_sources = read_patch_sources(&args.patch)?;
    let patch_refs: Vec<&str> = patch_sources.iter().map(String::as_str).collect();

    let conflicts = kpatch::apply(&mut docs, &patch_refs, &vars, &registry)
        .context("Failed to apply patches")?;
    report_conflicts(&conflicts);

    let output = kpatch::emit(&docs, args.structure_preserving).context("Failed to emit result")?;

    let output_path = args.output.as_ref().unwrap_or(&args.manifests);
    fs::write(output_path, &output)
        .with_context(|| format!("Failed to write output: {}", output_path.display()))?;
    eprintln!("Wrote patched manifests to {}", output_path.display());

    Ok(())
}

fn run_apply_dir(args: &ApplyDirArgs) -> anyhow::Result<()> {
    let project = load_project(args.config.as_ref())?;
    let vars = project.variable_context();
    let registry = registry_for(&project);

    let manifest_yaml = fs::read_to_string(&args.manifests)
        .with_context(|| format!("Failed to read manifests: {}", args.manifests.display()))?;
    let base = DocumentSet::load(&manifest_yaml)
        .with_context(|| format!("Failed to parse manifests: {}", args.manifests.display()))?;

    let mut patch_sources = Vec::new();
    let entries = fs::read_dir(&args.patches_dir)
        .with_context(|| format!("Failed to read patches dir: {}", args.patches_dir.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("patch")
            .to_string();
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read patch file: {}", path.display()))?;
        patch_sources.push((stem, content));
    }
    patch_sources.sort_by(|a, b| a.0.cmp(&b.0));

    let manifests_base = args
        .manifests
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("manifests");

    let outputs = kpatch::apply_per_patch_file(
        &base,
        manifests_base,
        &patch_sources,
        &vars,
        &registry,
        args.structure_preserving,
    )
    .context("Failed to apply patches")?;

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("Failed to create output dir: {}", args.output_dir.display()))?;

    for output in &outputs {
        let path = args.output_dir.join(&output.filename);
        fs::write(&path, &output.content)
            .with_context(|| format!("Failed to write output: {}", path.display()))?;
        eprintln!("Wrote {}", path.display());
    }

    eprintln!(
        "Applied {} of {} patch files ({} skipped: target not found)",
        outputs.len(),
        patch_sources.len(),
        patch_sources.len() - outputs.len()
    );

    Ok(())
}

fn run_check(args: &CheckArgs) -> anyhow::Result<()> {
    let project = load_project(args.config.as_ref())?;
    let vars = project.variable_context();
    let registry = registry_for(&project);

    let manifest_yaml = fs::read_to_string(&args.manifests)
        .with_context(|| format!("Failed to read manifests: {}", args.manifests.display()))?;
    let mut docs = DocumentSet::load(&manifest_yaml)
        .with_context(|| format!("Failed to parse manifests: {}", args.manifests.display()))?;

    let patch_sources = read_patch_sources(&args.patch)?;
    let patch_refs: Vec<&str> = patch_sources.iter().map(String::as_str).collect();

    let conflicts = kpatch::apply(&mut docs, &patch_refs, &vars, &registry)
        .context("Patch resolution failed")?;

    if conflicts.is_empty() {
        println!("OK: all patches resolved with no detected conflicts");
    } else {
        report_conflicts(&conflicts);
        bail!("{} resource(s) have conflicting strategic merge patches", conflicts.len());
    }

    Ok(())
}

fn report_conflicts(conflicts: &std::collections::HashMap<String, kpatch::ConflictReport>) {
    for (resource, report) in conflicts {
        eprintln!("conflict on {resource}:");
        for (i, j, description) in &report.conflicts {
            eprintln!("  patch #{i} vs #{j}: {description}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("kpatch_cli_test_{name}"));
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn run_apply_writes_patched_output() {
        let manifests = write_temp_file(
            "manifests_apply.yaml",
            "kind: ConfigMap\nmetadata:\n  name: demo\ndata:\n  foo: bar\n",
        );
        let patch = write_temp_file("patch_apply.yaml", "- target: demo\n  patch:\n    data.foo: baz\n");
        let output = std::env::temp_dir().join("kpatch_cli_test_output_apply.yaml");

        let args = ApplyArgs {
            manifests: manifests.clone(),
            patch: vec![patch.clone()],
            config: None,
            output: Some(output.clone()),
            structure_preserving: false,
        };
        run_apply(&args).unwrap();

        let result = fs::read_to_string(&output).unwrap();
        assert!(result.contains("baz"));

        fs::remove_file(&manifests).ok();
        fs::remove_file(&patch).ok();
        fs::remove_file(&output).ok();
    }

    #[test]
    fn run_check_reports_no_conflicts_for_single_patch() {
        let manifests = write_temp_file(
            "manifests_check.yaml",
            "kind: ConfigMap\nmetadata:\n  name: demo\ndata:\n  foo: bar\n",
        );
        let patch = write_temp_file("patch_check.yaml", "- target: demo\n  patch:\n    data.foo: baz\n");

        let args = CheckArgs {
            manifests: manifests.clone(),
            patch: vec![patch.clone()],
            config: None,
        };
        run_check(&args).unwrap();

        fs::remove_file(&manifests).ok();
        fs::remove_file(&patch).ok();
    }

    #[test]
    fn run_apply_missing_manifest_file_errors() {
        let args = ApplyArgs {
            manifests: PathBuf::from("/nonexistent/kpatch-manifests.yaml"),
            patch: vec![PathBuf::from("/nonexistent/kpatch-patch.yaml")],
            config: None,
            output: None,
            structure_preserving: false,
        };
        assert!(run_apply(&args).is_err());
    }
}
