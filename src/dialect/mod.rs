//! Dialect Loaders (spec §4.3): parse either patch file dialect into a
//! uniform `PatchSpec` stream.

pub mod header;
pub mod structured;
pub mod substitution;

use serde_yaml_ng::Mapping;

pub use substitution::VariableContext;

use crate::error::Result;
use crate::patchop::PatchOp;

/// One parsed entry from a patch file (spec §3 `PatchSpec`).
#[derive(Debug, Clone)]
pub enum PatchSpec {
    /// A field-level mutation, with an optional target designator (a
    /// missing target is resolved later by the Target Resolver's
    /// inference fallbacks).
    Field {
        /// The parsed operation.
        op: PatchOp,
        /// Designator string, if the patch file specified one explicitly.
        target: Option<String>,
    },
    /// A strategic merge patch. The target is mandatory (spec §3).
    Strategic {
        /// The patch body to merge into the target resource.
        patch: Mapping,
        /// Designator string.
        target: String,
    },
}

/// Parse `raw` patch-file bytes into a `PatchSpec` stream, auto-detecting
/// the dialect from the first non-blank, non-comment line: a line starting
/// with `[` and containing `]` selects the Header dialect; anything else
/// selects the Structured dialect.
///
/// # Errors
///
/// Returns [`Error::Parse`] for malformed input in either dialect, or
/// propagates a YAML parse error from the Structured dialect.
pub fn load_patches(raw: &str, vars: &VariableContext) -> Result<Vec<PatchSpec>> {
    if is_header_dialect(raw) {
        header::load(raw, vars)
    } else {
        structured::load(raw, vars)
    }
}

fn is_header_dialect(raw: &str) -> bool {
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        return trimmed.starts_with('[') && trimmed.contains(']');
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_header_dialect() {
        assert!(is_header_dialect("# comment\n\n[service.my-svc]\nport: 80\n"));
    }

    #[test]
    fn detects_structured_dialect_for_flat_mapping() {
        assert!(!is_header_dialect("data.foo: bar\n"));
    }

    #[test]
    fn detects_structured_dialect_for_sequence() {
        assert!(!is_header_dialect("- target: demo\n  patch:\n    foo: bar\n"));
    }
}
