//! Typed error enum for the `kpatch` library API.
//!
//! Library consumers can match on specific variants or on [`ErrorKind`] when
//! they only care about the broad category (e.g. the multi-file CLI mode
//! downgrades a "not found" resource error to a warning but aborts on
//! everything else). The CLI (`main.rs`) converts these to `anyhow::Error`
//! at the binary boundary for richer context messages.

/// Coarse category of an [`Error`], used by callers that branch on kind
/// without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed path, selector, header, or YAML.
    Parse,
    /// Unknown op, value out of domain.
    Validation,
    /// Target not found or ambiguous.
    Resource,
    /// Field-level operation failed against a resolved resource.
    Operation,
    /// Strategic merge patch application failed.
    StrategicMerge,
    /// Marshal/unmarshal round-trip failure in the emitter, or other bug.
    Internal,
}

/// Errors produced by `kpatch` library operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// File I/O failure (reading manifests, patches, or config).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error(transparent)]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON (de)serialization failure, used at the RFC 7386 merge boundary.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Malformed path, selector, patch header, or invalid patch `type`.
    #[error("parse error: {0}")]
    Parse(String),

    /// Unknown op or a value outside its domain (e.g. unknown IP family).
    #[error("validation error: {0}")]
    Validation(String),

    /// A target designator matched no resource in the document set.
    #[error("target '{target}' not found")]
    NotFound {
        /// The designator that failed to resolve.
        target: String,
    },

    /// A target designator matched more than one resource.
    ///
    /// Ambiguity is never silently resolved and is never downgraded to
    /// "not found" — see spec.md §4.5.
    #[error("target '{target}' is ambiguous: candidates {candidates:?}; {hint}")]
    Ambiguous {
        /// The designator that matched multiple resources.
        target: String,
        /// The candidate canonical keys (or `kind.name`s) that matched.
        candidates: Vec<String>,
        /// A disambiguation suggestion (e.g. "use namespace/kind.name").
        hint: String,
    },

    /// A field-level operation failed against a resolved resource.
    #[error("patch operation '{op}' failed at '{path}' on resource '{resource}': {cause}")]
    Operation {
        /// The op that failed (`replace`, `delete`, `append`, ...).
        op: String,
        /// The path the op was addressed at.
        path: String,
        /// The canonical key of the resource being patched.
        resource: String,
        /// Human-readable cause (index out of bounds, missing key, ...).
        cause: String,
    },

    /// Strategic merge patch application failed for a resource.
    #[error("strategic merge failed on resource '{resource}': {cause}")]
    StrategicMerge {
        /// The canonical key of the resource being merged.
        resource: String,
        /// Human-readable cause.
        cause: String,
    },

    /// Internal invariant violation (marshal round-trip, impossible state).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The coarse category of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Yaml(_) | Self::Json(_) | Self::Parse(_) => ErrorKind::Parse,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound { .. } | Self::Ambiguous { .. } => ErrorKind::Resource,
            Self::Operation { .. } => ErrorKind::Operation,
            Self::StrategicMerge { .. } => ErrorKind::StrategicMerge,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether a multi-file run may downgrade this error to a warning and
    /// skip the offending patch file rather than abort.
    ///
    /// Only "not found" resource errors qualify — ambiguity and every other
    /// kind remain fatal even in multi-file mode (spec.md §4.10, §7).
    #[must_use]
    pub fn is_skippable_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the library's public API.
pub type Result<T> = std::result::Result<T, Error>;
