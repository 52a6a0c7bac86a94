//! `kpatch`: a declarative, schema-aware patch engine for Kubernetes
//! manifests.
//!
//! Manifests are loaded into a [`DocumentSet`] (structured and untyped
//! representations kept in sync), patch files in either supported dialect
//! are parsed into a uniform [`dialect::PatchSpec`] stream, each spec's
//! target resource is resolved, and strategic merges and field-level
//! operations are applied in order. [`orchestrator::apply`] drives the
//! whole pipeline; [`orchestrator::emit`] serializes the result back to
//! YAML, optionally re-projecting onto each document's original
//! comment/order/style tree.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod config;
mod conflict;
mod dialect;
mod document;
mod error;
mod fieldop;
mod jsonmerge;
mod orchestrator;
mod patchop;
mod path;
mod resolve;
mod scheme;
mod smp;
mod tree;
mod typeinfer;

pub use config::{ProjectConfig, SchemaOverride};
pub use conflict::ConflictReport;
pub use dialect::{PatchSpec, VariableContext};
pub use document::{DocumentSet, StructuredDocument};
pub use error::{Error, ErrorKind, Result};
pub use orchestrator::{apply, apply_per_patch_file, emit, PatchFileOutput};
pub use patchop::{Op, PatchOp, PatchOpValue};
pub use path::{parse_path, MatchType, PathSegment};
pub use scheme::{BuiltinSchemeRegistry, Gvk, MergeSchema, SchemeLookup};
