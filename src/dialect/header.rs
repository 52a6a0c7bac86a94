//! Header dialect loader (spec §4.3a): a terse line-oriented dialect where
//! `[kind.name(.section)*(.selector)?]` headers introduce a run of
//! `key: value` lines, mapped to a Kubernetes path by a fixed, kind-aware
//! table.

use serde_yaml_ng::Value;

use super::{PatchSpec, VariableContext};
use crate::error::{Error, Result};
use crate::patchop;
use crate::typeinfer;

const WORKLOAD_KINDS: &[&str] = &[
    "deployment",
    "replicaset",
    "statefulset",
    "daemonset",
    "job",
    "cronjob",
];

const ROLE_KINDS: &[&str] = &["role", "clusterrole"];

/// Parse Header-dialect patch bytes into a `PatchSpec` stream.
///
/// # Errors
///
/// Returns [`Error::Parse`] for a value line with no preceding header, a
/// malformed header, or a line that doesn't split into `key: value`.
pub fn load(raw: &str, vars: &VariableContext) -> Result<Vec<PatchSpec>> {
    let mut specs = Vec::new();
    let mut current: Option<Header> = None;

    for raw_line in raw.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if line.starts_with('[') {
            current = Some(parse_header(line)?);
            continue;
        }

        let header = current
            .as_ref()
            .ok_or_else(|| Error::Parse(format!("value line {line:?} has no preceding header")))?;

        let (key, raw_value) = split_key_value(line)?;
        let mapped_path = map_header_path(header)?;
        let full_key = if mapped_path.is_empty() {
            key.to_string()
        } else {
            format!("{mapped_path}.{key}")
        };

        let substituted = super::substitution::substitute_string(&raw_value, vars);
        let value = typeinfer::infer_scalar(terminal_field(&full_key), &substituted);

        let op = patchop::parse_line(&full_key, value)?;
        specs.push(PatchSpec::Field {
            op,
            target: Some(header.designator()),
        });
    }

    Ok(specs)
}

struct Header {
    kind: String,
    name: String,
    sections: Vec<String>,
    selector: Option<Selector>,
}

impl Header {
    fn designator(&self) -> String {
        format!("{}.{}", self.kind.to_ascii_lowercase(), self.name)
    }
}

enum Selector {
    Index(i64),
    KeyValue(String, String),
    Bracketed(String),
}

fn parse_header(line: &str) -> Result<Header> {
    if !line.ends_with(']') {
        return Err(Error::Parse(format!("header {line:?} is missing ']'")));
    }
    let inner = &line[1..line.len() - 1];
    let parts = split_respecting_brackets(inner);
    if parts.len() < 2 {
        return Err(Error::Parse(format!(
            "header {line:?} must have at least kind.name"
        )));
    }

    let kind = parts[0].clone();
    let name = parts[1].clone();
    let mut sections = parts[2..].to_vec();

    let selector = sections.last().and_then(|last| classify_selector(last));
    if selector.is_some() {
        sections.pop();
    }

    Ok(Header {
        kind,
        name,
        sections,
        selector,
    })
}

fn classify_selector(s: &str) -> Option<Selector> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(Selector::Index(n));
    }
    if s.starts_with('[') && s.ends_with(']') && s.len() >= 2 {
        return Some(Selector::Bracketed(s[1..s.len() - 1].to_string()));
    }
    if let Some((k, v)) = s.split_once('=') {
        if !k.is_empty() {
            return Some(Selector::KeyValue(k.to_string(), v.to_string()));
        }
    }
    None
}

/// Split `inner` on `.`, but never inside a `[...]` run (so a bracketed
/// selector's raw content may itself contain dots).
fn split_respecting_brackets(inner: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for ch in inner.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth -= 1;
                current.push(ch);
            }
            '.' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    parts.push(current);
    parts
}

/// Map a header's kind/sections/selector onto a dotted path per the
/// kind-aware table in spec §4.3a.
fn map_header_path(header: &Header) -> Result<String> {
    let kind_lower = header.kind.to_ascii_lowercase();
    let is_workload = WORKLOAD_KINDS.contains(&kind_lower.as_str());
    let is_role = ROLE_KINDS.contains(&kind_lower.as_str());

    let mut tokens: Vec<String> = Vec::new();
    let mut prev_raw: Option<&str> = None;

    for section in &header.sections {
        if let Ok(n) = section.parse::<i64>() {
            apply_index_to_last(&mut tokens, n)?;
            continue;
        }

        let mapped = match section.as_str() {
            "containers" | "initContainers" | "volumes" => {
                if is_workload {
                    format!("spec.template.spec.{section}")
                } else {
                    format!("spec.{section}")
                }
            }
            "ports" => {
                if prev_raw == Some("containers") {
                    "ports".to_string()
                } else {
                    "spec.ports".to_string()
                }
            }
            "rules" => {
                if is_role {
                    "rules".to_string()
                } else {
                    "spec.rules".to_string()
                }
            }
            "labels" | "annotations" => {
                let under_metadata = tokens
                    .last()
                    .is_some_and(|t| t == "metadata" || t.starts_with("metadata."));
                if under_metadata {
                    section.clone()
                } else {
                    format!("metadata.{section}")
                }
            }
            other => other.to_string(),
        };

        tokens.push(mapped);
        prev_raw = Some(section.as_str());
    }

    let mut path = tokens.join(".");

    if let Some(selector) = &header.selector {
        let suffix = match selector {
            Selector::Index(n) => format!("[{n}]"),
            Selector::KeyValue(k, v) => format!("[{k}={v}]"),
            Selector::Bracketed(raw) => format!("[{raw}]"),
        };
        path.push_str(&suffix);
    }

    Ok(path)
}

fn apply_index_to_last(tokens: &mut [String], n: i64) -> Result<()> {
    let Some(last) = tokens.last_mut() else {
        return Err(Error::Parse(
            "numeric header section has no preceding field to index".to_string(),
        ));
    };
    *last = format!("{last}[{n}]");
    Ok(())
}

fn terminal_field(path: &str) -> &str {
    // Strip past the last bracket group, not the first/last one: a path like
    // `spec.ports[name=http].port` must yield `port`, not `ports`.
    let after_bracket = path.rfind(']').map_or(path, |i| &path[i + 1..]);
    let after_bracket = after_bracket.trim_start_matches('.');
    if !after_bracket.is_empty() {
        return after_bracket.rsplit('.').next().unwrap_or(after_bracket);
    }
    // Nothing follows the final bracket group (e.g. `items[2]`); the terminal
    // field is whatever precedes it.
    let before_bracket = path.rfind('[').map_or(path, |i| &path[..i]);
    before_bracket.rsplit('.').next().unwrap_or(before_bracket)
}

fn split_key_value(line: &str) -> Result<(&str, String)> {
    let idx = line
        .find(": ")
        .ok_or_else(|| Error::Parse(format!("line {line:?} is not 'key: value'")))?;
    let key = line[..idx].trim();
    let value = line[idx + 2..].trim();
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);
    if key.is_empty() {
        return Err(Error::Parse(format!("line {line:?} has an empty key")));
    }
    Ok((key, value.to_string()))
}
