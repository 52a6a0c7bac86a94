//! Structure-Preserving Emitter (spec §4.9).
//!
//! `serde_yaml_ng::Value` (used everywhere else in this crate for patching)
//! discards comments, key order styling, and spans once parsed. To retain
//! those across a patch we keep a second, comment-aware tree built directly
//! from `yaml-rust2`'s marker-aware event stream, and re-project the
//! patched untyped state onto it rather than re-parsing into `Value` and
//! serializing that directly.
//!
//! This is necessarily best-effort: comments are recovered by a secondary
//! raw-text scan bucketing `#`-led text around each node's source line, not
//! by a comment-aware YAML grammar. Spec §4.9/§9 call this out explicitly.

use std::collections::HashMap;

use yaml_rust2::parser::{MarkedEventReceiver, Parser};
use yaml_rust2::scanner::{Marker, TScalarStyle};
use yaml_rust2::Event;

use crate::error::{Error, Result};

/// Scalar rendering style, mirrored from `yaml-rust2`'s `TScalarStyle` so
/// this module doesn't leak that crate's types through its public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarStyle {
    /// No quotes, no block indicator.
    Plain,
    /// `'...'`.
    SingleQuoted,
    /// `"..."`.
    DoubleQuoted,
    /// `|` block literal.
    Literal,
    /// `>` block folded.
    Folded,
}

impl From<TScalarStyle> for ScalarStyle {
    fn from(s: TScalarStyle) -> Self {
        match s {
            TScalarStyle::SingleQuoted => Self::SingleQuoted,
            TScalarStyle::DoubleQuoted => Self::DoubleQuoted,
            TScalarStyle::Literal => Self::Literal,
            TScalarStyle::Folded => Self::Folded,
            TScalarStyle::Plain | TScalarStyle::Any => Self::Plain,
        }
    }
}

/// The shape of a [`Node`]'s content.
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// A leaf value.
    Scalar(String, ScalarStyle),
    /// Ordered key/value node pairs.
    Mapping(Vec<(Node, Node)>),
    /// Ordered items.
    Sequence(Vec<Node>),
    /// `~` / empty scalar.
    Null,
    /// `*anchor` — passed through opaquely, never merged into.
    Alias(String),
}

/// One node of the comment-aware structured tree.
#[derive(Debug, Clone)]
pub struct Node {
    /// The node's value.
    pub kind: NodeKind,
    /// Source line the node started on (1-based), used to bucket comments.
    pub line: usize,
    /// Comment lines immediately preceding this node, each without its
    /// leading `#` and surrounding whitespace.
    pub head_comments: Vec<String>,
    /// A trailing same-line comment, if any.
    pub line_comment: Option<String>,
    /// Comment lines immediately following this node before the next
    /// sibling (only populated on the last item of a mapping/sequence).
    pub foot_comments: Vec<String>,
}

impl Node {
    fn leaf(kind: NodeKind, line: usize) -> Self {
        Self {
            kind,
            line,
            head_comments: Vec::new(),
            line_comment: None,
            foot_comments: Vec::new(),
        }
    }

    /// Whether this node is a mapping.
    #[must_use]
    pub fn is_mapping(&self) -> bool {
        matches!(self.kind, NodeKind::Mapping(_))
    }

    /// Whether this node is a sequence.
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        matches!(self.kind, NodeKind::Sequence(_))
    }

    fn same_kind(&self, other: &Node) -> bool {
        matches!(
            (&self.kind, &other.kind),
            (NodeKind::Mapping(_), NodeKind::Mapping(_)) | (NodeKind::Sequence(_), NodeKind::Sequence(_))
        )
    }

    fn scalar_text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Scalar(s, _) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Parse `raw` (one YAML document, no `---` separators) into a `Node` tree
/// plus its comment map, recovering comments via a raw-text scan.
///
/// # Errors
///
/// Returns [`Error::Parse`] if the YAML event stream is malformed.
pub fn parse_document(raw: &str) -> Result<Node> {
    let mut builder = TreeBuilder::default();
    let mut parser = Parser::new_from_str(raw);
    parser
        .load(&mut builder, false)
        .map_err(|e| Error::Parse(format!("comment-aware YAML parse failed: {e}")))?;
    let mut root = builder
        .finish()
        .ok_or_else(|| Error::Internal("YAML parser produced no document".to_string()))?;
    attach_comments(&mut root, &scan_comments(raw));
    Ok(root)
}

#[derive(Default)]
struct TreeBuilder {
    stack: Vec<Frame>,
    root: Option<Node>,
}

enum Frame {
    Mapping {
        pending_key: Option<Node>,
        entries: Vec<(Node, Node)>,
        line: usize,
    },
    Sequence {
        items: Vec<Node>,
        line: usize,
    },
}

impl TreeBuilder {
    fn finish(self) -> Option<Node> {
        self.root
    }

    fn push_value(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(Frame::Sequence { items, .. }) => items.push(node),
            Some(Frame::Mapping {
                pending_key,
                entries,
                ..
            }) => {
                if let Some(key) = pending_key.take() {
                    entries.push((key, node));
                } else {
                    *pending_key = Some(node);
                }
            }
            None => self.root = Some(node),
        }
    }
}

impl MarkedEventReceiver for TreeBuilder {
    fn on_event(&mut self, event: Event, marker: Marker) {
        let line = marker.line();
        match event {
            Event::Scalar(text, style, _, _) => {
                self.push_value(Node::leaf(NodeKind::Scalar(text, style.into()), line));
            }
            Event::Alias(_) => {
                self.push_value(Node::leaf(NodeKind::Alias(String::new()), line));
            }
            Event::MappingStart(..) => {
                self.stack.push(Frame::Mapping {
                    pending_key: None,
                    entries: Vec::new(),
                    line,
                });
            }
            Event::MappingEnd => {
                if let Some(Frame::Mapping { entries, line, .. }) = self.stack.pop() {
                    self.push_value(Node::leaf(NodeKind::Mapping(entries), line));
                }
            }
            Event::SequenceStart(..) => {
                self.stack.push(Frame::Sequence {
                    items: Vec::new(),
                    line,
                });
            }
            Event::SequenceEnd => {
                if let Some(Frame::Sequence { items, line, .. }) = self.stack.pop() {
                    self.push_value(Node::leaf(NodeKind::Sequence(items), line));
                }
            }
            Event::Nothing => {
                self.push_value(Node::leaf(NodeKind::Null, line));
            }
            Event::StreamStart
            | Event::StreamEnd
            | Event::DocumentStart
            | Event::DocumentEnd => {}
        }
    }
}

/// `line (1-based) -> trailing comment text` for lines with code before the
/// `#`, and a parallel set of line numbers that are *pure* comment lines
/// (nothing but whitespace before the `#`).
struct CommentScan {
    trailing: HashMap<usize, String>,
    pure: Vec<(usize, String)>,
}

fn scan_comments(raw: &str) -> CommentScan {
    let mut trailing = HashMap::new();
    let mut pure = Vec::new();
    for (idx, line) in raw.lines().enumerate() {
        let lineno = idx + 1;
        let Some(hash) = find_unquoted_hash(line) else {
            continue;
        };
        let before = &line[..hash];
        let text = line[hash + 1..].trim().to_string();
        if text.is_empty() {
            continue;
        }
        if before.trim().is_empty() {
            pure.push((lineno, text));
        } else {
            trailing.insert(lineno, text);
        }
    }
    CommentScan { trailing, pure }
}

fn find_unquoted_hash(line: &str) -> Option<usize> {
    let bytes = line.as_bytes();
    let mut in_single = false;
    let mut in_double = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '#' if !in_single && !in_double => {
                if idx == 0 || bytes[idx - 1].is_ascii_whitespace() {
                    return Some(idx);
                }
            }
            _ => {}
        }
    }
    None
}

/// Walk the tree attaching trailing comments to nodes on the same line, and
/// head comments (runs of pure-comment lines immediately above) to each
/// mapping/sequence child, in source order.
fn attach_comments(node: &mut Node, scan: &CommentScan) {
    if let Some(c) = scan.trailing.get(&node.line) {
        node.line_comment = Some(c.clone());
    }
    match &mut node.kind {
        NodeKind::Mapping(entries) => {
            let mut prev_line = node.line;
            for (key, value) in entries.iter_mut() {
                key.head_comments = comments_between(scan, prev_line, key.line);
                attach_comments(key, scan);
                attach_comments(value, scan);
                prev_line = value.line.max(key.line);
            }
        }
        NodeKind::Sequence(items) => {
            let mut prev_line = node.line;
            for item in items.iter_mut() {
                item.head_comments = comments_between(scan, prev_line, item.line);
                attach_comments(item, scan);
                prev_line = item.line;
            }
        }
        NodeKind::Scalar(..) | NodeKind::Null | NodeKind::Alias(_) => {}
    }
}

fn comments_between(scan: &CommentScan, after_line: usize, before_line: usize) -> Vec<String> {
    scan.pure
        .iter()
        .filter(|(l, _)| *l > after_line && *l < before_line)
        .map(|(_, text)| text.clone())
        .collect()
}

/// Well-known merge-key field names, checked in priority order against a
/// sequence's first mapping item (spec §4.9 sequence merge rule).
const MERGE_KEY_CANDIDATES: &[&str] = &["name", "containerPort", "port", "mountPath", "key", "ip"];

fn detect_merge_key(items: &[Node]) -> Option<&'static str> {
    let first = items.iter().find(|n| n.is_mapping())?;
    let NodeKind::Mapping(entries) = &first.kind else {
        return None;
    };
    MERGE_KEY_CANDIDATES.iter().copied().find(|candidate| {
        entries
            .iter()
            .any(|(k, _)| k.scalar_text() == Some(*candidate))
    })
}

fn item_key_value<'a>(item: &'a Node, merge_key: &str) -> Option<&'a str> {
    let NodeKind::Mapping(entries) = &item.kind else {
        return None;
    };
    entries
        .iter()
        .find(|(k, _)| k.scalar_text() == Some(merge_key))
        .and_then(|(_, v)| v.scalar_text())
}

/// Re-project `patched` (a fresh tree parsed from the serialized, mutated
/// untyped object) onto `original` (the tree carrying comments/order from
/// the source document), per spec §4.9's merge rules.
#[must_use]
pub fn reproject(original: &Node, patched: &Node) -> Node {
    match (&original.kind, &patched.kind) {
        (NodeKind::Mapping(orig_entries), NodeKind::Mapping(patched_entries)) => {
            reproject_mapping(original, orig_entries, patched_entries)
        }
        (NodeKind::Sequence(orig_items), NodeKind::Sequence(patched_items)) => {
            reproject_sequence(original, orig_items, patched_items)
        }
        (NodeKind::Scalar(orig_text, _), NodeKind::Scalar(text, style)) => {
            if orig_text == text {
                // Value untouched by any patch: keep the original text and
                // style (quoting, block style) verbatim.
                original.clone()
            } else {
                // Value actually changed (field op or type inference): take
                // the new text and whatever style the fresh serialization
                // gave it, since that style is what encodes its new shape
                // (e.g. a quoted string turning into a bare number).
                let mut node = original.clone();
                node.kind = NodeKind::Scalar(text.clone(), *style);
                node
            }
        }
        (NodeKind::Alias(_), _) | (_, NodeKind::Alias(_)) => original.clone(),
        _ => patched.clone(),
    }
}

fn reproject_mapping(
    original: &Node,
    orig_entries: &[(Node, Node)],
    patched_entries: &[(Node, Node)],
) -> Node {
    let mut out = Vec::new();
    let mut consumed = vec![false; patched_entries.len()];

    for (orig_key, orig_value) in orig_entries {
        let Some(key_text) = orig_key.scalar_text() else {
            continue;
        };
        let Some((idx, (_, patched_value))) = patched_entries
            .iter()
            .enumerate()
            .find(|(_, (k, _))| k.scalar_text() == Some(key_text))
        else {
            // Key absent from the patched state: it was deleted, so it's
            // dropped from the re-projected tree.
            continue;
        };
        consumed[idx] = true;
        let merged_value = if orig_value.same_kind(patched_value) {
            reproject(orig_value, patched_value)
        } else {
            patched_value.clone()
        };
        out.push((orig_key.clone(), merged_value));
    }

    for (idx, (key, value)) in patched_entries.iter().enumerate() {
        if !consumed[idx] {
            out.push((key.clone(), value.clone()));
        }
    }

    let mut node = original.clone();
    node.kind = NodeKind::Mapping(out);
    node
}

fn reproject_sequence(original: &Node, orig_items: &[Node], patched_items: &[Node]) -> Node {
    let Some(merge_key) = detect_merge_key(orig_items).or_else(|| detect_merge_key(patched_items))
    else {
        let mut node = original.clone();
        node.kind = NodeKind::Sequence(patched_items.to_vec());
        return node;
    };

    let mut out = Vec::with_capacity(patched_items.len());
    for patched_item in patched_items {
        let carried = item_key_value(patched_item, merge_key).and_then(|value| {
            orig_items
                .iter()
                .find(|orig| item_key_value(orig, merge_key) == Some(value))
        });
        match carried {
            Some(orig_item) => {
                let mut item = patched_item.clone();
                item.head_comments = orig_item.head_comments.clone();
                item.line_comment = orig_item.line_comment.clone();
                item.foot_comments = orig_item.foot_comments.clone();
                out.push(item);
            }
            None => out.push(patched_item.clone()),
        }
    }

    let mut node = original.clone();
    node.kind = NodeKind::Sequence(out);
    node
}

/// Serialize a `Node` tree back to YAML text, re-emitting its carried
/// comments. Block style throughout; flow collections are never produced.
#[must_use]
pub fn serialize(node: &Node) -> String {
    let mut out = String::new();
    write_node(node, 0, &mut out, true);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

fn indent(level: usize, out: &mut String) {
    for _ in 0..level {
        out.push_str("  ");
    }
}

fn write_comments(comments: &[String], level: usize, out: &mut String) {
    for c in comments {
        indent(level, out);
        out.push_str("# ");
        out.push_str(c);
        out.push('\n');
    }
}

fn write_node(node: &Node, level: usize, out: &mut String, is_root: bool) {
    match &node.kind {
        NodeKind::Mapping(entries) => {
            if entries.is_empty() {
                if !is_root {
                    out.push_str("{}\n");
                }
                return;
            }
            for (key, value) in entries {
                write_comments(&key.head_comments, level, out);
                indent(level, out);
                out.push_str(&scalar_repr(key));
                out.push(':');
                write_inline_or_nested(value, level, out);
            }
            if let Some((_, last)) = entries.last() {
                write_comments(&last.foot_comments, level, out);
            }
        }
        NodeKind::Sequence(items) => {
            if items.is_empty() {
                if !is_root {
                    out.push_str("[]\n");
                }
                return;
            }
            for item in items {
                write_comments(&item.head_comments, level, out);
                indent(level, out);
                out.push('-');
                write_inline_or_nested(item, level, out);
            }
            if let Some(last) = items.last() {
                write_comments(&last.foot_comments, level, out);
            }
        }
        NodeKind::Scalar(..) | NodeKind::Null | NodeKind::Alias(_) => {
            indent(level, out);
            out.push_str(&scalar_repr(node));
            if let Some(c) = &node.line_comment {
                out.push_str("  # ");
                out.push_str(c);
            }
            out.push('\n');
        }
    }
}

fn write_inline_or_nested(value: &Node, level: usize, out: &mut String) {
    match &value.kind {
        NodeKind::Mapping(entries) if !entries.is_empty() => {
            if let Some(c) = &value.line_comment {
                out.push_str("  # ");
                out.push_str(c);
            }
            out.push('\n');
            write_node(value, level + 1, out, false);
        }
        NodeKind::Sequence(items) if !items.is_empty() => {
            if let Some(c) = &value.line_comment {
                out.push_str("  # ");
                out.push_str(c);
            }
            out.push('\n');
            write_node(value, level, out, false);
        }
        _ => {
            out.push(' ');
            out.push_str(&scalar_repr(value));
            if let Some(c) = &value.line_comment {
                out.push_str("  # ");
                out.push_str(c);
            }
            out.push('\n');
        }
    }
}

fn scalar_repr(node: &Node) -> String {
    match &node.kind {
        NodeKind::Null => "null".to_string(),
        NodeKind::Alias(name) => format!("*{name}"),
        NodeKind::Scalar(text, style) => match style {
            ScalarStyle::DoubleQuoted => format!("{text:?}"),
            ScalarStyle::SingleQuoted => format!("'{}'", text.replace('\'', "''")),
            ScalarStyle::Plain | ScalarStyle::Literal | ScalarStyle::Folded => {
                if needs_quoting(text) {
                    format!("{text:?}")
                } else {
                    text.clone()
                }
            }
        },
        NodeKind::Mapping(_) | NodeKind::Sequence(_) => String::new(),
    }
}

fn needs_quoting(text: &str) -> bool {
    text.is_empty()
        || text.contains(':')
        || text.contains('#')
        || text.starts_with(['-', '?', '&', '*', '!', '|', '>', '@', '`', '"', '\''])
        || text.trim() != text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mapping_with_comments() {
        let raw = "# header\nname: demo  # trailing\nspec:\n  replicas: 3\n";
        let root = parse_document(raw).unwrap();
        let NodeKind::Mapping(entries) = &root.kind else {
            panic!("expected mapping")
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0.head_comments, vec!["header".to_string()]);
        assert_eq!(entries[0].1.line_comment.as_deref(), Some("trailing"));
    }

    #[test]
    fn reproject_keeps_untouched_key_comment() {
        let original = parse_document("name: demo # identity\nreplicas: 1\n").unwrap();
        let patched = parse_document("name: demo\nreplicas: 3\n").unwrap();
        let result = reproject(&original, &patched);
        let NodeKind::Mapping(entries) = &result.kind else {
            panic!("expected mapping")
        };
        assert_eq!(entries[0].1.line_comment.as_deref(), Some("identity"));
        assert_eq!(entries[1].1.scalar_text(), Some("3"));
    }

    #[test]
    fn reproject_drops_deleted_key() {
        let original = parse_document("a: 1\nb: 2\n").unwrap();
        let patched = parse_document("a: 1\n").unwrap();
        let result = reproject(&original, &patched);
        let NodeKind::Mapping(entries) = &result.kind else {
            panic!("expected mapping")
        };
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn reproject_sequence_merges_by_name_and_keeps_comments() {
        let original = parse_document(
            "containers:\n  - name: main # primary\n    image: nginx:1.24\n",
        )
        .unwrap();
        let patched = parse_document(
            "containers:\n  - name: main\n    image: nginx:1.25\n  - name: sidecar\n    image: envoy:v1.28\n",
        )
        .unwrap();
        let result = reproject(&original, &patched);
        let NodeKind::Mapping(entries) = &result.kind else {
            panic!("expected mapping")
        };
        let NodeKind::Sequence(items) = &entries[0].1.kind else {
            panic!("expected sequence")
        };
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].head_comments, Vec::<String>::new());
        let NodeKind::Mapping(main_fields) = &items[0].kind else {
            panic!("expected mapping")
        };
        assert_eq!(main_fields[0].1.line_comment.as_deref(), Some("primary"));
    }

    #[test]
    fn sequence_without_merge_key_is_replaced_wholesale() {
        let original = parse_document("items:\n  - 1\n  - 2\n").unwrap();
        let patched = parse_document("items:\n  - 1\n  - 2\n  - 3\n").unwrap();
        let result = reproject(&original, &patched);
        let NodeKind::Mapping(entries) = &result.kind else {
            panic!("expected mapping")
        };
        let NodeKind::Sequence(items) = &entries[0].1.kind else {
            panic!("expected sequence")
        };
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn serialize_round_trips_plain_document() {
        let root = parse_document("name: demo\nreplicas: 3\n").unwrap();
        let text = serialize(&root);
        assert!(text.contains("name: demo"));
        assert!(text.contains("replicas: 3"));
    }
}
