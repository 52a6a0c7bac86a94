//! Path Model (spec §4.1).
//!
//! A path is a dotted string of segments; leading/trailing dots are trimmed.
//! A segment is `field` or `field[selector]`, where the selector is either a
//! non-negative integer (index match) or a `k=v` pair (key match).
//!
//! The terminal shorthands `field[-]` (append), `field[delete]`, and
//! `field[delete=selector]` are recognized only by the Patch Line Parser
//! (`crate::patchop`), not here.

use crate::error::{Error, Result};

/// How a [`PathSegment`]'s selector should be matched against a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// No selector; the segment addresses a plain field.
    None,
    /// Selector is a decimal index into a list.
    Index,
    /// Selector is a `k=v` pair matched against list elements that are maps.
    Key,
}

/// One step of an addressing expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    /// Field name. Always non-empty.
    pub field: String,
    /// Whether (and how) this segment carries a list selector.
    pub match_type: MatchType,
    /// Raw selector text. Empty iff `match_type == MatchType::None`.
    pub match_value: String,
}

impl PathSegment {
    fn plain(field: &str) -> Self {
        Self {
            field: field.to_string(),
            match_type: MatchType::None,
            match_value: String::new(),
        }
    }

    fn indexed(field: &str, index: &str) -> Self {
        Self {
            field: field.to_string(),
            match_type: MatchType::Index,
            match_value: index.to_string(),
        }
    }

    fn keyed(field: &str, kv: &str) -> Self {
        Self {
            field: field.to_string(),
            match_type: MatchType::Key,
            match_value: kv.to_string(),
        }
    }
}

/// Parse a dotted path string into its segments.
///
/// Leading and trailing dots are trimmed. Each non-empty segment must match
/// `field` or `field[selector]`; empty segments, empty selectors, a missing
/// closing bracket, or a bracket with an empty field are rejected.
///
/// # Errors
///
/// Returns [`Error::Parse`] if any segment is malformed.
pub fn parse_path(path: &str) -> Result<Vec<PathSegment>> {
    let trimmed = path.trim_matches('.');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed.split('.').map(parse_segment).collect()
}

fn parse_segment(raw: &str) -> Result<PathSegment> {
    if raw.is_empty() {
        return Err(Error::Parse(format!(
            "empty path segment in {raw:?}: paths must not contain consecutive dots"
        )));
    }

    let Some(open) = raw.find('[') else {
        return Ok(PathSegment::plain(raw));
    };

    if !raw.ends_with(']') {
        return Err(Error::Parse(format!(
            "path segment {raw:?} has an unterminated selector"
        )));
    }

    let field = &raw[..open];
    let selector = &raw[open + 1..raw.len() - 1];

    if field.is_empty() {
        return Err(Error::Parse(format!(
            "path segment {raw:?} has an empty field name before its selector"
        )));
    }
    if selector.is_empty() {
        return Err(Error::Parse(format!(
            "path segment {raw:?} has an empty selector"
        )));
    }

    if let Some((k, v)) = selector.split_once('=') {
        if k.is_empty() {
            return Err(Error::Parse(format!(
                "path segment {raw:?} has a key selector with an empty key"
            )));
        }
        let _ = v;
        return Ok(PathSegment::keyed(field, selector));
    }

    if selector.parse::<i64>().is_err() {
        return Err(Error::Parse(format!(
            "path segment {raw:?} has a selector that is neither `key=value` nor an integer"
        )));
    }

    Ok(PathSegment::indexed(field, selector))
}

/// Re-render segments back into their canonical dotted-path string.
#[must_use]
pub fn segments_to_path(segments: &[PathSegment]) -> String {
    segments
        .iter()
        .map(|seg| match seg.match_type {
            MatchType::None => seg.field.clone(),
            MatchType::Index | MatchType::Key => format!("{}[{}]", seg.field, seg.match_value),
        })
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_dotted_path() {
        let segs = parse_path("spec.template.spec.containers").unwrap();
        assert_eq!(segs.len(), 4);
        assert_eq!(segs[3].field, "containers");
        assert_eq!(segs[3].match_type, MatchType::None);
    }

    #[test]
    fn trims_leading_and_trailing_dots() {
        let segs = parse_path(".spec.replicas.").unwrap();
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].field, "spec");
    }

    #[test]
    fn parses_index_selector() {
        let segs = parse_path("spec.containers[0].image").unwrap();
        assert_eq!(segs[1].match_type, MatchType::Index);
        assert_eq!(segs[1].match_value, "0");
    }

    #[test]
    fn parses_negative_index_selector() {
        let segs = parse_path("items[-1]").unwrap();
        assert_eq!(segs[0].match_type, MatchType::Index);
        assert_eq!(segs[0].match_value, "-1");
    }

    #[test]
    fn parses_key_selector() {
        let segs = parse_path("spec.containers[name=main].image").unwrap();
        assert_eq!(segs[1].match_type, MatchType::Key);
        assert_eq!(segs[1].match_value, "name=main");
    }

    #[test]
    fn rejects_consecutive_dots() {
        assert!(parse_path("spec..replicas").is_err());
    }

    #[test]
    fn rejects_empty_selector() {
        assert!(parse_path("containers[]").is_err());
    }

    #[test]
    fn rejects_missing_closing_bracket() {
        assert!(parse_path("containers[0").is_err());
    }

    #[test]
    fn rejects_empty_field_before_selector() {
        assert!(parse_path("[0]").is_err());
    }

    #[test]
    fn rejects_non_integer_non_kv_selector() {
        assert!(parse_path("containers[abc]").is_err());
    }

    #[test]
    fn empty_path_yields_no_segments() {
        assert!(parse_path("").unwrap().is_empty());
        assert!(parse_path("...").unwrap().is_empty());
    }

    #[test]
    fn round_trips_through_segments_to_path() {
        let original = "spec.containers[name=main].ports[0]";
        let segs = parse_path(original).unwrap();
        assert_eq!(segments_to_path(&segs), original);
    }
}
