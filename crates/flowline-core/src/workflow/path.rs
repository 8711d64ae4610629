//! Parsed reference paths.
//!
//! Paths are parsed once, when a definition is compiled, into a root plus a
//! list of segments. Two syntaxes exist:
//!
//! - workflow paths: `<stepId>.result[.field...]` or `inputs[.field...]`
//! - named paths: `<name>[.field...]`, used by chain conditions where the
//!   roots are `output` and `agent`
//!
//! A segment made only of ASCII digits also indexes into sequences.

use std::fmt;

use flowline_types::workflow::INPUTS_ROOT;
use thiserror::Error;

/// Keyword separating a step id from the fields of its result.
const RESULT_SEGMENT: &str = "result";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid path '{path}': {reason}")]
pub struct PathError {
    pub path: String,
    pub reason: String,
}

impl PathError {
    fn new(path: &str, reason: impl Into<String>) -> Self {
        Self {
            path: path.to_string(),
            reason: reason.into(),
        }
    }
}

/// Where a path starts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathRoot {
    /// The stored result of a step.
    Step(String),
    /// The execution's initial inputs.
    Inputs,
    /// A named value supplied by the caller's scope.
    Named(String),
}

/// Which path grammar to parse with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSyntax {
    Workflow,
    Named,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferencePath {
    raw: String,
    root: PathRoot,
    segments: Vec<String>,
}

impl ReferencePath {
    /// Parse a workflow path (`step.result.field` or `inputs.field`).
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        Self::parse_with(raw, PathSyntax::Workflow)
    }

    /// Parse a named path (`output.field`).
    pub fn parse_named(raw: &str) -> Result<Self, PathError> {
        Self::parse_with(raw, PathSyntax::Named)
    }

    pub fn parse_with(raw: &str, syntax: PathSyntax) -> Result<Self, PathError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PathError::new(raw, "path is empty"));
        }
        let parts: Vec<&str> = trimmed.split('.').collect();
        Self::from_parts(trimmed, &parts, syntax)
    }

    /// Build a path from segments that were already split, e.g. by the
    /// condition parser where `items[0]` yields `["items", "0"]`.
    pub fn from_segments<S: AsRef<str>>(segments: &[S], syntax: PathSyntax) -> Result<Self, PathError> {
        let parts: Vec<&str> = segments.iter().map(AsRef::as_ref).collect();
        let raw = parts.join(".");
        if parts.is_empty() {
            return Err(PathError::new(&raw, "path is empty"));
        }
        Self::from_parts(&raw, &parts, syntax)
    }

    fn from_parts(raw: &str, parts: &[&str], syntax: PathSyntax) -> Result<Self, PathError> {
        if let Some(pos) = parts.iter().position(|p| p.is_empty()) {
            return Err(PathError::new(raw, format!("segment {} is empty", pos + 1)));
        }
        if let Some(bad) = parts.iter().find(|p| !is_segment(p)) {
            return Err(PathError::new(raw, format!("segment '{bad}' contains invalid characters")));
        }

        let head = parts[0];
        if !is_identifier(head) {
            return Err(PathError::new(
                raw,
                format!("root '{head}' must start with a letter or '_' and contain only letters, digits and '_'"),
            ));
        }
        let (root, rest) = match syntax {
            PathSyntax::Named => (PathRoot::Named(head.to_string()), &parts[1..]),
            PathSyntax::Workflow if head == INPUTS_ROOT => (PathRoot::Inputs, &parts[1..]),
            PathSyntax::Workflow => {
                if parts.get(1) != Some(&RESULT_SEGMENT) {
                    return Err(PathError::new(
                        raw,
                        format!("expected '{head}.{RESULT_SEGMENT}' at the start of the path"),
                    ));
                }
                (PathRoot::Step(head.to_string()), &parts[2..])
            }
        };

        Ok(Self {
            raw: raw.to_string(),
            root,
            segments: rest.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Path for `<step_id>.result.<field>`, as produced by wire-format expansion.
    pub fn step_field(step_id: &str, field: &str) -> String {
        if field.is_empty() {
            format!("{step_id}.{RESULT_SEGMENT}")
        } else {
            format!("{step_id}.{RESULT_SEGMENT}.{field}")
        }
    }

    pub fn root(&self) -> &PathRoot {
        &self.root
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The step this path reads from, if it addresses a step result.
    pub fn step_id(&self) -> Option<&str> {
        match &self.root {
            PathRoot::Step(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for ReferencePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Step ids and path roots: an ASCII letter or `_`, then letters, digits
/// and `_`. Conditions can only name roots of this shape.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_segment(s: &str) -> bool {
    s.chars()
        .all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_step_result_path() {
        let path = ReferencePath::parse("fetch.result.body.items").unwrap();
        assert_eq!(path.root(), &PathRoot::Step("fetch".to_string()));
        assert_eq!(path.segments(), &["body".to_string(), "items".to_string()]);
        assert_eq!(path.step_id(), Some("fetch"));
    }

    #[test]
    fn parses_whole_result() {
        let path = ReferencePath::parse("fetch.result").unwrap();
        assert!(path.segments().is_empty());
    }

    #[test]
    fn parses_inputs_path() {
        let path = ReferencePath::parse("inputs.urls.0").unwrap();
        assert_eq!(path.root(), &PathRoot::Inputs);
        assert_eq!(path.segments(), &["urls".to_string(), "0".to_string()]);
        assert_eq!(path.step_id(), None);
    }

    #[test]
    fn rejects_missing_result_keyword() {
        let err = ReferencePath::parse("fetch.status").unwrap_err();
        assert!(err.reason.contains("fetch.result"));
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(ReferencePath::parse("").is_err());
        assert!(ReferencePath::parse("fetch..result").is_err());
        assert!(ReferencePath::parse("fetch.result.").is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(ReferencePath::parse("fetch.result.a b").is_err());
        assert!(ReferencePath::parse("fetch.result[0]").is_err());
    }

    #[test]
    fn roots_must_be_identifiers() {
        assert!(ReferencePath::parse("gather_news.result.count").is_ok());
        assert!(ReferencePath::parse("gather-news.result.count").is_err());
        let err = ReferencePath::parse("2fa.result.ok").unwrap_err();
        assert!(err.reason.contains("root '2fa'"));
        // Fields keep the looser segment rules.
        assert!(ReferencePath::parse("fetch.result.content-type").is_ok());
    }

    #[test]
    fn from_segments_matches_parse() {
        let built = ReferencePath::from_segments(&["fetch", "result", "items", "0"], PathSyntax::Workflow).unwrap();
        assert_eq!(built, ReferencePath::parse("fetch.result.items.0").unwrap());
        assert!(ReferencePath::from_segments::<&str>(&[], PathSyntax::Workflow).is_err());
    }

    #[test]
    fn identifier_rules() {
        assert!(is_identifier("fetch"));
        assert!(is_identifier("_tmp2"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("2fa"));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn named_paths_have_no_result_keyword() {
        let path = ReferencePath::parse_named("output.score").unwrap();
        assert_eq!(path.root(), &PathRoot::Named("output".to_string()));
        assert_eq!(path.segments(), &["score".to_string()]);
    }

    #[test]
    fn step_field_builds_parseable_path() {
        let raw = ReferencePath::step_field("fetch", "status");
        assert_eq!(raw, "fetch.result.status");
        assert!(ReferencePath::parse(&raw).is_ok());
        assert_eq!(ReferencePath::step_field("fetch", ""), "fetch.result");
    }
}
