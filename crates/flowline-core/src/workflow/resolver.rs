//! Expression resolver: look up reference paths against a scope.
//!
//! A scope supplies the root value for a path (a step result, the inputs, or
//! a named value); the resolver walks the remaining segments through mappings
//! and sequences.

use flowline_types::value::{StepValue, ValueKind};
use thiserror::Error;

use super::path::{PathError, PathRoot, ReferencePath};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolutionError {
    /// The root step has not produced a result (or the root name is unknown).
    #[error("unknown step '{step_id}' in path '{path}'")]
    UnknownStep { step_id: String, path: String },

    #[error("unknown field '{field}' in path '{path}'")]
    UnknownField { field: String, path: String },

    #[error("cannot index {found} with '{segment}' in path '{path}'")]
    TypeMismatch {
        segment: String,
        found: ValueKind,
        path: String,
    },

    #[error(transparent)]
    InvalidPath(#[from] PathError),
}

/// Supplies root values to the resolver.
pub trait PathScope {
    fn lookup_root(&self, root: &PathRoot) -> Option<&StepValue>;
}

/// A mapping value used directly as a scope for named paths.
impl PathScope for StepValue {
    fn lookup_root(&self, root: &PathRoot) -> Option<&StepValue> {
        match root {
            PathRoot::Named(name) => self.get(name),
            PathRoot::Step(_) | PathRoot::Inputs => None,
        }
    }
}

/// Resolve a parsed path against a scope.
pub fn resolve<'a, S>(path: &ReferencePath, scope: &'a S) -> Result<&'a StepValue, ResolutionError>
where
    S: PathScope + ?Sized,
{
    let mut current = scope.lookup_root(path.root()).ok_or_else(|| {
        let step_id = match path.root() {
            PathRoot::Step(id) | PathRoot::Named(id) => id.clone(),
            PathRoot::Inputs => flowline_types::workflow::INPUTS_ROOT.to_string(),
        };
        ResolutionError::UnknownStep {
            step_id,
            path: path.to_string(),
        }
    })?;

    for segment in path.segments() {
        current = step_into(current, segment, path)?;
    }
    Ok(current)
}

/// Parse and resolve a workflow path in one go.
pub fn resolve_str<'a, S>(raw: &str, scope: &'a S) -> Result<&'a StepValue, ResolutionError>
where
    S: PathScope + ?Sized,
{
    let path = ReferencePath::parse(raw)?;
    resolve(&path, scope)
}

fn step_into<'a>(
    value: &'a StepValue,
    segment: &str,
    path: &ReferencePath,
) -> Result<&'a StepValue, ResolutionError> {
    match value {
        StepValue::Mapping(map) => map.get(segment).ok_or_else(|| ResolutionError::UnknownField {
            field: segment.to_string(),
            path: path.to_string(),
        }),
        StepValue::Sequence(items) => {
            let index: usize = segment.parse().map_err(|_| ResolutionError::TypeMismatch {
                segment: segment.to_string(),
                found: ValueKind::Sequence,
                path: path.to_string(),
            })?;
            items.get(index).ok_or_else(|| ResolutionError::UnknownField {
                field: segment.to_string(),
                path: path.to_string(),
            })
        }
        other => Err(ResolutionError::TypeMismatch {
            segment: segment.to_string(),
            found: other.kind(),
            path: path.to_string(),
        }),
    }
}
