//! Step values: the closed sum type that every tool result, workflow input and
//! step parameter is expressed in.
//!
//! `StepValue` replaces untyped JSON blobs inside the engine so that field
//! access, indexing and comparisons are checked exhaustively. It crosses the
//! wire as plain JSON through a `serde_json::Value` bridge.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Largest magnitude at which every whole `f64` is still an exact integer.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A value flowing through a workflow run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum StepValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Sequence(Vec<StepValue>),
    Mapping(BTreeMap<String, StepValue>),
}

/// Discriminant of a [`StepValue`], used in error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Sequence,
    Mapping,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Sequence => "sequence",
            ValueKind::Mapping => "mapping",
        };
        f.write_str(name)
    }
}

impl StepValue {
    /// An empty mapping.
    pub fn mapping() -> Self {
        StepValue::Mapping(BTreeMap::new())
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            StepValue::Null => ValueKind::Null,
            StepValue::Bool(_) => ValueKind::Bool,
            StepValue::Number(_) => ValueKind::Number,
            StepValue::String(_) => ValueKind::String,
            StepValue::Sequence(_) => ValueKind::Sequence,
            StepValue::Mapping(_) => ValueKind::Mapping,
        }
    }

    /// Truthiness used by bare condition operands.
    ///
    /// `null`, `false`, `0`, `""`, `[]` and `{}` are falsy; everything else
    /// is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            StepValue::Null => false,
            StepValue::Bool(b) => *b,
            StepValue::Number(n) => *n != 0.0 && !n.is_nan(),
            StepValue::String(s) => !s.is_empty(),
            StepValue::Sequence(items) => !items.is_empty(),
            StepValue::Mapping(map) => !map.is_empty(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StepValue::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StepValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StepValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StepValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[StepValue]> {
        match self {
            StepValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, StepValue>> {
        match self {
            StepValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut BTreeMap<String, StepValue>> {
        match self {
            StepValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a field on a mapping. Returns `None` for non-mappings.
    pub fn get(&self, key: &str) -> Option<&StepValue> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Convert into the JSON representation used on the wire and in storage.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::from(self.clone())
    }

    /// Render the value for human display: strings unquoted, everything else
    /// as compact JSON.
    pub fn display_string(&self) -> String {
        match self {
            StepValue::String(s) => s.clone(),
            other => other.to_json().to_string(),
        }
    }
}

impl PartialEq for StepValue {
    /// Numbers compare numerically, other kinds structurally; values of
    /// different kinds are never equal.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StepValue::Null, StepValue::Null) => true,
            (StepValue::Bool(a), StepValue::Bool(b)) => a == b,
            (StepValue::Number(a), StepValue::Number(b)) => a == b,
            (StepValue::String(a), StepValue::String(b)) => a == b,
            (StepValue::Sequence(a), StepValue::Sequence(b)) => a == b,
            (StepValue::Mapping(a), StepValue::Mapping(b)) => a == b,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// JSON bridge
// ---------------------------------------------------------------------------

impl From<serde_json::Value> for StepValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => StepValue::Null,
            serde_json::Value::Bool(b) => StepValue::Bool(b),
            serde_json::Value::Number(n) => StepValue::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => StepValue::String(s),
            serde_json::Value::Array(items) => {
                StepValue::Sequence(items.into_iter().map(StepValue::from).collect())
            }
            serde_json::Value::Object(map) => StepValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, StepValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<StepValue> for serde_json::Value {
    fn from(value: StepValue) -> Self {
        match value {
            StepValue::Null => serde_json::Value::Null,
            StepValue::Bool(b) => serde_json::Value::Bool(b),
            StepValue::Number(n) => number_to_json(n),
            StepValue::String(s) => serde_json::Value::String(s),
            StepValue::Sequence(items) => {
                serde_json::Value::Array(items.into_iter().map(serde_json::Value::from).collect())
            }
            StepValue::Mapping(map) => serde_json::Value::Object(
                map.into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            ),
        }
    }
}

/// Whole numbers go out as JSON integers; non-finite numbers become `null`.
fn number_to_json(n: f64) -> serde_json::Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

impl From<bool> for StepValue {
    fn from(b: bool) -> Self {
        StepValue::Bool(b)
    }
}

impl From<f64> for StepValue {
    fn from(n: f64) -> Self {
        StepValue::Number(n)
    }
}

impl From<i64> for StepValue {
    fn from(n: i64) -> Self {
        StepValue::Number(n as f64)
    }
}

impl From<u64> for StepValue {
    fn from(n: u64) -> Self {
        StepValue::Number(n as f64)
    }
}

impl From<&str> for StepValue {
    fn from(s: &str) -> Self {
        StepValue::String(s.to_string())
    }
}

impl From<String> for StepValue {
    fn from(s: String) -> Self {
        StepValue::String(s)
    }
}

impl From<Vec<StepValue>> for StepValue {
    fn from(items: Vec<StepValue>) -> Self {
        StepValue::Sequence(items)
    }
}

impl From<BTreeMap<String, StepValue>> for StepValue {
    fn from(map: BTreeMap<String, StepValue>) -> Self {
        StepValue::Mapping(map)
    }
}

impl fmt::Display for StepValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_bridge_preserves_structure() {
        let raw = json!({"status": 200, "tags": ["a", "b"], "ok": true, "none": null});
        let value = StepValue::from(raw.clone());

        assert_eq!(value.get("status"), Some(&StepValue::Number(200.0)));
        assert_eq!(value.to_json(), raw);
    }

    #[test]
    fn whole_numbers_serialize_as_integers() {
        let json = serde_json::to_string(&StepValue::Number(42.0)).unwrap();
        assert_eq!(json, "42");

        let json = serde_json::to_string(&StepValue::Number(0.5)).unwrap();
        assert_eq!(json, "0.5");
    }

    #[test]
    fn non_finite_numbers_serialize_as_null() {
        assert_eq!(StepValue::Number(f64::NAN).to_json(), serde_json::Value::Null);
        assert_eq!(StepValue::Number(f64::INFINITY).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn truthiness() {
        assert!(!StepValue::Null.is_truthy());
        assert!(!StepValue::Bool(false).is_truthy());
        assert!(!StepValue::Number(0.0).is_truthy());
        assert!(!StepValue::from("").is_truthy());
        assert!(!StepValue::Sequence(vec![]).is_truthy());
        assert!(!StepValue::mapping().is_truthy());

        assert!(StepValue::Bool(true).is_truthy());
        assert!(StepValue::Number(-1.0).is_truthy());
        assert!(StepValue::from("no").is_truthy());
        assert!(StepValue::Sequence(vec![StepValue::Null]).is_truthy());
    }

    #[test]
    fn equality_never_crosses_kinds() {
        assert_ne!(StepValue::from("1"), StepValue::Number(1.0));
        assert_ne!(StepValue::Bool(false), StepValue::Null);
        assert_ne!(StepValue::Number(0.0), StepValue::Bool(false));
        assert_eq!(StepValue::Number(1.0), StepValue::from(1_i64));
    }

    #[test]
    fn deserialize_from_yaml_style_json() {
        let value: StepValue = serde_json::from_str(r#"{"b": 1, "a": [1.5, "x"]}"#).unwrap();
        let map = value.as_mapping().unwrap();
        // BTreeMap orders keys deterministically.
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(value.kind(), ValueKind::Mapping);
    }

    #[test]
    fn display_string_unquotes_strings() {
        assert_eq!(StepValue::from("hello").display_string(), "hello");
        assert_eq!(StepValue::Number(3.0).display_string(), "3");
    }
}
