//! The untyped, nested value model used for user specs and Helm values.
//!
//! Both the composite `spec` and the Helm values of a chart are arbitrary
//! YAML documents. They are represented as [`serde_json::Value`], which is a
//! closed variant over `null`, booleans, numbers, strings, sequences and
//! mappings.
use serde_json::{Map, Value};

/// A nested mapping of string keys to arbitrary values.
///
/// The mapping is ordered by key, which keeps serialized output stable across
/// reconciliation passes.
pub type ParameterTree = Map<String, Value>;

/// The kind of a [`Value`], used to report type mismatches during traversal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Sequence,
    Mapping,
}

impl From<&Value> for ValueKind {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Sequence,
            Value::Object(_) => Self::Mapping,
        }
    }
}

/// Returns a fully independent copy of `tree`.
///
/// Every nested mapping and sequence is copied, scalars are copied by value.
/// Mutating the returned tree never affects `tree`, which is why merges always
/// start from a copy of the service defaults.
pub fn deep_clone(tree: &ParameterTree) -> ParameterTree {
    tree.iter()
        .map(|(key, value)| (key.clone(), deep_clone_value(value)))
        .collect()
}

fn deep_clone_value(value: &Value) -> Value {
    match value {
        Value::Object(mapping) => Value::Object(deep_clone(mapping)),
        Value::Array(sequence) => Value::Array(sequence.iter().map(deep_clone_value).collect()),
        scalar => scalar.clone(),
    }
}
