//! Dot-delimited field paths and value access inside nested [`ParameterTree`]s.
//!
//! Paths like `master.resources.requests.cpu` address a value by walking one
//! mapping per segment. Reading never creates anything and reports precisely
//! where and why a traversal stopped. Writing creates missing intermediate
//! mappings, but refuses to replace an existing non-mapping value on the way.
use std::{fmt::Display, str::FromStr};

use serde_json::{Map, Value};
use snafu::{OptionExt, Snafu};

use crate::tree::{ParameterTree, ValueKind};

type Result<T, E = Error> = std::result::Result<T, E>;

const SEPARATOR: char = '.';

#[derive(Debug, PartialEq, Snafu)]
pub enum Error {
    #[snafu(display("invalid field path {path:?}, segments must not be empty"))]
    InvalidPath { path: String },

    #[snafu(display("field path {path:?} not found, key {segment:?} does not exist"))]
    PathNotFound { path: String, segment: String },

    #[snafu(display(
        "field path {path:?} expected a {expected} to look up key {segment:?}, found a {actual}"
    ))]
    TypeMismatch {
        path: String,
        segment: String,
        expected: ValueKind,
        actual: ValueKind,
    },
}

impl Error {
    /// Returns whether the traversal failed because a key was absent.
    ///
    /// This is the only failure that callers may treat as "value not provided".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PathNotFound { .. })
    }
}

/// A parsed, dot-delimited path into a [`ParameterTree`].
///
/// The empty string parses to the root path, which has no segments. Any other
/// path must not contain empty segments, so `a..b`, `.a` and `a.` are rejected.
///
/// ```
/// use stackable_appcat::path::FieldPath;
///
/// let path: FieldPath = "master.resources.requests.cpu".parse().unwrap();
/// assert_eq!(path.segments().len(), 4);
/// assert!("master..cpu".parse::<FieldPath>().is_err());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// The path pointing at the tree itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// Builds a path from segments known to be non-empty.
    pub(crate) fn from_segments(segments: &[&str]) -> Self {
        Self {
            segments: segments.iter().map(|segment| (*segment).to_owned()).collect(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns a new path addressing `child` relative to `self`.
    pub fn join(&self, child: &Self) -> Self {
        Self {
            segments: self
                .segments
                .iter()
                .chain(child.segments.iter())
                .cloned()
                .collect(),
        }
    }
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Ok(Self::root());
        }

        let segments: Vec<String> = path.split(SEPARATOR).map(str::to_owned).collect();
        if segments.iter().any(String::is_empty) {
            return InvalidPathSnafu { path }.fail();
        }

        Ok(Self { segments })
    }
}

impl Display for FieldPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Reads the value at `path` inside `tree`.
///
/// The root path returns `tree` itself.
pub fn get_value<'a>(tree: &'a Value, path: &FieldPath) -> Result<&'a Value> {
    walk(tree, path, path.segments())
}

/// Writes `value` at `path` inside `tree`, replacing whatever was there.
///
/// Missing intermediate mappings are created. This never fails because
/// something is absent, only because an intermediate segment already holds a
/// scalar or a sequence, or because the path is the root.
pub fn set_value(tree: &mut ParameterTree, path: &FieldPath, value: Value) -> Result<()> {
    let Some((last, parents)) = path.segments().split_last() else {
        return InvalidPathSnafu {
            path: path.to_string(),
        }
        .fail();
    };

    let mut current = tree;
    for segment in parents {
        let next = current
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));

        current = match next {
            Value::Object(mapping) => mapping,
            other => {
                return TypeMismatchSnafu {
                    path: path.to_string(),
                    segment: segment.clone(),
                    expected: ValueKind::Mapping,
                    actual: ValueKind::from(&*other),
                }
                .fail();
            }
        };
    }

    current.insert(last.clone(), value);
    Ok(())
}

fn walk<'a>(tree: &'a Value, path: &FieldPath, segments: &[String]) -> Result<&'a Value> {
    let mut current = tree;
    for segment in segments {
        let Value::Object(mapping) = current else {
            return TypeMismatchSnafu {
                path: path.to_string(),
                segment: segment.clone(),
                expected: ValueKind::Mapping,
                actual: ValueKind::from(current),
            }
            .fail();
        };

        current = mapping.get(segment).context(PathNotFoundSnafu {
            path: path.to_string(),
            segment: segment.clone(),
        })?;
    }

    Ok(current)
}

/// Reads values from a document whose paths may echo the document's own name.
///
/// Field mappings are written against the composite resource, so their source
/// paths usually start with `spec.` even though the tree they are resolved
/// against already *is* the spec. An accessor constructed with
/// [`PathAccessor::with_root_segment`] ignores such a leading segment.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathAccessor {
    root_segment: Option<String>,
}

impl PathAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root_segment(root_segment: impl Into<String>) -> Self {
        Self {
            root_segment: Some(root_segment.into()),
        }
    }

    /// Reads the value at `path`, skipping a leading root segment if present.
    pub fn get<'a>(&self, tree: &'a Value, path: &FieldPath) -> Result<&'a Value> {
        let segments = match (&self.root_segment, path.segments().split_first()) {
            (Some(root_segment), Some((first, rest))) if first == root_segment => rest,
            _ => path.segments(),
        };

        walk(tree, path, segments)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn path(input: &str) -> FieldPath {
        input.parse().expect("test path is valid")
    }

    fn mapping(value: Value) -> ParameterTree {
        match value {
            Value::Object(mapping) => mapping,
            other => panic!("test tree must be a mapping, got {other}"),
        }
    }

    #[rstest]
    #[case("replicas", 1)]
    #[case("size.cpu", 2)]
    #[case("master.resources.requests.cpu", 4)]
    fn parse_valid_paths(#[case] input: &str, #[case] expected_segments: usize) {
        let parsed = path(input);
        assert_eq!(parsed.segments().len(), expected_segments);
        assert_eq!(parsed.to_string(), input);
    }

    #[rstest]
    #[case(".")]
    #[case("a..b")]
    #[case(".a")]
    #[case("a.")]
    fn parse_invalid_paths(#[case] input: &str) {
        assert_eq!(
            input.parse::<FieldPath>(),
            Err(Error::InvalidPath {
                path: input.to_owned()
            })
        );
    }

    #[test]
    fn empty_path_is_root() {
        let tree = json!({"a": 1});
        let root = path("");

        assert!(root.is_root());
        assert_eq!(get_value(&tree, &root), Ok(&tree));
    }

    #[test]
    fn get_nested_value() {
        let tree = json!({"size": {"cpu": "500m", "memory": "1Gi"}});
        assert_eq!(get_value(&tree, &path("size.cpu")), Ok(&json!("500m")));
    }

    #[test]
    fn get_missing_intermediate_segment() {
        let tree = json!({"size": {"cpu": "500m"}});
        let error = get_value(&tree, &path("storage.size")).unwrap_err();

        assert!(error.is_not_found());
        assert_eq!(
            error,
            Error::PathNotFound {
                path: "storage.size".to_owned(),
                segment: "storage".to_owned(),
            }
        );
    }

    #[test]
    fn get_through_scalar_is_type_mismatch() {
        let tree = json!({"size": "large"});
        let error = get_value(&tree, &path("size.cpu")).unwrap_err();

        assert_eq!(
            error,
            Error::TypeMismatch {
                path: "size.cpu".to_owned(),
                segment: "cpu".to_owned(),
                expected: ValueKind::Mapping,
                actual: ValueKind::String,
            }
        );
        assert!(!error.is_not_found());
    }

    #[test]
    fn get_through_sequence_is_type_mismatch() {
        let tree = json!({"users": ["a", "b"]});
        let error = get_value(&tree, &path("users.first")).unwrap_err();

        assert!(matches!(
            error,
            Error::TypeMismatch {
                actual: ValueKind::Sequence,
                ..
            }
        ));
    }

    #[rstest]
    #[case("spec.size.cpu")]
    #[case("size.cpu")]
    fn accessor_skips_root_segment(#[case] input: &str) {
        let user_spec = json!({"size": {"cpu": "500m"}});
        let accessor = PathAccessor::with_root_segment("spec");

        assert_eq!(accessor.get(&user_spec, &path(input)), Ok(&json!("500m")));
    }

    #[test]
    fn accessor_only_skips_leading_root_segment() {
        let user_spec = json!({"backup": {"spec": {"schedule": "@daily"}}});
        let accessor = PathAccessor::with_root_segment("spec");

        assert_eq!(
            accessor.get(&user_spec, &path("backup.spec.schedule")),
            Ok(&json!("@daily"))
        );
    }

    #[test]
    fn accessor_without_root_segment_reads_literally() {
        let observed = json!({"spec": {"forProvider": {"values": {"auth": {"password": "abc"}}}}});
        let accessor = PathAccessor::new();

        assert_eq!(
            accessor.get(&observed, &path("spec.forProvider.values.auth.password")),
            Ok(&json!("abc"))
        );
    }

    #[test]
    fn set_creates_intermediate_mappings() {
        let mut tree = ParameterTree::new();
        set_value(
            &mut tree,
            &path("master.resources.requests.cpu"),
            json!("1000m"),
        )
        .expect("set succeeds on an empty tree");

        assert_eq!(
            Value::Object(tree),
            json!({"master": {"resources": {"requests": {"cpu": "1000m"}}}})
        );
    }

    #[test]
    fn set_overwrites_existing_values() {
        let mut tree = mapping(json!({"auth": {"enabled": true, "password": "old"}}));
        set_value(&mut tree, &path("auth.password"), json!("new")).expect("set succeeds");

        assert_eq!(
            Value::Object(tree),
            json!({"auth": {"enabled": true, "password": "new"}})
        );
    }

    #[test]
    fn set_replaces_terminal_mapping() {
        let mut tree = mapping(json!({"resources": {"cpu": "1"}}));
        set_value(&mut tree, &path("resources"), json!("none")).expect("set succeeds");

        assert_eq!(tree["resources"], json!("none"));
    }

    #[test]
    fn set_through_scalar_is_type_mismatch() {
        let mut tree = mapping(json!({"master": "not-a-map"}));
        let error = set_value(&mut tree, &path("master.y"), json!(1)).unwrap_err();

        assert_eq!(
            error,
            Error::TypeMismatch {
                path: "master.y".to_owned(),
                segment: "master".to_owned(),
                expected: ValueKind::Mapping,
                actual: ValueKind::String,
            }
        );
        assert_eq!(tree["master"], json!("not-a-map"));
    }

    #[test]
    fn set_on_root_is_invalid() {
        let mut tree = ParameterTree::new();
        let error = set_value(&mut tree, &FieldPath::root(), json!(1)).unwrap_err();

        assert!(matches!(error, Error::InvalidPath { .. }));
    }

    #[rstest]
    #[case(json!({}), "a", json!(1))]
    #[case(json!({"a": {"b": 1}}), "a.b", json!({"c": [1, 2]}))]
    #[case(json!({"a": {"b": 1}}), "a.c.d", json!(null))]
    #[case(json!({"x": true}), "y.z", json!("text"))]
    fn set_then_get_round_trips(#[case] tree: Value, #[case] input: &str, #[case] value: Value) {
        let mut tree = mapping(tree);
        let field_path = path(input);

        set_value(&mut tree, &field_path, value.clone()).expect("set succeeds");
        assert_eq!(get_value(&Value::Object(tree), &field_path), Ok(&value));
    }

    #[test]
    fn join_paths() {
        let joined = path("spec.forProvider.values").join(&path("auth.password"));
        assert_eq!(joined.to_string(), "spec.forProvider.values.auth.password");
        assert_eq!(FieldPath::root().join(&path("a")), path("a"));
    }
}
