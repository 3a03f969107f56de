//! Drift computation
//!
//! An [`Attribute`] pairs a module parameter with the dotted path of the
//! matching field on the remote resource and the equality to compare them
//! under. Only parameters the caller supplied explicitly take part.

use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

use crate::args::Params;

/// Semantic equality used for one attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compare {
    /// Text, integer, boolean. Numbers compare numerically, also when one
    /// side is numeric text.
    Scalar,
    /// Text compared ignoring ASCII case
    CaseInsensitive,
    /// Unordered collection
    Set,
    /// Ordered collection, element-wise
    Sequence,
    /// Mapping compared on the listed keys only, recursively. An empty
    /// list means the keys the caller supplied.
    Mapping(&'static [&'static str]),
}

/// Parameter to remote field binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub param: &'static str,
    /// Dotted path into the remote resource, e.g. `volume.size`
    pub remote: &'static str,
    pub compare: Compare,
}

impl Attribute {
    pub const fn new(param: &'static str, remote: &'static str, compare: Compare) -> Self {
        Self { param, remote, compare }
    }

    pub const fn scalar(param: &'static str, remote: &'static str) -> Self {
        Self::new(param, remote, Compare::Scalar)
    }
}

/// Field at a dotted path. Numeric segments index into arrays. Null counts
/// as absent.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    (!current.is_null()).then_some(current)
}

/// Whether `desired` and `actual` are equal under `compare`
pub fn semantically_equal(compare: Compare, desired: &Value, actual: &Value) -> bool {
    match compare {
        Compare::Scalar => scalar_equal(desired, actual),
        Compare::CaseInsensitive => match (desired.as_str(), actual.as_str()) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            _ => scalar_equal(desired, actual),
        },
        Compare::Set => match (desired.as_array(), actual.as_array()) {
            (Some(a), Some(b)) => {
                a.iter().all(|x| b.iter().any(|y| scalar_equal(x, y)))
                    && b.iter().all(|y| a.iter().any(|x| scalar_equal(x, y)))
            }
            _ => false,
        },
        Compare::Sequence => match (desired.as_array(), actual.as_array()) {
            (Some(a), Some(b)) => a.len() == b.len() && a.iter().zip(b).all(|(x, y)| deep_equal(x, y)),
            _ => false,
        },
        Compare::Mapping(keys) => match (desired.as_object(), actual.as_object()) {
            (Some(a), Some(b)) => mapping_equal(keys, a, b),
            _ => false,
        },
    }
}

fn scalar_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (a, b) {
        // Text against text is exact; only a JSON number is compared numerically.
        (Value::String(_), Value::String(_)) => false,
        (Value::Number(x), Value::Number(y)) => numbers_equal(x, y),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            serde_json::from_str::<Number>(s.trim()).is_ok_and(|parsed| numbers_equal(n, &parsed))
        }
        (Value::Bool(x), Value::String(s)) | (Value::String(s), Value::Bool(x)) => {
            s.eq_ignore_ascii_case(if *x { "true" } else { "false" })
        }
        _ => false,
    }
}

fn numbers_equal(x: &Number, y: &Number) -> bool {
    if let (Some(p), Some(q)) = (x.as_i64(), y.as_i64()) {
        return p == q;
    }
    if let (Some(p), Some(q)) = (x.as_u64(), y.as_u64()) {
        return p == q;
    }
    let integral = |n: &Number| n.is_i64() || n.is_u64();
    if integral(x) && integral(y) {
        // One negative, one beyond i64.
        return false;
    }
    match (x.as_f64(), y.as_f64()) {
        (Some(p), Some(q)) => p == q,
        _ => false,
    }
}

fn deep_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => mapping_equal(&[], x, y),
        (Value::Array(x), Value::Array(y)) => x.len() == y.len() && x.iter().zip(y).all(|(p, q)| deep_equal(p, q)),
        _ => scalar_equal(a, b),
    }
}

fn mapping_equal(keys: &[&str], desired: &Map<String, Value>, actual: &Map<String, Value>) -> bool {
    let compare_key = |key: &str| match (desired.get(key), actual.get(key)) {
        (Some(d), Some(a)) => deep_equal(d, a),
        (Some(d), None) => d.is_null(),
        (None, _) => true,
    };
    if keys.is_empty() {
        desired.keys().all(|k| compare_key(k))
    } else {
        keys.iter().all(|k| compare_key(k))
    }
}

/// One drifted attribute
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    pub before: Value,
    pub after: Value,
}

/// Drift between parameters and a remote resource, keyed by parameter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    changes: BTreeMap<&'static str, Change>,
}

impl Diff {
    /// Compare every explicitly supplied attribute with the remote value.
    /// With `skip_unreported`, attributes the remote does not report are
    /// not counted.
    pub fn compute(attributes: &[Attribute], params: &Params, remote: &Value, skip_unreported: bool) -> Self {
        let mut changes = BTreeMap::new();
        for attr in attributes {
            if !params.is_explicit(attr.param) {
                continue;
            }
            let Some(desired) = params.get(attr.param) else {
                continue;
            };
            let actual = lookup(remote, attr.remote);
            let equal = match actual {
                Some(actual) => semantically_equal(attr.compare, desired, actual),
                None => skip_unreported,
            };
            if !equal {
                changes.insert(
                    attr.param,
                    Change {
                        before: actual.cloned().unwrap_or(Value::Null),
                        after: desired.clone(),
                    },
                );
            }
        }
        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn get(&self, param: &str) -> Option<&Change> {
        self.changes.get(param)
    }

    pub fn contains(&self, param: &str) -> bool {
        self.changes.contains_key(param)
    }

    pub fn params(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.changes.keys().copied()
    }

    /// `{param: before}` for diff output
    pub fn before(&self) -> Value {
        Value::Object(
            self.changes
                .iter()
                .map(|(k, c)| (k.to_string(), c.before.clone()))
                .collect(),
        )
    }

    /// `{param: after}` for diff output
    pub fn after(&self) -> Value {
        Value::Object(
            self.changes
                .iter()
                .map(|(k, c)| (k.to_string(), c.after.clone()))
                .collect(),
        )
    }

    /// Human summary: `flavor (a -> b), volume_size (40 -> 100)`
    pub fn describe(&self) -> String {
        self.changes
            .iter()
            .map(|(k, c)| format!("{} ({} -> {})", k, c.before, c.after))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::{ArgSpec, ArgumentSpec, Kind};
    use serde_json::json;

    const ATTRS: &[Attribute] = &[
        Attribute::scalar("flavor", "flavor_ref"),
        Attribute::scalar("volume_size", "volume.size"),
        Attribute::new("datastore_type", "datastore.type", Compare::CaseInsensitive),
        Attribute::new("tags", "tags", Compare::Set),
    ];

    fn params(args: Value) -> Params {
        ArgumentSpec::new()
            .param("flavor", ArgSpec::str())
            .param("volume_size", ArgSpec::int().default(40))
            .param("datastore_type", ArgSpec::str())
            .param("tags", ArgSpec::list(Kind::Str))
            .validate(args.as_object().unwrap())
            .unwrap()
    }

    fn remote() -> Value {
        json!({
            "flavor_ref": "rds.mysql.c3.large",
            "volume": {"type": "COMMON", "size": 100},
            "datastore": {"type": "MySQL"},
            "tags": ["b", "a"]
        })
    }

    #[test]
    fn test_omitted_and_defaulted_params_never_drift() {
        // volume_size defaults to 40 and remote has 100
        let diff = Diff::compute(ATTRS, &params(json!({})), &remote(), false);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_explicit_null_never_drifts() {
        let diff = Diff::compute(ATTRS, &params(json!({"flavor": null})), &remote(), false);
        assert!(diff.is_empty());
    }

    #[test]
    fn test_semantic_equality() {
        let diff = Diff::compute(
            ATTRS,
            &params(json!({"volume_size": "100", "datastore_type": "mysql", "tags": ["a", "b"]})),
            &remote(),
            false,
        );
        assert!(diff.is_empty(), "{}", diff.describe());
    }

    #[test]
    fn test_drift_reports_before_after() {
        let diff = Diff::compute(
            ATTRS,
            &params(json!({"flavor": "rds.mysql.c3.xlarge", "volume_size": 200})),
            &remote(),
            false,
        );
        assert_eq!(diff.len(), 2);
        assert_eq!(diff.get("volume_size").unwrap().before, json!(100));
        assert_eq!(diff.after(), json!({"flavor": "rds.mysql.c3.xlarge", "volume_size": 200}));
    }

    #[test]
    fn test_unreported_remote_field() {
        let p = params(json!({"flavor": "x"}));
        let remote = json!({"volume": {"size": 1}});
        assert!(Diff::compute(ATTRS, &p, &remote, true).is_empty());
        assert!(Diff::compute(ATTRS, &p, &remote, false).contains("flavor"));
    }

    #[test]
    fn test_mapping_compares_declared_keys_only() {
        let desired = json!({"type": "mysql", "version": "8.0"});
        let actual = json!({"type": "mysql", "version": "8.0", "complete_version": "8.0.28"});
        assert!(semantically_equal(Compare::Mapping(&[]), &desired, &actual));
        assert!(semantically_equal(Compare::Mapping(&["type"]), &json!({"type": "mysql", "version": "5.7"}), &actual));
        assert!(!semantically_equal(Compare::Mapping(&["version"]), &json!({"version": "5.7"}), &actual));
    }

    #[test]
    fn test_sequence_is_ordered() {
        assert!(semantically_equal(Compare::Sequence, &json!([1, 2]), &json!([1, 2])));
        assert!(!semantically_equal(Compare::Sequence, &json!([1, 2]), &json!([2, 1])));
        assert!(semantically_equal(Compare::Set, &json!([1, 2]), &json!([2, 1])));
    }

    #[test]
    fn test_text_is_compared_exactly() {
        for (desired, actual) in [("1.0", "1"), ("007", "7"), ("1e2", "100")] {
            assert!(!semantically_equal(Compare::Scalar, &json!(desired), &json!(actual)), "{}", desired);
        }
        let diff = Diff::compute(ATTRS, &params(json!({"flavor": "1.0"})), &json!({"flavor_ref": "1"}), false);
        assert!(diff.contains("flavor"));
        assert!(semantically_equal(Compare::Scalar, &json!(100), &json!("100")));
        assert!(semantically_equal(Compare::Scalar, &json!(100), &json!(100.0)));
    }

    #[test]
    fn test_large_integers_compare_exactly() {
        let a = json!(9_007_199_254_740_993_i64);
        let b = json!(9_007_199_254_740_992_i64);
        assert!(!semantically_equal(Compare::Scalar, &a, &b));
        assert!(!semantically_equal(Compare::Scalar, &json!(u64::MAX), &json!(-1)));
        assert!(semantically_equal(Compare::Scalar, &json!(u64::MAX), &json!(u64::MAX.to_string())));
    }

    #[test]
    fn test_lookup_paths() {
        let v = json!({"nodes": [{"availability_zone": "eu-de-01"}], "x": null});
        assert_eq!(lookup(&v, "nodes.0.availability_zone"), Some(&json!("eu-de-01")));
        assert_eq!(lookup(&v, "x"), None);
        assert_eq!(lookup(&v, "nodes.3"), None);
    }
}
