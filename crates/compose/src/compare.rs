//! Drift comparison between a CR's desired spec and a remote response.
//!
//! With a compare list the listed fields define equality and must be
//! present in the response. Without one the spec subtree is compared
//! structurally: spec keys missing from the response are ignored, and
//! numeric scalars compare by their 64-bit truncation so a response
//! serving `42.0` matches a spec holding `42`.

use kube::api::DynamicObject;
use serde_json::{Map, Value};

use konduct_core::descriptor::ResourceDescriptor;
use konduct_core::{tree, Error, Result};

/// One observed difference, addressed by dotted path into spec.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDiff {
    pub path: String,
    pub expected: Value,
    pub found: Value,
}

#[derive(Debug, Clone, Default)]
pub struct CompareOutcome {
    pub up_to_date: bool,
    pub diffs: Vec<FieldDiff>,
}

/// Decide whether the remote response matches the CR's spec.
pub fn is_up_to_date(
    descriptor: &ResourceDescriptor,
    cr: &DynamicObject,
    response: &Map<String, Value>,
) -> Result<CompareOutcome> {
    let spec = tree::subtree_map(&cr.data, "spec");
    let mut diffs = Vec::new();
    if !descriptor.compare_list.is_empty() {
        for field in &descriptor.compare_list {
            let found = response.get(field).ok_or_else(|| {
                Error::Comparison(format!("field {field:?} not found in response"))
            })?;
            let expected = spec.get(field).cloned().unwrap_or(Value::Null);
            compare_value(&expected, found, field, &mut diffs);
        }
    } else {
        compare_maps(&spec, response, "", &mut diffs);
    }
    Ok(CompareOutcome {
        up_to_date: diffs.is_empty(),
        diffs,
    })
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

fn compare_maps(
    expected: &Map<String, Value>,
    found: &Map<String, Value>,
    path: &str,
    diffs: &mut Vec<FieldDiff>,
) {
    for (key, exp) in expected {
        // Keys the response does not echo back are not drift.
        let Some(fnd) = found.get(key) else { continue };
        compare_value(exp, fnd, &join(path, key), diffs);
    }
}

fn compare_value(expected: &Value, found: &Value, path: &str, diffs: &mut Vec<FieldDiff>) {
    match (expected, found) {
        (Value::Object(eo), Value::Object(fo)) => compare_maps(eo, fo, path, diffs),
        (Value::Array(ea), Value::Array(fa)) => {
            if ea.len() != fa.len() {
                diffs.push(FieldDiff {
                    path: path.to_string(),
                    expected: expected.clone(),
                    found: found.clone(),
                });
                return;
            }
            for (i, (e, f)) in ea.iter().zip(fa).enumerate() {
                let p = format!("{path}[{i}]");
                match (e, f) {
                    (Value::Object(eo), Value::Object(fo)) => compare_maps(eo, fo, &p, diffs),
                    _ => {
                        if !scalar_eq(e, f) {
                            diffs.push(FieldDiff {
                                path: p,
                                expected: e.clone(),
                                found: f.clone(),
                            });
                        }
                    }
                }
            }
        }
        _ => {
            if !scalar_eq(expected, found) {
                diffs.push(FieldDiff {
                    path: path.to_string(),
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }
    }
}

/// Scalar equality keyed on the expected side's type. Numbers of any width
/// compare by 64-bit truncation; a cast failure is inequality.
fn scalar_eq(expected: &Value, found: &Value) -> bool {
    match expected {
        Value::Number(_) => match (as_i64_lossy(expected), as_i64_lossy(found)) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
        Value::String(s) => found.as_str() == Some(s),
        Value::Bool(b) => found.as_bool() == Some(*b),
        _ => expected == found,
    }
}

fn as_i64_lossy(value: &Value) -> Option<i64> {
    let Value::Number(n) = value else { return None };
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    if let Some(u) = n.as_u64() {
        return i64::try_from(u).ok();
    }
    let t = n.as_f64()?.trunc();
    if t >= i64::MIN as f64 && t < i64::MAX as f64 {
        Some(t as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cr(spec: Value) -> DynamicObject {
        let ar = konduct_hub::api_resource(&konduct_core::descriptor::Gvk {
            group: "example.org".into(),
            version: "v1".into(),
            kind: "Widget".into(),
        });
        let mut obj = DynamicObject::new("w", &ar);
        obj.data = json!({ "spec": spec });
        obj
    }

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    fn descriptor(compare_list: &[&str]) -> ResourceDescriptor {
        serde_json::from_value(json!({
            "verbsDescription": [
                {"action": "get", "method": "GET", "path": "/things/{id}"},
            ],
            "compareList": compare_list,
        }))
        .unwrap()
    }

    #[test]
    fn compare_list_with_numeric_widths() {
        let outcome = is_up_to_date(
            &descriptor(&["count"]),
            &cr(json!({"count": 5})),
            &body(json!({"count": 5.0})),
        )
        .unwrap();
        assert!(outcome.up_to_date);
    }

    #[test]
    fn compare_list_missing_field_is_an_error() {
        let err = is_up_to_date(&descriptor(&["count"]), &cr(json!({"count": 5})), &body(json!({})))
            .unwrap_err();
        assert!(matches!(err, Error::Comparison(_)));
    }

    #[test]
    fn compare_list_inequality_reports_drift() {
        let outcome = is_up_to_date(
            &descriptor(&["name"]),
            &cr(json!({"name": "x"})),
            &body(json!({"name": "y"})),
        )
        .unwrap();
        assert!(!outcome.up_to_date);
        assert_eq!(outcome.diffs[0].path, "name");
    }

    #[test]
    fn structural_ignores_keys_missing_from_response() {
        let outcome = is_up_to_date(
            &descriptor(&[]),
            &cr(json!({"name": "x", "size": 3})),
            &body(json!({"name": "x"})),
        )
        .unwrap();
        assert!(outcome.up_to_date);
    }

    #[test]
    fn structural_recurses_into_maps_and_sequences() {
        let outcome = is_up_to_date(
            &descriptor(&[]),
            &cr(json!({"nested": {"a": 1}, "tags": [{"k": "env"}, {"k": "tier"}]})),
            &body(json!({"nested": {"a": 2}, "tags": [{"k": "env"}, {"k": "zone"}]})),
        )
        .unwrap();
        assert!(!outcome.up_to_date);
        let paths: Vec<&str> = outcome.diffs.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["nested.a", "tags[1].k"]);
    }

    #[test]
    fn sequence_length_mismatch_is_drift() {
        let outcome = is_up_to_date(
            &descriptor(&[]),
            &cr(json!({"tags": [1, 2]})),
            &body(json!({"tags": [1]})),
        )
        .unwrap();
        assert!(!outcome.up_to_date);
        assert_eq!(outcome.diffs[0].path, "tags");
    }

    #[test]
    fn numeric_truncations_compare_equal() {
        for (a, b) in [
            (json!(5), json!(5.0)),
            (json!(5.7), json!(5.9)),
            (json!(-3), json!(-3.2)),
            (json!(7u64), json!(7i64)),
        ] {
            assert!(scalar_eq(&a, &b), "{a} vs {b}");
        }
    }

    #[test]
    fn unrepresentable_numbers_never_compare_equal() {
        assert!(!scalar_eq(&json!(u64::MAX), &json!(-1)));
        assert!(!scalar_eq(&json!(1e300), &json!(0)));
        assert!(!scalar_eq(&json!(5), &json!("5")));
    }

    #[test]
    fn strings_and_bools_compare_by_value() {
        assert!(scalar_eq(&json!("a"), &json!("a")));
        assert!(!scalar_eq(&json!("a"), &json!("b")));
        assert!(scalar_eq(&json!(true), &json!(true)));
        assert!(!scalar_eq(&json!(true), &json!("true")));
    }
}
