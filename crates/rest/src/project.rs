//! Request projection: walk a CR's spec and status field maps and classify
//! each pair into path parameters, query parameters, or body fields,
//! applying alternate-field rewrites along the way.

use serde_json::{Map, Value};
use tracing::trace;

use konduct_core::alt::{self, PathSegment};
use konduct_core::tree;

use crate::{AltField, CallInfo, RequestConfiguration};

/// Build the request for one call. Spec fields are processed first, then
/// status fields, so identifiers observed in status override values the
/// spec established for the same parameter.
pub fn build_request(
    info: &CallInfo,
    status_fields: &Map<String, Value>,
    spec_fields: &Map<String, Value>,
) -> RequestConfiguration {
    let mut config = RequestConfiguration::default();
    apply_fields(info, spec_fields, &mut config);
    apply_fields(info, status_fields, &mut config);
    config
}

fn apply_fields(info: &CallInfo, fields: &Map<String, Value>, config: &mut RequestConfiguration) {
    for (key, value) in fields {
        let (key, value) = rewrite(&info.alt_fields, key, value);
        if key.is_empty() {
            continue;
        }
        if info.req_params.parameters.contains(&key) {
            merge_text(&mut config.parameters, key, &value);
        } else if info.req_params.query.contains(&key) {
            merge_text(&mut config.query, key, &value);
        } else if info.req_params.body.contains(&key) {
            config.body.insert(key, value);
        } else {
            trace!(field = %key, "field not consumed by operation, dropped");
        }
    }
}

/// Stringify into a parameter map. An empty value never overwrites a
/// non-empty one already present, so the merge stays idempotent across the
/// spec-then-status passes.
fn merge_text(target: &mut std::collections::BTreeMap<String, String>, key: String, value: &Value) {
    let text = tree::scalar_to_string(value);
    if text.is_empty() && target.get(&key).is_some_and(|existing| !existing.is_empty()) {
        return;
    }
    target.insert(key, text);
}

/// Apply the alternate-field rewrite for one `(key, value)` pair.
///
/// A mapping whose source path starts at `key` and descends further is
/// resolved against the value; a changed resolution substitutes the
/// mapping's target name and the resolved value. A mapping whose source is
/// exactly `key` renames the field and keeps the value. A source path that
/// fails to match partway leaves the pair untouched.
fn rewrite(alt_fields: &[AltField], key: &str, value: &Value) -> (String, Value) {
    for alt in alt_fields {
        let Some((PathSegment::Descend(head), rest)) = alt.source.split_first() else {
            continue;
        };
        if head != key || rest.is_empty() {
            continue;
        }
        if let Some(resolved) = alt::resolve(rest, value) {
            if resolved != *value {
                return (alt.target.clone(), resolved);
            }
        }
    }
    for alt in alt_fields {
        if let [PathSegment::Descend(source)] = alt.source.as_slice() {
            if source == key {
                return (alt.target.clone(), value.clone());
            }
        }
    }
    (key.to_string(), value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use konduct_core::alt::parse;
    use serde_json::json;

    fn info(
        parameters: &[&str],
        query: &[&str],
        body: &[&str],
        alts: &[(&str, &str)],
    ) -> CallInfo {
        CallInfo {
            path: "/things/{id}".into(),
            req_params: crate::RequestedParams {
                parameters: parameters.iter().map(|s| s.to_string()).collect(),
                query: query.iter().map(|s| s.to_string()).collect(),
                body: body.iter().map(|s| s.to_string()).collect(),
            },
            identifier_fields: vec!["id".into()],
            alt_fields: alts
                .iter()
                .map(|(source, target)| AltField {
                    source: parse(source).unwrap(),
                    target: target.to_string(),
                })
                .collect(),
        }
    }

    fn fields(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn classifies_into_disjoint_buckets() {
        let info = info(&["id"], &["verbose"], &["name", "size"], &[]);
        let spec = fields(json!({"name": "x", "size": 3, "verbose": true, "noise": 1}));
        let status = fields(json!({"id": "abc"}));
        let config = build_request(&info, &status, &spec);
        assert_eq!(config.parameters.get("id"), Some(&"abc".to_string()));
        assert_eq!(config.query.get("verbose"), Some(&"true".to_string()));
        assert_eq!(config.body.get("name"), Some(&json!("x")));
        assert_eq!(config.body.get("size"), Some(&json!(3)));
        assert!(!config.body.contains_key("noise"));
    }

    #[test]
    fn status_overrides_spec_for_parameters() {
        let info = info(&["id"], &[], &[], &[]);
        let spec = fields(json!({"id": "from-spec"}));
        let status = fields(json!({"id": "from-status"}));
        let config = build_request(&info, &status, &spec);
        assert_eq!(config.parameters.get("id"), Some(&"from-status".to_string()));
    }

    #[test]
    fn empty_value_does_not_clobber_existing() {
        let info = info(&["id"], &[], &[], &[]);
        let spec = fields(json!({"id": "kept"}));
        let status = fields(json!({"id": ""}));
        let config = build_request(&info, &status, &spec);
        assert_eq!(config.parameters.get("id"), Some(&"kept".to_string()));
    }

    #[test]
    fn flattens_arrays_through_alt_mapping() {
        let info = info(&[], &[], &["emails"], &[("users[].email", "emails")]);
        let spec = fields(json!({"users": [{"email": "a@x"}, {"email": "b@y"}]}));
        let config = build_request(&info, &fields(json!({})), &spec);
        assert_eq!(config.body.get("emails"), Some(&json!("a@x,b@y")));
    }

    #[test]
    fn bare_source_renames_without_changing_value() {
        let info = info(&[], &[], &["user"], &[("username", "user")]);
        let spec = fields(json!({"username": "alice"}));
        let config = build_request(&info, &fields(json!({})), &spec);
        assert_eq!(config.body.get("user"), Some(&json!("alice")));
        assert!(!config.body.contains_key("username"));
    }

    #[test]
    fn failed_descent_leaves_pair_untouched() {
        let info = info(&[], &[], &["owner"], &[("account.owner.name", "owner")]);
        // account is a scalar, so the path cannot match partway through
        let spec = fields(json!({"account": "flat"}));
        let config = build_request(&info, &fields(json!({})), &spec);
        assert!(config.body.is_empty());
    }

    #[test]
    fn projection_is_complete_over_consumed_fields() {
        let info = info(&["id"], &["page"], &["name"], &[]);
        let spec = fields(json!({"id": "1", "page": "2", "name": "n"}));
        let config = build_request(&info, &fields(json!({})), &spec);
        assert_eq!(
            config.parameters.len() + config.query.len() + config.body.len(),
            3
        );
    }
}
