//! Owner-reference resolution: find the sibling CR a declared reference
//! points at by matching a spec field value against the siblings' scalar
//! leaves.

use kube::api::DynamicObject;
use serde_json::Value;
use tracing::debug;

use konduct_core::descriptor::ReferenceInfo;
use konduct_core::{tree, Error, Result};
use konduct_hub::ClusterOps;

/// Pure matching scan: the first object with a scalar leaf under `status`
/// or `spec` (one level deep) equal to the lookup key.
pub fn find_match<'a>(items: &'a [DynamicObject], lookup: &str) -> Option<&'a DynamicObject> {
    items.iter().find(|item| {
        ["status", "spec"].iter().any(|subtree| {
            item.data
                .get(*subtree)
                .and_then(Value::as_object)
                .is_some_and(|map| map.values().any(|v| scalar_matches(v, lookup)))
        })
    })
}

fn scalar_matches(value: &Value, lookup: &str) -> bool {
    match value {
        Value::String(_) | Value::Number(_) | Value::Bool(_) => {
            tree::scalar_to_string(value) == lookup
        }
        _ => false,
    }
}

/// Resolve a reference for the owning CR by listing every sibling of the
/// referenced kind cluster-wide. An empty candidate list, a missing or
/// non-scalar lookup field, and a failed match are all fatal.
pub async fn resolve(
    cluster: &dyn ClusterOps,
    reference: &ReferenceInfo,
    owner: &DynamicObject,
) -> Result<DynamicObject> {
    let gvk = &reference.group_version_kind;
    let items = cluster.list_all(gvk).await?;
    if items.is_empty() {
        return Err(Error::Reference(format!("no {gvk} objects to resolve against")));
    }
    let lookup = owner
        .data
        .get("spec")
        .and_then(|spec| spec.get(&reference.field))
        .ok_or_else(|| {
            Error::Reference(format!("spec field {:?} not found on owner", reference.field))
        })?;
    if !matches!(lookup, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
        return Err(Error::Reference(format!(
            "spec field {:?} is not a scalar",
            reference.field
        )));
    }
    let lookup = tree::scalar_to_string(lookup);
    debug!(gvk = %gvk, field = %reference.field, lookup = %lookup, "resolving reference");
    find_match(&items, &lookup)
        .cloned()
        .ok_or_else(|| Error::Reference(format!("no {gvk} object matches {lookup:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn team(name: &str, data: Value) -> DynamicObject {
        let ar = konduct_hub::api_resource(&konduct_core::descriptor::Gvk {
            group: "example.org".into(),
            version: "v1".into(),
            kind: "Team".into(),
        });
        let mut obj = DynamicObject::new(name, &ar);
        obj.data = data;
        obj
    }

    #[test]
    fn first_status_match_wins() {
        let items = vec![
            team("blue", json!({"status": {"displayName": "blue"}})),
            team("red", json!({"status": {"displayName": "red"}})),
            team("red2", json!({"spec": {"displayName": "red"}})),
        ];
        let found = find_match(&items, "red").unwrap();
        assert_eq!(found.metadata.name.as_deref(), Some("red"));
    }

    #[test]
    fn spec_leaves_match_when_status_does_not() {
        let items = vec![team("t", json!({"status": {}, "spec": {"alias": "target"}}))];
        assert!(find_match(&items, "target").is_some());
    }

    #[test]
    fn numeric_leaves_match_their_textual_form() {
        let items = vec![team("t", json!({"status": {"port": 8080}}))];
        assert!(find_match(&items, "8080").is_some());
        assert!(find_match(&items, "80").is_none());
    }

    #[test]
    fn composites_never_match() {
        let items = vec![team("t", json!({"status": {"tags": ["red"]}}))];
        assert!(find_match(&items, "red").is_none());
    }
}
