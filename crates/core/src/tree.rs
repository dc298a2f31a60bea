//! Accessors over the untyped CR tree (`serde_json::Value`).

use serde_json::{Map, Value};

use crate::{Error, Result};

/// Clone a named subtree (`spec`, `status`, …) as a field map. Absent or
/// non-mapping subtrees come back empty.
pub fn subtree_map(data: &Value, key: &str) -> Map<String, Value> {
    data.get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Default textual form of a value, used for path/query parameters and for
/// identifiers written into status. Strings render bare, null renders
/// empty, composites render as compact JSON.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Set `<subtree>.<key>` on the tree, creating the subtree if missing.
/// Fails when the root or an existing subtree is not a mapping.
pub fn set_nested_field(data: &mut Value, subtree: &str, key: &str, value: Value) -> Result<()> {
    let root = data.as_object_mut().ok_or_else(|| {
        Error::StatusWrite(format!("object root is not a mapping, cannot set {subtree}.{key}"))
    })?;
    let inner = root
        .entry(subtree.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    let inner = inner.as_object_mut().ok_or_else(|| {
        Error::StatusWrite(format!("{subtree} is not a mapping, cannot set {subtree}.{key}"))
    })?;
    inner.insert(key.to_string(), value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn subtree_map_handles_missing_and_non_mapping() {
        let data = json!({"spec": {"name": "x"}, "status": 3});
        assert_eq!(subtree_map(&data, "spec").get("name"), Some(&json!("x")));
        assert!(subtree_map(&data, "status").is_empty());
        assert!(subtree_map(&data, "metadata").is_empty());
    }

    #[test]
    fn scalars_stringify_without_quotes() {
        assert_eq!(scalar_to_string(&json!("abc")), "abc");
        assert_eq!(scalar_to_string(&json!(5)), "5");
        assert_eq!(scalar_to_string(&json!(true)), "true");
        assert_eq!(scalar_to_string(&Value::Null), "");
        assert_eq!(scalar_to_string(&json!(["a"])), "[\"a\"]");
    }

    #[test]
    fn set_nested_field_creates_subtree() {
        let mut data = json!({"spec": {}});
        set_nested_field(&mut data, "status", "id", json!("abc")).unwrap();
        assert_eq!(data["status"]["id"], json!("abc"));
    }

    #[test]
    fn set_nested_field_rejects_scalar_subtree() {
        let mut data = json!({"status": 1});
        let err = set_nested_field(&mut data, "status", "id", json!("abc")).unwrap_err();
        assert!(matches!(err, Error::StatusWrite(_)));
    }
}
