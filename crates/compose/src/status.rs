//! Mirror identifier fields from a response body into CR status.

use kube::api::DynamicObject;
use serde_json::{Map, Value};

use konduct_core::{tree, Result};

/// Copy every response field named by `identifiers` into `status.<name>`,
/// stringified. Non-identifier fields are ignored; a failed nested write is
/// fatal for the reconcile.
pub fn write_identifiers(
    identifiers: &[String],
    cr: &mut DynamicObject,
    body: &Map<String, Value>,
) -> Result<()> {
    for (key, value) in body {
        if identifiers.iter().any(|id| id == key) {
            tree::set_nested_field(
                &mut cr.data,
                "status",
                key,
                Value::String(tree::scalar_to_string(value)),
            )?;
        }
    }
    Ok(())
}
