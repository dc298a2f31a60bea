//! The known-probe: decide whether a CR already exists remotely by
//! checking that a valid `Get` request can be assembled from its fields.
//! Purely local: the probe never issues a network call.

use serde_json::{Map, Value};
use tracing::debug;

use konduct_core::descriptor::{Action, ResourceDescriptor};

use crate::{project, select, RestClient};

/// True when the descriptor declares a `Get` verb and the CR's spec/status
/// fields fill in every declared path parameter and required query
/// parameter. Selection or validation failures are informational: the
/// resource is simply not known yet.
pub fn is_known(
    client: &dyn RestClient,
    descriptor: &ResourceDescriptor,
    status_fields: &Map<String, Value>,
    spec_fields: &Map<String, Value>,
) -> bool {
    let bound = match select::select(client, descriptor, Action::Get) {
        Ok(Some(bound)) => bound,
        Ok(None) => return false,
        Err(e) => {
            debug!(error = %e, "known probe could not select Get");
            return false;
        }
    };
    let config = project::build_request(&bound.info, status_fields, spec_fields);
    let method = descriptor
        .verb(Action::Get)
        .map(|v| v.method.as_str())
        .unwrap_or("GET");
    match client.validate_request(method, &bound.info.path, &config.parameters, &config.query) {
        Ok(()) => true,
        Err(e) => {
            debug!(error = %e, "known probe validation failed");
            false
        }
    }
}
