//! Call selection: bind a descriptor verb to an operation on the external
//! client and assemble its `CallInfo`.

use std::collections::BTreeSet;

use tracing::debug;

use konduct_core::descriptor::{Action, ResourceDescriptor};
use konduct_core::{alt, Error, Result};

use crate::{AltField, BoundCall, CallInfo, CallKind, RequestedParams, RestClient};

/// Resolve the verb for `action` into a bound call. `Ok(None)` means the
/// descriptor does not support the verb; callers treat that as "not
/// supported" rather than a hard failure.
pub fn select(
    client: &dyn RestClient,
    descriptor: &ResourceDescriptor,
    action: Action,
) -> Result<Option<BoundCall>> {
    for verb in &descriptor.verbs_description {
        if !verb.matches(action) {
            continue;
        }
        let mut kind = CallKind::from_method(&verb.method)?;
        if action == Action::FindBy {
            kind = CallKind::FindBy;
        }
        let (parameters, query) = client
            .requested_params(&verb.method, &verb.path)
            .map_err(|e| Error::Introspection(format!("requested params: {e}")))?;
        let body = if matches!(verb.method.as_str(), "POST" | "PUT" | "PATCH") {
            client
                .requested_body(&verb.method, &verb.path)
                .map_err(|e| Error::Introspection(format!("requested body: {e}")))?
                .unwrap_or_default()
        } else {
            BTreeSet::new()
        };
        let mut alt_fields = Vec::with_capacity(verb.alt_field_mapping.len());
        for (source, target) in &verb.alt_field_mapping {
            alt_fields.push(AltField {
                source: alt::parse(source)?,
                target: target.clone(),
            });
        }
        debug!(action = %action, method = %verb.method, path = %verb.path, "call selected");
        return Ok(Some(BoundCall {
            kind,
            info: CallInfo {
                path: verb.path.clone(),
                req_params: RequestedParams {
                    parameters,
                    query,
                    body,
                },
                identifier_fields: descriptor.identifiers.clone(),
                alt_fields,
            },
        }));
    }
    debug!(action = %action, "no verb declared for action");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;
    use konduct_core::Error;

    fn descriptor() -> ResourceDescriptor {
        serde_json::from_value(serde_json::json!({
            "identifiers": ["id"],
            "verbsDescription": [
                {"action": "get", "method": "GET", "path": "/things/{id}"},
                {"action": "create", "method": "POST", "path": "/things"},
                {"action": "findby", "method": "GET", "path": "/things"},
            ],
        }))
        .unwrap()
    }

    #[test]
    fn selects_by_action_case_insensitively() {
        let client = MockClient::default();
        let bound = select(&client, &descriptor(), Action::Get).unwrap().unwrap();
        assert_eq!(bound.kind, CallKind::Get);
        assert_eq!(bound.info.path, "/things/{id}");
        assert_eq!(bound.info.identifier_fields, vec!["id".to_string()]);
        assert!(bound.info.req_params.parameters.contains("id"));
    }

    #[test]
    fn find_by_overrides_declared_method() {
        let client = MockClient::default();
        let bound = select(&client, &descriptor(), Action::FindBy)
            .unwrap()
            .unwrap();
        assert_eq!(bound.kind, CallKind::FindBy);
    }

    #[test]
    fn missing_verb_is_not_supported() {
        let client = MockClient::default();
        assert!(select(&client, &descriptor(), Action::Delete)
            .unwrap()
            .is_none());
    }

    #[test]
    fn unknown_method_is_a_descriptor_error() {
        let client = MockClient::default();
        let mut d = descriptor();
        d.verbs_description[0].method = "FETCH".into();
        assert!(matches!(
            select(&client, &d, Action::Get),
            Err(Error::Descriptor(_))
        ));
    }

    #[test]
    fn introspection_failure_is_fatal() {
        let client = MockClient {
            fail_introspection: true,
            ..MockClient::default()
        };
        assert!(matches!(
            select(&client, &descriptor(), Action::Get),
            Err(Error::Introspection(_))
        ));
    }

    #[test]
    fn body_set_requested_only_for_write_methods() {
        // MockClient errors if asked for a GET body, so a plain Get
        // selection succeeding proves the selector never asks.
        let client = MockClient::with_body(["name", "size"]);
        let get = select(&client, &descriptor(), Action::Get).unwrap().unwrap();
        assert!(get.info.req_params.body.is_empty());
        let post = select(&client, &descriptor(), Action::Create)
            .unwrap()
            .unwrap();
        assert!(post.info.req_params.body.contains("name"));
    }

    #[test]
    fn call_info_buckets_are_disjoint() {
        let client = MockClient {
            query: ["page"].into_iter().map(String::from).collect(),
            body: ["name"].into_iter().map(String::from).collect(),
            ..MockClient::default()
        };
        let bound = select(&client, &descriptor(), Action::Create)
            .unwrap()
            .unwrap();
        let p = &bound.info.req_params;
        assert!(p.parameters.intersection(&p.query).next().is_none());
        assert!(p.parameters.intersection(&p.body).next().is_none());
        assert!(p.query.intersection(&p.body).next().is_none());
    }
}
