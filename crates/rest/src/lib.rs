//! REST call plumbing: the consumed client interface, call selection, and
//! request projection from CR spec/status trees.

#![forbid(unsafe_code)]

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::{Map, Value};

use konduct_core::alt::PathSegment;
use konduct_core::Result;

mod known;
mod project;
mod select;

pub use known::is_known;
pub use project::build_request;
pub use select::select;

/// Internal call types the external client exposes. Derived from the HTTP
/// method declared by a verb; `FindBy` is forced by the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    List,
    FindBy,
}

impl CallKind {
    pub fn from_method(method: &str) -> Result<CallKind> {
        match method {
            "GET" => Ok(CallKind::Get),
            "POST" => Ok(CallKind::Post),
            "PUT" => Ok(CallKind::Put),
            "PATCH" => Ok(CallKind::Patch),
            "DELETE" => Ok(CallKind::Delete),
            other => Err(konduct_core::Error::Descriptor(format!(
                "unknown method {other:?}"
            ))),
        }
    }
}

/// The parameter/query/body field-name sets an operation consumes, as
/// introspected by the external client. The three sets are pairwise
/// disjoint for any single operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestedParams {
    pub parameters: BTreeSet<String>,
    pub query: BTreeSet<String>,
    pub body: BTreeSet<String>,
}

/// One alt-field mapping with its source path parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AltField {
    pub source: Vec<PathSegment>,
    pub target: String,
}

/// Everything needed to project a CR onto one API operation.
#[derive(Debug, Clone, Default)]
pub struct CallInfo {
    pub path: String,
    pub req_params: RequestedParams,
    pub identifier_fields: Vec<String>,
    pub alt_fields: Vec<AltField>,
}

/// A selected operation: the call type to invoke plus its call info.
#[derive(Debug, Clone)]
pub struct BoundCall {
    pub kind: CallKind,
    pub info: CallInfo,
}

/// The concrete request for one call. Path and query values are
/// stringified; body values keep their original type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestConfiguration {
    pub parameters: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Map<String, Value>,
}

/// The external HTTP client, consumed as a capability set. Introspection
/// and validation are local operations; only `call` goes on the wire.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Path-parameter and query-parameter name sets for an operation.
    fn requested_params(
        &self,
        method: &str,
        path: &str,
    ) -> Result<(BTreeSet<String>, BTreeSet<String>)>;

    /// Body field-name set for an operation. Only defined for
    /// POST/PUT/PATCH; an absent body is `None`.
    fn requested_body(&self, method: &str, path: &str) -> Result<Option<BTreeSet<String>>>;

    /// Verify that every declared path parameter has a non-empty value and
    /// every required query parameter is present. Does not issue a call.
    fn validate_request(
        &self,
        method: &str,
        path: &str,
        parameters: &BTreeMap<String, String>,
        query: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Issue the operation and decode the response body as a JSON-like
    /// tree, `None` when the response carries no body.
    async fn call(
        &self,
        kind: CallKind,
        path: &str,
        config: &RequestConfiguration,
    ) -> Result<Option<Map<String, Value>>>;
}

/// Placeholder names in an RFC 6570 level-1 path template (`/things/{id}`
/// yields `{id}`). A convenience for client implementations; the engine
/// itself takes the sets the client reports.
pub fn path_params(path: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else { break };
        out.insert(rest[open + 1..open + close].to_string());
        rest = &rest[open + close + 1..];
    }
    out
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_params_extracts_placeholders() {
        assert!(path_params("/things").is_empty());
        let got = path_params("/teams/{team}/things/{id}");
        assert_eq!(
            got.into_iter().collect::<Vec<_>>(),
            vec!["id".to_string(), "team".to_string()]
        );
    }

    #[test]
    fn call_kind_from_method() {
        assert_eq!(CallKind::from_method("GET").unwrap(), CallKind::Get);
        assert_eq!(CallKind::from_method("DELETE").unwrap(), CallKind::Delete);
        assert!(CallKind::from_method("get").is_err());
        assert!(CallKind::from_method("FETCH").is_err());
    }
}
