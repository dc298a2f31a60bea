//! Cluster access: a shared kube client, `ApiResource` derivation from a
//! GVK, and the handful of dynamic-object primitives the engine needs
//! (list, update, patch status).

#![forbid(unsafe_code)]

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::debug;

use konduct_core::descriptor::Gvk;
use konduct_core::{Error, Result};

/// Finalizer this controller owns on managed CRs.
pub const FINALIZER: &str = "composition.konduct.io/finalizer";

// Reuse a single kube client across the process; TLS/config setup is
// expensive and the client is already Arc'd internally.
static KUBE_CLIENT: OnceCell<kube::Client> = OnceCell::const_new();

pub async fn client() -> Result<kube::Client> {
    KUBE_CLIENT
        .get_or_try_init(|| async {
            kube::Client::try_default()
                .await
                .map_err(|e| Error::Transport(format!("kube client: {e}")))
        })
        .await
        .cloned()
}

/// Plural resource name for a kind: lowercase with the standard English
/// suffix rules (`Proxy` → `proxies`, `Ingress` → `ingresses`).
pub fn plural(kind: &str) -> String {
    let k = kind.to_ascii_lowercase();
    if k.ends_with('s') || k.ends_with('x') || k.ends_with("ch") || k.ends_with("sh") {
        format!("{k}es")
    } else if k.ends_with('y')
        && !k
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
    {
        format!("{}ies", &k[..k.len() - 1])
    } else {
        format!("{k}s")
    }
}

pub fn api_resource(gvk: &Gvk) -> ApiResource {
    ApiResource::from_gvk_with_plural(
        &GroupVersionKind {
            group: gvk.group.clone(),
            version: gvk.version.clone(),
            kind: gvk.kind.clone(),
        },
        &plural(&gvk.kind),
    )
}

/// Parse a GVK key of the form `v1/Kind` or `group/v1/Kind`.
pub fn parse_gvk_key(key: &str) -> Result<Gvk> {
    let parts: Vec<&str> = key.split('/').collect();
    match parts.as_slice() {
        [version, kind] => Ok(Gvk {
            group: String::new(),
            version: (*version).to_string(),
            kind: (*kind).to_string(),
        }),
        [group, version, kind] => Ok(Gvk {
            group: (*group).to_string(),
            version: (*version).to_string(),
            kind: (*kind).to_string(),
        }),
        _ => Err(Error::Descriptor(format!(
            "invalid gvk key {key:?} (expect v1/Kind or group/v1/Kind)"
        ))),
    }
}

/// GVK of a dynamic object from its type metadata.
pub fn object_gvk(obj: &DynamicObject) -> Result<Gvk> {
    let types = obj
        .types
        .as_ref()
        .ok_or_else(|| Error::Transport("object has no type metadata".into()))?;
    let (group, version) = match types.api_version.split_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), types.api_version.clone()),
    };
    Ok(Gvk {
        group,
        version,
        kind: types.kind.clone(),
    })
}

/// Add this controller's finalizer if absent. Returns whether the object
/// changed (callers persist only then).
pub fn ensure_finalizer(obj: &mut DynamicObject) -> bool {
    let finalizers = obj.metadata.finalizers.get_or_insert_with(Vec::new);
    if finalizers.iter().any(|f| f == FINALIZER) {
        return false;
    }
    finalizers.push(FINALIZER.to_string());
    true
}

/// Drop every finalizer so the orchestrator can complete deletion.
pub fn clear_finalizers(obj: &mut DynamicObject) {
    obj.metadata.finalizers = Some(Vec::new());
}

/// The dynamic cluster operations the engine consumes. Implemented against
/// kube below; tests swap in in-memory fakes.
#[async_trait]
pub trait ClusterOps: Send + Sync {
    /// Cluster-wide list of every CR of the given kind.
    async fn list_all(&self, gvk: &Gvk) -> Result<Vec<DynamicObject>>;

    /// Replace the object (spec and metadata) with the working copy.
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject>;

    /// Merge-patch the object's status subtree from the working copy.
    async fn patch_status(&self, obj: &DynamicObject) -> Result<()>;
}

pub struct KubeCluster {
    client: kube::Client,
}

impl KubeCluster {
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    pub async fn try_default() -> Result<Self> {
        Ok(Self::new(client().await?))
    }

    fn api_for(&self, obj: &DynamicObject) -> Result<Api<DynamicObject>> {
        let ar = api_resource(&object_gvk(obj)?);
        Ok(match obj.metadata.namespace.as_deref() {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        })
    }

    fn name_of(obj: &DynamicObject) -> Result<&str> {
        obj.metadata
            .name
            .as_deref()
            .ok_or_else(|| Error::Transport("object has no name".into()))
    }
}

fn page_limit() -> u32 {
    std::env::var("KONDUCT_LIST_PAGE_LIMIT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(500)
}

#[async_trait]
impl ClusterOps for KubeCluster {
    async fn list_all(&self, gvk: &Gvk) -> Result<Vec<DynamicObject>> {
        let ar = api_resource(gvk);
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let mut items = Vec::new();
        let mut continue_token: Option<String> = None;
        loop {
            let mut params = ListParams::default().limit(page_limit());
            if let Some(token) = &continue_token {
                params = params.continue_token(token);
            }
            let page = api
                .list(&params)
                .await
                .map_err(|e| Error::Transport(format!("listing {}: {e}", ar.plural)))?;
            continue_token = page.metadata.continue_.clone();
            items.extend(page.items);
            if continue_token.is_none() {
                break;
            }
        }
        debug!(gvk = %gvk, count = items.len(), "listed cluster objects");
        Ok(items)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject> {
        let api = self.api_for(obj)?;
        let name = Self::name_of(obj)?;
        api.replace(name, &PostParams::default(), obj)
            .await
            .map_err(|e| Error::Transport(format!("updating {name}: {e}")))
    }

    async fn patch_status(&self, obj: &DynamicObject) -> Result<()> {
        let api = self.api_for(obj)?;
        let name = Self::name_of(obj)?;
        let status = obj.data.get("status").cloned().unwrap_or_else(|| json!({}));
        api.patch_status(
            name,
            &PatchParams::default(),
            &Patch::Merge(&json!({ "status": status })),
        )
        .await
        .map_err(|e| Error::Transport(format!("patching status of {name}: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plural_covers_common_suffixes() {
        assert_eq!(plural("Team"), "teams");
        assert_eq!(plural("Proxy"), "proxies");
        assert_eq!(plural("Gateway"), "gateways");
        assert_eq!(plural("Ingress"), "ingresses");
        assert_eq!(plural("Box"), "boxes");
        assert_eq!(plural("Branch"), "branches");
    }

    #[test]
    fn gvk_keys_parse_both_forms() {
        let core = parse_gvk_key("v1/ConfigMap").unwrap();
        assert_eq!(core.group, "");
        assert_eq!(core.kind, "ConfigMap");
        let grouped = parse_gvk_key("example.org/v1/Widget").unwrap();
        assert_eq!(grouped.group, "example.org");
        assert_eq!(grouped.version, "v1");
        assert!(parse_gvk_key("Widget").is_err());
    }

    #[test]
    fn api_resource_carries_plural() {
        let ar = api_resource(&Gvk {
            group: "example.org".into(),
            version: "v1".into(),
            kind: "Widget".into(),
        });
        assert_eq!(ar.plural, "widgets");
        assert_eq!(ar.api_version, "example.org/v1");
    }

    #[test]
    fn finalizer_add_and_clear() {
        let ar = api_resource(&Gvk {
            group: "example.org".into(),
            version: "v1".into(),
            kind: "Widget".into(),
        });
        let mut obj = DynamicObject::new("w", &ar);
        assert!(ensure_finalizer(&mut obj));
        assert!(!ensure_finalizer(&mut obj));
        assert_eq!(
            obj.metadata.finalizers.as_deref(),
            Some(&[FINALIZER.to_string()][..])
        );
        clear_finalizers(&mut obj);
        assert_eq!(obj.metadata.finalizers.as_deref(), Some(&[][..]));
    }
}
