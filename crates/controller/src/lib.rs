//! Controller runtime: process bootstrap helpers and the watch loop that
//! drives reconciles for a configured GVK. Embedders construct a
//! [`WatchController`] with their `RestClient` implementation and call
//! [`WatchController::run`].

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use kube::api::{Api, DynamicObject};
use kube::runtime::watcher;
use metrics::counter;
use tracing::{debug, error, info, warn};

use konduct_compose::{DescriptorSource, Reconciler};
use konduct_hub::ClusterOps;
use konduct_rest::RestClient;

pub mod bootstrap;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn backoff_max_secs() -> u64 {
    env_u64("KONDUCT_WATCH_BACKOFF_MAX_SECS", 30)
}

fn retry_budget() -> u64 {
    env_u64("KONDUCT_RECONCILE_RETRIES", 3)
}

pub struct WatchController {
    reconciler: Reconciler,
    cluster: Arc<dyn ClusterOps>,
    source: Arc<dyn DescriptorSource>,
}

impl WatchController {
    pub fn new(
        rest: Arc<dyn RestClient>,
        cluster: Arc<dyn ClusterOps>,
        source: Arc<dyn DescriptorSource>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(rest, cluster.clone()),
            cluster,
            source,
        }
    }

    /// Watch the given GVK key (`group/v1/Kind` or `v1/Kind`), reconciling
    /// every applied object. Restarts the stream with capped exponential
    /// backoff on watch errors; runs until cancelled.
    pub async fn run(&self, gvk_key: &str, namespace: Option<&str>) -> anyhow::Result<()> {
        let client = konduct_hub::client().await?;
        let gvk = konduct_hub::parse_gvk_key(gvk_key)?;
        let ar = konduct_hub::api_resource(&gvk);
        let backoff_max = backoff_max_secs();
        let mut backoff: u64 = 1;

        loop {
            let api: Api<DynamicObject> = match namespace {
                Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
                None => Api::all_with(client.clone(), &ar),
            };
            info!(gvk = %gvk, ns = ?namespace, "watch stream opened");
            let mut stream = watcher(api, watcher::Config::default()).boxed();
            let mut failed = false;

            while let Some(event) = stream.next().await {
                match event {
                    Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                        self.handle(obj).await;
                    }
                    // Remote cleanup already ran through the finalizer path.
                    Ok(watcher::Event::Delete(obj)) => {
                        debug!(name = ?obj.metadata.name, "object deleted");
                    }
                    Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => {}
                    Err(e) => {
                        warn!(error = %e, "watch stream error; will backoff and restart");
                        counter!("watch_errors_total", 1u64);
                        failed = true;
                        break;
                    }
                }
            }

            if failed {
                tokio::time::sleep(Duration::from_secs(backoff.min(backoff_max))).await;
                backoff = (backoff * 2).min(backoff_max).max(1);
            } else {
                warn!("watch stream ended; restarting");
                backoff = 1;
            }
            counter!("watch_restarts_total", 1u64);
        }
    }

    async fn handle(&self, mut cr: DynamicObject) {
        let name = cr.metadata.name.clone().unwrap_or_default();

        let has_finalizer = cr
            .metadata
            .finalizers
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|f| f == konduct_hub::FINALIZER);

        if cr.metadata.deletion_timestamp.is_none() {
            // Claim the object first; the update event re-delivers it with
            // the finalizer set and reconciliation proceeds then.
            if konduct_hub::ensure_finalizer(&mut cr) {
                if let Err(e) = self.cluster.update(&cr).await {
                    warn!(name = %name, error = %e, "adding finalizer failed");
                }
                return;
            }
        } else if !has_finalizer {
            return;
        }

        let descriptor = match self.source.descriptor_for(&cr).await {
            Ok(descriptor) => descriptor,
            Err(e) => {
                error!(name = %name, error = %e, "loading descriptor failed");
                counter!("descriptor_errors_total", 1u64);
                return;
            }
        };

        let budget = retry_budget();
        for attempt in 0..budget {
            match self.reconciler.reconcile(&descriptor, &mut cr).await {
                Ok(outcome) => {
                    info!(name = %name, outcome = ?outcome, "reconciled");
                    return;
                }
                Err(e) if e.is_recoverable() && attempt + 1 < budget => {
                    let delay = 1u64 << attempt;
                    warn!(name = %name, error = %e, delay, "transport failure; retrying");
                    tokio::time::sleep(Duration::from_secs(delay)).await;
                }
                Err(e) => {
                    error!(name = %name, error = %e, "reconcile failed");
                    return;
                }
            }
        }
    }
}
