//! The reconcile state machine: observe a CR, then create, update, or
//! delete the remote object it composes, and write the outcome back.

use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use metrics::{counter, histogram};
use serde_json::{Map, Value};
use tracing::{debug, info};

use konduct_core::descriptor::{Action, Gvk, ResourceDescriptor};
use konduct_core::{tree, Error, Result};
use konduct_hub::ClusterOps;
use konduct_rest::{build_request, is_known, select, BoundCall, RestClient};

use crate::compare::{self, FieldDiff};
use crate::{reference, status};

/// Reconcile phases, also recorded under `status.phase` so operators can
/// read progress off the CR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Observing,
    Creating,
    Updating,
    Deleting,
    Steady,
}

impl Phase {
    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Observing => "Observing",
            Phase::Creating => "Creating",
            Phase::Updating => "Updating",
            Phase::Deleting => "Deleting",
            Phase::Steady => "Steady",
        }
    }
}

/// What one reconcile event asks of the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Observe,
    Delete,
}

fn classify(cr: &DynamicObject) -> Step {
    if cr.metadata.deletion_timestamp.is_some() {
        Step::Delete
    } else {
        Step::Observe
    }
}

/// Result of observing the remote side.
#[derive(Debug)]
pub enum Observation {
    /// No valid `Get` request can be assembled; the remote object does not
    /// exist yet as far as this CR knows.
    NotKnown,
    /// The remote object exists but differs from the desired spec.
    Drifted(Vec<FieldDiff>),
    /// Remote and spec agree.
    Settled,
}

impl Observation {
    /// The phase an observation transitions the machine into.
    pub fn phase(&self) -> Phase {
        match self {
            Observation::NotKnown => Phase::Creating,
            Observation::Drifted(_) => Phase::Updating,
            Observation::Settled => Phase::Steady,
        }
    }
}

/// What a completed reconcile did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Updated,
    UpToDate,
    Deleted,
}

pub struct Reconciler {
    rest: Arc<dyn RestClient>,
    cluster: Arc<dyn ClusterOps>,
}

impl Reconciler {
    pub fn new(rest: Arc<dyn RestClient>, cluster: Arc<dyn ClusterOps>) -> Self {
        Self { rest, cluster }
    }

    /// One observe-then-act round trip for a single CR working copy. The
    /// caller owns scheduling and must not run two reconciles for the same
    /// CR key concurrently.
    pub async fn reconcile(
        &self,
        descriptor: &ResourceDescriptor,
        cr: &mut DynamicObject,
    ) -> Result<Outcome> {
        counter!("reconcile_total", 1u64);
        let started = Instant::now();
        let result = self.run(descriptor, cr).await;
        histogram!(
            "reconcile_latency_ms",
            started.elapsed().as_secs_f64() * 1000.0
        );
        if result.is_err() {
            counter!("reconcile_errors_total", 1u64);
        }
        result
    }

    async fn run(&self, descriptor: &ResourceDescriptor, cr: &mut DynamicObject) -> Result<Outcome> {
        match classify(cr) {
            Step::Delete => self.delete(descriptor, cr).await,
            Step::Observe => {
                self.resolve_references(descriptor, cr).await?;
                debug!(name = ?cr.metadata.name, phase = Phase::Observing.as_str(), "observing");
                let observation = self.observe(descriptor, cr).await?;
                debug!(name = ?cr.metadata.name, phase = observation.phase().as_str(), "observed");
                match observation {
                    Observation::NotKnown => self.create(descriptor, cr).await,
                    Observation::Drifted(diffs) => self.update(descriptor, cr, diffs).await,
                    Observation::Settled => {
                        self.record_phase(cr, Phase::Steady).await?;
                        Ok(Outcome::UpToDate)
                    }
                }
            }
        }
    }

    async fn observe(
        &self,
        descriptor: &ResourceDescriptor,
        cr: &DynamicObject,
    ) -> Result<Observation> {
        let spec = tree::subtree_map(&cr.data, "spec");
        let status = tree::subtree_map(&cr.data, "status");
        if !is_known(self.rest.as_ref(), descriptor, &status, &spec) {
            return Ok(Observation::NotKnown);
        }
        let bound = match select(self.rest.as_ref(), descriptor, Action::Get)? {
            Some(bound) => bound,
            None => match select(self.rest.as_ref(), descriptor, Action::FindBy)? {
                Some(bound) => bound,
                None => return Ok(Observation::NotKnown),
            },
        };
        let body = self.invoke(&bound, &status, &spec).await?;
        let Some(body) = body else {
            // Nothing to compare against; treat the remote as settled.
            return Ok(Observation::Settled);
        };
        let outcome = compare::is_up_to_date(descriptor, cr, &body)?;
        if outcome.up_to_date {
            Ok(Observation::Settled)
        } else {
            Ok(Observation::Drifted(outcome.diffs))
        }
    }

    async fn create(
        &self,
        descriptor: &ResourceDescriptor,
        cr: &mut DynamicObject,
    ) -> Result<Outcome> {
        let bound = select(self.rest.as_ref(), descriptor, Action::Create)?
            .ok_or_else(|| Error::Descriptor("create verb not declared".into()))?;
        let spec = tree::subtree_map(&cr.data, "spec");
        let status = tree::subtree_map(&cr.data, "status");
        info!(name = ?cr.metadata.name, path = %bound.info.path, "creating remote object");
        let body = self.invoke(&bound, &status, &spec).await?;
        if let Some(body) = &body {
            status::write_identifiers(&descriptor.identifiers, cr, body)?;
        }
        set_phase(cr, Phase::Creating)?;
        self.cluster.patch_status(cr).await?;
        Ok(Outcome::Created)
    }

    async fn update(
        &self,
        descriptor: &ResourceDescriptor,
        cr: &mut DynamicObject,
        diffs: Vec<FieldDiff>,
    ) -> Result<Outcome> {
        let bound = match select(self.rest.as_ref(), descriptor, Action::Update)? {
            Some(bound) => bound,
            None => select(self.rest.as_ref(), descriptor, Action::Patch)?
                .ok_or_else(|| Error::Descriptor("neither update nor patch verb declared".into()))?,
        };
        let paths: Vec<&str> = diffs.iter().map(|d| d.path.as_str()).collect();
        info!(name = ?cr.metadata.name, drifted = ?paths, "updating remote object");
        let spec = tree::subtree_map(&cr.data, "spec");
        let status = tree::subtree_map(&cr.data, "status");
        self.invoke(&bound, &status, &spec).await?;
        set_phase(cr, Phase::Updating)?;
        self.cluster.patch_status(cr).await?;
        Ok(Outcome::Updated)
    }

    async fn delete(
        &self,
        descriptor: &ResourceDescriptor,
        cr: &mut DynamicObject,
    ) -> Result<Outcome> {
        let spec = tree::subtree_map(&cr.data, "spec");
        let status = tree::subtree_map(&cr.data, "status");
        let known = is_known(self.rest.as_ref(), descriptor, &status, &spec);
        if known {
            if let Some(bound) = select(self.rest.as_ref(), descriptor, Action::Delete)? {
                info!(name = ?cr.metadata.name, path = %bound.info.path, "deleting remote object");
                self.invoke(&bound, &status, &spec).await?;
            }
        } else {
            debug!(name = ?cr.metadata.name, "remote object not known, skipping delete call");
        }
        set_phase(cr, Phase::Deleting)?;
        konduct_hub::clear_finalizers(cr);
        self.cluster.update(cr).await?;
        Ok(Outcome::Deleted)
    }

    async fn invoke(
        &self,
        bound: &BoundCall,
        status: &Map<String, Value>,
        spec: &Map<String, Value>,
    ) -> Result<Option<Map<String, Value>>> {
        let config = build_request(&bound.info, status, spec);
        let started = Instant::now();
        let result = self.rest.call(bound.kind, &bound.info.path, &config).await;
        histogram!(
            "api_call_latency_ms",
            started.elapsed().as_secs_f64() * 1000.0
        );
        result
    }

    /// Resolve declared owner references and persist the metadata change
    /// when a new owner is attached.
    async fn resolve_references(
        &self,
        descriptor: &ResourceDescriptor,
        cr: &mut DynamicObject,
    ) -> Result<()> {
        let mut changed = false;
        for declared in &descriptor.references {
            let resolved =
                reference::resolve(self.cluster.as_ref(), declared, cr).await?;
            changed |= attach_owner(cr, &declared.group_version_kind, &resolved);
        }
        if changed {
            *cr = self.cluster.update(cr).await?;
        }
        Ok(())
    }

    async fn record_phase(&self, cr: &mut DynamicObject, phase: Phase) -> Result<()> {
        let current = cr
            .data
            .get("status")
            .and_then(|s| s.get("phase"))
            .and_then(Value::as_str);
        if current == Some(phase.as_str()) {
            return Ok(());
        }
        set_phase(cr, phase)?;
        self.cluster.patch_status(cr).await
    }
}

fn set_phase(cr: &mut DynamicObject, phase: Phase) -> Result<()> {
    tree::set_nested_field(
        &mut cr.data,
        "status",
        "phase",
        Value::String(phase.as_str().to_string()),
    )
}

/// Add an owner reference to the resolved sibling if it is not already
/// attached. Returns whether the metadata changed.
fn attach_owner(cr: &mut DynamicObject, gvk: &Gvk, resolved: &DynamicObject) -> bool {
    let api_version = if gvk.group.is_empty() {
        gvk.version.clone()
    } else {
        format!("{}/{}", gvk.group, gvk.version)
    };
    let owner = OwnerReference {
        api_version,
        kind: gvk.kind.clone(),
        name: resolved.metadata.name.clone().unwrap_or_default(),
        uid: resolved.metadata.uid.clone().unwrap_or_default(),
        ..OwnerReference::default()
    };
    let owners = cr.metadata.owner_references.get_or_insert_with(Vec::new);
    if owners
        .iter()
        .any(|existing| existing.kind == owner.kind && existing.name == owner.name)
    {
        return false;
    }
    owners.push(owner);
    true
}
