//! The reconciliation engine — converges owned VPAs to the workload set.
//!
//! One call handles one namespace, synchronously, one workload at a time in
//! catalog order. Convergence is at-least-once: any write failure aborts the
//! rest of the pass and the watch loop re-drives it later.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use kube::ResourceExt;
use tracing::{debug, info, warn};

use crate::crd::vpa::{
    PodUpdatePolicy, UpdateMode, VerticalPodAutoscaler, VerticalPodAutoscalerSpec,
};
use crate::error::Result;
use crate::policy::{self, PolicyConfig};
use crate::store::{ownership_labels, VpaStore};
use crate::workload::{WorkloadCatalog, WorkloadRef};

/// Converges the owned VPA set of a namespace to its workload set.
///
/// All collaborators are injected at construction; the engine holds no
/// client state of its own.
pub struct Reconciler {
    catalog: Arc<dyn WorkloadCatalog>,
    store: Arc<dyn VpaStore>,
    policy: PolicyConfig,
    skip_noop_updates: bool,
}

impl Reconciler {
    pub fn new(
        catalog: Arc<dyn WorkloadCatalog>,
        store: Arc<dyn VpaStore>,
        policy: PolicyConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            policy,
            skip_noop_updates: false,
        }
    }

    /// Skip updates whose desired state already equals the stored state.
    /// Off by default: an unconditional update bumps resourceVersion, and
    /// external consumers may rely on that.
    pub fn skip_noop_updates(mut self, skip: bool) -> Self {
        self.skip_noop_updates = skip;
        self
    }

    /// Converge one namespace: delete everything owned when the namespace is
    /// unmanaged, otherwise create/update a VPA per workload and delete the
    /// dangling rest.
    pub async fn reconcile_namespace(&self, namespace: &Namespace) -> Result<()> {
        let ns = namespace.name_any();
        let vpas = self.store.list_owned(Some(&ns)).await?;

        if !policy::namespace_is_managed(namespace, &self.policy) {
            debug!(%ns, "namespace is not managed, cleaning up VPAs");
            return self.delete_all(&ns, &vpas).await;
        }

        let workloads = self.catalog.list_workloads(Some(&ns)).await?;
        debug!(%ns, workloads = workloads.len(), vpas = vpas.len(), "reconciling namespace");
        self.converge(namespace, &vpas, &workloads).await
    }

    async fn delete_all(&self, ns: &str, vpas: &[VerticalPodAutoscaler]) -> Result<()> {
        if vpas.is_empty() {
            debug!(%ns, "no owned VPAs, skipping cleanup");
            return Ok(());
        }
        info!(%ns, count = vpas.len(), "deleting all owned VPAs");
        for vpa in vpas {
            self.store.delete(ns, &vpa.name_any()).await?;
        }
        Ok(())
    }

    async fn converge(
        &self,
        namespace: &Namespace,
        vpas: &[VerticalPodAutoscaler],
        workloads: &[WorkloadRef],
    ) -> Result<()> {
        let ns = namespace.name_any();
        let (ns_mode, _) = policy::update_mode_for(
            namespace.metadata.annotations.as_ref(),
            namespace.metadata.labels.as_ref(),
        );

        // Names are unique within a namespace, so the index is one-to-one.
        let by_name: HashMap<String, usize> = vpas
            .iter()
            .enumerate()
            .map(|(idx, vpa)| (vpa.name_any(), idx))
            .collect();

        let mut associated: HashSet<String> = HashSet::new();

        for workload in workloads {
            let existing = find_match(vpas, &by_name, workload);
            report_duplicates(vpas, workload, existing);

            let (workload_mode, explicit) = policy::update_mode_for(
                Some(&workload.annotations),
                Some(&workload.labels),
            );
            let mode = if explicit { workload_mode } else { ns_mode };

            let desired = desired_vpa(existing, workload, mode);
            let vpa_name = desired.name_any();
            debug!(
                %ns,
                kind = %workload.kind,
                workload = %workload.name,
                vpa = %vpa_name,
                %mode,
                "reconciling workload"
            );

            match existing {
                None => {
                    info!(%ns, vpa = %vpa_name, "workload has no VPA, creating");
                    self.store.create(&desired).await?;
                }
                Some(existing) => {
                    if self.skip_noop_updates && is_noop(existing, &desired) {
                        debug!(%ns, vpa = %vpa_name, "VPA already up to date, skipping update");
                    } else {
                        self.store.update(&desired).await?;
                    }
                }
            }
            associated.insert(vpa_name);
        }

        // Anything owned but unmatched this pass is dangling.
        for vpa in vpas {
            let name = vpa.name_any();
            if !associated.contains(&name) {
                info!(%ns, vpa = %name, "deleting dangling VPA");
                self.store.delete(&ns, &name).await?;
            }
        }

        Ok(())
    }
}

/// Pair a workload with its owned VPA: look up the derived name first, verify
/// by target reference (authoritative), and fall back to a scan by target
/// reference for VPAs carrying a legacy or foreign name.
fn find_match<'a>(
    vpas: &'a [VerticalPodAutoscaler],
    by_name: &HashMap<String, usize>,
    workload: &WorkloadRef,
) -> Option<&'a VerticalPodAutoscaler> {
    if let Some(&idx) = by_name.get(&workload.vpa_name()) {
        let vpa = &vpas[idx];
        if workload.matches_target(&vpa.spec.target_ref) {
            return Some(vpa);
        }
    }
    vpas.iter()
        .find(|vpa| workload.matches_target(&vpa.spec.target_ref))
}

/// The supported invariant is at most one owned VPA per workload identity;
/// extras indicate drift. They are left out of the associated set, so the
/// dangling cleanup deletes them deterministically — here they only get named.
fn report_duplicates(
    vpas: &[VerticalPodAutoscaler],
    workload: &WorkloadRef,
    kept: Option<&VerticalPodAutoscaler>,
) {
    let Some(kept) = kept else { return };
    let kept_name = kept.name_any();
    for vpa in vpas {
        let name = vpa.name_any();
        if name != kept_name && workload.matches_target(&vpa.spec.target_ref) {
            warn!(
                kind = %workload.kind,
                workload = %workload.name,
                kept = %kept_name,
                duplicate = %name,
                "multiple owned VPAs match one workload, duplicate will be cleaned up"
            );
        }
    }
}

/// Build the desired VPA for a workload. An existing object is used as the
/// template so the update carries its resourceVersion; ownership labels and
/// the managed spec are always (re)applied on top.
fn desired_vpa(
    existing: Option<&VerticalPodAutoscaler>,
    workload: &WorkloadRef,
    mode: UpdateMode,
) -> VerticalPodAutoscaler {
    let spec = VerticalPodAutoscalerSpec {
        target_ref: workload.target_ref(),
        update_policy: Some(PodUpdatePolicy {
            update_mode: Some(mode),
        }),
    };

    let mut vpa = match existing {
        Some(existing) => existing.clone(),
        None => VerticalPodAutoscaler {
            metadata: ObjectMeta {
                name: Some(workload.vpa_name()),
                namespace: Some(workload.namespace.clone()),
                ..Default::default()
            },
            spec: spec.clone(),
            status: None,
        },
    };

    vpa.metadata.labels = Some(ownership_labels());
    vpa.spec = spec;
    vpa
}

/// True when an update would change nothing the engine manages.
fn is_noop(existing: &VerticalPodAutoscaler, desired: &VerticalPodAutoscaler) -> bool {
    existing.spec == desired.spec && existing.metadata.labels == desired.metadata.labels
}
