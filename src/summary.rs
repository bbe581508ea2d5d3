//! Recommendation summary — joins owned VPA status onto workload containers.
//!
//! The summarizer is independent of the reconciler: it only needs owned VPA
//! objects to exist, and performs its own reads. Both reads (VPAs and
//! workloads) are cached on first use for the life of the instance; callers
//! needing fresh data call [`Summarizer::refresh`] or build a new instance.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use kube::ResourceExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::crd::vpa::{ResourceList, VerticalPodAutoscaler};
use crate::error::Result;
use crate::store::VpaStore;
use crate::workload::{WorkloadCatalog, WorkloadRef};

/// Workload annotation listing container names (comma-separated) to leave
/// out of the summary, in addition to the process-wide exclusion set.
pub const EXCLUDE_CONTAINERS_ANNOTATION: &str = "vpa.bemade.org/exclude-containers";

// ── Summary tree ──────────────────────────────────────────────────────────────

/// Nested recommendation report: namespace → workload → container.
/// Built fresh on every summarization call.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub namespaces: BTreeMap<String, NamespaceSummary>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSummary {
    pub namespace: String,
    pub workloads: BTreeMap<String, WorkloadSummary>,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadSummary {
    pub workload_name: String,
    pub kind: String,
    pub containers: BTreeMap<String, ContainerSummary>,
}

/// Recommendation bounds for one container, paired with the live requests
/// and limits from the workload's container definition.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    pub container_name: String,
    pub lower_bound: ResourceList,
    pub upper_bound: ResourceList,
    pub target: ResourceList,
    pub uncapped_target: ResourceList,
    pub requests: ResourceList,
    pub limits: ResourceList,
}

// ── Summarizer ────────────────────────────────────────────────────────────────

/// Builds [`Summary`] trees from the owned VPA set and the workload catalog.
pub struct Summarizer {
    store: Arc<dyn VpaStore>,
    catalog: Arc<dyn WorkloadCatalog>,
    namespace: Option<String>,
    excluded_containers: BTreeSet<String>,

    // cached reads, filled on first use
    vpas: Option<Vec<VerticalPodAutoscaler>>,
    workload_for_vpa: Option<HashMap<String, WorkloadRef>>,
}

impl Summarizer {
    /// Summarizer over all namespaces with no exclusions.
    pub fn new(store: Arc<dyn VpaStore>, catalog: Arc<dyn WorkloadCatalog>) -> Self {
        Self {
            store,
            catalog,
            namespace: None,
            excluded_containers: BTreeSet::new(),
            vpas: None,
            workload_for_vpa: None,
        }
    }

    /// Restrict the summary to a single namespace.
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Process-wide container names to leave out of every workload.
    pub fn exclude_containers<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_containers = names.into_iter().map(Into::into).collect();
        self
    }

    /// Re-read VPAs and workloads, replacing the cached snapshots.
    pub async fn refresh(&mut self) -> Result<()> {
        let scope = self.namespace.as_deref();
        let vpas = self.store.list_owned(scope).await?;
        let workloads = self.catalog.list_workloads(scope).await?;

        // Index workloads by the VPA name they derive, for the join below.
        let workload_for_vpa = workloads
            .into_iter()
            .map(|w| (w.vpa_name(), w))
            .collect();

        self.vpas = Some(vpas);
        self.workload_for_vpa = Some(workload_for_vpa);
        Ok(())
    }

    /// Build the summary tree, reading (and caching) cluster state on first
    /// use. Join failures skip the offending entry and are reported; they
    /// never abort the rest of the summary.
    pub async fn summary(&mut self) -> Result<Summary> {
        if self.vpas.is_none() || self.workload_for_vpa.is_none() {
            self.refresh().await?;
        }
        let vpas = self.vpas.as_deref().unwrap_or_default();
        let workload_for_vpa = match &self.workload_for_vpa {
            Some(map) => map,
            None => return Ok(Summary::default()),
        };

        let mut summary = Summary::default();

        // A single-namespace summary names its namespace even when empty.
        if let Some(ns) = &self.namespace {
            summary.namespaces.insert(
                ns.clone(),
                NamespaceSummary {
                    namespace: ns.clone(),
                    ..Default::default()
                },
            );
        }

        for vpa in vpas {
            let vpa_name = vpa.name_any();
            let ns = vpa.namespace().unwrap_or_default();
            debug!(vpa = %vpa_name, %ns, "summarizing VPA");

            let ns_summary = summary
                .namespaces
                .entry(ns.clone())
                .or_insert_with(|| NamespaceSummary {
                    namespace: ns.clone(),
                    ..Default::default()
                });

            let Some(workload) = workload_for_vpa.get(&vpa_name) else {
                warn!(vpa = %vpa_name, %ns, "no matching workload found, skipping");
                continue;
            };

            let mut workload_summary = WorkloadSummary {
                workload_name: vpa_name.clone(),
                kind: vpa.spec.target_ref.kind.clone(),
                containers: BTreeMap::new(),
            };

            // A VPA the recommender has not filled in yet still shows its
            // workload, with an empty container map.
            let recommendations = vpa
                .status
                .as_ref()
                .and_then(|s| s.recommendation.as_ref())
                .map(|r| r.container_recommendations.as_slice())
                .unwrap_or_default();

            let excluded = self.excluded_for(workload);

            for rec in recommendations {
                if excluded.contains(&rec.container_name) {
                    debug!(
                        workload = %workload_summary.workload_name,
                        container = %rec.container_name,
                        "excluding container"
                    );
                    continue;
                }

                let Some(container) = workload
                    .containers
                    .iter()
                    .find(|c| c.name == rec.container_name)
                else {
                    warn!(
                        workload = %workload_summary.workload_name,
                        container = %rec.container_name,
                        "recommendation for container not on workload, skipping"
                    );
                    continue;
                };

                workload_summary.containers.insert(
                    rec.container_name.clone(),
                    ContainerSummary {
                        container_name: rec.container_name.clone(),
                        lower_bound: rec.lower_bound.clone(),
                        upper_bound: rec.upper_bound.clone(),
                        target: rec.target.clone(),
                        uncapped_target: rec.uncapped_target.clone(),
                        requests: container.requests.clone(),
                        limits: container.limits.clone(),
                    },
                );
            }

            ns_summary
                .workloads
                .insert(workload_summary.workload_name.clone(), workload_summary);
        }

        Ok(summary)
    }

    /// Union of the process-wide exclusion set and the workload's
    /// exclusion annotation.
    fn excluded_for(&self, workload: &WorkloadRef) -> BTreeSet<String> {
        let mut excluded = self.excluded_containers.clone();
        if let Some(value) = workload.annotations.get(EXCLUDE_CONTAINERS_ANNOTATION) {
            excluded.extend(value.split(',').map(str::to_string));
        }
        excluded
    }
}
