//! Workload snapshot model and the catalog that produces it.
//!
//! A workload is any pod-template-bearing resource whose containers are
//! candidates for autoscaling — Deployments and StatefulSets. The catalog
//! reduces each to a [`WorkloadRef`]: a point-in-time identity plus the
//! metadata and container list the reconciler and summarizer need. Nothing
//! here writes to the cluster.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::autoscaling::v1::CrossVersionObjectReference;
use k8s_openapi::api::core::v1::Container;
use kube::api::{Api, ListParams, ObjectMeta};
use kube::Client;

use crate::crd::vpa::ResourceList;
use crate::error::Result;

const APPS_API_VERSION: &str = "apps/v1";

/// A container definition reduced to what the summarizer pairs with
/// recommendations: its name and live resource requests/limits.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub requests: ResourceList,
    pub limits: ResourceList,
}

/// Immutable snapshot of a pod-template workload, taken at list time.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkloadRef {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub containers: Vec<ContainerSpec>,
}

impl WorkloadRef {
    /// Name of the VPA owned for this workload:
    /// `<workload-name>-<lowercased-kind>`.
    pub fn vpa_name(&self) -> String {
        format!("{}-{}", self.name, self.kind.to_lowercase())
    }

    /// The target reference a VPA watching this workload must carry.
    pub fn target_ref(&self) -> CrossVersionObjectReference {
        CrossVersionObjectReference {
            api_version: Some(self.api_version.clone()),
            kind: self.kind.clone(),
            name: self.name.clone(),
        }
    }

    /// Target-reference equality — the authoritative match between a VPA
    /// and a workload. Name collisions across kinds make name-only matching
    /// unsafe, so all three identity fields must agree.
    pub fn matches_target(&self, target: &CrossVersionObjectReference) -> bool {
        target.kind == self.kind
            && target.name == self.name
            && target.api_version.as_deref() == Some(self.api_version.as_str())
    }

    fn from_parts(kind: &str, meta: ObjectMeta, containers: Vec<Container>) -> Self {
        Self {
            api_version: APPS_API_VERSION.to_string(),
            kind: kind.to_string(),
            namespace: meta.namespace.unwrap_or_default(),
            name: meta.name.unwrap_or_default(),
            labels: meta.labels.unwrap_or_default(),
            annotations: meta.annotations.unwrap_or_default(),
            containers: containers.into_iter().map(container_spec).collect(),
        }
    }

    pub fn from_deployment(deployment: Deployment) -> Self {
        let containers = deployment
            .spec
            .and_then(|s| s.template.spec)
            .map(|s| s.containers)
            .unwrap_or_default();
        Self::from_parts("Deployment", deployment.metadata, containers)
    }

    pub fn from_stateful_set(stateful_set: StatefulSet) -> Self {
        let containers = stateful_set
            .spec
            .and_then(|s| s.template.spec)
            .map(|s| s.containers)
            .unwrap_or_default();
        Self::from_parts("StatefulSet", stateful_set.metadata, containers)
    }
}

fn container_spec(container: Container) -> ContainerSpec {
    let resources = container.resources.unwrap_or_default();
    ContainerSpec {
        name: container.name,
        requests: resources.requests.unwrap_or_default(),
        limits: resources.limits.unwrap_or_default(),
    }
}

// ── Catalog ───────────────────────────────────────────────────────────────────

/// Read-only source of workload snapshots. Abstracted so tests can substitute
/// a fixed catalog for the live cluster.
#[async_trait]
pub trait WorkloadCatalog: Send + Sync {
    /// List all Deployments and StatefulSets in the namespace (`None` for
    /// all namespaces). Any read error aborts the whole build — a partial
    /// catalog is never returned.
    async fn list_workloads(&self, namespace: Option<&str>) -> Result<Vec<WorkloadRef>>;
}

/// Catalog backed by the cluster API.
pub struct KubeWorkloadCatalog {
    client: Client,
}

impl KubeWorkloadCatalog {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadCatalog for KubeWorkloadCatalog {
    async fn list_workloads(&self, namespace: Option<&str>) -> Result<Vec<WorkloadRef>> {
        let deployments: Api<Deployment> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let stateful_sets: Api<StatefulSet> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        // List responses do not carry TypeMeta, so kind and apiVersion are
        // filled in statically per list call.
        let lp = ListParams::default();
        let mut workloads = Vec::new();
        for deployment in deployments.list(&lp).await? {
            workloads.push(WorkloadRef::from_deployment(deployment));
        }
        for stateful_set in stateful_sets.list(&lp).await? {
            workloads.push(WorkloadRef::from_stateful_set(stateful_set));
        }

        Ok(workloads)
    }
}
