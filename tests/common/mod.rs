//! Shared test fixtures: in-memory fakes substituted through the store and
//! catalog traits, plus small object builders.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::api::ObjectMeta;
use kube::ResourceExt;

use vpa_operator::crd::vpa::{
    PodUpdatePolicy, RecommendedContainerResources, RecommendedPodResources, ResourceList,
    UpdateMode, VerticalPodAutoscaler, VerticalPodAutoscalerSpec, VerticalPodAutoscalerStatus,
};
use vpa_operator::error::{Error, Result};
use vpa_operator::store::{is_owned, ownership_labels, VpaStore};
use vpa_operator::workload::{ContainerSpec, WorkloadCatalog, WorkloadRef};

// ── In-memory VPA store ─────────────────────────────────────────────────────

/// VpaStore fake backed by a map, with call counters and failure injection.
/// Emulates server-side ownership filtering: unlabeled objects are invisible
/// to `list_owned` but still present in the map.
#[derive(Default)]
pub struct InMemoryVpaStore {
    objects: Mutex<BTreeMap<(String, String), VerticalPodAutoscaler>>,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_writes: AtomicBool,
}

impl InMemoryVpaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an object directly, bypassing create bookkeeping.
    pub fn seed(&self, vpa: VerticalPodAutoscaler) {
        let key = (vpa.namespace().unwrap_or_default(), vpa.name_any());
        self.objects.lock().unwrap().insert(key, vpa);
    }

    pub fn get(&self, namespace: &str, name: &str) -> Option<VerticalPodAutoscaler> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.get(namespace, name).is_some()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn names(&self, namespace: &str) -> Vec<String> {
        self.objects
            .lock()
            .unwrap()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, name)| name.clone())
            .collect()
    }

    /// Write a status onto a stored object, as the external recommender would.
    pub fn set_status(&self, namespace: &str, name: &str, status: VerticalPodAutoscalerStatus) {
        let mut objects = self.objects.lock().unwrap();
        let vpa = objects
            .get_mut(&(namespace.to_string(), name.to_string()))
            .expect("set_status on missing VPA");
        vpa.status = Some(status);
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::reconcile("injected write failure"));
        }
        Ok(())
    }
}

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

#[async_trait]
impl VpaStore for InMemoryVpaStore {
    async fn list_owned(&self, namespace: Option<&str>) -> Result<Vec<VerticalPodAutoscaler>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((ns, _), vpa)| namespace.is_none_or(|want| ns.as_str() == want) && is_owned(vpa))
            .map(|(_, vpa)| vpa.clone())
            .collect())
    }

    async fn create(&self, vpa: &VerticalPodAutoscaler) -> Result<()> {
        self.check_write()?;
        self.creates.fetch_add(1, Ordering::SeqCst);
        let key = (vpa.namespace().unwrap_or_default(), vpa.name_any());
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            return Err(api_error(
                409,
                "AlreadyExists",
                format!("vpa {:?} already exists", key.1),
            ));
        }
        objects.insert(key, vpa.clone());
        Ok(())
    }

    async fn update(&self, vpa: &VerticalPodAutoscaler) -> Result<()> {
        self.check_write()?;
        self.updates.fetch_add(1, Ordering::SeqCst);
        let key = (vpa.namespace().unwrap_or_default(), vpa.name_any());
        let mut objects = self.objects.lock().unwrap();
        match objects.get_mut(&key) {
            Some(stored) => {
                // Keep the recommender-written status, as a replace of the
                // main resource would.
                let status = stored.status.clone();
                *stored = vpa.clone();
                if stored.status.is_none() {
                    stored.status = status;
                }
                Ok(())
            }
            None => Err(api_error(
                404,
                "NotFound",
                format!("vpa {:?} not found", key.1),
            )),
        }
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        self.check_write()?;
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}

// ── Static workload catalog ─────────────────────────────────────────────────

/// WorkloadCatalog fake serving a fixed list, with failure injection.
#[derive(Default)]
pub struct StaticCatalog {
    workloads: Mutex<Vec<WorkloadRef>>,
    pub fail_reads: AtomicBool,
}

impl StaticCatalog {
    pub fn new(workloads: Vec<WorkloadRef>) -> Self {
        Self {
            workloads: Mutex::new(workloads),
            fail_reads: AtomicBool::new(false),
        }
    }

    pub fn set_workloads(&self, workloads: Vec<WorkloadRef>) {
        *self.workloads.lock().unwrap() = workloads;
    }
}

#[async_trait]
impl WorkloadCatalog for StaticCatalog {
    async fn list_workloads(&self, namespace: Option<&str>) -> Result<Vec<WorkloadRef>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::reconcile("injected read failure"));
        }
        Ok(self
            .workloads
            .lock()
            .unwrap()
            .iter()
            .filter(|w| namespace.is_none_or(|want| want == w.namespace))
            .cloned()
            .collect())
    }
}

// ── Object builders ─────────────────────────────────────────────────────────

pub fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
    Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: if labels.is_empty() {
                None
            } else {
                Some(string_map(labels))
            },
            ..Default::default()
        },
        ..Default::default()
    }
}

pub fn string_map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn quantities(entries: &[(&str, &str)]) -> ResourceList {
    entries
        .iter()
        .map(|(k, v)| (k.to_string(), Quantity(v.to_string())))
        .collect()
}

pub fn container(name: &str) -> ContainerSpec {
    ContainerSpec {
        name: name.to_string(),
        requests: quantities(&[("cpu", "100m"), ("memory", "128Mi")]),
        limits: quantities(&[("cpu", "200m"), ("memory", "256Mi")]),
    }
}

/// A workload with a single container named `app`.
pub fn workload(ns: &str, kind: &str, name: &str) -> WorkloadRef {
    WorkloadRef {
        api_version: "apps/v1".to_string(),
        kind: kind.to_string(),
        namespace: ns.to_string(),
        name: name.to_string(),
        labels: BTreeMap::new(),
        annotations: BTreeMap::new(),
        containers: vec![container("app")],
    }
}

/// An ownership-labeled VPA shaped the way the reconciler would create it
/// for the workload.
pub fn owned_vpa(w: &WorkloadRef, mode: UpdateMode) -> VerticalPodAutoscaler {
    let mut vpa = VerticalPodAutoscaler::new(
        &w.vpa_name(),
        VerticalPodAutoscalerSpec {
            target_ref: w.target_ref(),
            update_policy: Some(PodUpdatePolicy {
                update_mode: Some(mode),
            }),
        },
    );
    vpa.metadata.namespace = Some(w.namespace.clone());
    vpa.metadata.labels = Some(ownership_labels());
    vpa
}

/// A status recommendation covering the given container names.
pub fn recommendation_for(containers: &[&str]) -> VerticalPodAutoscalerStatus {
    VerticalPodAutoscalerStatus {
        recommendation: Some(RecommendedPodResources {
            container_recommendations: containers
                .iter()
                .map(|name| RecommendedContainerResources {
                    container_name: name.to_string(),
                    target: quantities(&[("cpu", "25m"), ("memory", "64Mi")]),
                    lower_bound: quantities(&[("cpu", "10m"), ("memory", "32Mi")]),
                    upper_bound: quantities(&[("cpu", "500m"), ("memory", "512Mi")]),
                    uncapped_target: quantities(&[("cpu", "25m"), ("memory", "64Mi")]),
                })
                .collect(),
        }),
    }
}
