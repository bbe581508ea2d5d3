//! Read/write access to the VPA objects this operator owns.
//!
//! Ownership is expressed purely through a fixed label set: every VPA this
//! operator creates carries [`ownership_labels`], and every list goes through
//! the matching selector. A VPA without these labels is invisible here and is
//! never touched, whatever its name.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use crate::crd::vpa::VerticalPodAutoscaler;
use crate::error::Result;

/// Standard managed-by label applied to every owned VPA.
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";
pub const MANAGED_BY_VALUE: &str = "vpa-operator";

/// Operator-specific ownership marker.
pub const OWNED_LABEL: &str = "vpa.bemade.org/managed";
pub const OWNED_VALUE: &str = "true";

/// How many times an update is attempted when the API server rejects it for
/// a stale resourceVersion, and the initial backoff between attempts.
const CONFLICT_RETRY_LIMIT: u32 = 5;
const CONFLICT_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// The fixed label set marking a VPA as owned by this operator.
pub fn ownership_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string()),
        (OWNED_LABEL.to_string(), OWNED_VALUE.to_string()),
    ])
}

/// Label selector matching exactly [`ownership_labels`].
pub fn ownership_selector() -> String {
    ownership_labels()
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// True when the object carries the full ownership label set.
pub fn is_owned(vpa: &VerticalPodAutoscaler) -> bool {
    let labels = vpa.labels();
    ownership_labels()
        .iter()
        .all(|(k, v)| labels.get(k) == Some(v))
}

// ── Store trait ───────────────────────────────────────────────────────────────

/// Store adapter for owned VPA objects. Abstracted so the reconciler and
/// summarizer can be driven against an in-memory store in tests.
#[async_trait]
pub trait VpaStore: Send + Sync {
    /// List owned VPAs in the namespace (`None` for all namespaces),
    /// filtered by the ownership label selector. Order is unspecified.
    async fn list_owned(&self, namespace: Option<&str>) -> Result<Vec<VerticalPodAutoscaler>>;

    /// Create a VPA. Fails with the API server's AlreadyExists error if a
    /// same-named object exists.
    async fn create(&self, vpa: &VerticalPodAutoscaler) -> Result<()>;

    /// Update a VPA, retrying on optimistic-concurrency conflict by
    /// re-submitting the same desired object.
    ///
    /// Re-submitting without a re-read is only safe because this operator is
    /// the sole writer of owned VPAs; that is a documented precondition, not
    /// something the store can enforce.
    async fn update(&self, vpa: &VerticalPodAutoscaler) -> Result<()>;

    /// Delete a VPA by namespace and name. Deleting an object that is
    /// already gone is not an error.
    async fn delete(&self, namespace: &str, name: &str) -> Result<()>;
}

// ── Kube-backed implementation ────────────────────────────────────────────────

pub struct KubeVpaStore {
    client: Client,
}

impl KubeVpaStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: Option<&str>) -> Api<VerticalPodAutoscaler> {
        match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

#[async_trait]
impl VpaStore for KubeVpaStore {
    async fn list_owned(&self, namespace: Option<&str>) -> Result<Vec<VerticalPodAutoscaler>> {
        let lp = ListParams::default().labels(&ownership_selector());
        Ok(self.api(namespace).list(&lp).await?.items)
    }

    async fn create(&self, vpa: &VerticalPodAutoscaler) -> Result<()> {
        let ns = vpa.namespace().unwrap_or_default();
        let name = vpa.name_any();
        self.api(Some(&ns)).create(&PostParams::default(), vpa).await?;
        info!(%name, %ns, "created VPA");
        Ok(())
    }

    async fn update(&self, vpa: &VerticalPodAutoscaler) -> Result<()> {
        let ns = vpa.namespace().unwrap_or_default();
        let name = vpa.name_any();
        let api = self.api(Some(&ns));
        retry_on_conflict(|| {
            let api = api.clone();
            let name = name.clone();
            let vpa = vpa.clone();
            async move {
                api.replace(&name, &PostParams::default(), &vpa)
                    .await
                    .map(|_| ())
            }
        })
        .await?;
        info!(%name, %ns, "updated VPA");
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        match self
            .api(Some(namespace))
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => {
                info!(%name, %namespace, "deleted VPA");
                Ok(())
            }
            Err(e) if is_not_found(&e) => {
                debug!(%name, %namespace, "VPA already gone");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

// ── Conflict retry ────────────────────────────────────────────────────────────

/// True when the error is the API server rejecting a stale write (HTTP 409).
pub fn is_conflict(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 409)
}

/// True when the error is an HTTP 404 for a missing object.
pub fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == 404)
}

/// Run `op`, retrying on conflict with doubling backoff up to the bounded
/// attempt limit. The final conflict (or any other error) propagates.
pub async fn retry_on_conflict<T, F, Fut>(mut op: F) -> std::result::Result<T, kube::Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, kube::Error>>,
{
    let mut delay = CONFLICT_RETRY_BACKOFF;
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_conflict(&e) && attempt < CONFLICT_RETRY_LIMIT => {
                debug!(attempt, "write conflict, retrying");
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
            Err(e) => return Err(e),
        }
    }
}

// ── Dry-run decorator ─────────────────────────────────────────────────────────

/// Store wrapper that turns every write into a logged no-op while delegating
/// reads, so a dry run exercises the full reconcile path without mutating
/// the cluster.
pub struct DryRunStore {
    inner: Arc<dyn VpaStore>,
}

impl DryRunStore {
    pub fn new(inner: Arc<dyn VpaStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl VpaStore for DryRunStore {
    async fn list_owned(&self, namespace: Option<&str>) -> Result<Vec<VerticalPodAutoscaler>> {
        self.inner.list_owned(namespace).await
    }

    async fn create(&self, vpa: &VerticalPodAutoscaler) -> Result<()> {
        info!(name = %vpa.name_any(), ns = %vpa.namespace().unwrap_or_default(), "dry run, not creating VPA");
        Ok(())
    }

    async fn update(&self, vpa: &VerticalPodAutoscaler) -> Result<()> {
        info!(name = %vpa.name_any(), ns = %vpa.namespace().unwrap_or_default(), "dry run, not updating VPA");
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<()> {
        info!(%name, %namespace, "dry run, not deleting VPA");
        Ok(())
    }
}
