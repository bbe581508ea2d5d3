//! Namespace watch loop driving the reconciliation engine.
//!
//! Watches every Namespace in the cluster and invokes the engine once per
//! event. Failed passes requeue after a fixed delay; successful ones requeue
//! at the resync interval so convergence is re-driven even without events.

pub mod reconciler;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::Api;
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use reconciler::Reconciler;

/// Shared context passed to every reconcile call.
pub struct Context {
    pub reconciler: Reconciler,
    pub resync: Duration,
}

/// Start the namespace controller. Returns a future that runs forever.
pub async fn run(client: Client, ctx: Arc<Context>) {
    let namespaces: Api<Namespace> = Api::all(client);

    Controller::new(namespaces, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|res| async move {
            match res {
                Ok((obj, _action)) => debug!(namespace = %obj.name, "reconciled"),
                Err(e) => warn!("reconcile failed: {e:?}"),
            }
        })
        .await;
}

async fn reconcile(namespace: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action> {
    let name = namespace.name_any();
    debug!(%name, "namespace event");
    ctx.reconciler.reconcile_namespace(&namespace).await?;
    Ok(Action::requeue(ctx.resync))
}

fn error_policy(namespace: Arc<Namespace>, error: &Error, _ctx: Arc<Context>) -> Action {
    warn!(name = %namespace.name_any(), %error, "reconcile error, requeuing in 30s");
    Action::requeue(Duration::from_secs(30))
}
