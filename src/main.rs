//! vpa-operator — manages VerticalPodAutoscalers for labeled namespaces.
//!
//! Two entry points share one binary: the `controller` subcommand runs the
//! namespace watch loop (plus health probes), and the `summary` subcommand
//! prints the current recommendation summary as JSON.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::Client;
use tracing::info;
use warp::Filter;

use vpa_operator::controller::{self, reconciler::Reconciler, Context};
use vpa_operator::policy::PolicyConfig;
use vpa_operator::store::{DryRunStore, KubeVpaStore, VpaStore};
use vpa_operator::summary::Summarizer;
use vpa_operator::workload::{KubeWorkloadCatalog, WorkloadCatalog};

#[derive(Parser, Debug)]
#[command(
    name = "vpa-operator",
    about = "Kubernetes operator managing VerticalPodAutoscalers per namespace policy"
)]
struct Args {
    /// Log format: "text" for human-readable, "json" for structured.
    #[arg(long, default_value = "text", env = "LOG_FORMAT")]
    log_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the namespace controller.
    Controller {
        /// Manage namespaces that carry no enablement label.
        #[arg(long, env = "ON_BY_DEFAULT")]
        on_by_default: bool,

        /// Namespace names to manage regardless of the default (comma-separated).
        #[arg(long, env = "INCLUDE_NAMESPACES", value_delimiter = ',')]
        include_namespaces: Vec<String>,

        /// Namespace names to never manage by default (comma-separated).
        #[arg(long, env = "EXCLUDE_NAMESPACES", value_delimiter = ',')]
        exclude_namespaces: Vec<String>,

        /// Log every write intent without mutating the cluster.
        #[arg(long, env = "DRY_RUN")]
        dry_run: bool,

        /// Skip updates whose desired state already equals the stored state.
        #[arg(long, env = "SKIP_NOOP_UPDATES")]
        skip_noop_updates: bool,

        /// Seconds between full resyncs of every namespace.
        #[arg(long, default_value = "300", env = "RESYNC_SECS")]
        resync_secs: u64,

        /// Bind address for health probe endpoints (/healthz, /readyz).
        #[arg(long, default_value = ":8081", env = "HEALTH_PROBE_BIND_ADDRESS")]
        health_probe_bind_address: String,
    },
    /// Print a recommendation summary as JSON on stdout.
    Summary {
        /// Restrict the summary to one namespace (all namespaces when omitted).
        #[arg(long, env = "SUMMARY_NAMESPACE")]
        namespace: Option<String>,

        /// Container names to leave out of every workload (comma-separated).
        #[arg(long, env = "EXCLUDE_CONTAINERS", value_delimiter = ',')]
        exclude_containers: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,kube=warn,hyper=warn,tower=warn,warp=warn".into());

    if args.log_format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let client = Client::try_default().await?;

    match args.command {
        Command::Controller {
            on_by_default,
            include_namespaces,
            exclude_namespaces,
            dry_run,
            skip_noop_updates,
            resync_secs,
            health_probe_bind_address,
        } => {
            info!(
                on_by_default,
                dry_run,
                include = ?include_namespaces,
                exclude = ?exclude_namespaces,
                "starting vpa-operator controller"
            );

            let store: Arc<dyn VpaStore> = if dry_run {
                Arc::new(DryRunStore::new(Arc::new(KubeVpaStore::new(client.clone()))))
            } else {
                Arc::new(KubeVpaStore::new(client.clone()))
            };
            let catalog: Arc<dyn WorkloadCatalog> =
                Arc::new(KubeWorkloadCatalog::new(client.clone()));

            let reconciler = Reconciler::new(
                catalog,
                store,
                PolicyConfig {
                    on_by_default,
                    include_namespaces,
                    exclude_namespaces,
                },
            )
            .skip_noop_updates(skip_noop_updates);

            let ctx = Arc::new(Context {
                reconciler,
                resync: Duration::from_secs(resync_secs),
            });

            // Parse health probe bind address (e.g. ":8081" or "0.0.0.0:8081").
            let health_addr: std::net::SocketAddr = health_probe_bind_address
                .strip_prefix(':')
                .map(|port| format!("0.0.0.0:{port}"))
                .unwrap_or(health_probe_bind_address)
                .parse()
                .expect("invalid --health-probe-bind-address");

            let healthz = warp::get()
                .and(warp::path("healthz"))
                .and(warp::path::end())
                .map(|| warp::reply::with_status("ok", warp::http::StatusCode::OK));
            let readyz = warp::get()
                .and(warp::path("readyz"))
                .and(warp::path::end())
                .map(|| warp::reply::with_status("ok", warp::http::StatusCode::OK));
            let health_routes = healthz.or(readyz);

            tokio::select! {
                _ = controller::run(client, ctx) => {},
                _ = warp::serve(health_routes).run(health_addr) => {},
            }
        }
        Command::Summary {
            namespace,
            exclude_containers,
        } => {
            let store: Arc<dyn VpaStore> = Arc::new(KubeVpaStore::new(client.clone()));
            let catalog: Arc<dyn WorkloadCatalog> = Arc::new(KubeWorkloadCatalog::new(client));

            let mut summarizer =
                Summarizer::new(store, catalog).exclude_containers(exclude_containers);
            if let Some(ns) = namespace.filter(|ns| !ns.is_empty()) {
                summarizer = summarizer.namespace(ns);
            }

            let summary = summarizer.summary().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
