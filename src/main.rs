//! Cluster Orchestrator
//!
//! Control plane process: REST API over the node inventory, monitor quorum
//! and pool reconciler, plus health and metrics endpoints, an optional
//! local node reporter and background metrics registration.

use clap::Parser;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cluster_orchestrator::domain::StoreRef;
use cluster_orchestrator::inventory::discovery::{run_reporter, DiskScanner, LocalNode, ScannerConfig};
use cluster_orchestrator::metrics::run_metrics_task;
use cluster_orchestrator::store::keys;
use cluster_orchestrator::{
    ApiServer, ApiServerConfig, AppState, ClusterAccess, ClusterContext, ClusterMetrics,
    DirectConnector, EtcdConfig, EtcdStore, Error, MemoryStore, PoolDefaults, RestfulConfig,
    RestfulConnectionFactory, Result, RetryPolicy,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Cluster Orchestrator - control plane for a distributed storage cluster
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// REST API bind address
    #[arg(long, env = "API_ADDR", default_value = "0.0.0.0:8124")]
    api_addr: String,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: String,

    /// etcd client endpoint of the coordination store
    #[arg(long, env = "ETCD_ENDPOINT")]
    etcd_endpoint: Option<String>,

    /// Run with an in-memory coordination store
    #[arg(long, env = "STANDALONE")]
    standalone: bool,

    /// Root prefix of every coordination store key
    #[arg(long, env = "KEY_ROOT", default_value = "/orchestrator")]
    key_root: String,

    /// Storage backend segment of the key layout
    #[arg(long, env = "BACKEND", default_value = "ceph")]
    backend: String,

    /// Storage cluster name
    #[arg(long, env = "CLUSTER_NAME", default_value = "ceph")]
    cluster_name: String,

    /// Administrative user
    #[arg(long, env = "ADMIN_USER", default_value = "admin")]
    admin_user: String,

    /// Cluster manager REST endpoint
    #[arg(long, env = "MGR_ENDPOINT", default_value = "https://127.0.0.1:8003")]
    mgr_endpoint: String,

    /// API key of the administrative user on the manager endpoint
    #[arg(long, env = "MGR_API_KEY", default_value = "", hide_env_values = true)]
    mgr_api_key: String,

    /// Accept self-signed manager certificates
    #[arg(long, env = "MGR_INSECURE_TLS")]
    mgr_insecure_tls: bool,

    /// Admin connect attempts per request
    #[arg(long, env = "CONNECT_ATTEMPTS", default_value = "5")]
    connect_attempts: u32,

    /// Seconds between admin connect attempts
    #[arg(long, env = "CONNECT_INTERVAL", default_value = "2")]
    connect_interval_secs: u64,

    /// Request timeout in seconds
    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "30")]
    request_timeout_secs: u64,

    /// Placement groups for newly created pools
    #[arg(long, env = "DEFAULT_PG_COUNT", default_value = "100")]
    pg_count: u32,

    /// Metrics refresh interval in seconds
    #[arg(long, env = "METRICS_REFRESH", default_value = "30")]
    metrics_refresh_secs: u64,

    /// Report this node's disks into the inventory
    #[arg(long, env = "DISCOVER")]
    discover: bool,

    /// Discovery interval in seconds
    #[arg(long, env = "DISCOVER_INTERVAL", default_value = "60")]
    discover_interval_secs: u64,

    /// Inventory id of this node
    #[arg(long, env = "NODE_ID")]
    node_id: Option<String>,

    /// Public address of this node
    #[arg(long, env = "PUBLIC_IP", default_value = "")]
    public_ip: String,

    /// Private address of this node
    #[arg(long, env = "PRIVATE_IP", default_value = "")]
    private_ip: String,

    /// Topology location of this node, e.g. `root=default,dc=dc1`
    #[arg(long, env = "LOCATION", default_value = "")]
    location: String,

    /// Path to sysfs
    #[arg(long, env = "SYSFS_PATH", default_value = "/sys")]
    sysfs_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting Cluster Orchestrator");
    info!("  Version: {}", cluster_orchestrator::VERSION);
    info!("  REST API: {}", args.api_addr);
    info!("  Cluster: {} as {}", args.cluster_name, args.admin_user);
    info!("  Standalone mode: {}", args.standalone);

    let store = build_store(&args)?;
    let context = Arc::new(
        ClusterContext::new(store, args.cluster_name.clone())
            .with_key_root(args.key_root.clone())
            .with_backend(args.backend.clone())
            .with_admin_user(args.admin_user.clone()),
    );

    let connect_interval = Duration::from_secs(args.connect_interval_secs);
    let factory = Arc::new(RestfulConnectionFactory::new(RestfulConfig {
        endpoint: args.mgr_endpoint.clone(),
        api_key: args.mgr_api_key.clone(),
        request_timeout: Duration::from_secs(args.request_timeout_secs),
        insecure_tls: args.mgr_insecure_tls,
    }));
    let access = Arc::new(ClusterAccess::new(
        context.clone(),
        Arc::new(DirectConnector),
        factory,
        RetryPolicy::new(args.connect_attempts, connect_interval),
    ));

    // Metrics registration keeps retrying until the cluster answers
    let metrics = Arc::new(ClusterMetrics::new()?);
    tokio::spawn(run_metrics_task(
        metrics.clone(),
        access.clone(),
        RetryPolicy::new(u32::MAX, connect_interval),
        Duration::from_secs(args.metrics_refresh_secs),
    ));

    if args.discover {
        let node_id = args
            .node_id
            .clone()
            .ok_or_else(|| Error::Configuration("--node-id is required with --discover".into()))?;
        let node = LocalNode {
            node_id,
            public_ip: args.public_ip.clone(),
            private_ip: args.private_ip.clone(),
            location: args.location.clone(),
        };
        let scanner = DiskScanner::new(ScannerConfig {
            sysfs_path: args.sysfs_path.clone(),
            ..Default::default()
        });
        tokio::spawn(run_reporter(
            context.clone(),
            node,
            scanner,
            Duration::from_secs(args.discover_interval_secs),
        ));
    }

    // Start health server
    let health_addr = args.health_addr.clone();
    let health_context = context.clone();
    tokio::spawn(async move {
        if let Err(e) = run_health_server(&health_addr, health_context).await {
            error!("Health server error: {}", e);
        }
    });

    // Start metrics server
    let metrics_addr = args.metrics_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(&metrics_addr, metrics).await {
            error!("Metrics server error: {}", e);
        }
    });

    // Create and run API server
    let api_config = ApiServerConfig {
        rest_addr: args.api_addr.parse().map_err(|e| {
            Error::Configuration(format!("Invalid REST API address: {}", e))
        })?,
        request_timeout_secs: args.request_timeout_secs,
    };
    let state = AppState::new(
        access,
        PoolDefaults {
            pg_count: args.pg_count,
        },
    );
    let api_server = Arc::new(ApiServer::new(api_config, state));

    let signal_server = api_server.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_server.shutdown();
        }
    });

    api_server.run().await?;

    info!("Orchestrator shutdown complete");
    Ok(())
}

fn build_store(args: &Args) -> Result<StoreRef> {
    if args.standalone {
        warn!("Using in-memory coordination store; state is lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let endpoint = args.etcd_endpoint.clone().ok_or_else(|| {
        Error::Configuration("--etcd-endpoint is required unless --standalone is set".into())
    })?;
    info!("  Coordination store: {}", endpoint);

    Ok(Arc::new(EtcdStore::new(EtcdConfig {
        endpoint,
        ..Default::default()
    })?))
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "{},hyper=warn,reqwest=warn,tower=warn,tower_http=info,axum=info",
            level.as_str().to_lowercase()
        ))
    });

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}

fn plain(status: hyper::StatusCode, body: impl Into<hyper::Body>) -> hyper::Response<hyper::Body> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

// =============================================================================
// Health Server
// =============================================================================

async fn run_health_server(addr: &str, context: Arc<ClusterContext>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let context = context.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let context = context.clone();
                async move {
                    let response = match req.uri().path() {
                        "/healthz" | "/livez" => plain(StatusCode::OK, "ok"),
                        // ready once the coordination store answers
                        "/readyz" => match context.store.get(&keys::cluster_name_key(&context)).await {
                            Ok(_) => plain(StatusCode::OK, "ok"),
                            Err(e) => {
                                warn!("Readiness check failed: {}", e);
                                plain(StatusCode::SERVICE_UNAVAILABLE, "store unavailable")
                            }
                        },
                        _ => plain(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid health server address: {}", e))
    })?;

    info!("Health server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Health server error: {}", e)))?;

    Ok(())
}

// =============================================================================
// Metrics Server
// =============================================================================

async fn run_metrics_server(addr: &str, metrics: Arc<ClusterMetrics>) -> Result<()> {
    use hyper::service::{make_service_fn, service_fn};
    use hyper::{header, Body, Request, Server, StatusCode};

    let make_svc = make_service_fn(move |_conn| {
        let metrics = metrics.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req: Request<Body>| {
                let metrics = metrics.clone();
                async move {
                    let response = match req.uri().path() {
                        "/metrics" => match metrics.encode() {
                            Ok((content_type, buffer)) => {
                                let mut response = plain(StatusCode::OK, buffer);
                                if let Ok(value) = header::HeaderValue::from_str(&content_type) {
                                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                                }
                                response
                            }
                            Err(e) => {
                                error!("Metrics encoding failed: {}", e);
                                plain(StatusCode::INTERNAL_SERVER_ERROR, Body::empty())
                            }
                        },
                        _ => plain(StatusCode::NOT_FOUND, "not found"),
                    };
                    Ok::<_, Infallible>(response)
                }
            }))
        }
    });

    let addr: SocketAddr = addr.parse().map_err(|e| {
        Error::Configuration(format!("Invalid metrics server address: {}", e))
    })?;

    info!("Metrics server listening on {}", addr);
    Server::bind(&addr)
        .serve(make_svc)
        .await
        .map_err(|e| Error::Internal(format!("Metrics server error: {}", e)))?;

    Ok(())
}
