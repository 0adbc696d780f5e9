//! Cluster Orchestrator - Storage Cluster Control Plane
//!
//! Discovers storage nodes, tracks the monitor quorum and reconciles
//! storage pools against a live storage cluster, exposing the result over
//! a REST API.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          REST API (axum)                         │
//! │      /node      /mon      /pool      /image/mapinfo              │
//! ├──────────────┬─────────────────┬──────────────┬──────────────────┤
//! │     Node     │  Monitor Quorum │     Pool     │  Client Access   │
//! │   Inventory  │     Manager     │  Reconciler  │    Resolver      │
//! ├──────────────┴────────┬────────┴──────────────┴──────────────────┤
//! │  Coordination Store   │   Cluster Access (connector + retry)     │
//! │  (etcd / in-memory)   │   Connection Factory (manager REST)      │
//! └───────────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Desired state lives in the coordination store, observed state in the
//! storage cluster. Neither is cached beyond a single request.
//!
//! # Modules
//!
//! - [`api`]: REST handlers and server
//! - [`cluster`]: admin connection, monitors, pools, client access
//! - [`inventory`]: node records and local disk discovery
//! - [`store`]: coordination store clients and key layout
//! - [`metrics`]: Prometheus cluster gauges
//! - [`domain`]: capability traits and the shared cluster context
//! - [`error`]: Error types and handling

pub mod api;
pub mod cluster;
pub mod domain;
pub mod error;
pub mod inventory;
pub mod metrics;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, AppState};

pub use cluster::{
    ClientAccessInfo, ClusterAccess, DirectConnector, MonitorsResponse, Pool, PoolDefaults,
    PoolType, RestfulConfig, RestfulConnectionFactory, RetryPolicy,
};

pub use domain::{
    AdminConnector, ClusterContext, Connection, ConnectionFactory, CoordinationStore,
    MonCommandOutput,
};

pub use error::{Error, ErrorKind, Result};

pub use inventory::{Disk, Node, NodeState};

pub use metrics::ClusterMetrics;

pub use store::{EtcdConfig, EtcdStore, MemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
