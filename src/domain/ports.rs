//! Domain Ports - Core trait definitions for the orchestrator
//!
//! These traits define the boundaries between the reconciliation logic and
//! the systems it drives: the coordination store holding desired state and
//! the storage cluster holding live state. Adapters implement these traits
//! to provide concrete functionality; tests substitute fakes per call.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

// =============================================================================
// Coordination Store Port
// =============================================================================

/// Key/value store with per-key read-after-write consistency and ordered
/// children under a key prefix
///
/// Implementations must be safe to share across concurrent requests and must
/// not cache: every call crosses the store's own consistency boundary.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Read a single value, `None` if the key does not exist
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a single value, creating intermediate directories as needed
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Names of the immediate children of `key`, in store order
    ///
    /// A key with no children (or no key at all) yields an empty list.
    async fn children(&self, key: &str) -> Result<Vec<String>>;
}

// =============================================================================
// Storage Cluster Ports
// =============================================================================

/// Raw response of one administrative command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonCommandOutput {
    /// Command output buffer (usually JSON)
    pub buffer: Vec<u8>,
    /// Informational status string reported by the cluster
    pub info: String,
}

/// An open administrative session to the storage cluster
///
/// Sessions are command/response only. Dropping the connection closes it.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Issue an administrative command given its JSON-encoded arguments
    async fn mon_command(&self, args: &[u8]) -> Result<MonCommandOutput>;
}

/// Produces connections to a named cluster as a named user
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn connect(&self, cluster_name: &str, user: &str) -> Result<ConnectionRef>;
}

/// Opens the administrative connection for a cluster context
#[async_trait]
pub trait AdminConnector: Send + Sync {
    async fn connect_as_admin(
        &self,
        context: &ClusterContext,
        factory: &dyn ConnectionFactory,
    ) -> Result<ConnectionRef>;
}

// =============================================================================
// Cluster Context
// =============================================================================

/// Default root under which all orchestrator keys live
pub const DEFAULT_KEY_ROOT: &str = "/orchestrator";

/// Default storage backend name used in the key layout
pub const DEFAULT_BACKEND: &str = "ceph";

/// Default administrative identity
pub const DEFAULT_ADMIN_USER: &str = "admin";

/// Process-wide cluster identity plus the store handle
///
/// Built once at startup and shared behind an `Arc`; nothing mutates it
/// afterwards.
#[derive(Clone)]
pub struct ClusterContext {
    /// Coordination store client
    pub store: StoreRef,
    /// Root prefix of every key written or read
    pub key_root: String,
    /// Backend segment of the `services/<backend>/...` layout
    pub backend: String,
    /// Name of the storage cluster
    pub cluster_name: String,
    /// Administrative user name (without the `client.` prefix)
    pub admin_user: String,
}

impl ClusterContext {
    /// Create a context with the default key root, backend and admin user
    pub fn new(store: StoreRef, cluster_name: impl Into<String>) -> Self {
        Self {
            store,
            key_root: DEFAULT_KEY_ROOT.to_string(),
            backend: DEFAULT_BACKEND.to_string(),
            cluster_name: cluster_name.into(),
            admin_user: DEFAULT_ADMIN_USER.to_string(),
        }
    }

    pub fn with_key_root(mut self, key_root: impl Into<String>) -> Self {
        self.key_root = key_root.into();
        self
    }

    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = backend.into();
        self
    }

    pub fn with_admin_user(mut self, admin_user: impl Into<String>) -> Self {
        self.admin_user = admin_user.into();
        self
    }
}

impl std::fmt::Debug for ClusterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClusterContext")
            .field("key_root", &self.key_root)
            .field("backend", &self.backend)
            .field("cluster_name", &self.cluster_name)
            .field("admin_user", &self.admin_user)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Type Aliases for Trait Objects
// =============================================================================

pub type StoreRef = Arc<dyn CoordinationStore>;
pub type ConnectionRef = Box<dyn Connection>;
pub type ConnectionFactoryRef = Arc<dyn ConnectionFactory>;
pub type AdminConnectorRef = Arc<dyn AdminConnector>;
