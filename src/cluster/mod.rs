//! Storage Cluster Module
//!
//! Everything that talks to the live storage cluster:
//! - Connection: admin connect with bounded retry, manager REST adapter
//! - Monitors: live quorum and desired monitor set
//! - Pools: listing, description and creation, erasure-code profiles
//! - Client access: connection bundle for storage clients

pub mod client_access;
pub mod command;
pub mod connector;
pub mod mon;
pub mod multi_json;
pub mod pool;
pub mod restful;
pub mod retry;

pub use client_access::{get_client_access_info, ClientAccessInfo};
pub use command::MonCommand;
pub use connector::{ClusterAccess, DirectConnector};
pub use mon::{get_monitors, DesiredMonitor, MonStatus, MonitorsResponse};
pub use pool::{
    create_pool, list_pools, ErasureCodeProfile, ErasureCodedConfig, Pool, PoolDefaults,
    PoolRequest, PoolType, ReplicationConfig,
};
pub use restful::{RestfulConfig, RestfulConnectionFactory};
pub use retry::{retry_with_limit, RetryPolicy};
