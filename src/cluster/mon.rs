//! Monitor Quorum Manager
//!
//! Two decoupled views of the monitors:
//! - `status`: the live quorum as the storage cluster reports it
//! - `desired`: the monitor set declared in the coordination store
//!
//! A monitor is declared before its daemon exists and only gains a rank once
//! the cluster reports it in quorum. The views are never merged.

use crate::cluster::command::{run_json, MonCommand};
use crate::cluster::connector::ClusterAccess;
use crate::domain::{ClusterContext, Connection};
use crate::error::{Error, Result};
use crate::store::keys;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// =============================================================================
// Live Quorum
// =============================================================================

/// Live quorum as reported by `mon_status`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonStatus {
    /// Ranks of the monitors currently in quorum
    #[serde(default)]
    pub quorum: Vec<i32>,
    #[serde(default)]
    pub monmap: MonMap,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonMap {
    #[serde(default)]
    pub mons: Vec<MonMapEntry>,
}

/// A monitor known to the cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonMapEntry {
    pub name: String,
    pub rank: i32,
    /// `host:port`
    pub addr: String,
}

impl MonStatus {
    /// Addresses of every monitor in the map
    pub fn addresses(&self) -> Vec<String> {
        self.monmap.mons.iter().map(|m| m.addr.clone()).collect()
    }
}

/// Drop the `/nonce` suffix the cluster appends to monitor addresses
pub fn strip_nonce(addr: &str) -> &str {
    addr.split_once('/').map(|(host_port, _)| host_port).unwrap_or(addr)
}

/// Query the live quorum over an open connection
pub async fn get_mon_status(conn: &dyn Connection) -> Result<MonStatus> {
    let mut status: MonStatus = run_json(conn, &MonCommand::new("mon_status")).await?;

    for mon in &mut status.monmap.mons {
        mon.addr = strip_nonce(&mon.addr).to_string();
    }

    debug!(
        "Quorum {:?} of {} monitors",
        status.quorum,
        status.monmap.mons.len()
    );
    Ok(status)
}

// =============================================================================
// Desired Monitors
// =============================================================================

/// A monitor declared in the coordination store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredMonitor {
    pub name: String,
    /// `ip:port`
    pub endpoint: String,
}

/// Declare a monitor under `id`
pub async fn set_desired_monitor(
    context: &ClusterContext,
    id: &str,
    name: &str,
    ip: &str,
    port: u16,
) -> Result<()> {
    let base = keys::join(&keys::desired_monitors_key(context), id);
    context.store.set(&keys::join(&base, keys::MONITOR_ID), name).await?;
    context.store.set(&keys::join(&base, keys::MONITOR_IP), ip).await?;
    context
        .store
        .set(&keys::join(&base, keys::MONITOR_PORT), &port.to_string())
        .await
}

/// Read the declared monitor set, in store order
pub async fn desired_monitors(context: &ClusterContext) -> Result<Vec<DesiredMonitor>> {
    let root = keys::desired_monitors_key(context);
    let mut monitors = Vec::new();

    for id in context.store.children(&root).await? {
        let base = keys::join(&root, &id);
        let name = context
            .store
            .get(&keys::join(&base, keys::MONITOR_ID))
            .await?
            .unwrap_or_else(|| id.clone());
        let ip = context
            .store
            .get(&keys::join(&base, keys::MONITOR_IP))
            .await?
            .ok_or_else(|| Error::malformed(format!("desired monitor {}", id), "missing ipaddress"))?;
        let port = context
            .store
            .get(&keys::join(&base, keys::MONITOR_PORT))
            .await?
            .ok_or_else(|| Error::malformed(format!("desired monitor {}", id), "missing port"))?;
        let port: u16 = port
            .trim()
            .parse()
            .map_err(|e| Error::malformed(format!("desired monitor {} port", id), e))?;

        monitors.push(DesiredMonitor {
            name,
            endpoint: format!("{}:{}", ip, port),
        });
    }

    Ok(monitors)
}

// =============================================================================
// Monitors View
// =============================================================================

/// Combined response of [`get_monitors`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorsResponse {
    pub status: MonStatus,
    pub desired: Vec<DesiredMonitor>,
}

/// Read the desired set from the store and the live quorum from the cluster
///
/// An unreachable cluster yields an empty `status`: the cluster may simply
/// not be bootstrapped yet. A reachable cluster that fails the query is an
/// error.
pub async fn get_monitors(access: &ClusterAccess) -> Result<MonitorsResponse> {
    let desired = desired_monitors(access.context()).await?;

    let status = match access.connect_as_admin().await {
        Ok(conn) => get_mon_status(conn.as_ref()).await?,
        Err(e) => {
            warn!("Cluster unreachable, reporting empty quorum: {}", e);
            MonStatus::default()
        }
    };

    Ok(MonitorsResponse { status, desired })
}
