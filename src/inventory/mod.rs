//! Node Inventory
//!
//! Per-node hardware facts recorded in the coordination store:
//!
//! ```text
//! <root>/nodes/config/<nodeId>/public-ip
//! <root>/nodes/config/<nodeId>/private-ip
//! <root>/nodes/config/<nodeId>/location
//! <root>/nodes/config/<nodeId>/disks       JSON array of Disk
//! <root>/nodes/config/<nodeId>/heartbeat   RFC 3339
//! ```
//!
//! Reading assembles [`Node`] records. A field that is missing or cannot be
//! parsed falls back to its zero value so one bad node never hides the rest;
//! a failing store read aborts the listing.

pub mod discovery;

use crate::domain::ClusterContext;
use crate::error::{Error, Result};
use crate::store::keys;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// A node is healthy while its last heartbeat is younger than this
pub const HEARTBEAT_THRESHOLD: Duration = Duration::from_secs(60);

/// `lastUpdated` reported for a node that never sent a heartbeat (one year)
pub const MISSING_HEARTBEAT_NANOS: u64 = 365 * 24 * 60 * 60 * 1_000_000_000;

/// Device type recorded for whole disks
pub const DISK_TYPE: &str = "disk";

// =============================================================================
// Types
// =============================================================================

/// A block device as recorded at scan time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Disk {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub disk_type: String,
    /// Bytes
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub rotational: bool,
    /// No partitions and no holders
    #[serde(default)]
    pub empty: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum NodeState {
    Healthy,
    Unhealthy,
}

impl From<NodeState> for u8 {
    fn from(state: NodeState) -> Self {
        match state {
            NodeState::Healthy => 0,
            NodeState::Unhealthy => 1,
        }
    }
}

impl TryFrom<u8> for NodeState {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(NodeState::Healthy),
            1 => Ok(NodeState::Unhealthy),
            other => Err(Error::Validation(format!("unknown node state {}", other))),
        }
    }
}

/// Presentation record of a discovered node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub node_id: String,
    pub cluster_name: String,
    pub public_ip: String,
    pub private_ip: String,
    /// Sum of all disk sizes, bytes
    pub storage: u64,
    /// Nanoseconds since the last heartbeat
    pub last_updated: u64,
    pub state: NodeState,
    pub location: String,
}

/// Everything a node agent reports about itself in one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeReport {
    pub node_id: String,
    pub public_ip: String,
    pub private_ip: String,
    pub location: String,
    pub disks: Vec<Disk>,
}

// =============================================================================
// Reads
// =============================================================================

/// List every node in store enumeration order
pub async fn list_nodes(context: &ClusterContext) -> Result<Vec<Node>> {
    list_nodes_at(context, Utc::now()).await
}

/// List nodes, computing heartbeat age against `now`
pub async fn list_nodes_at(context: &ClusterContext, now: DateTime<Utc>) -> Result<Vec<Node>> {
    let node_ids = context
        .store
        .children(&keys::nodes_config_key(context))
        .await?;
    if node_ids.is_empty() {
        return Ok(Vec::new());
    }

    let cluster_name = context
        .store
        .get(&keys::cluster_name_key(context))
        .await?
        .unwrap_or_else(|| context.cluster_name.clone());

    let mut nodes = Vec::with_capacity(node_ids.len());
    for node_id in node_ids {
        nodes.push(load_node(context, &node_id, &cluster_name, now).await?);
    }

    debug!("Loaded {} nodes", nodes.len());
    Ok(nodes)
}

async fn load_node(
    context: &ClusterContext,
    node_id: &str,
    cluster_name: &str,
    now: DateTime<Utc>,
) -> Result<Node> {
    let public_ip = read_field(context, node_id, keys::NODE_PUBLIC_IP)
        .await?
        .unwrap_or_default();
    let private_ip = read_field(context, node_id, keys::NODE_PRIVATE_IP)
        .await?
        .unwrap_or_default();
    let location = read_field(context, node_id, keys::NODE_LOCATION)
        .await?
        .unwrap_or_default();
    let disks = parse_disks(
        node_id,
        read_field(context, node_id, keys::NODE_DISKS).await?.as_deref(),
    );
    let heartbeat = parse_heartbeat(
        node_id,
        read_field(context, node_id, keys::NODE_HEARTBEAT).await?.as_deref(),
    );

    let last_updated = heartbeat_age(heartbeat, now);
    let state = if last_updated <= HEARTBEAT_THRESHOLD.as_nanos() as u64 {
        NodeState::Healthy
    } else {
        NodeState::Unhealthy
    };

    Ok(Node {
        node_id: node_id.to_string(),
        cluster_name: cluster_name.to_string(),
        public_ip,
        private_ip,
        storage: disks.iter().map(|d| d.size).sum(),
        last_updated,
        state,
        location,
    })
}

async fn read_field(context: &ClusterContext, node_id: &str, field: &str) -> Result<Option<String>> {
    context
        .store
        .get(&keys::node_field_key(context, node_id, field))
        .await
}

fn parse_disks(node_id: &str, raw: Option<&str>) -> Vec<Disk> {
    let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
        return Vec::new();
    };
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!("Ignoring unparsable disks of node {}: {}", node_id, e);
        Vec::new()
    })
}

fn parse_heartbeat(node_id: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?.trim();
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring unparsable heartbeat of node {}: {}", node_id, e);
            None
        }
    }
}

fn heartbeat_age(heartbeat: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    let Some(at) = heartbeat else {
        return MISSING_HEARTBEAT_NANOS;
    };
    match (now - at).num_nanoseconds() {
        Some(nanos) => nanos.max(0) as u64,
        None => MISSING_HEARTBEAT_NANOS,
    }
}

// =============================================================================
// Writes
// =============================================================================

pub async fn set_ip_address(
    context: &ClusterContext,
    node_id: &str,
    public_ip: &str,
    private_ip: &str,
) -> Result<()> {
    context
        .store
        .set(&keys::node_field_key(context, node_id, keys::NODE_PUBLIC_IP), public_ip)
        .await?;
    context
        .store
        .set(&keys::node_field_key(context, node_id, keys::NODE_PRIVATE_IP), private_ip)
        .await
}

pub async fn set_location(context: &ClusterContext, node_id: &str, location: &str) -> Result<()> {
    context
        .store
        .set(&keys::node_field_key(context, node_id, keys::NODE_LOCATION), location)
        .await
}

pub async fn set_disks(context: &ClusterContext, node_id: &str, disks: &[Disk]) -> Result<()> {
    let value = serde_json::to_string(disks)?;
    context
        .store
        .set(&keys::node_field_key(context, node_id, keys::NODE_DISKS), &value)
        .await
}

pub async fn record_heartbeat(
    context: &ClusterContext,
    node_id: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    context
        .store
        .set(
            &keys::node_field_key(context, node_id, keys::NODE_HEARTBEAT),
            &at.to_rfc3339(),
        )
        .await
}

/// Record a full report and stamp the heartbeat
pub async fn report_node(context: &ClusterContext, report: &NodeReport) -> Result<()> {
    if report.node_id.is_empty() {
        return Err(Error::Validation("node id is required".into()));
    }

    set_ip_address(context, &report.node_id, &report.public_ip, &report.private_ip).await?;
    set_location(context, &report.node_id, &report.location).await?;
    set_disks(context, &report.node_id, &report.disks).await?;
    record_heartbeat(context, &report.node_id, Utc::now()).await?;

    debug!(
        "Reported node {} with {} disks",
        report.node_id,
        report.disks.len()
    );
    Ok(())
}
