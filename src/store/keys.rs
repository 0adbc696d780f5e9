//! Coordination store key layout
//!
//! ```text
//! <root>/services/<backend>/name
//! <root>/services/<backend>/osd/applied/<nodeId>/<osdId>/disk-uuid
//! <root>/services/<backend>/monitor/desired/<id>/{id,ipaddress,port}
//! <root>/nodes/config/<nodeId>/{public-ip,private-ip,location,disks,heartbeat}
//! ```

use crate::domain::ClusterContext;

pub const NODE_PUBLIC_IP: &str = "public-ip";
pub const NODE_PRIVATE_IP: &str = "private-ip";
pub const NODE_LOCATION: &str = "location";
pub const NODE_DISKS: &str = "disks";
pub const NODE_HEARTBEAT: &str = "heartbeat";

pub const MONITOR_ID: &str = "id";
pub const MONITOR_IP: &str = "ipaddress";
pub const MONITOR_PORT: &str = "port";

/// Join a key and a child segment with exactly one separator
pub fn join(base: &str, segment: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        segment.trim_start_matches('/')
    )
}

fn services_key(context: &ClusterContext) -> String {
    join(&join(&context.key_root, "services"), &context.backend)
}

/// Key holding the storage cluster's name
pub fn cluster_name_key(context: &ClusterContext) -> String {
    join(&services_key(context), "name")
}

/// Prefix under which discovered nodes are recorded
pub fn nodes_config_key(context: &ClusterContext) -> String {
    join(&context.key_root, "nodes/config")
}

pub fn node_key(context: &ClusterContext, node_id: &str) -> String {
    join(&nodes_config_key(context), node_id)
}

pub fn node_field_key(context: &ClusterContext, node_id: &str, field: &str) -> String {
    join(&node_key(context, node_id), field)
}

/// Prefix of the declared monitor set
pub fn desired_monitors_key(context: &ClusterContext) -> String {
    join(&services_key(context), "monitor/desired")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn test_join_normalizes_separators() {
        assert_eq!(join("/a/", "/b"), "/a/b");
        assert_eq!(join("/a", "b/c"), "/a/b/c");
    }

    #[test]
    fn test_layout() {
        let context = ClusterContext::new(Arc::new(MemoryStore::new()), "c1");

        assert_eq!(cluster_name_key(&context), "/orchestrator/services/ceph/name");
        assert_eq!(
            node_field_key(&context, "node1", NODE_DISKS),
            "/orchestrator/nodes/config/node1/disks"
        );
        assert_eq!(
            desired_monitors_key(&context),
            "/orchestrator/services/ceph/monitor/desired"
        );
    }
}
