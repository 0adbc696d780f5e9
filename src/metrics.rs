//! Cluster Metrics
//!
//! Prometheus gauges describing the cluster as this process sees it. The
//! gauges are registered once the cluster first answers an admin connect,
//! retried in the background so the process can start before the cluster
//! is reachable, then refreshed on an interval.

use crate::cluster::connector::ClusterAccess;
use crate::cluster::mon::get_mon_status;
use crate::cluster::pool::count_pools;
use crate::cluster::retry::{retry_with_limit, RetryPolicy};
use crate::error::{Error, Result};
use crate::inventory::list_nodes;
use prometheus::{Encoder, IntGauge, Registry, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct ClusterMetrics {
    registry: Registry,
    pools_total: IntGauge,
    monitors_in_quorum: IntGauge,
    nodes_total: IntGauge,
    registered: AtomicBool,
}

fn gauge(name: &str, help: &str) -> Result<IntGauge> {
    IntGauge::new(name, help).map_err(|e| Error::Internal(format!("metric {}: {}", name, e)))
}

impl ClusterMetrics {
    pub fn new() -> Result<Self> {
        Ok(Self {
            registry: Registry::new(),
            pools_total: gauge("cluster_pools_total", "Number of storage pools")?,
            monitors_in_quorum: gauge(
                "cluster_monitors_in_quorum",
                "Number of monitors in the live quorum",
            )?,
            nodes_total: gauge("cluster_nodes_total", "Number of nodes in the inventory")?,
            registered: AtomicBool::new(false),
        })
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    /// Register all three gauges or none of them
    fn register_collectors(&self) -> Result<()> {
        if self.is_registered() {
            return Ok(());
        }

        let collectors = [&self.pools_total, &self.monitors_in_quorum, &self.nodes_total];
        for (index, collector) in collectors.iter().enumerate() {
            if let Err(e) = self.registry.register(Box::new((*collector).clone())) {
                for registered in &collectors[..index] {
                    let _ = self.registry.unregister(Box::new((*registered).clone()));
                }
                return Err(Error::Internal(format!("metrics registration: {}", e)));
            }
        }

        self.registered.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Register the gauges once the cluster answers an admin connect
    pub async fn register(&self, access: &ClusterAccess, policy: &RetryPolicy) -> Result<()> {
        retry_with_limit(policy, "metrics registration", || async {
            let _conn = access.connect_once().await?;
            self.register_collectors()
        })
        .await?;

        info!("Cluster metrics registered");
        Ok(())
    }

    /// Re-read pool count, quorum size and node count
    pub async fn refresh(&self, access: &ClusterAccess) -> Result<()> {
        let nodes = list_nodes(access.context()).await?;
        self.nodes_total.set(nodes.len() as i64);

        let conn = access.connect_as_admin().await?;
        let pools = count_pools(conn.as_ref()).await?;
        let status = get_mon_status(conn.as_ref()).await?;

        self.pools_total.set(pools as i64);
        self.monitors_in_quorum.set(status.quorum.len() as i64);

        debug!(
            "Metrics refreshed: {} pools, {} in quorum, {} nodes",
            pools,
            status.quorum.len(),
            nodes.len()
        );
        Ok(())
    }

    /// Text exposition of every registered metric
    pub fn encode(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| Error::Internal(format!("metrics encoding: {}", e)))?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

/// Register, then refresh every `interval` for the life of the process
pub async fn run_metrics_task(
    metrics: Arc<ClusterMetrics>,
    access: Arc<ClusterAccess>,
    policy: RetryPolicy,
    interval: Duration,
) {
    if let Err(e) = metrics.register(&access, &policy).await {
        warn!("Giving up on metrics registration: {}", e);
        return;
    }

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if let Err(e) = metrics.refresh(&access).await {
            warn!("Metrics refresh failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::set_location;
    use crate::store::MemoryStore;
    use crate::testing::{
        access_with, access_with_connector, reply, two_pool_cluster, unexpected,
        CountingConnector, MON_STATUS_RESPONSE,
    };

    fn fast(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_registration_retries_until_cluster_answers() {
        let connector = Arc::new(CountingConnector::failing_first(1));
        let access =
            access_with_connector(Arc::new(MemoryStore::new()), connector.clone(), unexpected);
        let metrics = ClusterMetrics::new().unwrap();

        metrics.register(&access, &fast(5)).await.unwrap();

        assert_eq!(connector.attempts(), 2);
        assert!(metrics.is_registered());
        let (_, body) = metrics.encode().unwrap();
        assert!(String::from_utf8(body).unwrap().contains("cluster_pools_total"));
    }

    #[tokio::test]
    async fn test_registration_gives_up_after_budget() {
        let connector = Arc::new(CountingConnector::failing_first(u32::MAX));
        let access =
            access_with_connector(Arc::new(MemoryStore::new()), connector.clone(), unexpected);
        let metrics = ClusterMetrics::new().unwrap();

        assert!(metrics.register(&access, &fast(3)).await.is_err());
        assert_eq!(connector.attempts(), 3);
        assert!(!metrics.is_registered());
    }

    #[test]
    fn test_failed_registration_leaves_nothing_registered() {
        let metrics = ClusterMetrics::new().unwrap();
        let squatter = gauge("cluster_nodes_total", "Number of nodes in the inventory").unwrap();
        metrics.registry.register(Box::new(squatter.clone())).unwrap();

        assert!(metrics.register_collectors().is_err());
        assert!(!metrics.is_registered());
        let (_, body) = metrics.encode().unwrap();
        assert!(!String::from_utf8(body).unwrap().contains("cluster_pools_total"));

        metrics.registry.unregister(Box::new(squatter)).unwrap();
        metrics.register_collectors().unwrap();
        assert!(metrics.is_registered());
        let (_, body) = metrics.encode().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("cluster_pools_total"));
        assert!(text.contains("cluster_monitors_in_quorum"));
    }

    #[tokio::test]
    async fn test_refresh() {
        let store = Arc::new(MemoryStore::new());
        let access = access_with(store, |args| {
            if args.contains("mon_status") {
                reply(MON_STATUS_RESPONSE, "")
            } else {
                two_pool_cluster(args)
            }
        });
        set_location(access.context(), "node1", "rack=1").await.unwrap();

        let metrics = ClusterMetrics::new().unwrap();
        metrics.register(&access, &fast(1)).await.unwrap();
        metrics.refresh(&access).await.unwrap();

        let (_, body) = metrics.encode().unwrap();
        let text = String::from_utf8(body).unwrap();
        assert!(text.contains("cluster_pools_total 2"));
        assert!(text.contains("cluster_monitors_in_quorum 1"));
        assert!(text.contains("cluster_nodes_total 1"));
    }
}
