//! Local Disk Discovery
//!
//! Enumerates whole block devices from sysfs and reports them, together with
//! the node's addresses and location, into the inventory.

use crate::domain::ClusterContext;
use crate::error::{Error, Result};
use crate::inventory::{report_node, Disk, NodeReport, DISK_TYPE};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Configuration for the disk scanner
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Include loopback devices
    pub include_loopback: bool,
    /// Include RAM disks
    pub include_ram: bool,
    /// Include device mapper devices
    pub include_dm: bool,
    /// Minimum device size to include (bytes)
    pub min_size_bytes: u64,
    /// Path to sysfs (for testing)
    pub sysfs_path: PathBuf,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            include_loopback: false,
            include_ram: false,
            include_dm: false,
            min_size_bytes: 0,
            sysfs_path: PathBuf::from("/sys"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiskScanner {
    config: ScannerConfig,
}

impl DiskScanner {
    pub fn new(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Scan sysfs for whole disks, sorted by name
    pub fn scan(&self) -> Result<Vec<Disk>> {
        let block_path = self.config.sysfs_path.join("class/block");
        if !block_path.exists() {
            return Err(Error::Configuration(format!(
                "block device sysfs not found at {}",
                block_path.display()
            )));
        }

        let mut disks = Vec::new();
        for entry in fs::read_dir(&block_path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            if !self.should_include_device(&name) || is_partition(&entry.path()) {
                continue;
            }

            match self.scan_device(&entry.path(), &name) {
                Ok(disk) if disk.size >= self.config.min_size_bytes => disks.push(disk),
                Ok(disk) => debug!("Skipping {}: {} bytes below minimum", name, disk.size),
                Err(e) => warn!("Skipping {}: {}", name, e),
            }
        }

        disks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(disks)
    }

    fn scan_device(&self, sysfs_path: &Path, name: &str) -> Result<Disk> {
        let size = read_sysfs_attr(sysfs_path, "size")?;
        let sectors: u64 = size
            .trim()
            .parse()
            .map_err(|_| Error::malformed(format!("size of {}", name), size.trim()))?;

        let rotational = read_sysfs_attr(sysfs_path, "queue/rotational")
            .map(|r| r.trim() == "1")
            .unwrap_or(false);

        Ok(Disk {
            name: name.to_string(),
            disk_type: DISK_TYPE.to_string(),
            size: sectors * 512,
            rotational,
            empty: !has_partitions(sysfs_path, name) && !has_holders(sysfs_path),
        })
    }

    fn should_include_device(&self, name: &str) -> bool {
        if !self.config.include_loopback && name.starts_with("loop") {
            return false;
        }
        if !self.config.include_ram && name.starts_with("ram") {
            return false;
        }
        if !self.config.include_dm && name.starts_with("dm-") {
            return false;
        }
        !(name.starts_with("md") || name.starts_with("zram") || name.starts_with("sr"))
    }
}

fn read_sysfs_attr(base_path: &Path, attr: &str) -> Result<String> {
    let path = base_path.join(attr);
    fs::read_to_string(&path)
        .map_err(|e| Error::Internal(format!("failed to read {}: {}", path.display(), e)))
}

/// Partitions carry a `partition` attribute
fn is_partition(sysfs_path: &Path) -> bool {
    sysfs_path.join("partition").exists()
}

fn has_partitions(sysfs_path: &Path, name: &str) -> bool {
    let Ok(entries) = fs::read_dir(sysfs_path) else {
        return false;
    };
    entries.flatten().any(|entry| {
        entry.file_name().to_string_lossy().starts_with(name) && is_partition(&entry.path())
    })
}

fn has_holders(sysfs_path: &Path) -> bool {
    fs::read_dir(sysfs_path.join("holders"))
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

// =============================================================================
// Reporter
// =============================================================================

/// Identity of the node this process runs on
#[derive(Debug, Clone, Default)]
pub struct LocalNode {
    pub node_id: String,
    pub public_ip: String,
    pub private_ip: String,
    pub location: String,
}

/// Scan the local disks and record them under the node's inventory key
pub async fn report_local_node(
    context: &ClusterContext,
    node: &LocalNode,
    scanner: &DiskScanner,
) -> Result<usize> {
    let scanner = scanner.clone();
    let disks = tokio::task::spawn_blocking(move || scanner.scan())
        .await
        .map_err(|e| Error::Internal(format!("disk scan task failed: {}", e)))??;

    let count = disks.len();
    report_node(
        context,
        &NodeReport {
            node_id: node.node_id.clone(),
            public_ip: node.public_ip.clone(),
            private_ip: node.private_ip.clone(),
            location: node.location.clone(),
            disks,
        },
    )
    .await?;
    Ok(count)
}

/// Report the local node every `interval` until the process exits
pub async fn run_reporter(
    context: Arc<ClusterContext>,
    node: LocalNode,
    scanner: DiskScanner,
    interval: Duration,
) {
    info!(
        "Reporting node {} every {:?}",
        node.node_id, interval
    );
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match report_local_node(&context, &node, &scanner).await {
            Ok(count) => debug!("Reported {} disks for node {}", count, node.node_id),
            Err(e) => warn!("Node report failed: {}", e),
        }
    }
}
