//! Premium disk performance tiers.

use std::fmt::{Display, Formatter};

use log::debug;
use sapmon_core::{Error, Result};

use crate::{StorageAccountRef, StorageManagementClient};

const GIB: u64 = 1024 * 1024 * 1024;

/// Guaranteed performance of a premium disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceTier {
    /// Tier name, for example `P10`.
    pub name: &'static str,
    /// Guaranteed IOPS.
    pub iops: u32,
    /// Guaranteed throughput in MB/s.
    pub throughput_mbps: u32,
}

impl PerformanceTier {
    pub const P10: PerformanceTier = PerformanceTier {
        name: "P10",
        iops: 500,
        throughput_mbps: 100,
    };
    pub const P20: PerformanceTier = PerformanceTier {
        name: "P20",
        iops: 2300,
        throughput_mbps: 150,
    };
    pub const P30: PerformanceTier = PerformanceTier {
        name: "P30",
        iops: 5000,
        throughput_mbps: 200,
    };

    /// Tier of a disk of `size_gb` GB.
    pub fn for_size_gb(size_gb: u64) -> Result<Self> {
        match size_gb {
            0..=128 => Ok(Self::P10),
            129..=512 => Ok(Self::P20),
            513..=1024 => Ok(Self::P30),
            _ => Err(Error::tier(format!(
                "unknown disk size tier for {size_gb} GB"
            ))),
        }
    }

    /// Tier of a disk of `size_bytes` bytes, rounded down to whole GB.
    pub fn for_size_bytes(size_bytes: u64) -> Result<Self> {
        Self::for_size_gb(size_bytes / GIB)
    }
}

impl Display for PerformanceTier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} IOPS, {} MB/s)",
            self.name, self.iops, self.throughput_mbps
        )
    }
}

/// DiskSizer finds the performance tier of a premium disk.
#[derive(Debug, Clone)]
pub struct DiskSizer {
    client: StorageManagementClient,
}

impl DiskSizer {
    /// Create a new sizer.
    pub fn new(client: StorageManagementClient) -> Self {
        Self { client }
    }

    /// Tier of the disk stored at `blob_uri`.
    ///
    /// The declared size wins when present; otherwise the blob is probed.
    pub async fn tier(
        &self,
        account: &StorageAccountRef,
        blob_uri: &str,
        declared_size_gb: Option<u64>,
    ) -> Result<PerformanceTier> {
        if let Some(size_gb) = declared_size_gb {
            return PerformanceTier::for_size_gb(size_gb);
        }

        let size = self.client.head_blob(account, blob_uri).await?;
        debug!("disk {blob_uri} has {size} bytes");
        PerformanceTier::for_size_bytes(size).map_err(|e| e.with_context(blob_uri))
    }
}
