//! Compute instance model

use serde::{Deserialize, Serialize};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// Wire record for one entry of the KaaS ship listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Ship {
    #[serde(alias = "Id")]
    pub id: String,
    pub fqdn: String,
    pub name: String,
    pub public_ip: String,
    pub server_plan_id: String,
    /// Number of cores
    pub cpus: f64,
    /// RAM in MiB
    pub memory: u64,
    /// Disk in GiB
    pub storage: u64,
}

/// A compute instance as seen by the provider
///
/// The instance name is its fqdn; the orchestrator uses it as the host identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub address: String,
    pub cpus: f64,
    pub memory_bytes: u64,
    pub storage_bytes: u64,
}

impl From<Ship> for Instance {
    fn from(ship: Ship) -> Self {
        Self {
            id: ship.id,
            name: ship.fqdn,
            address: ship.public_ip,
            cpus: ship.cpus,
            memory_bytes: ship.memory.saturating_mul(MIB),
            storage_bytes: ship.storage.saturating_mul(GIB),
        }
    }
}

impl Instance {
    /// CPU capacity in millicores, truncated
    pub fn cpu_millicores(&self) -> u64 {
        (self.cpus * 1000.0) as u64
    }

    pub fn memory_mib(&self) -> u64 {
        self.memory_bytes / MIB
    }

    pub fn storage_gib(&self) -> u64 {
        self.storage_bytes / GIB
    }
}
