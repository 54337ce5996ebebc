//! Cluster context supplied alongside each component specification.

use serde::{Deserialize, Serialize};

/// Facts about the target cluster that are not part of the component spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterContext {
    pub namespace: String,
    /// Selected platform version; falls back to the operator default.
    pub platform_version: Option<String>,
    #[serde(default)]
    pub storage: StorageTopology,
    /// Whether the platform offers native build pipelines.
    #[serde(default)]
    pub native_build_supported: bool,
}

impl ClusterContext {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            platform_version: None,
            storage: StorageTopology::default(),
            native_build_supported: false,
        }
    }
}

/// Broker storage layout of the managed cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum StorageTopology {
    Ephemeral { size_limit: Option<String> },
    PersistentClaim { size: String },
    Jbod { volumes: Vec<StorageVolume> },
}

impl Default for StorageTopology {
    fn default() -> Self {
        StorageTopology::Ephemeral { size_limit: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageVolume {
    pub id: u32,
    pub size: String,
}
