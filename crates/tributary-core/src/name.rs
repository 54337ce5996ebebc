//! Resource naming.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Name of a generated resource, always derived from the owning cluster name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct ResourceName(String);

impl ResourceName {
    /// `<cluster>-<suffix>`
    pub fn new(cluster: &str, suffix: &str) -> Self {
        Self(format!("{}-{}", cluster, suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ResourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<ResourceName> for String {
    fn from(name: ResourceName) -> Self {
        name.0
    }
}
