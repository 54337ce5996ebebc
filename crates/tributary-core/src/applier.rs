//! Apply boundary.
//!
//! Appliers take a synthesized [`ResourceSet`] and make the target cluster
//! match it. Retry, backoff and diffing live behind this trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::ResourceSet;
use crate::Result;

/// A resource the applier touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedResource {
    pub kind: String,
    pub name: String,
}

/// Outcome of one apply call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyReport {
    pub applied: Vec<AppliedResource>,
    pub finished_at: DateTime<Utc>,
}

/// Trait for apply backends.
#[async_trait]
pub trait ResourceApplier: Send + Sync {
    /// Name of this applier.
    fn name(&self) -> &'static str;

    /// Apply every resource in the set. Either all resources are submitted or
    /// an error is returned for the first failure.
    async fn apply(&self, resources: &ResourceSet) -> Result<ApplyReport>;
}
