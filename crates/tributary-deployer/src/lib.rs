//! Apply backends for Tributary.
//!
//! Provides applier implementations:
//! - Kubernetes (server-side apply)

pub mod kubernetes;

pub use kubernetes::KubernetesApplier;
pub use tributary_core::applier::{AppliedResource, ApplyReport, ResourceApplier};
