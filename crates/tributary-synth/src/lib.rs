//! Resource synthesis for Tributary.
//!
//! This crate handles:
//! - Template overlay resolution (labels, annotations, env, affinity)
//! - The shared component model and its workload capabilities
//! - Per-component models: balancer, bridge, mirror and plugin build
//! - The pure `synthesize` step and the end-to-end render pipeline

pub mod auth;
pub mod balancer;
pub mod bridge;
pub mod build;
pub mod jvm;
pub mod labels;
pub mod mirror;
pub mod model;
pub mod overlay;
pub mod pipeline;
pub mod synthesizer;

#[cfg(test)]
mod fixtures;

pub use model::{ComponentModel, Workload};
pub use pipeline::{Pipeline, RenderRequest, Rendered};
pub use synthesizer::{synthesize, SynthesisInput};
