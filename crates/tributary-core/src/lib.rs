//! Core data model and traits for Tributary.
//!
//! This crate contains:
//! - Component specifications and template overlays
//! - Cluster context
//! - Credential material and the signing capability trait
//! - Resource sets and the apply boundary
//! - The error taxonomy shared by every stage of the pipeline

pub mod applier;
pub mod context;
pub mod credential;
pub mod error;
pub mod name;
pub mod resource;
pub mod spec;
pub mod template;

pub use error::{Error, Result};
pub use name::ResourceName;
