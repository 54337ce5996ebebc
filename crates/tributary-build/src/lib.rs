//! Build descriptor compilation for Tributary.
//!
//! A build request is validated, rendered into a Dockerfile and dispatched
//! to one of two backends:
//! - a generic container build step that pushes to a registry
//! - a platform-native build pipeline

pub mod compiler;
pub mod descriptor;
pub mod dockerfile;

pub use compiler::{compile, BuildCompiler, BuildEnvironment};
pub use descriptor::{BuildBackend, BuildDescriptor, BuildOutput, BuilderStep, NativePipeline};
pub use dockerfile::Dockerfile;
