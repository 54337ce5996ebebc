//! Compiled build descriptors.

use serde::Serialize;
use tributary_core::spec::Plugin;

use crate::dockerfile::Dockerfile;

pub const DOCKERFILE_MOUNT_PATH: &str = "/dockerfile";
pub const PUSH_SECRET_MOUNT_PATH: &str = "/kaniko/.docker";
pub const NATIVE_RUN_POLICY: &str = "Serial";
pub const NATIVE_HISTORY_LIMIT: i32 = 5;

/// Where the built image goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BuildOutput {
    RegistryPush {
        image: String,
        push_secret: Option<String>,
    },
    ImageStream {
        image: String,
    },
}

impl BuildOutput {
    pub fn image(&self) -> &str {
        match self {
            BuildOutput::RegistryPush { image, .. } | BuildOutput::ImageStream { image } => image,
        }
    }
}

/// A generic container build step (registry push).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuilderStep {
    pub image: String,
    pub args: Vec<String>,
    /// Registry credentials mounted at [`PUSH_SECRET_MOUNT_PATH`].
    pub push_secret: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NativeOutputKind {
    DockerImage,
    ImageStreamTag,
}

impl NativeOutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NativeOutputKind::DockerImage => "DockerImage",
            NativeOutputKind::ImageStreamTag => "ImageStreamTag",
        }
    }
}

/// Data for a platform-native build pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativePipeline {
    pub output_kind: NativeOutputKind,
    pub output_name: String,
    pub push_secret: Option<String>,
    /// Pull secret for the base image.
    pub pull_secret: Option<String>,
    pub run_policy: &'static str,
    pub successful_builds_history_limit: i32,
    pub failed_builds_history_limit: i32,
}

/// The backend that runs the build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BuildBackend {
    Generic(BuilderStep),
    Native(NativePipeline),
}

/// Output of [`crate::compile`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildDescriptor {
    pub plugins: Vec<Plugin>,
    pub output: BuildOutput,
    /// Validated additional builder options.
    pub options: Vec<String>,
    pub dockerfile: Dockerfile,
    pub revision: String,
    pub backend: BuildBackend,
}
