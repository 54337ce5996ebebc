//! CLI command implementations.

pub mod apply;
pub mod render;
pub mod validate;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use serde::Deserialize;
use std::path::Path;
use tributary_config::OperatorConfig;
use tributary_core::context::ClusterContext;
use tributary_core::spec::ComponentSpec;
use tributary_credentials::PriorCredentials;

/// One input document: the component and the cluster it runs in.
#[derive(Debug, Deserialize)]
pub struct RenderInput {
    pub spec: ComponentSpec,
    pub context: ClusterContext,
}

pub fn load_input(path: &Path) -> Result<RenderInput> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read spec file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse spec file: {}", path.display()))
}

/// Operator configuration from a KDL file, or from the environment.
pub fn load_operator_config(path: Option<&Path>) -> Result<OperatorConfig> {
    let Some(path) = path else {
        return OperatorConfig::from_env()
            .context("Failed to read operator config from the environment");
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read operator config: {}", path.display()))?;
    tributary_config::parse_operator_config(&content)
        .with_context(|| format!("Failed to parse operator config: {}", path.display()))
}

/// Prior credential material from a JSON array of previously applied secrets.
pub fn load_prior(path: Option<&Path>) -> Result<PriorCredentials> {
    let Some(path) = path else {
        return Ok(PriorCredentials::new());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state file: {}", path.display()))?;
    let secrets: Vec<Secret> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
    Ok(PriorCredentials::from_secrets(&secrets))
}
