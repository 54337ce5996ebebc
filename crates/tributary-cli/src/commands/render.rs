//! Render component specs to resource descriptors.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use tributary_build::BuildCompiler;
use tributary_core::resource::ResourceSet;
use tributary_synth::{Pipeline, RenderRequest, Rendered};

use super::{load_input, load_operator_config, load_prior};
use crate::authority::LocalAuthority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

/// Options shared by every command that renders.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub operator_config: Option<PathBuf>,
    pub state: Option<PathBuf>,
    pub maintenance_window: bool,
    pub ca_generation: u64,
    pub allowed_build_options: Vec<String>,
}

/// Render each input file in order.
pub fn render_all(paths: &[PathBuf], options: &RenderOptions) -> Result<Vec<Rendered>> {
    let operator = load_operator_config(options.operator_config.as_deref())?;
    let prior = load_prior(options.state.as_deref())?;
    let authority = LocalAuthority::new("tributary-cluster-ca", options.ca_generation)
        .context("Failed to create signing authority")?;
    let mut pipeline = Pipeline::new(&operator, &authority);
    if !options.allowed_build_options.is_empty() {
        pipeline = pipeline.with_compiler(BuildCompiler::with_allowed_options(
            options.allowed_build_options.iter().map(String::as_str),
        ));
    }

    paths
        .iter()
        .map(|path| render_one(&pipeline, path, &prior, options.maintenance_window))
        .collect()
}

fn render_one(
    pipeline: &Pipeline<'_>,
    path: &Path,
    prior: &tributary_credentials::PriorCredentials,
    maintenance_window: bool,
) -> Result<Rendered> {
    let input = load_input(path)?;
    let rendered = pipeline
        .render(&RenderRequest {
            spec: &input.spec,
            context: &input.context,
            prior,
            maintenance_window_open: maintenance_window,
        })
        .with_context(|| format!("Failed to render {}", path.display()))?;

    if let Some(state) = rendered.certificate {
        info!(path = %path.display(), certificate = ?state, "certificate state");
    }
    Ok(rendered)
}

fn to_yaml(resources: &ResourceSet) -> Result<String> {
    let mut out = String::new();
    for resource in resources {
        out.push_str("---\n");
        out.push_str(&serde_yaml::to_string(resource)?);
    }
    Ok(out)
}

pub fn render(paths: &[PathBuf], options: &RenderOptions, format: OutputFormat) -> Result<()> {
    for rendered in render_all(paths, options)? {
        let text = match format {
            OutputFormat::Json => rendered.resources.to_json()?,
            OutputFormat::Yaml => to_yaml(&rendered.resources)?,
        };
        println!("{}", text);
    }
    Ok(())
}
