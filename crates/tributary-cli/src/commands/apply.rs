//! Render component specs and apply them to the current cluster.

use anyhow::{Context, Result};
use futures::future::try_join_all;
use std::path::PathBuf;
use tributary_deployer::{KubernetesApplier, ResourceApplier};

use super::render::{RenderOptions, render_all};

pub async fn apply(paths: &[PathBuf], options: &RenderOptions) -> Result<()> {
    let rendered = render_all(paths, options)?;
    let applier = KubernetesApplier::new()
        .await
        .context("Failed to connect to Kubernetes")?;

    let reports = try_join_all(
        rendered
            .iter()
            .map(|r| applier.apply(&r.resources)),
    )
    .await
    .context("Failed to apply resources")?;

    for (rendered, report) in rendered.iter().zip(&reports) {
        println!(
            "{} {}: applied {} resources at {}",
            rendered.resources.component(),
            rendered.resources.cluster(),
            report.applied.len(),
            report.finished_at.to_rfc3339()
        );
        for resource in &report.applied {
            println!("  {} {}", resource.kind, resource.name);
        }
    }
    Ok(())
}
