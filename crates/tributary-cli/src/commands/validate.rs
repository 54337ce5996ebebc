//! Validate component specs without emitting resources.

use anyhow::Result;
use std::path::PathBuf;

use super::render::{RenderOptions, render_all};

pub fn validate(paths: &[PathBuf], options: &RenderOptions) -> Result<()> {
    match render_all(paths, options) {
        Ok(rendered) => {
            for (path, rendered) in paths.iter().zip(&rendered) {
                for warning in &rendered.warnings {
                    println!("{}: warning at {}: {}", path.display(), warning.field, warning.message);
                }
            }
            println!("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    }
}
