//! Tributary CLI tool.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod authority;
mod commands;

use commands::render::{OutputFormat, RenderOptions};

#[derive(Parser)]
#[command(name = "tributary")]
#[command(about = "Render and apply Tributary managed components", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RenderArgs {
    /// Component spec files
    #[arg(required = true)]
    specs: Vec<PathBuf>,

    /// Operator configuration (KDL). Defaults to the environment.
    #[arg(long, env = "TRIBUTARY_OPERATOR_CONFIG")]
    operator_config: Option<PathBuf>,

    /// Previously applied secrets (JSON array)
    #[arg(long)]
    state: Option<PathBuf>,

    /// Allow certificate renewal in this pass
    #[arg(long)]
    maintenance_window: bool,

    /// Generation of the signing authority
    #[arg(long, default_value = "1")]
    ca_generation: u64,

    /// Builder option accepted in build specs; replaces the default allow-list
    #[arg(long = "allowed-build-option")]
    allowed_build_options: Vec<String>,
}

impl RenderArgs {
    fn options(&self) -> RenderOptions {
        RenderOptions {
            operator_config: self.operator_config.clone(),
            state: self.state.clone(),
            maintenance_window: self.maintenance_window,
            ca_generation: self.ca_generation,
            allowed_build_options: self.allowed_build_options.clone(),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render resource descriptors to stdout
    Render {
        #[command(flatten)]
        args: RenderArgs,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    /// Validate component specs
    Validate {
        #[command(flatten)]
        args: RenderArgs,
    },
    /// Render and apply to the current cluster
    Apply {
        #[command(flatten)]
        args: RenderArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render { args, format } => {
            commands::render::render(&args.specs, &args.options(), format)?;
        }
        Commands::Validate { args } => {
            commands::validate::validate(&args.specs, &args.options())?;
        }
        Commands::Apply { args } => {
            commands::apply::apply(&args.specs, &args.options()).await?;
        }
    }

    Ok(())
}
