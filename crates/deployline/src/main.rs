//! deployline — build pipelines and canary rollouts from one config file.
//!
//! # Usage
//!
//! ```text
//! deployline init --name blog
//! deployline validate --config deployline.toml
//! deployline run --config deployline.toml --data-dir .deployline
//! deployline plan --preset Linear10PercentEvery1Minute
//! deployline serve --port 8080 --config deployline.toml
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod provisioner;

#[derive(Parser)]
#[command(
    name = "deployline",
    about = "Deployline — pipelines and progressive delivery",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a starter deployline.toml.
    Init {
        /// Directory to write into.
        #[arg(short, long, default_value = ".")]
        path: PathBuf,
        /// Deployable unit name.
        #[arg(short, long)]
        name: String,
    },
    /// Check the pipeline, canary plan and alarm without running anything.
    Validate {
        #[arg(short, long, default_value = "deployline.toml")]
        config: PathBuf,
    },
    /// Run the pipeline once.
    Run {
        #[arg(short, long, default_value = "deployline.toml")]
        config: PathBuf,
        /// Holds the artifact store and action work directories.
        #[arg(long, default_value = ".deployline")]
        data_dir: PathBuf,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Show the traffic steps of a canary plan.
    Plan {
        /// Read `[deployment]` from this config.
        #[arg(short, long, conflicts_with = "preset")]
        config: Option<PathBuf>,
        /// A named preset instead of a config file.
        #[arg(short, long)]
        preset: Option<String>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Serve the rollout control plane.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,
        /// Create the unit's alias from its latest built artifact.
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = ".deployline")]
        data_dir: PathBuf,
        /// Datapoints older than this many seconds are dropped.
        #[arg(long, default_value = "3600")]
        metrics_retention: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,deployline=debug"))?,
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Init { path, name } => commands::init::init(&path, &name),
        Command::Validate { config } => commands::validate::validate(&config),
        Command::Run {
            config,
            data_dir,
            format,
        } => commands::run::run(&config, &data_dir, &format).await,
        Command::Plan {
            config,
            preset,
            format,
        } => commands::plan::plan(config.as_deref(), preset.as_deref(), &format),
        Command::Serve {
            port,
            config,
            data_dir,
            metrics_retention,
        } => commands::serve::serve(port, config.as_deref(), &data_dir, metrics_retention).await,
    }
}
