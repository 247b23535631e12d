//! Leakscope CLI entry point

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "leakscope")]
#[command(about = "Memory leak detection from object-graph snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Project root holding leakscope.toml and the .leakscope cache (defaults to current directory)
    #[arg(short, long, default_value = ".")]
    root: PathBuf,

    /// Config file (defaults to <root>/leakscope.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the number of snapshots fitted per site
    #[arg(long)]
    window: Option<usize>,

    /// Override the number of snapshots kept in the store
    #[arg(long)]
    retention: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a recorded trace into the snapshot cache
    Collect {
        /// Trace file (JSON)
        trace: PathBuf,

        /// Stop after this many snapshots
        #[arg(short, long)]
        frames: Option<usize>,
    },
    /// Analyze cached snapshots and print suspected leaks
    Report {
        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: ReportFormat,

        /// Write the report here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Collect continuously from a trace, re-running detection on every snapshot
    Watch {
        /// Trace file (JSON)
        trace: PathBuf,

        /// Sampling interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,
    },
    /// Clear the snapshot cache
    Clear,
    /// Show version
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ReportFormat {
    Json,
    Table,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!("leakscope={}", log_level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::debug!("Leakscope v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("Project root: {}", cli.root.display());

    let overrides = commands::Overrides {
        config: cli.config,
        window: cli.window,
        retention: cli.retention,
    };

    match cli.command {
        Commands::Collect { trace, frames } => {
            commands::collect(cli.root, &overrides, trace, frames).await
        }
        Commands::Report { format, output } => {
            commands::report(cli.root, &overrides, format, output)
        }
        Commands::Watch { trace, interval } => {
            commands::watch(cli.root, &overrides, trace, interval).await
        }
        Commands::Clear => {
            commands::clear(cli.root)
        }
        Commands::Version => {
            println!("Leakscope v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
