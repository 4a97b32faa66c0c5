//! Tether CLI - diagnostics for the native engine bridge.

mod check_config;
mod colors;
mod self_test;
mod symbols;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Diagnostics for the tether native engine bridge")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Load an engine library and report which entry points resolve
    Symbols {
        /// Path to the engine's shared library (defaults to TETHER_LIBRARY)
        #[arg(short, long)]
        library: Option<PathBuf>,

        /// Symbol prefix of the engine
        #[arg(short, long)]
        prefix: Option<String>,

        /// Bridge configuration file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a bridge configuration file and print the resolved settings
    CheckConfig {
        /// Path to the configuration file (JSON)
        file: PathBuf,
    },

    /// Exercise the bridge end to end against the built-in fake engine
    SelfTest,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    // Helper to format tether-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(tether_err) = err.downcast_ref::<tether_core::Error>() {
            anyhow::anyhow!("{}", tether_err.with_hint())
        } else {
            err
        }
    };

    match cli.command {
        Commands::Symbols {
            library,
            prefix,
            config,
            json,
        } => {
            symbols::execute(library, prefix, config.as_deref(), json).map_err(format_error)?;
        }

        Commands::CheckConfig { file } => {
            check_config::execute(&file).map_err(format_error)?;
        }

        Commands::SelfTest => self_test::execute().map_err(format_error)?,
    }

    Ok(())
}
