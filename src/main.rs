//! Addon host
//!
//! Loads a host configuration, starts its addons in dependency order and
//! stops them in reverse on SIGINT/SIGTERM.
//!
//! ```text
//! addon-host --config host.toml          # same as `run`
//! addon-host --config host.toml check    # validate, print start order
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use addon_host::addons::FactoryRegistry;
use addon_host::config::load_config;
use addon_host::lifecycle::{build_manager, start_order, wait_for_signal};
use addon_host::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "addon-host")]
#[command(about = "Starts addons in dependency order and serves their TCP endpoints", long_about = None)]
struct Cli {
    /// Host configuration file (TOML).
    #[arg(short, long, default_value = "addon-host.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start all addons and run until SIGINT/SIGTERM
    Run,
    /// Validate the configuration and print the start order
    Check,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Check => {
            let order = start_order(&config)?;
            println!("{}: {} addon(s)", cli.config.display(), order.len());
            for (position, id) in order.iter().enumerate() {
                println!("{:>3}. {}", position + 1, id);
            }
        }
        Commands::Run => {
            logging::init_logging(&config.observability)?;
            tracing::info!(config = %cli.config.display(), "addon-host v{} starting", env!("CARGO_PKG_VERSION"));

            if config.observability.metrics_enabled {
                // Address already checked by config validation.
                let addr = config.observability.metrics_address.parse()?;
                metrics::init_metrics(addr)?;
            }

            let manager = build_manager(&config, &FactoryRegistry::with_builtins())?;
            manager.start().await?;

            let signal = wait_for_signal().await?;
            tracing::info!(%signal, "Shutdown signal received");

            manager.stop().await?;
            tracing::info!("Shutdown complete");
        }
    }

    Ok(())
}
