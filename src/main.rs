use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use autoiso::cli::Cli;
use autoiso::config::BuildConfig;
use autoiso::core::{IsoModifier, Outcome};

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("autoiso={},warn", log_level)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(&cli) {
        Ok(Outcome::Unchanged { source }) => {
            info!("Source ISO left unchanged: {}", source.display());
        }
        Ok(Outcome::Written { output, .. }) => {
            info!("✓ Custom ISO ready: {}", output.display());
        }
        Err(e) => {
            error!("✗ {:#}", e);
            std::process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> Result<Outcome> {
    info!("autoiso v{} starting", env!("CARGO_PKG_VERSION"));

    let config = BuildConfig::from_cli(cli).context("Invalid arguments")?;
    let modifier = IsoModifier::from_config(&config);
    let outcome = modifier
        .modify_iso(&config)
        .with_context(|| format!("Failed to build {}", config.output.display()))?;
    Ok(outcome)
}
