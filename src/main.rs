//! tola-bundle - inspect and watch asset bundles from the command line.

mod cli;

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use tola_bundle::config::{BundleConfig, find_config_file};
use tola_bundle::{debug, logger};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    let cwd = std::env::current_dir().context("Failed to get current working directory")?;
    let config_path = find_config_file(&cli.config, &cwd)
        .with_context(|| format!("config file `{}` not found", cli.config.display()))?;
    let config = BundleConfig::load(&config_path)?;
    debug!("config"; "loaded {}", config.config_path.display());

    let pipeline = Arc::new(config.build_pipeline()?);

    match &cli.command {
        Commands::List => cli::list::run_list(&pipeline, &mut io::stdout().lock()),
        Commands::Get { args } => {
            let mut out = io::stdout().lock();
            cli::get::run_get(&pipeline, args, &mut out)?;
            out.flush()?;
            Ok(())
        }
        Commands::Watch { routes, debounce } => {
            cli::watch::run_watch(pipeline, routes, Duration::from_millis(*debounce))
        }
    }
}
