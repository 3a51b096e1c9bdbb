//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Bundle, minify and cache web assets
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path, searched upward from the current directory
    #[arg(short = 'C', long, default_value = "bundle.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// Enable verbose output for debugging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List configured bundles
    #[command(visible_alias = "l")]
    List,

    /// Print the content served for a route
    #[command(visible_alias = "g")]
    Get {
        #[command(flatten)]
        args: GetArgs,
    },

    /// Rebuild bundles whenever their sources change
    #[command(visible_alias = "w")]
    Watch {
        /// Routes to keep warm (default: every bundle)
        #[arg(value_name = "ROUTE")]
        routes: Vec<String>,

        /// Quiet period before rebuilding, in milliseconds
        #[arg(long, default_value_t = 300)]
        debounce: u64,
    },
}

/// Get command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct GetArgs {
    /// Route to execute, e.g. `/site.css`
    pub route: String,

    /// Request context entry, e.g. `--context encoding=br`
    #[arg(short, long = "context", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub context: Vec<(String, String)>,

    /// Print a JSON object with content, files and fingerprint
    #[arg(long)]
    pub json: bool,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    if key.is_empty() {
        return Err(format!("empty key in `{s}`"));
    }
    Ok((key.to_string(), value.to_string()))
}
