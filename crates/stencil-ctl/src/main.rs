//! `stencil-ctl`: compile templates and write what they generate.

mod cli_config;
mod commands;
mod output;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "stencil-ctl", version, about = "Compile and run text templates")]
#[command(styles = output::clap_styles())]
pub(crate) struct Cli {
    /// Log pipeline progress (same as RUST_LOG=stencil=debug; RUST_LOG wins when set)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Compile one template and run it once
    Generate(GenerateArgs),

    /// Run every property set of a batch file
    Batch(BatchArgs),
}

/// Flags shared by both commands.
#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    /// Property-set XML applied before any other property source
    #[arg(short, long, value_name = "FILE")]
    pub properties: Option<PathBuf>,

    /// Property value, applied after the properties file (repeatable)
    #[arg(long = "property", value_name = "NAME=VALUE", value_parser = parse_property)]
    pub property: Vec<(String, String)>,

    /// Write generated text here instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub out: Option<PathBuf>,

    /// Print the numbered generated-source listing
    #[arg(long)]
    pub debug: bool,

    /// Keep compilation artifacts on disk after the run
    #[arg(long)]
    pub keep_temp_files: bool,
}

#[derive(Debug, Args)]
pub(crate) struct GenerateArgs {
    /// Template file to compile
    #[arg(short, long, value_name = "FILE")]
    pub template: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,
}

#[derive(Debug, Args)]
pub(crate) struct BatchArgs {
    /// Batch XML file listing property sets
    #[arg(short, long, value_name = "FILE")]
    pub batch: PathBuf,

    /// Template for property sets that name none (overrides <defaultTemplate>)
    #[arg(short, long, value_name = "FILE")]
    pub template: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

fn parse_property(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{arg}'")),
    }
}

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str = "stencil=warn,stencil_ctl=info";
const VERBOSE_LOG_FILTER: &str = "stencil=debug,stencil_ctl=info";

/// `RUST_LOG` wins when it is set; otherwise `--verbose` picks the default.
fn log_filter(verbose: bool, rust_log: Option<&str>) -> EnvFilter {
    match rust_log {
        Some(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ if verbose => EnvFilter::new(VERBOSE_LOG_FILTER),
        _ => EnvFilter::new(DEFAULT_LOG_FILTER),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.verbose, rust_log.as_deref()))
        .with_writer(std::io::stderr)
        .init();

    let result = cli_config::load_cli_config().and_then(|config| match cli.command {
        Commands::Generate(args) => commands::handle_generate_command(args, &config),
        Commands::Batch(args) => commands::handle_batch_command(args, &config),
    });

    if let Err(e) = result {
        output::error(format!("{e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
