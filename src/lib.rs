pub mod analysis;
pub mod classify;
pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod grouping;
pub mod ingest;
pub mod io_utils;
pub mod model;
pub mod naming;
pub mod normalize;
pub mod policy;
pub mod removal;
pub mod report;
pub mod risk;

use std::{env, sync::OnceLock};

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};

use crate::{
    cli::{Cli, Commands},
    config::ReconcileConfig,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("ci_reconcile", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => analysis::execute(&args),
        Commands::Diff(args) => diff::execute(&args),
        Commands::Config(args) => handle_config(&args),
    }
}

fn handle_config(args: &cli::ConfigArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "{:?} already exists; pass --force to overwrite it",
            args.output
        );
    }
    ReconcileConfig::default()
        .save(&args.output)
        .with_context(|| format!("Writing configuration to {:?}", args.output))?;
    info!("Default configuration written to {:?}", args.output);
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
