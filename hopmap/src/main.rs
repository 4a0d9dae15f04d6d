use anyhow::{Result, bail};
use colored::Colorize;
use commands::command_argument_builder;
use hopmap::handlers::{
    handle_analyze, handle_export, handle_import, handle_show_paths, load_config,
    load_domains_from_source,
};
use hopmap_core::Analyzer;
use std::path::PathBuf;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod commands;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let matches = command_argument_builder().get_matches();
    init_tracing(matches.get_flag("verbose"));

    let config = load_config(matches.get_one::<PathBuf>("config"))?;

    // Export and import short-circuit analysis
    if let Some(path) = matches.get_one::<PathBuf>("export-db") {
        let mut store = config.store();
        handle_export(&mut store, path)?;
        store.close()?;
        return Ok(());
    }
    if let Some(path) = matches.get_one::<PathBuf>("import-db") {
        let mut store = config.store();
        handle_import(&mut store, path)?;
        store.close()?;
        return Ok(());
    }

    let positional: Vec<String> = matches
        .get_many::<String>("DOMAINS")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let domains = load_domains_from_source(&positional, matches.get_one::<PathBuf>("domains-file"))?;
    let show_paths = matches.get_flag("show-paths");

    if domains.is_empty() && !show_paths {
        bail!("No domains given. Pass DOMAINS, --domains-file or --show-paths");
    }

    let mut analyzer = Analyzer::from_config(&config);
    if !domains.is_empty() {
        let summary = handle_analyze(&mut analyzer, &domains, true).await;
        if summary.skipped() == domains.len() {
            warn!("Every domain was skipped");
        }
    }
    if show_paths {
        handle_show_paths(analyzer.store())?;
    }

    analyzer.close()?;
    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
