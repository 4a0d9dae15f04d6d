use anyhow::{Context, Result, bail};
use colored::Colorize;
use hopmap_core::codec::{export_to_file, import_from_file};
use hopmap_core::config::{Config, DEFAULT_CONFIG_PATH};
use hopmap_core::report::generate_path_report;
use hopmap_core::{AnalysisOptions, AnalysisSummary, Analyzer, DomainOutcome, GraphStore};
use std::fs;
use std::path::{Path, PathBuf};

/// Load domains from the domains file if given, otherwise use the positional
/// arguments.
pub fn load_domains_from_source(
    domains: &[String],
    domains_file: Option<&PathBuf>,
) -> Result<Vec<String>> {
    if let Some(path) = domains_file {
        return load_domains_from_file(path);
    }
    Ok(domains.iter().filter_map(|d| parse_domain_line(d)).collect())
}

/// Load domains from a newline-delimited file
pub fn load_domains_from_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read domains file {}", path.display()))?;

    let domains: Vec<String> = content.lines().filter_map(parse_domain_line).collect();
    if domains.is_empty() {
        bail!("No domains found in {}", path.display());
    }
    Ok(domains)
}

/// Blank lines and `#` comments yield `None`.
pub fn parse_domain_line(line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.to_string())
}

pub fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    let (path, explicit) = match path {
        Some(path) => (path.as_path(), true),
        None => (Path::new(DEFAULT_CONFIG_PATH), false),
    };
    Config::load_or_default(path, explicit)
        .with_context(|| format!("Failed to load config {}", path.display()))
}

fn print_divider() {
    println!("{}", "═".repeat(60).bright_blue().bold());
}

pub fn handle_export(store: &mut GraphStore, path: &Path) -> Result<()> {
    let document = export_to_file(store, path)
        .with_context(|| format!("Failed to export graph to {}", path.display()))?;
    println!(
        "{} Exported {} nodes and {} relationships to {}",
        "✓".green().bold(),
        document.nodes.len(),
        document.relationships.len(),
        path.display().to_string().bright_white()
    );
    Ok(())
}

pub fn handle_import(store: &mut GraphStore, path: &Path) -> Result<()> {
    let summary = import_from_file(store, path)
        .with_context(|| format!("Failed to import graph from {}", path.display()))?;
    println!(
        "{} Imported {} nodes and {} relationships from {}",
        "✓".green().bold(),
        summary.nodes,
        summary.relationships,
        path.display().to_string().bright_white()
    );
    Ok(())
}

pub async fn handle_analyze(
    analyzer: &mut Analyzer,
    domains: &[String],
    show_progress: bool,
) -> AnalysisSummary {
    print_divider();
    println!("{}", "  HOPMAP PATH DISCOVERY".bright_white().bold());
    print_divider();
    println!(
        "{} Analyzing {} domain(s)\n",
        "→".blue(),
        domains.len().to_string().bright_white()
    );

    let summary = analyzer
        .analyze_domains(domains, AnalysisOptions { show_progress })
        .await;

    for (domain, outcome) in &summary.outcomes {
        match outcome {
            DomainOutcome::Stored { hops } => println!(
                "  {} {} ({} hops)",
                "✓".green().bold(),
                domain.bright_white(),
                hops
            ),
            DomainOutcome::NoPath => println!(
                "  {} {} (no path found)",
                "•".yellow(),
                domain.bright_white()
            ),
            DomainOutcome::Skipped(reason) => println!(
                "  {} {} ({})",
                "✗".red().bold(),
                domain.bright_white(),
                reason.dimmed()
            ),
        }
    }
    println!();
    summary
}

pub fn handle_show_paths(store: &mut GraphStore) -> Result<()> {
    let map = store.all_paths().context("Failed to read stored paths")?;
    let paths: Vec<_> = map.paths().collect();
    print!("{}", generate_path_report(&paths));
    Ok(())
}
