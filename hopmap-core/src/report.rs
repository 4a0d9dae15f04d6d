// Text rendering of stored domain paths

use crate::map::{HopRecord, PathRecord};
use colored::Colorize;
use std::collections::BTreeSet;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

pub fn generate_path_report(paths: &[PathRecord]) -> String {
    let mut report = String::new();

    report.push_str(&format!("{}\n", RULE.bright_blue()));
    report.push_str(&format!("{}\n", "  NETWORK PATHS".bright_white().bold()));
    report.push_str(&format!("{}\n\n", RULE.bright_blue()));

    if paths.is_empty() {
        report.push_str(&format!("{}\n", "No stored paths found.".yellow()));
        return report;
    }

    for (idx, path) in paths.iter().enumerate() {
        let target = path.target_ip.as_deref().unwrap_or("unresolved");
        let terminal = path.terminal().map_or("nowhere", |hop| hop.address.as_str());
        report.push_str(&format!(
            "[{}] {} ({}) - {} hops, ends at {}\n",
            idx + 1,
            path.domain.bright_white().bold(),
            target.cyan(),
            path.hops.len(),
            terminal.yellow()
        ));

        for (hop_idx, hop) in path.hops.iter().enumerate() {
            report.push_str(&format!(
                "  {:>2}. {:<15} {}\n",
                hop_idx + 1,
                hop.address.green(),
                describe_hop(hop).dimmed()
            ));
        }
        report.push('\n');
    }

    let domains: BTreeSet<_> = paths.iter().map(|p| p.domain.as_str()).collect();
    report.push_str(&format!(
        "{} {} paths across {} domains\n",
        "→".blue(),
        paths.len(),
        domains.len()
    ));

    report
}

fn describe_hop(hop: &HopRecord) -> String {
    let place = match (hop.city.as_deref(), hop.country.as_deref()) {
        (Some(city), Some(country)) if !country.is_empty() => format!("{}, {}", city, country),
        (Some(city), _) => city.to_string(),
        (None, Some(country)) => country.to_string(),
        (None, None) => "location unknown".to_string(),
    };
    match hop.isp.as_deref() {
        Some(isp) if !isp.is_empty() => format!("{} [{}]", place, isp),
        _ => place,
    }
}
