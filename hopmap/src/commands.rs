use crate::CLAP_STYLING;
use clap::{ArgAction, arg};
use std::path::PathBuf;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("hopmap")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("hopmap")
        .about("Trace the network path to each domain and merge it into a topology graph")
        .styles(CLAP_STYLING)
        .arg(
            arg!([DOMAINS] ...)
                .required(false)
                .help("Domains to analyze"),
        )
        .arg(
            arg!(-c --"config" <PATH>)
                .required(false)
                .help("Path to the YAML configuration file [default: config.yaml]")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(-d --"domains-file" <PATH>)
                .required(false)
                .help("Newline-delimited file of domains; overrides DOMAINS")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--"export-db" <PATH>)
                .required(false)
                .help("Export the whole graph to a JSON file and exit")
                .value_parser(clap::value_parser!(PathBuf))
                .conflicts_with("import-db"),
        )
        .arg(
            arg!(--"import-db" <PATH>)
                .required(false)
                .help("Merge a previously exported JSON graph and exit")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            arg!(--"show-paths")
                .help("Print every stored domain path after analysis")
                .action(ArgAction::SetTrue),
        )
        .arg(
            arg!(-v --"verbose")
                .help("Enable debug logging")
                .action(ArgAction::SetTrue),
        )
}
