mod commands;
mod config;
mod domain;
mod platform;
mod render;
mod tools;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::report::ReportArgs;

#[derive(Parser)]
#[command(
    name = "hostscan",
    version,
    args_conflicts_with_subcommands = true,
    about = "Read-only host inventory: one report, every section, whatever tools exist"
)]
struct Cli {
    /// Path to config file (default: ~/.config/hostscan/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides config; RUST_LOG wins over both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    report: ReportArgs,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect a host inventory report (the default)
    Report(ReportArgs),

    /// List the sections, sources and candidate methods
    Sections,

    /// Show which probe tools this host offers
    Tools,

    /// Compare two saved reports
    Diff {
        /// Older saved report
        old: PathBuf,

        /// Newer saved report
        new: PathBuf,

        /// Output format (text, json or yaml)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(cli.config.as_deref())?;
    init_tracing(cli.log_level.as_deref().unwrap_or(&cfg.log_level), cli.log_json);

    match cli.command {
        None => commands::report::run(&cli.report, cfg),
        Some(Commands::Report(args)) => commands::report::run(&args, cfg),
        Some(Commands::Sections) => commands::sections::run(),
        Some(Commands::Tools) => commands::tools::run(cfg.collector.elevation),
        Some(Commands::Diff { old, new, format }) => commands::diff::run(old, new, &format),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_invocation_is_a_report() {
        let cli = Cli::try_parse_from(["hostscan", "--format", "json", "--skip", "Containers"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.report.format.as_deref(), Some("json"));
        assert_eq!(cli.report.skip, vec!["Containers".to_string()]);
    }

    #[test]
    fn subcommands_parse() {
        let cli = Cli::try_parse_from(["hostscan", "report", "--only", "Network", "--save"]).unwrap();
        match cli.command {
            Some(Commands::Report(args)) => {
                assert_eq!(args.only, vec!["Network".to_string()]);
                assert!(args.save);
            }
            _ => panic!("expected report"),
        }

        let cli = Cli::try_parse_from(["hostscan", "diff", "a.json", "b.json"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Diff { .. })));

        assert!(Cli::try_parse_from(["hostscan", "report", "--save", "--cached"]).is_err());
    }
}
