#![forbid(unsafe_code)]

mod cmd;
mod output;
mod rules;

use clap::{CommandFactory, Parser, Subcommand};
use output::OutputMode;
use std::env;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use watchkeep_core::config;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "wk: duty rotation planning and incident propagation graphs",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Output format (overrides `FORMAT` and the user config).
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Duty",
        about = "Preview the shifts a rule produces",
        long_about = "Generate the shifts of one duty rule over a window without touching any state.",
        after_help = "EXAMPLES:\n    # Preview the default window from the rule's effective time\n    wk preview --rule rules/ops.yaml\n\n    # Two weeks from a given instant, with a coverage report\n    wk preview --rule rules/ops.yaml --begin \"2024-03-01 00:00\" --days 14 --coverage\n\n    # Emit machine-readable output\n    wk preview --rule rules/ops.yaml --json"
    )]
    Preview(cmd::preview::PreviewArgs),

    #[command(
        next_help_heading = "Duty",
        about = "Compute when a shift hands over",
        long_about = "Compute the handover instant of a daily, weekly or monthly rotation in the configured UTC offset.",
        after_help = "EXAMPLES:\n    # Weekly handover on Monday 09:00\n    wk handoff weekly --begin \"2024-03-06 14:00\" --day 1 --at 09:00\n\n    # Monthly handover on the 31st (clamped in short months)\n    wk handoff monthly --begin 2024-02-10T00:00:00Z --day 31 --at 10:00"
    )]
    Handoff(cmd::handoff::HandoffArgs),

    #[command(
        next_help_heading = "Duty",
        about = "Reconcile rules against a state file",
        long_about = "Bring the snapshots and plans in a JSON state file in line with a group's rules, then plan everything due within the horizon.",
        after_help = "EXAMPLES:\n    # Reconcile group 7 as of now\n    wk reconcile --rules rules/ops.yaml --state state.json --group 7\n\n    # Reconcile as of a fixed task time\n    wk reconcile --rules rules/ops.yaml --state state.json --group 7 --at \"2024-03-01 00:00\""
    )]
    Reconcile(cmd::reconcile::ReconcileArgs),

    #[command(
        next_help_heading = "Incident",
        about = "Query an incident propagation graph",
        long_about = "Load an incident snapshot document and run traversal, layering, aggregation or handler queries on it.",
        after_help = "EXAMPLES:\n    # Upstream entities of a service, grouped by rank\n    wk incident upstreams snapshot.json svc#checkout\n\n    # Collapse equivalent entities and print the result\n    wk incident aggregate snapshot.json --min-group 3 --json"
    )]
    Incident(cmd::incident::IncidentArgs),

    #[command(
        next_help_heading = "Setup",
        about = "Generate shell completions",
        long_about = "Generate shell completion scripts for wk.",
        after_help = "EXAMPLES:\n    # Generate bash completions\n    wk completions bash > ~/.local/share/bash-completion/completions/wk"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("WATCHKEEP_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "watchkeep=debug,info"
        } else {
            "watchkeep=info,warn"
        })
    });

    let format = env::var("WATCHKEEP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.verbose {
        info!("Verbose mode enabled");
    }

    let project_root = env::current_dir()?;
    let effective = config::resolve_config(&project_root, cli.json)?;
    let output = cli
        .format
        .unwrap_or_else(|| OutputMode::from_resolved(&effective.resolved_output));
    debug!(?output, root = %project_root.display(), "resolved output mode");

    match cli.command {
        Commands::Preview(ref args) => cmd::preview::run_preview(args, output, &effective.project),
        Commands::Handoff(ref args) => cmd::handoff::run_handoff(args, output, &effective.project),
        Commands::Reconcile(ref args) => {
            cmd::reconcile::run_reconcile(args, output, &effective.project)
        }
        Commands::Incident(ref args) => {
            cmd::incident::run_incident(args, output, &effective.project)
        }
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn json_flag_parses_after_subcommand() {
        let cli = Cli::parse_from(["wk", "preview", "--rule", "r.json", "--json"]);
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Preview(_)));
    }

    #[test]
    fn format_flag_accepts_value_enum() {
        let cli = Cli::parse_from(["wk", "--format", "text", "completions", "bash"]);
        assert_eq!(cli.format, Some(OutputMode::Text));
    }

    #[test]
    fn incident_subcommand_parses() {
        let cli = Cli::parse_from(["wk", "incident", "upstreams", "snap.json", "svc#a"]);
        assert!(matches!(cli.command, Commands::Incident(_)));
    }

    #[test]
    fn handoff_requires_a_kind() {
        assert!(Cli::try_parse_from(["wk", "handoff"]).is_err());
    }
}
