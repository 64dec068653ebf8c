//! htbpanel CLI
//!
//! Lab dashboard for the terminal: browse the cached machine catalog, drive
//! the running machine and submit flags.

use clap::Parser;
use tracing::info;

use htbpanel_cli::catalog_cmd::{self, CatalogCommand};
use htbpanel_cli::context::{Context, GlobalArgs};
use htbpanel_cli::machine_cmd::{self, MachineCommand};
use htbpanel_core::config::load_config;
use htbpanel_core::tracing_init::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "htbpanel")]
#[command(version, about = "Lab machine dashboard", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    #[command(flatten)]
    Catalog(CatalogCommand),

    #[command(flatten)]
    Machine(MachineCommand),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cwd = std::env::current_dir().ok();
    let config = cli.global.apply(load_config(cwd.as_deref())?);
    init_tracing(&config.log_level, cli.global.log_json);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting htbpanel");

    let ctx = Context::open(config).await?;
    match cli.command {
        Commands::Catalog(command) => catalog_cmd::run(&ctx, command).await,
        Commands::Machine(command) => machine_cmd::run(&ctx, command).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use htbpanel_core::models::{Difficulty, TagCategory};
    use htbpanel_core::storage::CompletionStatus;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("htbpanel").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn parses_list_filters() {
        let cli = parse(&[
            "list",
            "--status",
            "complete",
            "--free",
            "-d",
            "easy",
            "-d",
            "Hard",
            "--area",
            "Web",
        ]);
        let Commands::Catalog(CatalogCommand::List(args)) = cli.command else {
            panic!("expected list");
        };
        assert_eq!(args.status, Some(CompletionStatus::Complete));
        assert!(args.free && !args.active);
        assert_eq!(args.difficulty, vec![Difficulty::Easy, Difficulty::Hard]);
        assert_eq!(args.area, vec!["Web".to_string()]);
    }

    #[test]
    fn search_conflicts_with_filters() {
        let err = Cli::try_parse_from(["htbpanel", "list", "--search", "la", "--free"]);
        assert!(err.is_err());
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = parse(&["status", "--db", "/tmp/htb.db", "--log-json"]);
        assert!(matches!(cli.command, Commands::Machine(MachineCommand::Status)));
        assert_eq!(cli.global.db.as_deref(), Some(std::path::Path::new("/tmp/htb.db")));
        assert!(cli.global.log_json);
    }

    #[test]
    fn parses_flag_submission() {
        let cli = parse(&["flag", "deadbeef", "--machine", "Lame"]);
        let Commands::Machine(MachineCommand::Flag { token, machine }) = cli.command else {
            panic!("expected flag");
        };
        assert_eq!(token, "deadbeef");
        assert_eq!(machine.as_deref(), Some("Lame"));
    }

    #[test]
    fn parses_tag_category_short_form() {
        let cli = parse(&["tags", "vulnerability"]);
        assert!(matches!(
            cli.command,
            Commands::Catalog(CatalogCommand::Tags {
                category: TagCategory::Vulnerabilities
            })
        ));
    }

    #[test]
    fn unknown_difficulty_is_rejected() {
        assert!(Cli::try_parse_from(["htbpanel", "list", "-d", "trivial"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
