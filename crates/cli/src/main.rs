mod commands;
mod config;
mod logging;
mod migrations;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use commands::{make, migrate};
use config::CliConfig;
use logging::LoggingConfig;

#[derive(Parser)]
#[command(name = "kest")]
#[command(about = "Run, roll back and inspect database migrations")]
#[command(version)]
struct Cli {
    /// Log the engine's ledger and dialect decisions
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pending migrations
    Migrate {
        /// Print the SQL that would run without executing it
        #[arg(long)]
        pretend: bool,

        /// Put every migration in its own batch
        #[arg(long)]
        step: bool,

        /// Allow running in production
        #[arg(long)]
        force: bool,
    },

    /// Roll back the last batch, a number of steps or a specific batch
    Rollback {
        /// Number of migrations to roll back
        #[arg(long, value_name = "N")]
        step: Option<usize>,

        /// Batch number to roll back
        #[arg(long, value_name = "N")]
        batch: Option<i64>,

        /// Print the SQL that would run without executing it
        #[arg(long)]
        pretend: bool,
    },

    /// Roll back every applied migration
    Reset {
        /// Skip the confirmation prompt and allow running in production
        #[arg(long)]
        force: bool,

        /// Print the SQL that would run without executing it
        #[arg(long)]
        pretend: bool,
    },

    /// Drop all tables and run every migration again
    Fresh {
        /// Skip the confirmation prompts and allow running in production
        #[arg(long)]
        force: bool,

        /// Print the drops and SQL that would run without executing them
        #[arg(long)]
        pretend: bool,
    },

    /// Show which migrations have run and in which batch
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a new migration file
    Make {
        /// Migration name (e.g., create_users_table)
        name: String,

        /// Table to create
        #[arg(long, value_name = "TABLE", conflicts_with = "table")]
        create: Option<String>,

        /// Existing table to modify
        #[arg(long, value_name = "TABLE")]
        table: Option<String>,
    },
}

async fn run(cli: Cli, config: CliConfig) -> anyhow::Result<()> {
    match cli.command {
        Commands::Migrate {
            pretend,
            step,
            force,
        } => migrate::migrate(&config, pretend, step, force).await,
        Commands::Rollback {
            step,
            batch,
            pretend,
        } => migrate::rollback(&config, step, batch, pretend).await,
        Commands::Reset { force, pretend } => migrate::reset(&config, force, pretend).await,
        Commands::Fresh { force, pretend } => migrate::fresh(&config, force, pretend).await,
        Commands::Status { json } => migrate::status(&config, json).await,
        Commands::Make {
            name,
            create,
            table,
        } => make::migration(&config, &name, create, table),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CliConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            commands::output::error(format!("Failed to load config: {}", e));
            return ExitCode::FAILURE;
        }
    };

    let mut logging = LoggingConfig::from_cli(&config);
    if cli.verbose {
        logging = logging.verbose();
    }
    if let Err(e) = logging::init_logging(logging) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            commands::output::error(format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_rollback_flags() {
        let cli = Cli::parse_from(["kest", "rollback", "--step", "2", "--pretend"]);
        match cli.command {
            Commands::Rollback {
                step,
                batch,
                pretend,
            } => {
                assert_eq!(step, Some(2));
                assert_eq!(batch, None);
                assert!(pretend);
            }
            _ => panic!("expected rollback"),
        }
    }

    #[test]
    fn test_fresh_accepts_pretend() {
        let cli = Cli::parse_from(["kest", "fresh", "--pretend"]);
        assert!(matches!(
            cli.command,
            Commands::Fresh {
                force: false,
                pretend: true
            }
        ));
    }

    #[test]
    fn test_make_rejects_create_with_table() {
        let result = Cli::try_parse_from([
            "kest",
            "make",
            "create_users_table",
            "--create",
            "users",
            "--table",
            "users",
        ]);
        assert!(result.is_err());
    }
}
