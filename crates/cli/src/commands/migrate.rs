use std::sync::Arc;

use anyhow::{bail, Context, Result};
use inquire::{Confirm, InquireError, Text};
use kest_migrate::{Database, MigrationError, Migrator, MigratorOptions, RollbackOptions};
use tracing::debug;

use super::output::{self, ConsoleOutput, ConsoleProgress};
use crate::config::CliConfig;
use crate::migrations;

/// Connect and build a migrator with every bundled migration registered
pub async fn create_migrator(config: &CliConfig, pretend: bool) -> Result<Migrator> {
    let url = config.database_url()?;
    let db = Database::connect_with(url, config.database_options())
        .await
        .context("Failed to connect to the database")?;
    debug!(dialect = %db.dialect(), environment = %config.environment, "Connected");

    let mut migrator = Migrator::from_config(db, &config.migration_config());
    if pretend {
        migrator.set_output(Arc::new(ConsoleOutput));
    } else {
        migrator = migrator.with_events(Arc::new(ConsoleProgress));
    }
    migrator.register_many(migrations::all());

    Ok(migrator)
}

fn ensure_allowed(config: &CliConfig, force: bool, action: &str) -> Result<()> {
    if config.environment.is_production() && !force {
        bail!("Cannot {} in production without --force", action);
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    match Confirm::new(prompt).with_default(false).prompt() {
        Ok(answer) => Ok(answer),
        Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => Ok(false),
        Err(e) => Err(e).context("Failed to read confirmation"),
    }
}

fn database_name_matches(expected: &str, typed: &str) -> bool {
    !expected.is_empty() && typed.trim() == expected
}

/// Print what finished before a unit failure and hand the error back
fn report_failure(err: MigrationError, verb: &str) -> anyhow::Error {
    let completed = err.completed();
    if !completed.is_empty() {
        output::warning(format!(
            "{} {} migration(s) before the failure: {}",
            verb,
            completed.len(),
            completed.join(", ")
        ));
    }
    anyhow::Error::new(err)
}

async fn close(migrator: Migrator) {
    migrator.database().close().await;
}

pub async fn migrate(config: &CliConfig, pretend: bool, step: bool, force: bool) -> Result<()> {
    ensure_allowed(config, force, "run migrations")?;

    let migrator = create_migrator(config, pretend).await?;
    if pretend {
        output::info("Running migrations in pretend mode...");
    } else {
        output::info("Running migrations...");
    }

    let mut options = MigratorOptions::new();
    if pretend {
        options = options.with_pretend();
    }
    if step {
        options = options.with_step();
    }
    if force {
        options = options.with_force();
    }

    let result = migrator.run(options).await;
    close(migrator).await;
    let executed = result.map_err(|e| report_failure(e, "Migrated"))?;

    if executed.is_empty() {
        output::info("Nothing to migrate");
    } else {
        output::success(format!("Migrations completed ({} migrations)", executed.len()));
    }
    Ok(())
}

pub async fn rollback(
    config: &CliConfig,
    step: Option<usize>,
    batch: Option<i64>,
    pretend: bool,
) -> Result<()> {
    let migrator = create_migrator(config, pretend).await?;
    if pretend {
        output::info("Rolling back migrations in pretend mode...");
    } else {
        output::info("Rolling back migrations...");
    }

    let mut options = RollbackOptions::new();
    if let Some(steps) = step {
        options = options.with_steps(steps);
    }
    if let Some(batch) = batch {
        options = options.with_batch(batch);
    }
    if pretend {
        options = options.with_pretend();
    }

    let result = migrator.rollback(options).await;
    close(migrator).await;
    let rolled_back = result.map_err(|e| report_failure(e, "Rolled back"))?;

    if rolled_back.is_empty() {
        output::info("Nothing to rollback");
    } else {
        output::success(format!("Rollback completed ({} migrations)", rolled_back.len()));
    }
    Ok(())
}

pub async fn reset(config: &CliConfig, force: bool, pretend: bool) -> Result<()> {
    ensure_allowed(config, force, "reset migrations")?;

    if !pretend {
        output::banner("WARNING - This will roll back ALL migrations!");
        if let Some(name) = config.database_name() {
            output::info(format!("Database: {}", name));
        }
        println!();
    }

    if !force && !confirm("This will roll back ALL migrations. Continue?")? {
        output::info("Operation cancelled");
        return Ok(());
    }

    let migrator = create_migrator(config, pretend).await?;
    if pretend {
        output::info("Resetting migrations in pretend mode...");
    } else {
        output::info("Resetting all migrations...");
    }

    let result = migrator.reset(pretend).await;
    close(migrator).await;
    let rolled_back = result.map_err(|e| report_failure(e, "Rolled back"))?;

    if rolled_back.is_empty() {
        output::info("Nothing to reset");
    } else {
        output::success(format!("Reset completed ({} migrations)", rolled_back.len()));
    }
    Ok(())
}

pub async fn fresh(config: &CliConfig, force: bool, pretend: bool) -> Result<()> {
    ensure_allowed(config, force, "run fresh")?;

    if pretend {
        let migrator = create_migrator(config, true).await?;
        output::info("Refreshing the database in pretend mode...");

        let result = migrator.fresh(MigratorOptions::new().with_pretend()).await;
        close(migrator).await;
        let executed = result.map_err(|e| report_failure(e, "Migrated"))?;

        output::success(format!("Pretended {} migrations", executed.len()));
        return Ok(());
    }

    let database_name = config.database_name().unwrap_or_default();
    output::banner("DESTRUCTIVE OPERATION - ALL DATA WILL BE LOST!");
    output::info(format!("Database: {}", database_name));
    println!();

    if !force {
        if !confirm("This will DROP ALL TABLES and DELETE ALL DATA. Continue?")? {
            output::info("Operation cancelled");
            return Ok(());
        }

        output::warning(format!(
            "To confirm, please type the database name '{}':",
            database_name
        ));
        let typed = match Text::new("Database name").prompt() {
            Ok(typed) => typed,
            Err(InquireError::OperationCanceled | InquireError::OperationInterrupted) => {
                String::new()
            }
            Err(e) => return Err(e).context("Failed to read database name"),
        };
        if !database_name_matches(&database_name, &typed) {
            bail!("Database name does not match. Operation cancelled.");
        }
    }

    let migrator = create_migrator(config, false).await?;
    output::warning("Dropping all tables...");

    let mut options = MigratorOptions::new();
    if force {
        options = options.with_force();
    }

    let result = migrator.fresh(options).await;
    close(migrator).await;
    let executed = result.map_err(|e| report_failure(e, "Migrated"))?;

    output::success("Database refreshed");
    output::success(format!("Migrations completed ({} migrations)", executed.len()));
    Ok(())
}

pub async fn status(config: &CliConfig, json: bool) -> Result<()> {
    let migrator = create_migrator(config, false).await?;
    let ledger_exists = migrator.repository().repository_exists().await;
    let statuses = migrator.status().await;
    close(migrator).await;
    let (ledger_exists, statuses) = (ledger_exists?, statuses?);

    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
        return Ok(());
    }

    if !ledger_exists {
        output::info("No migrations have been run yet");
    }
    if statuses.is_empty() {
        output::info("No migrations found");
        return Ok(());
    }

    println!("{}", console::style("Migration Status").bold().cyan());
    println!("{}", output::status_table(&statuses));
    Ok(())
}
