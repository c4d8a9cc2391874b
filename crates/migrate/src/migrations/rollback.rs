//! Migration Rollback - Handles rolling back applied migrations
//!
//! Reverts migrations by batch, by step count or entirely, and rebuilds the
//! schema from scratch for `fresh`.

use sqlx::{Executor, Row};
use tracing::{info, warn};

use super::definitions::{MigrationDirection, MigratorOptions, RollbackOptions, RollbackSelection};
use super::runner::Migrator;
use crate::database::SqlDialect;
use crate::error::{MigrationError, MigrationResult};
use crate::events::MigrationEvent;
use crate::executor::{PretendExecutor, SchemaExecutor};

/// Output sink label for the statements a pretended `fresh` would drop with
pub const FRESH_DROP_OUTPUT: &str = "fresh: drop all tables";

impl Migrator {
    /// Roll back the selected migrations, most recent first
    ///
    /// `steps` wins over `batch`; with neither set the last batch is reverted.
    pub async fn rollback(&self, options: RollbackOptions) -> MigrationResult<Vec<String>> {
        let repository = self.repository();
        let records = if !repository.repository_exists().await? {
            Vec::new()
        } else {
            match options.selection() {
                RollbackSelection::Steps(steps) => repository.get_migrations(steps).await?,
                RollbackSelection::Batch(batch) => repository.get_migrations_by_batch(batch).await?,
                RollbackSelection::LastBatch => repository.get_last().await?,
            }
        };

        let names = records.into_iter().map(|record| record.migration).collect();
        self.rollback_migrations(names, options.pretend).await
    }

    /// Roll back every applied migration in reverse order
    pub async fn reset(&self, pretend: bool) -> MigrationResult<Vec<String>> {
        let repository = self.repository();
        let mut names = if repository.repository_exists().await? {
            repository.get_ran().await?
        } else {
            Vec::new()
        };
        names.reverse();

        self.rollback_migrations(names, pretend).await
    }

    /// Drop every table, remove the ledger and run all migrations again
    ///
    /// In pretend mode nothing is dropped: the drop statements go to the
    /// output sink under [`FRESH_DROP_OUTPUT`] and every registered migration
    /// is pretended from batch 1.
    pub async fn fresh(&self, options: MigratorOptions) -> MigrationResult<Vec<String>> {
        if options.pretend {
            self.pretend_drop_all_tables().await?;
            return self
                .run_pending(self.registered_migrations(), 1, options)
                .await;
        }

        self.drop_all_tables().await?;

        let repository = self.repository();
        if repository.repository_exists().await? {
            repository.delete_repository().await?;
        }

        self.run(options).await
    }

    async fn rollback_migrations(
        &self,
        names: Vec<String>,
        pretend: bool,
    ) -> MigrationResult<Vec<String>> {
        if names.is_empty() {
            info!("Nothing to roll back");
            self.fire(MigrationEvent::no_pending(MigrationDirection::Down));
            return Ok(Vec::new());
        }

        if let Some(missing) = names.iter().find(|name| self.migration(name).is_none()) {
            return Err(MigrationError::NotRegistered {
                name: missing.clone(),
            });
        }

        self.fire(MigrationEvent::migrations_started(MigrationDirection::Down));

        let mut rolled_back = Vec::with_capacity(names.len());
        for name in names {
            if let Err(e) = self.run_down(&name, pretend).await {
                return Err(e.with_completed(rolled_back));
            }
            rolled_back.push(name);
        }

        self.fire(MigrationEvent::migrations_ended(MigrationDirection::Down));
        Ok(rolled_back)
    }

    async fn run_down(&self, name: &str, pretend: bool) -> MigrationResult<()> {
        let migration = self
            .migration(name)
            .ok_or_else(|| MigrationError::NotRegistered {
                name: name.to_string(),
            })?;

        self.fire(MigrationEvent::migration_started(name, MigrationDirection::Down));

        if pretend {
            self.pretend_to_run(name, migration.as_ref(), MigrationDirection::Down)
                .await;
            return Ok(());
        }

        self.run_migration(migration.as_ref(), MigrationDirection::Down)
            .await
            .map_err(|e| MigrationError::failed(name, MigrationDirection::Down, e))?;
        self.repository().delete(name).await?;

        info!(migration = name, "Rolled back");
        self.fire(MigrationEvent::migration_ended(name, MigrationDirection::Down));
        Ok(())
    }

    /// Drop every table in the current database or schema
    ///
    /// All statements run on one connection so the foreign key toggles for
    /// MySQL and SQLite apply to the drops.
    async fn drop_all_tables(&self) -> MigrationResult<()> {
        let db = self.database();
        let dialect = db.dialect();

        let Some(list_sql) = dialect.list_tables_sql() else {
            warn!(%dialect, "Dropping all tables is not supported for this dialect, skipping");
            return Ok(());
        };

        let mut conn = db.pool().acquire().await?;
        let tables = sqlx::query(list_sql)
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<Vec<_>, _>>()?;

        if tables.is_empty() {
            return Ok(());
        }

        if let Some(sql) = dialect.disable_foreign_keys_sql() {
            (&mut *conn).execute(sql).await?;
        }

        let mut outcome = Ok(());
        for table in &tables {
            let sql = dialect.drop_table_sql(table);
            if let Err(e) = (&mut *conn).execute(sql.as_str()).await {
                outcome = Err(MigrationError::from(e));
                break;
            }
            info!(table = %table, "Dropped table");
        }

        if let Some(sql) = dialect.enable_foreign_keys_sql() {
            (&mut *conn).execute(sql).await?;
        }

        outcome
    }

    /// Capture what `drop_all_tables` would execute without touching the schema
    async fn pretend_drop_all_tables(&self) -> MigrationResult<()> {
        let db = self.database();
        let dialect = db.dialect();

        let Some(list_sql) = dialect.list_tables_sql() else {
            warn!(%dialect, "Dropping all tables is not supported for this dialect, skipping");
            return Ok(());
        };

        let tables = sqlx::query(list_sql)
            .fetch_all(db.pool())
            .await?
            .iter()
            .map(|row| row.try_get::<String, _>(0))
            .collect::<Result<Vec<_>, _>>()?;

        let mut executor = PretendExecutor::new(dialect.clone());
        executor
            .execute_all(&drop_all_statements(dialect, &tables))
            .await?;

        if let Some(output) = self.output() {
            output.write(FRESH_DROP_OUTPUT, executor.statements());
        }
        Ok(())
    }
}

fn drop_all_statements(dialect: &SqlDialect, tables: &[String]) -> Vec<String> {
    if tables.is_empty() {
        return Vec::new();
    }

    let mut statements = Vec::with_capacity(tables.len() + 2);
    statements.extend(dialect.disable_foreign_keys_sql().map(str::to_string));
    statements.extend(tables.iter().map(|table| dialect.drop_table_sql(table)));
    statements.extend(dialect.enable_foreign_keys_sql().map(str::to_string));
    statements
}
