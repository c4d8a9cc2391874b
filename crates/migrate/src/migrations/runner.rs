//! Migration Runner - Executes migrations against the database
//!
//! Holds the registry of migration units, compares it with the ledger and
//! applies pending migrations in name order, batch by batch.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use tracing::{debug, info, warn};

use super::definitions::{
    Migration, MigrationConfig, MigrationDirection, MigrationStatus, MigratorOptions,
};
use super::repository::{DatabaseMigrationRepository, MigrationRepository};
use crate::database::Database;
use crate::error::{MigrationError, MigrationResult};
use crate::events::{EventPublisher, MigrationEvent};
use crate::executor::{LiveExecutor, OutputWriter, PretendExecutor, SchemaExecutor};

/// Registry and orchestrator of migration units
///
/// Operations are meant to run one at a time; there is no locking of the
/// ledger table against other processes.
pub struct Migrator {
    migrations: RwLock<HashMap<String, Arc<dyn Migration>>>,
    repository: Arc<dyn MigrationRepository>,
    db: Database,
    events: Option<Arc<dyn EventPublisher>>,
    output: RwLock<Option<Arc<dyn OutputWriter>>>,
    use_transactions: bool,
}

impl Migrator {
    /// Create a migrator over an explicit ledger repository
    pub fn new(repository: Arc<dyn MigrationRepository>, db: Database) -> Self {
        Self {
            migrations: RwLock::new(HashMap::new()),
            repository,
            db,
            events: None,
            output: RwLock::new(None),
            use_transactions: true,
        }
    }

    /// Create a migrator with a database ledger in `config.migrations_table`
    pub fn from_config(db: Database, config: &MigrationConfig) -> Self {
        let repository = DatabaseMigrationRepository::new(db.clone(), &config.migrations_table);
        let mut migrator = Self::new(Arc::new(repository), db);
        migrator.use_transactions = config.use_transactions;
        migrator
    }

    /// Publish lifecycle events to `publisher`
    pub fn with_events(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(publisher);
        self
    }

    /// Register a migration unit; a later registration under the same name wins
    pub fn register<M>(&self, name: impl Into<String>, migration: M)
    where
        M: Migration + 'static,
    {
        self.register_arc(name, Arc::new(migration));
    }

    pub fn register_arc(&self, name: impl Into<String>, migration: Arc<dyn Migration>) {
        let name = name.into();
        debug!(migration = %name, "Registering migration");
        self.migrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, migration);
    }

    pub fn register_many<I, S>(&self, migrations: I)
    where
        I: IntoIterator<Item = (S, Arc<dyn Migration>)>,
        S: Into<String>,
    {
        let mut registry = self
            .migrations
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for (name, migration) in migrations {
            registry.insert(name.into(), migration);
        }
    }

    /// Registered migration names in ascending order
    pub fn registered_migrations(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .migrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Look up a registered migration unit
    pub fn migration(&self, name: &str) -> Option<Arc<dyn Migration>> {
        self.migrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn repository(&self) -> Arc<dyn MigrationRepository> {
        self.repository.clone()
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Set the sink that receives statements captured in pretend mode
    pub fn set_output(&self, output: Arc<dyn OutputWriter>) {
        *self.output.write().unwrap_or_else(PoisonError::into_inner) = Some(output);
    }

    pub(super) fn output(&self) -> Option<Arc<dyn OutputWriter>> {
        self.output
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(super) fn fire(&self, event: MigrationEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }

    /// Registered names not present in `ran`, ascending
    fn pending_migrations(&self, ran: &[String]) -> Vec<String> {
        let ran: HashSet<&str> = ran.iter().map(String::as_str).collect();
        self.registered_migrations()
            .into_iter()
            .filter(|name| !ran.contains(name.as_str()))
            .collect()
    }

    /// Run all pending migrations and return the names that were executed
    ///
    /// On a unit failure the run stops at once; migrations applied before it
    /// stay logged and are listed in the error's `completed()`.
    pub async fn run(&self, options: MigratorOptions) -> MigrationResult<Vec<String>> {
        // A pretend run never creates the ledger table
        let ledger_exists = self.repository.repository_exists().await?;
        if !ledger_exists && !options.pretend {
            self.repository.create_repository().await?;
        }

        let ran = if ledger_exists {
            self.repository.get_ran().await?
        } else {
            Vec::new()
        };
        let pending = self.pending_migrations(&ran);
        if pending.is_empty() {
            return self.run_pending(pending, 1, options).await;
        }

        let batch = if ledger_exists {
            self.repository.get_next_batch_number().await?
        } else {
            1
        };
        self.run_pending(pending, batch, options).await
    }

    /// Apply `pending` in order starting at `batch`
    pub(super) async fn run_pending(
        &self,
        pending: Vec<String>,
        mut batch: i64,
        options: MigratorOptions,
    ) -> MigrationResult<Vec<String>> {
        if pending.is_empty() {
            info!("Nothing to migrate");
            self.fire(MigrationEvent::no_pending(MigrationDirection::Up));
            return Ok(Vec::new());
        }

        self.fire(MigrationEvent::migrations_started(MigrationDirection::Up));

        let mut executed = Vec::with_capacity(pending.len());
        for name in pending {
            if let Err(e) = self.run_up(&name, batch, options.pretend).await {
                return Err(e.with_completed(executed));
            }
            executed.push(name);

            if options.step {
                batch += 1;
            }
        }

        self.fire(MigrationEvent::migrations_ended(MigrationDirection::Up));
        Ok(executed)
    }

    async fn run_up(&self, name: &str, batch: i64, pretend: bool) -> MigrationResult<()> {
        let migration = self
            .migration(name)
            .ok_or_else(|| MigrationError::NotRegistered {
                name: name.to_string(),
            })?;

        self.fire(MigrationEvent::migration_started(name, MigrationDirection::Up));

        if pretend {
            self.pretend_to_run(name, migration.as_ref(), MigrationDirection::Up)
                .await;
            return Ok(());
        }

        let started = Instant::now();
        self.run_migration(migration.as_ref(), MigrationDirection::Up)
            .await
            .map_err(|e| MigrationError::failed(name, MigrationDirection::Up, e))?;
        self.repository.log(name, batch).await?;

        info!(
            migration = name,
            batch,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Migrated"
        );
        self.fire(MigrationEvent::migration_ended(name, MigrationDirection::Up));
        Ok(())
    }

    /// Execute one direction of a unit against the live database
    ///
    /// The ledger is updated by the caller after this returns, outside the
    /// unit's transaction.
    pub(super) async fn run_migration(
        &self,
        migration: &dyn Migration,
        direction: MigrationDirection,
    ) -> MigrationResult<()> {
        let dialect = self.db.dialect().clone();

        if self.use_transactions && migration.runs_in_transaction() {
            let mut tx = self.db.pool().begin().await?;
            let outcome = {
                let mut executor = LiveExecutor::new(&mut *tx, dialect);
                invoke(migration, &mut executor, direction).await
            };

            match outcome {
                Ok(()) => {
                    tx.commit().await?;
                    Ok(())
                }
                Err(e) => {
                    if let Err(rollback_error) = tx.rollback().await {
                        warn!(error = %rollback_error, "Failed to roll back migration transaction");
                    }
                    Err(e)
                }
            }
        } else {
            let mut conn = self.db.pool().acquire().await?;
            let mut executor = LiveExecutor::new(&mut *conn, dialect);
            invoke(migration, &mut executor, direction).await
        }
    }

    /// Run a unit against a statement collector and hand the statements to
    /// the output sink. Unit errors are logged and otherwise ignored.
    pub(super) async fn pretend_to_run(
        &self,
        name: &str,
        migration: &dyn Migration,
        direction: MigrationDirection,
    ) {
        let mut executor = PretendExecutor::new(self.db.dialect().clone());
        if let Err(e) = invoke(migration, &mut executor, direction).await {
            warn!(migration = name, %direction, error = %e, "Migration failed while pretending");
        }

        let statements = executor.into_statements();
        if let Some(output) = self.output() {
            output.write(name, &statements);
        }

        self.fire(MigrationEvent::migration_ended(name, direction));
    }

    /// Ran flag and batch for every registered migration, in name order
    pub async fn status(&self) -> MigrationResult<Vec<MigrationStatus>> {
        let batches = if self.repository.repository_exists().await? {
            self.repository.get_migration_batches().await?
        } else {
            HashMap::new()
        };

        Ok(self
            .registered_migrations()
            .into_iter()
            .map(|name| {
                let batch = batches.get(&name).copied();
                MigrationStatus {
                    ran: batch.is_some(),
                    batch,
                    name,
                }
            })
            .collect())
    }
}

async fn invoke(
    migration: &dyn Migration,
    executor: &mut dyn SchemaExecutor,
    direction: MigrationDirection,
) -> MigrationResult<()> {
    match direction {
        MigrationDirection::Up => migration.up(executor).await,
        MigrationDirection::Down => migration.down(executor).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseOptions;
    use crate::migrations::sql::SqlMigration;

    async fn migrator() -> Migrator {
        let db = Database::connect_with("sqlite::memory:", DatabaseOptions::single_connection())
            .await
            .unwrap();
        Migrator::from_config(db, &MigrationConfig::default())
    }

    #[tokio::test]
    async fn test_registered_migrations_are_sorted() {
        let migrator = migrator().await;
        migrator.register("2024_01_02_b", SqlMigration::new("", ""));
        migrator.register("2024_01_01_a", SqlMigration::new("", ""));
        migrator.register_many(vec![(
            "2024_01_03_c",
            Arc::new(SqlMigration::new("", "")) as Arc<dyn Migration>,
        )]);

        assert_eq!(
            migrator.registered_migrations(),
            vec!["2024_01_01_a", "2024_01_02_b", "2024_01_03_c"]
        );
        assert!(migrator.migration("2024_01_01_a").is_some());
        assert!(migrator.migration("missing").is_none());
    }

    #[tokio::test]
    async fn test_last_registration_wins() {
        let migrator = migrator().await;
        migrator.register("a", SqlMigration::new("SELECT 1", ""));
        migrator.register("a", SqlMigration::new("SELECT 2", "").without_transaction());

        assert_eq!(migrator.registered_migrations().len(), 1);
        let unit = migrator.migration("a").unwrap();
        assert!(!unit.runs_in_transaction());
    }

    #[tokio::test]
    async fn test_pending_excludes_ran() {
        let migrator = migrator().await;
        migrator.register("a", SqlMigration::new("", ""));
        migrator.register("b", SqlMigration::new("", ""));
        migrator.register("c", SqlMigration::new("", ""));

        let pending = migrator.pending_migrations(&["b".to_string(), "x".to_string()]);
        assert_eq!(pending, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn test_status_before_ledger_exists() {
        let migrator = migrator().await;
        migrator.register("a", SqlMigration::new("", ""));

        let status = migrator.status().await.unwrap();
        assert_eq!(
            status,
            vec![MigrationStatus {
                name: "a".to_string(),
                ran: false,
                batch: None,
            }]
        );
    }
}
