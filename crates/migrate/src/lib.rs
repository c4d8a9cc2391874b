//! # kest-migrate
//!
//! Schema migration engine: tracks which migrations ran against a database,
//! runs pending ones in name order grouped into batches, rolls them back,
//! simulates them in pretend mode and publishes lifecycle events.
//!
//! ```no_run
//! use std::sync::Arc;
//! use kest_migrate::{Database, EventBus, MigrationConfig, Migrator, MigratorOptions, SqlMigration};
//!
//! # async fn demo() -> kest_migrate::MigrationResult<()> {
//! let db = Database::connect("postgres://localhost/app").await?;
//! let events = Arc::new(EventBus::new());
//! let migrator = Migrator::from_config(db, &MigrationConfig::default()).with_events(events);
//!
//! migrator.register(
//!     "2025_06_18_000000_create_users_table",
//!     SqlMigration::new(
//!         "CREATE TABLE users (id BIGSERIAL PRIMARY KEY, email VARCHAR(255) NOT NULL)",
//!         "DROP TABLE users",
//!     ),
//! );
//!
//! let ran = migrator.run(MigratorOptions::new()).await?;
//! # let _ = ran;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod error;
pub mod events;
pub mod executor;
pub mod migrations;

pub use database::{Database, DatabaseOptions, SqlDialect};
pub use error::{MigrationError, MigrationResult};
pub use events::{
    EventBus, EventPublisher, EventSubscription, MigrationEvent, MigrationEventKind,
    MigrationObserver,
};
pub use executor::{CapturedOutput, LiveExecutor, OutputWriter, PretendExecutor, SchemaExecutor};
pub use migrations::{
    CreatedMigration, CreatorOptions, DatabaseMigrationRepository, Migration, MigrationConfig,
    MigrationCreator, MigrationDirection, MigrationRecord, MigrationRepository, MigrationStatus,
    MigrationTemplate, Migrator, MigratorOptions, RollbackOptions, RollbackSelection, SqlMigration,
    FRESH_DROP_OUTPUT,
};

/// Re-exported so migration units can implement `Migration` without a
/// direct dependency
pub use async_trait::async_trait;
