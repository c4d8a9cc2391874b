//! Migration Definitions - Core types and structures for migrations
//!
//! Defines the migration unit contract, ledger records, run and rollback
//! options, and the engine configuration.

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MigrationResult;
use crate::executor::SchemaExecutor;

/// A named, reversible schema change
///
/// Units are registered with the migrator under a lexicographically sortable
/// name such as `2025_06_18_000000_create_users_table`. Only the name is
/// persisted in the ledger.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Apply the change
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()>;

    /// Revert the change
    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()>;

    /// Whether `up`/`down` run inside a single transaction
    fn runs_in_transaction(&self) -> bool {
        true
    }
}

/// Applied migration as stored in the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRecord {
    /// Migration name
    pub migration: String,
    /// Batch number (for grouping migrations)
    pub batch: i64,
    /// When the migration was applied
    pub applied_at: DateTime<Utc>,
}

/// Migration direction for execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationDirection {
    /// Apply the migration
    Up,
    /// Rollback the migration
    Down,
}

impl MigrationDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationDirection::Up => "up",
            MigrationDirection::Down => "down",
        }
    }
}

impl fmt::Display for MigrationDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a registered migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub name: String,
    pub ran: bool,
    /// Batch the migration was applied in; `None` while pending
    pub batch: Option<i64>,
}

/// Options for `run` and `fresh`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigratorOptions {
    /// Capture statements instead of executing them
    pub pretend: bool,
    /// Give every migration its own batch
    pub step: bool,
    /// Production override. Checked by callers, not by the engine.
    pub force: bool,
}

impl MigratorOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pretend(mut self) -> Self {
        self.pretend = true;
        self
    }

    pub fn with_step(mut self) -> Self {
        self.step = true;
        self
    }

    pub fn with_force(mut self) -> Self {
        self.force = true;
        self
    }
}

/// Options for `rollback`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollbackOptions {
    /// Number of most recent migrations to revert; wins over `batch`
    pub steps: usize,
    /// Specific batch to revert
    pub batch: i64,
    pub pretend: bool,
}

/// Which ledger records a rollback reverts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackSelection {
    Steps(usize),
    Batch(i64),
    LastBatch,
}

impl RollbackOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    pub fn with_batch(mut self, batch: i64) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_pretend(mut self) -> Self {
        self.pretend = true;
        self
    }

    pub fn selection(&self) -> RollbackSelection {
        if self.steps > 0 {
            RollbackSelection::Steps(self.steps)
        } else if self.batch > 0 {
            RollbackSelection::Batch(self.batch)
        } else {
            RollbackSelection::LastBatch
        }
    }
}

/// Configuration for the migration system
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Directory where migration files are stored
    pub migrations_dir: PathBuf,
    /// Table name for tracking migrations
    pub migrations_table: String,
    /// Run units inside a transaction when they ask for one
    pub use_transactions: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migrations_dir: PathBuf::from("migrations"),
            migrations_table: "migrations".to_string(),
            use_transactions: true,
        }
    }
}

impl MigrationConfig {
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.migrations_table = table.into();
        self
    }

    pub fn with_migrations_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    pub fn without_transactions(mut self) -> Self {
        self.use_transactions = false;
        self
    }
}
