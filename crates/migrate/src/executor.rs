//! Statement execution handles handed to migration units
//!
//! A unit never touches the pool directly. It receives a `SchemaExecutor`,
//! which is either live (a pooled connection or an open transaction) or a
//! pretend collector that records statement text and reports zero rows.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use sqlx::{AnyConnection, Executor};
use tracing::trace;

use crate::database::SqlDialect;
use crate::error::MigrationResult;

/// Execution handle a migration unit issues its statements through
#[async_trait]
pub trait SchemaExecutor: Send {
    /// Dialect of the target database
    fn dialect(&self) -> &SqlDialect;

    /// Execute one statement and return the number of affected rows
    async fn execute(&mut self, sql: &str) -> MigrationResult<u64>;

    /// Execute statements in order, stopping at the first error
    async fn execute_all(&mut self, statements: &[String]) -> MigrationResult<u64> {
        let mut affected = 0;
        for statement in statements {
            affected += self.execute(statement).await?;
        }
        Ok(affected)
    }

    /// True when statements are captured instead of executed
    fn is_pretending(&self) -> bool {
        false
    }
}

/// Executes statements against a borrowed connection
///
/// The connection is either a plain pooled connection or the connection
/// behind an open transaction; committing is the caller's concern.
pub struct LiveExecutor<'c> {
    conn: &'c mut AnyConnection,
    dialect: SqlDialect,
}

impl<'c> LiveExecutor<'c> {
    pub fn new(conn: &'c mut AnyConnection, dialect: SqlDialect) -> Self {
        Self { conn, dialect }
    }
}

#[async_trait]
impl<'c> SchemaExecutor for LiveExecutor<'c> {
    fn dialect(&self) -> &SqlDialect {
        &self.dialect
    }

    async fn execute(&mut self, sql: &str) -> MigrationResult<u64> {
        trace!(sql, "Executing migration statement");
        let result = (&mut *self.conn).execute(sql).await?;
        Ok(result.rows_affected())
    }
}

/// Records statements without sending them to the database
#[derive(Debug)]
pub struct PretendExecutor {
    dialect: SqlDialect,
    statements: Vec<String>,
}

impl PretendExecutor {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            statements: Vec::new(),
        }
    }

    /// Statements captured so far, in execution order
    pub fn statements(&self) -> &[String] {
        &self.statements
    }

    pub fn into_statements(self) -> Vec<String> {
        self.statements
    }
}

#[async_trait]
impl SchemaExecutor for PretendExecutor {
    fn dialect(&self) -> &SqlDialect {
        &self.dialect
    }

    async fn execute(&mut self, sql: &str) -> MigrationResult<u64> {
        self.statements.push(sql.trim().to_string());
        Ok(0)
    }

    fn is_pretending(&self) -> bool {
        true
    }
}

/// Receives the statements captured for each migration in pretend mode
pub trait OutputWriter: Send + Sync {
    fn write(&self, migration: &str, statements: &[String]);
}

/// Output writer that keeps everything it receives in memory
#[derive(Debug, Default)]
pub struct CapturedOutput {
    entries: Mutex<Vec<(String, Vec<String>)>>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(migration, statements)` pairs in the order they were written
    pub fn entries(&self) -> Vec<(String, Vec<String>)> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Captured statements for one migration
    pub fn statements_for(&self, migration: &str) -> Option<Vec<String>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(name, _)| name == migration)
            .map(|(_, statements)| statements.clone())
    }
}

impl OutputWriter for CapturedOutput {
    fn write(&self, migration: &str, statements: &[String]) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((migration.to_string(), statements.to_vec()));
    }
}
