//! Database handle and SQL dialect support
//!
//! The engine talks to every backend through the sqlx `any` driver. The
//! dialect is detected from the live connection once, when the handle is
//! built, and drives placeholder style, identifier quoting and the
//! dialect-specific statements used by the ledger and by `fresh`.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;
use tracing::debug;

use crate::error::{MigrationError, MigrationResult};

/// SQL dialect of the migrated database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
    /// A backend the engine has no special handling for
    Other(String),
}

impl SqlDialect {
    /// Map the backend name reported by a sqlx connection to a dialect
    pub fn from_backend_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "postgresql" | "postgres" => SqlDialect::PostgreSQL,
            "mysql" | "mariadb" => SqlDialect::MySQL,
            "sqlite" => SqlDialect::SQLite,
            _ => SqlDialect::Other(name.to_string()),
        }
    }

    /// Get the parameter placeholder for a zero-based parameter index
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            _ => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::MySQL => '`',
            _ => '"',
        }
    }

    /// Quote an identifier, doubling any embedded quote characters
    pub fn quote_identifier(&self, ident: &str) -> String {
        let quote = self.identifier_quote();
        let escaped = ident.replace(quote, &format!("{quote}{quote}"));
        format!("{quote}{escaped}{quote}")
    }

    /// Column definition for an auto-incrementing integer primary key
    pub fn auto_increment_primary_key(&self, column: &str) -> String {
        let column = self.quote_identifier(column);
        match self {
            SqlDialect::PostgreSQL => format!("{column} BIGSERIAL PRIMARY KEY"),
            SqlDialect::MySQL => format!("{column} BIGINT AUTO_INCREMENT PRIMARY KEY"),
            SqlDialect::SQLite => format!("{column} INTEGER PRIMARY KEY AUTOINCREMENT"),
            SqlDialect::Other(_) => format!("{column} INTEGER PRIMARY KEY"),
        }
    }

    /// Whether `fresh` knows how to enumerate and drop tables for this dialect
    pub fn supports_drop_all(&self) -> bool {
        !matches!(self, SqlDialect::Other(_))
    }

    /// Query returning the name of every user table in the current schema
    pub(crate) fn list_tables_sql(&self) -> Option<&'static str> {
        match self {
            SqlDialect::PostgreSQL => Some(
                "SELECT tablename::text FROM pg_tables WHERE schemaname = current_schema()",
            ),
            SqlDialect::MySQL => Some(
                "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'",
            ),
            SqlDialect::SQLite => Some(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
            ),
            SqlDialect::Other(_) => None,
        }
    }

    pub(crate) fn drop_table_sql(&self, table: &str) -> String {
        let table = self.quote_identifier(table);
        match self {
            SqlDialect::PostgreSQL => format!("DROP TABLE IF EXISTS {table} CASCADE"),
            _ => format!("DROP TABLE IF EXISTS {table}"),
        }
    }

    pub(crate) fn disable_foreign_keys_sql(&self) -> Option<&'static str> {
        match self {
            SqlDialect::MySQL => Some("SET FOREIGN_KEY_CHECKS = 0"),
            SqlDialect::SQLite => Some("PRAGMA foreign_keys = OFF"),
            _ => None,
        }
    }

    pub(crate) fn enable_foreign_keys_sql(&self) -> Option<&'static str> {
        match self {
            SqlDialect::MySQL => Some("SET FOREIGN_KEY_CHECKS = 1"),
            SqlDialect::SQLite => Some("PRAGMA foreign_keys = ON"),
            _ => None,
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::PostgreSQL => write!(f, "postgresql"),
            SqlDialect::MySQL => write!(f, "mysql"),
            SqlDialect::SQLite => write!(f, "sqlite"),
            SqlDialect::Other(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for SqlDialect {
    type Err = MigrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match SqlDialect::from_backend_name(s) {
            SqlDialect::Other(name) => Err(MigrationError::Configuration(format!(
                "Unsupported database dialect: {}",
                name
            ))),
            dialect => Ok(dialect),
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone)]
pub struct DatabaseOptions {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
}

impl Default for DatabaseOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            min_connections: 0,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl DatabaseOptions {
    /// One long-lived connection. Required for in-memory SQLite, where every
    /// new connection opens a separate empty database.
    pub fn single_connection() -> Self {
        Self {
            max_connections: 1,
            min_connections: 0,
            idle_timeout: None,
            max_lifetime: None,
            ..Self::default()
        }
    }

    pub fn with_max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }
}

/// Pooled database handle paired with its detected dialect
#[derive(Debug, Clone)]
pub struct Database {
    pool: AnyPool,
    dialect: SqlDialect,
}

impl Database {
    /// Connect with default pool settings
    pub async fn connect(url: &str) -> MigrationResult<Self> {
        Self::connect_with(url, DatabaseOptions::default()).await
    }

    /// Connect with explicit pool settings
    pub async fn connect_with(url: &str, options: DatabaseOptions) -> MigrationResult<Self> {
        install_default_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(options.max_connections)
            .min_connections(options.min_connections)
            .acquire_timeout(options.acquire_timeout)
            .idle_timeout(options.idle_timeout)
            .max_lifetime(options.max_lifetime)
            .connect(url)
            .await?;

        Self::from_pool(pool).await
    }

    /// Wrap an existing pool, detecting the dialect from a live connection
    pub async fn from_pool(pool: AnyPool) -> MigrationResult<Self> {
        let dialect = {
            let conn = pool.acquire().await?;
            SqlDialect::from_backend_name(conn.backend_name())
        };
        debug!(%dialect, "Detected database dialect");

        Ok(Self { pool, dialect })
    }

    /// Wrap an existing pool with a known dialect
    pub fn new(pool: AnyPool, dialect: SqlDialect) -> Self {
        Self { pool, dialect }
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn dialect(&self) -> &SqlDialect {
        &self.dialect
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
