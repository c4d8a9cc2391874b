//! Error types for the migration engine
//!
//! Storage errors from the ledger or the target database are passed through
//! unchanged; failures raised by a migration unit are wrapped with the
//! migration name and the method that was running.

use thiserror::Error;

use crate::migrations::definitions::MigrationDirection;

/// Result type alias for migration operations
pub type MigrationResult<T> = Result<T, MigrationError>;

/// Error types for migration operations
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database or ledger storage error
    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// A ledger entry (or requested name) has no registered migration unit
    #[error("Migration not registered: {name}")]
    NotRegistered { name: String },

    /// A migration unit returned an error from `up` or `down`
    #[error("Migration '{name}' failed during {method}: {source}")]
    Failed {
        name: String,
        method: MigrationDirection,
        /// Migrations that completed in the same operation before this one failed
        completed: Vec<String>,
        #[source]
        source: Box<MigrationError>,
    },

    /// Migration name does not follow the naming rules
    #[error("Invalid migration name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    /// A migration file with the same name already exists
    #[error("Migration file already exists: {0}")]
    AlreadyExists(String),

    /// Migration template failed to render
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    /// IO error while writing migration files
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Error raised by migration code itself
    #[error("{0}")]
    Custom(String),
}

impl MigrationError {
    /// Create an error from inside a migration unit
    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom(message.into())
    }

    pub(crate) fn failed(
        name: impl Into<String>,
        method: MigrationDirection,
        source: MigrationError,
    ) -> Self {
        Self::Failed {
            name: name.into(),
            method,
            completed: Vec::new(),
            source: Box::new(source),
        }
    }

    /// Attach the list of migrations that finished before a unit failure
    pub(crate) fn with_completed(self, done: Vec<String>) -> Self {
        match self {
            Self::Failed {
                name,
                method,
                source,
                ..
            } => Self::Failed {
                name,
                method,
                completed: done,
                source,
            },
            other => other,
        }
    }

    /// Name of the migration this error is about, if any
    pub fn migration_name(&self) -> Option<&str> {
        match self {
            Self::Failed { name, .. } | Self::NotRegistered { name } => Some(name),
            Self::InvalidName { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Method that was executing when a unit failed
    pub fn method(&self) -> Option<MigrationDirection> {
        match self {
            Self::Failed { method, .. } => Some(*method),
            _ => None,
        }
    }

    /// Migrations completed before the failing unit
    pub fn completed(&self) -> &[String] {
        match self {
            Self::Failed { completed, .. } => completed,
            _ => &[],
        }
    }

    pub fn is_not_registered(&self) -> bool {
        matches!(self, Self::NotRegistered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_error_exposes_name_and_method() {
        let error = MigrationError::failed(
            "2024_01_01_000000_create_users_table",
            MigrationDirection::Up,
            MigrationError::custom("boom"),
        );

        assert_eq!(
            error.migration_name(),
            Some("2024_01_01_000000_create_users_table")
        );
        assert_eq!(error.method(), Some(MigrationDirection::Up));
        assert!(error.completed().is_empty());

        let message = error.to_string();
        assert!(message.contains("2024_01_01_000000_create_users_table"));
        assert!(message.contains("up"));
        assert!(message.contains("boom"));
    }

    #[test]
    fn test_with_completed_only_touches_failures() {
        let error = MigrationError::failed("b", MigrationDirection::Down, MigrationError::custom("x"))
            .with_completed(vec!["a".to_string()]);
        assert_eq!(error.completed(), &["a".to_string()]);

        let other = MigrationError::NotRegistered {
            name: "c".to_string(),
        }
        .with_completed(vec!["a".to_string()]);
        assert!(other.is_not_registered());
        assert!(other.completed().is_empty());
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;

        let error = MigrationError::failed("a", MigrationDirection::Up, MigrationError::custom("inner"));
        let source = error.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("inner"));
    }
}
