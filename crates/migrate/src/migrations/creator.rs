//! Migration file generator
//!
//! Writes a new migration unit source file from one of three templates:
//! blank, create-table or modify-table.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tera::{Context, Tera};
use tracing::info;

use super::definitions::MigrationConfig;
use crate::error::{MigrationError, MigrationResult};

/// Timestamp prefix format, e.g. `2025_06_18_093000`
pub const TIMESTAMP_FORMAT: &str = "%Y_%m_%d_%H%M%S";

static IDENTIFIER: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").ok());

static TABLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^create_(.+)_table$",
        r"_to_([a-z_]+)$",
        r"_from_([a-z_]+)$",
        r"^modify_(.+)_table$",
        r"^update_(.+)_table$",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

const BLANK_TEMPLATE: &str = r#"//! Migration {{ migration_id }}

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "{{ migration_id }}";

pub struct {{ struct_name }};

#[async_trait]
impl Migration for {{ struct_name }} {
    async fn up(&self, _db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        Ok(())
    }

    async fn down(&self, _db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        Ok(())
    }
}
"#;

const CREATE_TEMPLATE: &str = r#"//! Migration {{ migration_id }}

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "{{ migration_id }}";

pub struct {{ struct_name }};

#[async_trait]
impl Migration for {{ struct_name }} {
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        let id = db.dialect().auto_increment_primary_key("id");
        db.execute(&format!(
            "CREATE TABLE {{ table_name }} ({id}, created_at VARCHAR(64), updated_at VARCHAR(64))"
        ))
        .await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute("DROP TABLE IF EXISTS {{ table_name }}").await?;
        Ok(())
    }
}
"#;

const UPDATE_TEMPLATE: &str = r#"//! Migration {{ migration_id }}

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "{{ migration_id }}";

pub struct {{ struct_name }};

#[async_trait]
impl Migration for {{ struct_name }} {
    async fn up(&self, _db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        // _db.execute("ALTER TABLE {{ table_name }} ADD COLUMN example VARCHAR(255)").await?;
        Ok(())
    }

    async fn down(&self, _db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        // _db.execute("ALTER TABLE {{ table_name }} DROP COLUMN example").await?;
        Ok(())
    }
}
"#;

/// Template a new migration is generated from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationTemplate {
    Blank,
    Create,
    Update,
}

impl MigrationTemplate {
    fn source(&self) -> &'static str {
        match self {
            MigrationTemplate::Blank => BLANK_TEMPLATE,
            MigrationTemplate::Create => CREATE_TEMPLATE,
            MigrationTemplate::Update => UPDATE_TEMPLATE,
        }
    }
}

/// `--create` / `--table` style options
#[derive(Debug, Clone, Default)]
pub struct CreatorOptions {
    /// Table to create
    pub create: Option<String>,
    /// Existing table to modify
    pub table: Option<String>,
}

impl CreatorOptions {
    pub fn template(&self) -> MigrationTemplate {
        if self.create.is_some() {
            MigrationTemplate::Create
        } else if self.table.is_some() {
            MigrationTemplate::Update
        } else {
            MigrationTemplate::Blank
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedMigration {
    /// Full migration name, timestamp prefix included
    pub name: String,
    pub path: PathBuf,
    pub filename: String,
    pub struct_name: String,
    pub table_name: String,
}

#[derive(Debug, Clone)]
pub struct MigrationCreator {
    migrations_dir: PathBuf,
}

impl MigrationCreator {
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
        }
    }

    pub fn from_config(config: &MigrationConfig) -> Self {
        Self::new(config.migrations_dir.clone())
    }

    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Create a migration stamped with the current time
    pub fn create(&self, name: &str, options: &CreatorOptions) -> MigrationResult<CreatedMigration> {
        self.create_at(name, options, Utc::now())
    }

    /// Create a migration stamped with `timestamp`
    pub fn create_at(
        &self,
        name: &str,
        options: &CreatorOptions,
        timestamp: DateTime<Utc>,
    ) -> MigrationResult<CreatedMigration> {
        validate_migration_name(name)?;
        let table_name = table_name_for(name, options)?;

        let migration_id = format!("{}_{}", timestamp.format(TIMESTAMP_FORMAT), name);
        // Module names cannot start with a digit
        let filename = format!("m{}.rs", migration_id);
        let path = self.migrations_dir.join(&filename);

        fs::create_dir_all(&self.migrations_dir)?;
        if path.exists() {
            return Err(MigrationError::AlreadyExists(path.display().to_string()));
        }

        let struct_name = to_struct_name(name);
        let source = render(
            options.template(),
            &migration_id,
            &struct_name,
            &table_name,
        )?;
        fs::write(&path, source)?;

        info!(migration = %migration_id, path = %path.display(), "Created migration");

        Ok(CreatedMigration {
            name: migration_id,
            path,
            filename,
            struct_name,
            table_name,
        })
    }
}

/// Render a template without touching the filesystem
pub fn render(
    template: MigrationTemplate,
    migration_id: &str,
    struct_name: &str,
    table_name: &str,
) -> MigrationResult<String> {
    let mut context = Context::new();
    context.insert("migration_id", migration_id);
    context.insert("struct_name", struct_name);
    context.insert("table_name", table_name);

    Ok(Tera::one_off(template.source(), &context, false)?)
}

/// Check that a name is lowercase snake_case starting with a letter
pub fn validate_migration_name(name: &str) -> MigrationResult<()> {
    if name.is_empty() {
        return Err(MigrationError::InvalidName {
            name: name.to_string(),
            reason: "migration name cannot be empty".to_string(),
        });
    }

    if !is_identifier(name) {
        return Err(MigrationError::InvalidName {
            name: name.to_string(),
            reason: "must start with a lowercase letter and contain only lowercase letters, numbers and underscores".to_string(),
        });
    }

    Ok(())
}

fn is_identifier(value: &str) -> bool {
    IDENTIFIER
        .as_ref()
        .is_some_and(|identifier| identifier.is_match(value))
}

fn table_name_for(name: &str, options: &CreatorOptions) -> MigrationResult<String> {
    let explicit = options.create.as_ref().or(options.table.as_ref());
    match explicit {
        Some(table) if !is_identifier(table) => Err(MigrationError::InvalidName {
            name: table.clone(),
            reason: "table names must start with a lowercase letter and contain only lowercase letters, numbers and underscores".to_string(),
        }),
        Some(table) => Ok(table.clone()),
        None => Ok(infer_table_name(name)),
    }
}

/// Guess the table a migration touches from its name
///
/// Falls back to the name itself when no pattern matches.
pub fn infer_table_name(name: &str) -> String {
    TABLE_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(name))
        .and_then(|captures| captures.get(1))
        .map(|table| table.as_str().to_string())
        .unwrap_or_else(|| name.to_string())
}

/// `create_users_table` -> `CreateUsersTable`
pub fn to_struct_name(name: &str) -> String {
    name.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 18, 9, 30, 5).unwrap()
    }

    #[test]
    fn test_infer_table_name() {
        assert_eq!(infer_table_name("create_users_table"), "users");
        assert_eq!(infer_table_name("create_user_roles_table"), "user_roles");
        assert_eq!(infer_table_name("add_email_to_users"), "users");
        assert_eq!(infer_table_name("remove_email_from_users"), "users");
        assert_eq!(infer_table_name("modify_posts_table"), "posts");
        assert_eq!(infer_table_name("update_comments_table"), "comments");
        assert_eq!(infer_table_name("seed_defaults"), "seed_defaults");
    }

    #[test]
    fn test_validate_migration_name() {
        assert!(validate_migration_name("create_users_table").is_ok());
        assert!(validate_migration_name("v2_changes").is_ok());
        assert!(validate_migration_name("").is_err());
        assert!(validate_migration_name("CreateUsers").is_err());
        assert!(validate_migration_name("1_create").is_err());
        assert!(validate_migration_name("create-users").is_err());
        assert!(validate_migration_name("create_users\n").is_err());
    }

    #[test]
    fn test_to_struct_name() {
        assert_eq!(to_struct_name("create_users_table"), "CreateUsersTable");
        assert_eq!(to_struct_name("add_2fa_to_users"), "Add2faToUsers");
    }

    #[test]
    fn test_create_writes_create_template() {
        let dir = TempDir::new().unwrap();
        let creator = MigrationCreator::new(dir.path().join("migrations"));

        let options = CreatorOptions {
            create: Some("users".to_string()),
            table: None,
        };
        let created = creator
            .create_at("create_users_table", &options, timestamp())
            .unwrap();

        assert_eq!(created.name, "2025_06_18_093005_create_users_table");
        assert_eq!(created.filename, "m2025_06_18_093005_create_users_table.rs");
        assert_eq!(created.struct_name, "CreateUsersTable");
        assert_eq!(created.table_name, "users");

        let source = fs::read_to_string(&created.path).unwrap();
        assert!(source.contains("pub struct CreateUsersTable;"));
        assert!(source.contains("pub const NAME: &str = \"2025_06_18_093005_create_users_table\";"));
        assert!(source.contains("CREATE TABLE users ({id}"));
        assert!(source.contains("DROP TABLE IF EXISTS users"));
    }

    #[test]
    fn test_create_infers_template_and_table() {
        let dir = TempDir::new().unwrap();
        let creator = MigrationCreator::new(dir.path());

        let update = creator
            .create_at(
                "add_email_to_users",
                &CreatorOptions {
                    create: None,
                    table: Some("accounts".to_string()),
                },
                timestamp(),
            )
            .unwrap();
        assert_eq!(update.table_name, "accounts");
        let source = fs::read_to_string(&update.path).unwrap();
        assert!(source.contains("ALTER TABLE accounts"));

        let blank = creator
            .create_at("seed_defaults", &CreatorOptions::default(), timestamp())
            .unwrap();
        let source = fs::read_to_string(&blank.path).unwrap();
        assert!(source.contains("_db: &mut dyn SchemaExecutor"));
        assert!(!source.contains("CREATE TABLE"));
        assert!(!source.contains("ALTER TABLE"));
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let creator = MigrationCreator::new(dir.path());

        creator
            .create_at("create_users_table", &CreatorOptions::default(), timestamp())
            .unwrap();
        let err = creator
            .create_at("create_users_table", &CreatorOptions::default(), timestamp())
            .unwrap_err();
        assert!(matches!(err, MigrationError::AlreadyExists(_)));
    }

    #[test]
    fn test_create_rejects_invalid_name() {
        let dir = TempDir::new().unwrap();
        let creator = MigrationCreator::new(dir.path());

        let err = creator
            .create("Bad Name", &CreatorOptions::default())
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidName { .. }));
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[test]
    fn test_create_rejects_unsafe_table_names() {
        let dir = TempDir::new().unwrap();
        let creator = MigrationCreator::new(dir.path());

        for table in ["users\"", "users\\", "Users", "user roles", ""] {
            let err = creator
                .create_at(
                    "create_users_table",
                    &CreatorOptions {
                        create: Some(table.to_string()),
                        table: None,
                    },
                    timestamp(),
                )
                .unwrap_err();
            assert!(matches!(err, MigrationError::InvalidName { .. }), "{table}");
        }

        let err = creator
            .create_at(
                "add_email_to_users",
                &CreatorOptions {
                    create: None,
                    table: Some("users\"; drop".to_string()),
                },
                timestamp(),
            )
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidName { .. }));
        assert!(fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
