//! Application migrations registered by the `kest` binary
//!
//! New units are generated with `kest make <name>` into this directory and
//! added to `all()` by hand.

use std::sync::Arc;

use kest_migrate::Migration;

mod m2025_06_18_000000_create_users_table;
mod m2025_12_26_000000_create_roles_table;
mod m2025_12_26_000001_create_permissions_table;
mod m2025_12_26_000002_create_role_permissions_table;
mod m2025_12_26_000003_create_user_roles_table;
mod m2026_01_05_000000_create_projects_table;
mod m2026_01_05_000001_create_project_members_table;

/// Every bundled migration keyed by its registration name
pub fn all() -> Vec<(&'static str, Arc<dyn Migration>)> {
    vec![
        unit(
            m2025_06_18_000000_create_users_table::NAME,
            m2025_06_18_000000_create_users_table::CreateUsersTable,
        ),
        unit(
            m2025_12_26_000000_create_roles_table::NAME,
            m2025_12_26_000000_create_roles_table::CreateRolesTable,
        ),
        unit(
            m2025_12_26_000001_create_permissions_table::NAME,
            m2025_12_26_000001_create_permissions_table::CreatePermissionsTable,
        ),
        unit(
            m2025_12_26_000002_create_role_permissions_table::NAME,
            m2025_12_26_000002_create_role_permissions_table::CreateRolePermissionsTable,
        ),
        unit(
            m2025_12_26_000003_create_user_roles_table::NAME,
            m2025_12_26_000003_create_user_roles_table::CreateUserRolesTable,
        ),
        unit(
            m2026_01_05_000000_create_projects_table::NAME,
            m2026_01_05_000000_create_projects_table::CreateProjectsTable,
        ),
        unit(
            m2026_01_05_000001_create_project_members_table::NAME,
            m2026_01_05_000001_create_project_members_table::CreateProjectMembersTable,
        ),
    ]
}

fn unit<M>(name: &'static str, migration: M) -> (&'static str, Arc<dyn Migration>)
where
    M: Migration + 'static,
{
    (name, Arc::new(migration))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kest_migrate::{
        CapturedOutput, Database, DatabaseOptions, MigrationConfig, Migrator, MigratorOptions,
    };
    use std::collections::HashSet;

    async fn migrator() -> Migrator {
        let db = Database::connect_with("sqlite::memory:", DatabaseOptions::single_connection())
            .await
            .unwrap();
        let migrator = Migrator::from_config(db, &MigrationConfig::default());
        migrator.register_many(all());
        migrator
    }

    async fn tables(migrator: &Migrator) -> HashSet<String> {
        sqlx::query_scalar::<_, String>(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(migrator.database().pool())
        .await
        .unwrap()
        .into_iter()
        .collect()
    }

    #[test]
    fn test_names_are_unique_and_ordered() {
        let names: Vec<&str> = all().into_iter().map(|(name, _)| name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(names, sorted);
    }

    #[tokio::test]
    async fn test_bundled_migrations_apply_and_reset() {
        let migrator = migrator().await;

        let ran = migrator.run(MigratorOptions::new()).await.unwrap();
        assert_eq!(ran.len(), all().len());

        let created = tables(&migrator).await;
        for table in [
            "users",
            "roles",
            "permissions",
            "role_permissions",
            "user_roles",
            "projects",
            "project_members",
            "migrations",
        ] {
            assert!(created.contains(table), "missing table {table}");
        }

        let rolled_back = migrator.reset(false).await.unwrap();
        assert_eq!(
            rolled_back.first().map(String::as_str),
            Some(m2026_01_05_000001_create_project_members_table::NAME)
        );
        assert_eq!(
            tables(&migrator).await,
            HashSet::from(["migrations".to_string()])
        );
    }

    #[tokio::test]
    async fn test_bundled_migrations_pretend() {
        let migrator = migrator().await;
        let output = Arc::new(CapturedOutput::new());
        migrator.set_output(output.clone());

        migrator
            .run(MigratorOptions::new().with_pretend())
            .await
            .unwrap();

        let users = output
            .statements_for(m2025_06_18_000000_create_users_table::NAME)
            .unwrap();
        assert_eq!(users.len(), 4);
        assert!(users[0].starts_with("CREATE TABLE users"));
        assert!(tables(&migrator).await.is_empty());
    }
}
