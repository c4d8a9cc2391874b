//! Migration 2025_12_26_000000_create_roles_table

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "2025_12_26_000000_create_roles_table";

pub struct CreateRolesTable;

#[async_trait]
impl Migration for CreateRolesTable {
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        let id = db.dialect().auto_increment_primary_key("id");
        db.execute(&format!(
            "CREATE TABLE roles (
                {id},
                name VARCHAR(64) NOT NULL,
                display_name VARCHAR(128),
                description VARCHAR(512),
                is_default INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NULL,
                updated_at TIMESTAMP NULL
            )"
        ))
        .await?;
        db.execute("CREATE UNIQUE INDEX idx_roles_name ON roles (name)")
            .await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute("DROP TABLE IF EXISTS roles").await?;
        Ok(())
    }
}
