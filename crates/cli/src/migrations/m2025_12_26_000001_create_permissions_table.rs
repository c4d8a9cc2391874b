//! Migration 2025_12_26_000001_create_permissions_table

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "2025_12_26_000001_create_permissions_table";

pub struct CreatePermissionsTable;

#[async_trait]
impl Migration for CreatePermissionsTable {
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        let id = db.dialect().auto_increment_primary_key("id");
        db.execute(&format!(
            "CREATE TABLE permissions (
                {id},
                name VARCHAR(128) NOT NULL,
                display_name VARCHAR(128),
                description VARCHAR(512),
                created_at TIMESTAMP NULL,
                updated_at TIMESTAMP NULL
            )"
        ))
        .await?;
        db.execute("CREATE UNIQUE INDEX idx_permissions_name ON permissions (name)")
            .await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute("DROP TABLE IF EXISTS permissions").await?;
        Ok(())
    }
}
