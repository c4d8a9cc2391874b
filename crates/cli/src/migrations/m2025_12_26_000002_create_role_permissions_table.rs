//! Migration 2025_12_26_000002_create_role_permissions_table

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "2025_12_26_000002_create_role_permissions_table";

pub struct CreateRolePermissionsTable;

#[async_trait]
impl Migration for CreateRolePermissionsTable {
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute(
            "CREATE TABLE role_permissions (
                role_id BIGINT NOT NULL,
                permission_id BIGINT NOT NULL,
                PRIMARY KEY (role_id, permission_id)
            )",
        )
        .await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute("DROP TABLE IF EXISTS role_permissions").await?;
        Ok(())
    }
}
