//! Migration 2025_12_26_000003_create_user_roles_table

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "2025_12_26_000003_create_user_roles_table";

pub struct CreateUserRolesTable;

#[async_trait]
impl Migration for CreateUserRolesTable {
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute(
            "CREATE TABLE user_roles (
                user_id BIGINT NOT NULL,
                role_id BIGINT NOT NULL,
                PRIMARY KEY (user_id, role_id)
            )",
        )
        .await?;
        db.execute("CREATE INDEX idx_user_roles_role_id ON user_roles (role_id)")
            .await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute("DROP TABLE IF EXISTS user_roles").await?;
        Ok(())
    }
}
