//! Migration 2025_06_18_000000_create_users_table

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "2025_06_18_000000_create_users_table";

pub struct CreateUsersTable;

#[async_trait]
impl Migration for CreateUsersTable {
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        let id = db.dialect().auto_increment_primary_key("id");
        db.execute(&format!(
            "CREATE TABLE users (
                {id},
                username VARCHAR(64) NOT NULL,
                password VARCHAR(255) NOT NULL,
                email VARCHAR(255) NOT NULL,
                nickname VARCHAR(64),
                avatar VARCHAR(512),
                phone VARCHAR(32),
                bio VARCHAR(1024),
                status INTEGER NOT NULL DEFAULT 1,
                last_login TIMESTAMP NULL,
                created_at TIMESTAMP NULL,
                updated_at TIMESTAMP NULL,
                deleted_at TIMESTAMP NULL
            )"
        ))
        .await?;
        db.execute("CREATE UNIQUE INDEX idx_users_email ON users (email)")
            .await?;
        db.execute("CREATE UNIQUE INDEX idx_users_username ON users (username)")
            .await?;
        db.execute("CREATE INDEX idx_users_deleted_at ON users (deleted_at)")
            .await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute("DROP TABLE IF EXISTS users").await?;
        Ok(())
    }
}
