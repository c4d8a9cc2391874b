//! Migration 2026_01_05_000000_create_projects_table

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "2026_01_05_000000_create_projects_table";

pub struct CreateProjectsTable;

#[async_trait]
impl Migration for CreateProjectsTable {
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        let id = db.dialect().auto_increment_primary_key("id");
        db.execute(&format!(
            "CREATE TABLE projects (
                {id},
                name VARCHAR(128) NOT NULL,
                slug VARCHAR(128) NOT NULL,
                platform VARCHAR(32),
                status INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP NULL,
                updated_at TIMESTAMP NULL,
                deleted_at TIMESTAMP NULL
            )"
        ))
        .await?;
        db.execute("CREATE UNIQUE INDEX idx_projects_slug ON projects (slug)")
            .await?;
        db.execute("CREATE INDEX idx_projects_deleted_at ON projects (deleted_at)")
            .await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute("DROP TABLE IF EXISTS projects").await?;
        Ok(())
    }
}
