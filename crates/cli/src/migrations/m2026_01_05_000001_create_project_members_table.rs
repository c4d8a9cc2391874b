//! Migration 2026_01_05_000001_create_project_members_table

use kest_migrate::{async_trait, Migration, MigrationResult, SchemaExecutor};

pub const NAME: &str = "2026_01_05_000001_create_project_members_table";

pub struct CreateProjectMembersTable;

#[async_trait]
impl Migration for CreateProjectMembersTable {
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        let id = db.dialect().auto_increment_primary_key("id");
        db.execute(&format!(
            "CREATE TABLE project_members (
                {id},
                project_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                role VARCHAR(32) NOT NULL,
                created_at TIMESTAMP NULL,
                updated_at TIMESTAMP NULL
            )"
        ))
        .await?;
        db.execute(
            "CREATE UNIQUE INDEX idx_project_members_project_user ON project_members (project_id, user_id)",
        )
        .await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute("DROP TABLE IF EXISTS project_members").await?;
        Ok(())
    }
}
