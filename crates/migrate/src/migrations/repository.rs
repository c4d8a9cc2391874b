//! Migration ledger storage
//!
//! The ledger is a table in the migrated database recording which
//! migrations are applied, in which batch, and when.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::AnyRow;
use sqlx::Row;
use tracing::debug;

use crate::database::{Database, SqlDialect};
use crate::error::MigrationResult;
use crate::migrations::definitions::MigrationRecord;

/// Durable record of applied migrations
#[async_trait]
pub trait MigrationRepository: Send + Sync {
    async fn repository_exists(&self) -> MigrationResult<bool>;

    /// Create the ledger table; a no-op when it already exists
    async fn create_repository(&self) -> MigrationResult<()>;

    async fn delete_repository(&self) -> MigrationResult<()>;

    /// Record a migration as applied. Fails if the name is already logged.
    async fn log(&self, migration: &str, batch: i64) -> MigrationResult<()>;

    async fn delete(&self, migration: &str) -> MigrationResult<()>;

    /// Applied names ordered by batch, then name
    async fn get_ran(&self) -> MigrationResult<Vec<String>>;

    /// Records of the highest batch, most recent first
    async fn get_last(&self) -> MigrationResult<Vec<MigrationRecord>>;

    /// The `steps` most recently applied records, most recent first
    async fn get_migrations(&self, steps: usize) -> MigrationResult<Vec<MigrationRecord>>;

    /// Records of one batch, most recent first
    async fn get_migrations_by_batch(&self, batch: i64) -> MigrationResult<Vec<MigrationRecord>>;

    async fn get_migration_batches(&self) -> MigrationResult<HashMap<String, i64>>;

    /// One more than the highest batch, or 1 for an empty ledger
    async fn get_next_batch_number(&self) -> MigrationResult<i64>;
}

/// Ledger stored in a table of the migrated database
#[derive(Debug, Clone)]
pub struct DatabaseMigrationRepository {
    db: Database,
    table: String,
}

impl DatabaseMigrationRepository {
    pub fn new(db: Database, table: impl Into<String>) -> Self {
        Self {
            db,
            table: table.into(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn dialect(&self) -> &SqlDialect {
        self.db.dialect()
    }

    fn quoted_table(&self) -> String {
        self.dialect().quote_identifier(&self.table)
    }

    fn placeholder(&self, index: usize) -> String {
        self.dialect().parameter_placeholder(index)
    }

    fn build_create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n    {},\n    migration VARCHAR(255) NOT NULL UNIQUE,\n    batch BIGINT NOT NULL,\n    applied_at VARCHAR(64) NOT NULL\n)",
            self.quoted_table(),
            self.dialect().auto_increment_primary_key("id"),
        )
    }

    fn build_exists_sql(&self) -> String {
        let param = self.placeholder(0);
        match self.dialect() {
            SqlDialect::PostgreSQL => format!(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = {}",
                param
            ),
            SqlDialect::MySQL => format!(
                "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = {}",
                param
            ),
            _ => format!(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = {}",
                param
            ),
        }
    }

    fn select_records_sql(&self, filter: &str) -> String {
        format!(
            "SELECT migration, batch, applied_at FROM {} {}",
            self.quoted_table(),
            filter
        )
    }

    fn decode_record(row: &AnyRow) -> MigrationResult<MigrationRecord> {
        let applied_at: String = row.try_get("applied_at")?;
        let applied_at = DateTime::parse_from_rfc3339(&applied_at)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
            .with_timezone(&Utc);

        Ok(MigrationRecord {
            migration: row.try_get("migration")?,
            batch: row.try_get("batch")?,
            applied_at,
        })
    }

    fn decode_records(rows: &[AnyRow]) -> MigrationResult<Vec<MigrationRecord>> {
        rows.iter().map(Self::decode_record).collect()
    }
}

#[async_trait]
impl MigrationRepository for DatabaseMigrationRepository {
    async fn repository_exists(&self) -> MigrationResult<bool> {
        if let SqlDialect::Other(_) = self.dialect() {
            let probe = format!("SELECT COUNT(*) FROM {}", self.quoted_table());
            return Ok(sqlx::query(&probe).fetch_one(self.db.pool()).await.is_ok());
        }

        let sql = self.build_exists_sql();
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(self.table.clone())
            .fetch_one(self.db.pool())
            .await?;
        Ok(count > 0)
    }

    async fn create_repository(&self) -> MigrationResult<()> {
        debug!(table = %self.table, "Creating migrations table");
        sqlx::query(&self.build_create_table_sql())
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    async fn delete_repository(&self) -> MigrationResult<()> {
        debug!(table = %self.table, "Dropping migrations table");
        let sql = format!("DROP TABLE IF EXISTS {}", self.quoted_table());
        sqlx::query(&sql).execute(self.db.pool()).await?;
        Ok(())
    }

    async fn log(&self, migration: &str, batch: i64) -> MigrationResult<()> {
        let sql = format!(
            "INSERT INTO {} (migration, batch, applied_at) VALUES ({}, {}, {})",
            self.quoted_table(),
            self.placeholder(0),
            self.placeholder(1),
            self.placeholder(2),
        );
        sqlx::query(&sql)
            .bind(migration.to_string())
            .bind(batch)
            .bind(Utc::now().to_rfc3339())
            .execute(self.db.pool())
            .await?;
        debug!(migration, batch, "Logged migration");
        Ok(())
    }

    async fn delete(&self, migration: &str) -> MigrationResult<()> {
        let sql = format!(
            "DELETE FROM {} WHERE migration = {}",
            self.quoted_table(),
            self.placeholder(0)
        );
        sqlx::query(&sql)
            .bind(migration.to_string())
            .execute(self.db.pool())
            .await?;
        debug!(migration, "Removed migration from ledger");
        Ok(())
    }

    async fn get_ran(&self) -> MigrationResult<Vec<String>> {
        let sql = format!(
            "SELECT migration FROM {} ORDER BY batch ASC, migration ASC",
            self.quoted_table()
        );
        let names = sqlx::query_scalar(&sql).fetch_all(self.db.pool()).await?;
        Ok(names)
    }

    async fn get_last(&self) -> MigrationResult<Vec<MigrationRecord>> {
        let sql = self.select_records_sql(&format!(
            "WHERE batch = (SELECT MAX(batch) FROM {}) ORDER BY migration DESC",
            self.quoted_table()
        ));
        let rows = sqlx::query(&sql).fetch_all(self.db.pool()).await?;
        Self::decode_records(&rows)
    }

    async fn get_migrations(&self, steps: usize) -> MigrationResult<Vec<MigrationRecord>> {
        if steps == 0 {
            return Ok(Vec::new());
        }

        let sql = self.select_records_sql(&format!(
            "ORDER BY batch DESC, migration DESC LIMIT {}",
            self.placeholder(0)
        ));
        let limit = i64::try_from(steps).unwrap_or(i64::MAX);
        let rows = sqlx::query(&sql)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;
        Self::decode_records(&rows)
    }

    async fn get_migrations_by_batch(&self, batch: i64) -> MigrationResult<Vec<MigrationRecord>> {
        let sql = self.select_records_sql(&format!(
            "WHERE batch = {} ORDER BY migration DESC",
            self.placeholder(0)
        ));
        let rows = sqlx::query(&sql)
            .bind(batch)
            .fetch_all(self.db.pool())
            .await?;
        Self::decode_records(&rows)
    }

    async fn get_migration_batches(&self) -> MigrationResult<HashMap<String, i64>> {
        let sql = format!("SELECT migration, batch FROM {}", self.quoted_table());
        let rows = sqlx::query(&sql).fetch_all(self.db.pool()).await?;

        rows.iter()
            .map(|row| -> MigrationResult<(String, i64)> {
                Ok((row.try_get("migration")?, row.try_get("batch")?))
            })
            .collect()
    }

    async fn get_next_batch_number(&self) -> MigrationResult<i64> {
        let sql = format!("SELECT MAX(batch) FROM {}", self.quoted_table());
        let max: Option<i64> = sqlx::query_scalar(&sql).fetch_one(self.db.pool()).await?;
        Ok(max.unwrap_or(0) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseOptions;

    async fn repository() -> DatabaseMigrationRepository {
        let db = Database::connect_with("sqlite::memory:", DatabaseOptions::single_connection())
            .await
            .unwrap();
        DatabaseMigrationRepository::new(db, "migrations")
    }

    #[tokio::test]
    async fn test_create_repository_is_idempotent() {
        let repo = repository().await;
        assert!(!repo.repository_exists().await.unwrap());

        repo.create_repository().await.unwrap();
        repo.create_repository().await.unwrap();
        assert!(repo.repository_exists().await.unwrap());

        repo.delete_repository().await.unwrap();
        assert!(!repo.repository_exists().await.unwrap());
    }

    #[tokio::test]
    async fn test_next_batch_number() {
        let repo = repository().await;
        repo.create_repository().await.unwrap();
        assert_eq!(repo.get_next_batch_number().await.unwrap(), 1);

        repo.log("a", 1).await.unwrap();
        repo.log("b", 4).await.unwrap();
        assert_eq!(repo.get_next_batch_number().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_log_rejects_duplicates() {
        let repo = repository().await;
        repo.create_repository().await.unwrap();
        repo.log("a", 1).await.unwrap();

        let err = repo.log("a", 2).await.unwrap_err();
        assert!(matches!(err, crate::error::MigrationError::Database(_)));
    }

    #[tokio::test]
    async fn test_ordering_queries() {
        let repo = repository().await;
        repo.create_repository().await.unwrap();
        repo.log("2024_01_02_b", 1).await.unwrap();
        repo.log("2024_01_01_a", 1).await.unwrap();
        repo.log("2024_01_03_c", 2).await.unwrap();
        repo.log("2024_01_04_d", 2).await.unwrap();

        assert_eq!(
            repo.get_ran().await.unwrap(),
            vec!["2024_01_01_a", "2024_01_02_b", "2024_01_03_c", "2024_01_04_d"]
        );

        let last: Vec<_> = repo
            .get_last()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.migration)
            .collect();
        assert_eq!(last, vec!["2024_01_04_d", "2024_01_03_c"]);

        let recent: Vec<_> = repo
            .get_migrations(3)
            .await
            .unwrap()
            .into_iter()
            .map(|r| (r.migration, r.batch))
            .collect();
        assert_eq!(
            recent,
            vec![
                ("2024_01_04_d".to_string(), 2),
                ("2024_01_03_c".to_string(), 2),
                ("2024_01_02_b".to_string(), 1),
            ]
        );

        let first_batch: Vec<_> = repo
            .get_migrations_by_batch(1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.migration)
            .collect();
        assert_eq!(first_batch, vec!["2024_01_02_b", "2024_01_01_a"]);

        assert!(repo.get_migrations(0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_and_batches() {
        let repo = repository().await;
        repo.create_repository().await.unwrap();
        repo.log("a", 1).await.unwrap();
        repo.log("b", 2).await.unwrap();

        repo.delete("a").await.unwrap();
        let batches = repo.get_migration_batches().await.unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches.get("b"), Some(&2));
    }

    #[tokio::test]
    async fn test_records_carry_applied_at() {
        let repo = repository().await;
        repo.create_repository().await.unwrap();
        let before = Utc::now() - chrono::Duration::seconds(1);
        repo.log("a", 1).await.unwrap();

        let records = repo.get_last().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].applied_at >= before);
    }

    #[tokio::test]
    async fn test_sql_follows_dialect() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::any::AnyPoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .unwrap();

        let postgres = DatabaseMigrationRepository::new(
            Database::new(pool.clone(), SqlDialect::PostgreSQL),
            "schema_migrations",
        );
        let create = postgres.build_create_table_sql();
        assert!(create.starts_with("CREATE TABLE IF NOT EXISTS \"schema_migrations\""));
        assert!(create.contains("\"id\" BIGSERIAL PRIMARY KEY"));
        assert!(postgres.build_exists_sql().ends_with("table_name = $1"));

        let mysql = DatabaseMigrationRepository::new(
            Database::new(pool, SqlDialect::MySQL),
            "schema_migrations",
        );
        assert!(mysql
            .build_create_table_sql()
            .contains("`id` BIGINT AUTO_INCREMENT PRIMARY KEY"));
        assert!(mysql.build_exists_sql().contains("DATABASE()"));
    }
}
