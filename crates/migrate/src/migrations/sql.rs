//! Migrations written as plain SQL scripts

use async_trait::async_trait;
use sqlparser::dialect::GenericDialect;
use sqlparser::tokenizer::{Token, Tokenizer};

use crate::error::MigrationResult;
use crate::executor::SchemaExecutor;
use crate::migrations::definitions::Migration;

/// A migration unit built from an up script and a down script
///
/// Each script may hold several `;`-separated statements; they are executed
/// one at a time, in order.
#[derive(Debug, Clone)]
pub struct SqlMigration {
    up_sql: String,
    down_sql: String,
    transactional: bool,
}

impl SqlMigration {
    pub fn new(up_sql: impl Into<String>, down_sql: impl Into<String>) -> Self {
        Self {
            up_sql: up_sql.into(),
            down_sql: down_sql.into(),
            transactional: true,
        }
    }

    /// Run outside a transaction, e.g. for `CREATE INDEX CONCURRENTLY`
    pub fn without_transaction(mut self) -> Self {
        self.transactional = false;
        self
    }

    pub fn up_sql(&self) -> &str {
        &self.up_sql
    }

    pub fn down_sql(&self) -> &str {
        &self.down_sql
    }
}

#[async_trait]
impl Migration for SqlMigration {
    async fn up(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute_all(&split_sql_statements(&self.up_sql)).await?;
        Ok(())
    }

    async fn down(&self, db: &mut dyn SchemaExecutor) -> MigrationResult<()> {
        db.execute_all(&split_sql_statements(&self.down_sql)).await?;
        Ok(())
    }

    fn runs_in_transaction(&self) -> bool {
        self.transactional
    }
}

/// Split a script into individual statements
///
/// Semicolons inside string literals, quoted identifiers and comments do not
/// end a statement. Statement text is kept exactly as written, minus
/// surrounding whitespace and the terminating `;`. Chunks holding only
/// comments are dropped.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let dialect = GenericDialect {};
    let tokens = match Tokenizer::new(&dialect, sql).tokenize_with_location() {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::warn!("SQL tokenizing failed, using naive semicolon splitting: {}", e);
            return sql
                .split(';')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
    };

    let line_starts = line_offsets(sql);
    let mut statements = Vec::new();
    let mut start = 0;
    let mut has_content = false;

    for token in &tokens {
        match &token.token {
            Token::SemiColon => {
                let line = token.location.line as usize;
                let column = token.location.column as usize;
                let Some(end) = byte_offset(sql, &line_starts, line, column) else {
                    continue;
                };
                if has_content {
                    push_statement(&mut statements, &sql[start..end]);
                }
                start = end + 1;
                has_content = false;
            }
            Token::Whitespace(_) | Token::EOF => {}
            _ => has_content = true,
        }
    }

    if has_content {
        push_statement(&mut statements, &sql[start..]);
    }

    statements
}

fn push_statement(statements: &mut Vec<String>, chunk: &str) {
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        statements.push(chunk.to_string());
    }
}

fn line_offsets(sql: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(sql.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

/// Byte offset of a 1-based line/column (column counted in chars)
fn byte_offset(sql: &str, line_starts: &[usize], line: usize, column: usize) -> Option<usize> {
    let line_start = *line_starts.get(line.checked_sub(1)?)?;
    sql[line_start..]
        .char_indices()
        .nth(column.checked_sub(1)?)
        .map(|(i, _)| line_start + i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqlDialect;
    use crate::executor::PretendExecutor;

    #[test]
    fn test_split_simple_script() {
        let sql = "CREATE TABLE users (id INT);\nCREATE TABLE posts (id INT);\n";
        assert_eq!(
            split_sql_statements(sql),
            vec!["CREATE TABLE users (id INT)", "CREATE TABLE posts (id INT)"]
        );
    }

    #[test]
    fn test_split_ignores_semicolons_in_strings_and_comments() {
        let sql = "INSERT INTO notes (body) VALUES ('a; b');\n\
                   -- comment; still a comment\n\
                   INSERT INTO notes (body) VALUES ('it''s');";
        let statements = split_sql_statements(sql);

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "INSERT INTO notes (body) VALUES ('a; b')");
        assert!(statements[1].ends_with("VALUES ('it''s')"));
    }

    #[test]
    fn test_split_keeps_dialect_specific_syntax() {
        let sql = "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, é TEXT); SELECT 1";
        assert_eq!(
            split_sql_statements(sql),
            vec![
                "CREATE TABLE t (id INTEGER PRIMARY KEY AUTOINCREMENT, é TEXT)",
                "SELECT 1"
            ]
        );
    }

    #[test]
    fn test_split_drops_empty_and_comment_only_chunks() {
        assert!(split_sql_statements("").is_empty());
        assert!(split_sql_statements(" ;; \n").is_empty());
        assert_eq!(
            split_sql_statements("SELECT 1;\n-- trailing note\n"),
            vec!["SELECT 1"]
        );
    }

    #[tokio::test]
    async fn test_sql_migration_runs_each_statement() {
        let migration = SqlMigration::new(
            "CREATE TABLE a (id INT); CREATE TABLE b (id INT);",
            "DROP TABLE b; DROP TABLE a;",
        );
        assert!(migration.runs_in_transaction());

        let mut executor = PretendExecutor::new(SqlDialect::SQLite);
        migration.up(&mut executor).await.unwrap();
        migration.down(&mut executor).await.unwrap();

        assert_eq!(
            executor.statements(),
            &[
                "CREATE TABLE a (id INT)".to_string(),
                "CREATE TABLE b (id INT)".to_string(),
                "DROP TABLE b".to_string(),
                "DROP TABLE a".to_string(),
            ]
        );

        assert!(!migration.without_transaction().runs_in_transaction());
    }
}
