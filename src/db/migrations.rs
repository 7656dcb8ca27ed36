//! Database lifecycle and schema migrations.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::SqliteConnection;
use sqlx::sqlite::SqlitePool;
use std::path::Path;

use super::Database;

impl Database {
    /// Create a new database connection
    ///
    /// Creates the database file if it doesn't exist and runs migrations.
    pub async fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to create database directory: {}",
                    e
                )))
            })?;
        }

        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
        use std::str::FromStr;

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
            .map_err(|e| {
                Error::Database(DatabaseError::ConnectionFailed(format!(
                    "Failed to parse database path: {}",
                    e
                )))
            })?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to connect to database: {}",
                e
            )))
        })?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create schema_version table: {}",
                e
            )))
        })?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to query schema version: {}",
                        e
                    )))
                })?;

        if current_version.unwrap_or(0) < 1 {
            Self::migrate_v1(&mut conn).await?;
        }

        Ok(())
    }

    /// Migration v1: Create initial schema
    async fn migrate_v1(conn: &mut SqliteConnection) -> Result<()> {
        tracing::info!("Applying database migration v1");

        // Partial failures must not leave the schema half-created
        sqlx::query("BEGIN")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to begin transaction: {}",
                    e
                )))
            })?;

        let result = async {
            Self::create_contents_schema(conn).await?;
            Self::create_marks_schema(conn).await?;
            Self::create_groups_schema(conn).await?;
            Self::create_downloads_schema(conn).await?;
            Self::record_migration(conn, 1).await?;
            Ok::<(), Error>(())
        }
        .await;

        match result {
            Ok(()) => {
                sqlx::query("COMMIT")
                    .execute(&mut *conn)
                    .await
                    .map_err(|e| {
                        Error::Database(DatabaseError::MigrationFailed(format!(
                            "Failed to commit migration v1: {}",
                            e
                        )))
                    })?;
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        }

        tracing::info!("Database migration v1 complete");
        Ok(())
    }

    async fn execute_ddl(conn: &mut SqliteConnection, sql: &str, what: &str) -> Result<()> {
        sqlx::query(sql).execute(&mut *conn).await.map_err(|e| {
            Error::Database(DatabaseError::MigrationFailed(format!(
                "Failed to create {}: {}",
                what, e
            )))
        })?;
        Ok(())
    }

    /// Create contents table and its indexes
    async fn create_contents_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE contents (
                id TEXT PRIMARY KEY NOT NULL,
                content_type TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                duration INTEGER NOT NULL DEFAULT 0,
                card_artwork_url TEXT,
                technologies TEXT NOT NULL DEFAULT '',
                difficulty TEXT,
                released_at INTEGER NOT NULL DEFAULT 0,
                popularity REAL NOT NULL DEFAULT 0.0,
                video_id INTEGER
            )
            "#,
            "contents table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_contents_type_released ON contents(content_type, released_at)",
            "contents index",
        )
        .await
    }

    /// Create bookmarks and progressions tables
    async fn create_marks_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE bookmarks (
                id TEXT PRIMARY KEY NOT NULL,
                content_id TEXT NOT NULL UNIQUE
            )
            "#,
            "bookmarks table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE progressions (
                id TEXT PRIMARY KEY NOT NULL,
                content_id TEXT NOT NULL UNIQUE,
                progress INTEGER NOT NULL DEFAULT 0,
                finished INTEGER NOT NULL DEFAULT 0,
                updated_at INTEGER NOT NULL
            )
            "#,
            "progressions table",
        )
        .await
    }

    /// Create groups and group_episodes tables
    async fn create_groups_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE content_groups (
                id TEXT PRIMARY KEY NOT NULL,
                content_id TEXT NOT NULL,
                name TEXT NOT NULL,
                ordinal INTEGER NOT NULL DEFAULT 0
            )
            "#,
            "content_groups table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE group_episodes (
                group_id TEXT NOT NULL REFERENCES content_groups(id) ON DELETE CASCADE,
                episode_id TEXT NOT NULL,
                ordinal INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (group_id, episode_id)
            )
            "#,
            "group_episodes table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_groups_content ON content_groups(content_id)",
            "groups index",
        )
        .await
    }

    /// Create downloads table and its indexes
    async fn create_downloads_schema(conn: &mut SqliteConnection) -> Result<()> {
        Self::execute_ddl(
            conn,
            r#"
            CREATE TABLE downloads (
                download_id TEXT PRIMARY KEY NOT NULL,
                content_id TEXT NOT NULL,
                url TEXT,
                progress INTEGER NOT NULL DEFAULT 0,
                state INTEGER NOT NULL DEFAULT 0,
                failure_reason INTEGER,
                is_marker INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL
            )
            "#,
            "downloads table",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_downloads_state ON downloads(state, created_at)",
            "downloads state index",
        )
        .await?;

        Self::execute_ddl(
            conn,
            "CREATE INDEX idx_downloads_content ON downloads(content_id)",
            "downloads content index",
        )
        .await
    }

    /// Record a migration version in schema_version
    async fn record_migration(conn: &mut SqliteConnection, version: i64) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(now)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::MigrationFailed(format!(
                    "Failed to record migration: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Delete every cached row (logout purge)
    pub async fn purge_all(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "group_episodes",
            "content_groups",
            "bookmarks",
            "progressions",
            "downloads",
            "contents",
        ] {
            sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to purge {}: {}",
                        table, e
                    )))
                })?;
        }
        tx.commit().await?;
        tracing::info!("Local cache purged");
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
