//! Bookmarks and progressions.

use crate::error::DatabaseError;
use crate::{Error, Result};

use super::{Bookmark, Database, Progression};

impl Database {
    /// Store a bookmark, replacing any previous one for the same content
    pub async fn upsert_bookmark(&self, bookmark: &Bookmark) -> Result<()> {
        let inserted = sqlx::query("INSERT OR IGNORE INTO bookmarks (id, content_id) VALUES (?, ?)")
            .bind(&bookmark.id)
            .bind(&bookmark.content_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert bookmark: {}",
                    e
                )))
            })?
            .rows_affected();

        if inserted == 0 {
            sqlx::query("UPDATE bookmarks SET id = ? WHERE content_id = ?")
                .bind(&bookmark.id)
                .bind(&bookmark.content_id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to update bookmark: {}",
                        e
                    )))
                })?;
        }

        Ok(())
    }

    /// Get the bookmark on a content item
    pub async fn get_bookmark(&self, content_id: &str) -> Result<Option<Bookmark>> {
        let row = sqlx::query_as::<_, Bookmark>(
            "SELECT id, content_id FROM bookmarks WHERE content_id = ?",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get bookmark: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Delete the bookmark on a content item
    pub async fn delete_bookmark(&self, content_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM bookmarks WHERE content_id = ?")
            .bind(content_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete bookmark: {}",
                    e
                )))
            })?;

        Ok(())
    }

    /// Store a progression, replacing any previous one for the same content
    pub async fn upsert_progression(&self, progression: &Progression) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO progressions (id, content_id, progress, finished, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&progression.id)
        .bind(&progression.content_id)
        .bind(progression.progress)
        .bind(progression.finished)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert progression: {}",
                e
            )))
        })?
        .rows_affected();

        if inserted == 0 {
            sqlx::query(
                r#"
                UPDATE progressions
                SET id = ?, progress = ?, finished = ?, updated_at = ?
                WHERE content_id = ?
                "#,
            )
            .bind(&progression.id)
            .bind(progression.progress)
            .bind(progression.finished)
            .bind(now)
            .bind(&progression.content_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update progression: {}",
                    e
                )))
            })?;
        }

        Ok(())
    }

    /// Get the progression on a content item
    pub async fn get_progression(&self, content_id: &str) -> Result<Option<Progression>> {
        let row = sqlx::query_as::<_, Progression>(
            "SELECT id, content_id, progress, finished FROM progressions WHERE content_id = ?",
        )
        .bind(content_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get progression: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// Delete the progression on a content item
    pub async fn delete_progression(&self, content_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM progressions WHERE content_id = ?")
            .bind(content_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to delete progression: {}",
                    e
                )))
            })?;

        Ok(())
    }
}
