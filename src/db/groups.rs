//! Collection groups and their episodes.

use crate::error::DatabaseError;
use crate::{Error, Result};
use sqlx::FromRow;

use super::{Content, ContentRow, Database, Group};

#[derive(FromRow)]
struct GroupRow {
    id: String,
    content_id: String,
    name: String,
    ordinal: i64,
}

impl Database {
    /// Replace the cached groups of a collection
    ///
    /// Episodes are upserted as content rows and linked through
    /// `group_episodes` in play order.
    pub async fn upsert_groups(&self, content_id: &str, groups: &[Group]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM content_groups WHERE content_id = ?")
            .bind(content_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to clear groups: {}",
                    e
                )))
            })?;

        for group in groups {
            sqlx::query("INSERT INTO content_groups (id, content_id, name, ordinal) VALUES (?, ?, ?, ?)")
                .bind(&group.id)
                .bind(content_id)
                .bind(&group.name)
                .bind(group.ordinal)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to insert group: {}",
                        e
                    )))
                })?;

            for (ordinal, episode) in group.episodes.iter().enumerate() {
                Self::upsert_content_on(&mut tx, episode).await?;

                sqlx::query(
                    "INSERT OR IGNORE INTO group_episodes (group_id, episode_id, ordinal) VALUES (?, ?, ?)",
                )
                .bind(&group.id)
                .bind(&episode.id)
                .bind(ordinal as i64)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to link episode: {}",
                        e
                    )))
                })?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    /// Whether the collection's groups have been cached
    pub async fn has_groups(&self, content_id: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM content_groups WHERE content_id = ?")
            .bind(content_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count groups: {}",
                    e
                )))
            })?;

        Ok(count > 0)
    }

    /// Episode ids of a collection in play order
    pub async fn episode_ids_for(&self, content_id: &str) -> Result<Vec<String>> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT ge.episode_id
            FROM group_episodes ge
            JOIN content_groups g ON g.id = ge.group_id
            WHERE g.content_id = ?
            ORDER BY g.ordinal ASC, ge.ordinal ASC
            "#,
        )
        .bind(content_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list episode ids: {}",
                e
            )))
        })?;

        Ok(ids)
    }

    /// Cached groups of a collection, episodes included
    pub async fn groups_for(&self, content_id: &str) -> Result<Vec<Group>> {
        let rows = sqlx::query_as::<_, GroupRow>(
            "SELECT id, content_id, name, ordinal FROM content_groups WHERE content_id = ? ORDER BY ordinal ASC",
        )
        .bind(content_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list groups: {}",
                e
            )))
        })?;

        let mut groups = Vec::with_capacity(rows.len());
        for row in rows {
            let episodes = sqlx::query_as::<_, ContentRow>(
                r#"
                SELECT c.id, c.content_type, c.name, c.description, c.duration,
                       c.card_artwork_url, c.technologies, c.difficulty, c.released_at,
                       c.popularity, c.video_id
                FROM group_episodes ge
                JOIN contents c ON c.id = ge.episode_id
                WHERE ge.group_id = ?
                ORDER BY ge.ordinal ASC
                "#,
            )
            .bind(&row.id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to list group episodes: {}",
                    e
                )))
            })?;

            groups.push(Group {
                id: row.id,
                content_id: row.content_id,
                name: row.name,
                ordinal: row.ordinal,
                episodes: episodes.into_iter().map(Content::from).collect(),
            });
        }

        Ok(groups)
    }
}
