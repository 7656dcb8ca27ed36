//! Content upserts and filtered catalog queries.

use crate::error::DatabaseError;
use crate::types::{ContentFilters, ContentType, SortOrder};
use crate::{Error, Result};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};

use super::{Content, ContentRecord, ContentRecordRow, ContentRow, Database, join_tags};

const CONTENT_COLUMNS: &str = "c.id, c.content_type, c.name, c.description, c.duration, \
     c.card_artwork_url, c.technologies, c.difficulty, c.released_at, c.popularity, c.video_id";

impl Database {
    /// Insert or update a single content row
    pub async fn upsert_content(&self, content: &Content) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        Self::upsert_content_on(&mut conn, content).await
    }

    /// Insert or update a batch of content rows in one transaction
    pub async fn upsert_contents(&self, contents: &[Content]) -> Result<()> {
        if contents.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for content in contents {
            Self::upsert_content_on(&mut tx, content).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub(super) async fn upsert_content_on(
        conn: &mut SqliteConnection,
        content: &Content,
    ) -> Result<()> {
        let technologies = join_tags(&content.technologies);

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO contents (
                id, content_type, name, description, duration, card_artwork_url,
                technologies, difficulty, released_at, popularity, video_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&content.id)
        .bind(&content.content_type)
        .bind(&content.name)
        .bind(&content.description)
        .bind(content.duration_secs)
        .bind(&content.card_artwork_url)
        .bind(&technologies)
        .bind(&content.difficulty)
        .bind(content.released_at)
        .bind(content.popularity)
        .bind(content.video_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert content: {}",
                e
            )))
        })?
        .rows_affected();

        if inserted > 0 {
            return Ok(());
        }

        sqlx::query(
            r#"
            UPDATE contents SET
                content_type = ?, name = ?, description = ?, duration = ?,
                card_artwork_url = ?, technologies = ?, difficulty = ?,
                released_at = ?, popularity = ?, video_id = ?
            WHERE id = ?
            "#,
        )
        .bind(&content.content_type)
        .bind(&content.name)
        .bind(&content.description)
        .bind(content.duration_secs)
        .bind(&content.card_artwork_url)
        .bind(&technologies)
        .bind(&content.difficulty)
        .bind(content.released_at)
        .bind(content.popularity)
        .bind(content.video_id)
        .bind(&content.id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update content: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Get a content row by id
    pub async fn get_content(&self, id: &str) -> Result<Option<Content>> {
        let sql = format!("SELECT {} FROM contents c WHERE c.id = ?", CONTENT_COLUMNS);
        let row = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get content: {}",
                    e
                )))
            })?;

        Ok(row.map(Content::from))
    }

    /// Get a content row merged with bookmark, progression and download state
    pub async fn get_content_record(&self, id: &str) -> Result<Option<ContentRecord>> {
        let mut builder = Self::record_select();
        builder.push(" WHERE c.id = ").push_bind(id);
        let row = builder
            .build_query_as::<ContentRecordRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get content record: {}",
                    e
                )))
            })?;

        Ok(row.map(ContentRecord::from))
    }

    /// Query the cached catalog for a surface
    ///
    /// Episodes are never listed on their own unless explicitly requested
    /// through `filters.content_types`.
    pub async fn query_contents(
        &self,
        filters: &ContentFilters,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<ContentRecord>> {
        let mut builder = Self::record_select();
        Self::push_filters(&mut builder, filters);
        match filters.sort {
            SortOrder::Newest => builder.push(" ORDER BY c.released_at DESC, c.id ASC"),
            SortOrder::Popularity => builder.push(" ORDER BY c.popularity DESC, c.id ASC"),
        };
        builder.push(" LIMIT ").push_bind(limit);
        builder.push(" OFFSET ").push_bind(offset);

        let rows = builder
            .build_query_as::<ContentRecordRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to query contents: {}",
                    e
                )))
            })?;

        Ok(rows.into_iter().map(ContentRecord::from).collect())
    }

    /// Count cached rows matching a surface's filters
    pub async fn count_contents(&self, filters: &ContentFilters) -> Result<i64> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT COUNT(*) FROM contents c \
             LEFT JOIN bookmarks b ON b.content_id = c.id \
             LEFT JOIN progressions p ON p.content_id = c.id \
             LEFT JOIN downloads d ON d.download_id = c.id",
        );
        Self::push_filters(&mut builder, filters);

        let count: i64 = builder
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to count contents: {}",
                    e
                )))
            })?;

        Ok(count)
    }

    fn record_select<'a>() -> QueryBuilder<'a, Sqlite> {
        QueryBuilder::new(format!(
            "SELECT {}, \
                 b.id AS bookmark_id, \
                 p.id AS progression_id, \
                 p.progress AS progression_progress, \
                 p.finished AS progression_finished, \
                 d.state AS download_state, \
                 d.progress AS download_progress \
             FROM contents c \
             LEFT JOIN bookmarks b ON b.content_id = c.id \
             LEFT JOIN progressions p ON p.content_id = c.id \
             LEFT JOIN downloads d ON d.download_id = c.id",
            CONTENT_COLUMNS
        ))
    }

    fn push_filters<'a>(builder: &mut QueryBuilder<'a, Sqlite>, filters: &'a ContentFilters) {
        let types: Vec<&'static str> = if filters.content_types.is_empty() {
            vec![
                ContentType::Screencast.as_str(),
                ContentType::Collection.as_str(),
            ]
        } else {
            filters.content_types.iter().map(|t| t.as_str()).collect()
        };

        builder.push(" WHERE c.content_type IN (");
        let mut separated = builder.separated(", ");
        for content_type in types {
            separated.push_bind(content_type);
        }
        separated.push_unseparated(")");

        if !filters.technologies.is_empty() {
            builder.push(" AND (");
            for (i, tech) in filters.technologies.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder
                    .push("(',' || c.technologies || ',') LIKE ('%,' || ")
                    .push_bind(tech.as_str())
                    .push(" || ',%')");
            }
            builder.push(")");
        }

        if !filters.difficulties.is_empty() {
            builder.push(" AND c.difficulty IN (");
            let mut separated = builder.separated(", ");
            for difficulty in &filters.difficulties {
                separated.push_bind(difficulty.as_str());
            }
            separated.push_unseparated(")");
        }

        if let Some(search) = filters.search.as_deref().map(str::trim)
            && !search.is_empty()
        {
            builder
                .push(" AND c.name LIKE ('%' || ")
                .push_bind(search)
                .push(" || '%')");
        }

        if filters.bookmarked_only {
            builder.push(" AND b.id IS NOT NULL");
        }
        if filters.downloaded_only {
            builder.push(" AND d.download_id IS NOT NULL");
        }
        if filters.in_progress_only {
            builder.push(" AND p.id IS NOT NULL AND p.finished = 0");
        }
        if filters.completed_only {
            builder.push(" AND p.finished = 1");
        }
    }
}
