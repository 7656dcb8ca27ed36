use super::open_db;
use crate::db::*;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_database_creation() {
    let (db, _file) = open_db().await;

    let mut conn = db.pool.acquire().await.unwrap();
    let tables: Vec<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(&mut *conn)
            .await
            .unwrap();
    drop(conn);

    for table in [
        "bookmarks",
        "contents",
        "downloads",
        "group_episodes",
        "content_groups",
        "progressions",
        "schema_version",
    ] {
        assert!(tables.contains(&table.to_string()), "missing {}", table);
    }

    db.close().await;
}

#[tokio::test]
async fn test_reopen_does_not_reapply_migrations() {
    let temp_file = NamedTempFile::new().unwrap();

    let db = Database::new(temp_file.path()).await.unwrap();
    db.upsert_content(&super::content("c1", "screencast", 1))
        .await
        .unwrap();
    db.close().await;

    let db = Database::new(temp_file.path()).await.unwrap();
    let versions: Vec<i64> = sqlx::query_scalar("SELECT version FROM schema_version")
        .fetch_all(db.pool())
        .await
        .unwrap();
    assert_eq!(versions, vec![1]);
    assert!(db.get_content("c1").await.unwrap().is_some());

    db.close().await;
}

#[tokio::test]
async fn test_purge_all_clears_every_table() {
    let (db, _file) = open_db().await;

    db.upsert_content(&super::content("c1", "screencast", 1))
        .await
        .unwrap();
    db.upsert_bookmark(&Bookmark {
        id: "b1".to_string(),
        content_id: "c1".to_string(),
    })
    .await
    .unwrap();
    db.insert_download_if_absent(&NewDownload {
        download_id: "c1".into(),
        content_id: "c1".to_string(),
        is_marker: false,
    })
    .await
    .unwrap();

    db.purge_all().await.unwrap();

    assert!(db.get_content("c1").await.unwrap().is_none());
    assert!(db.get_bookmark("c1").await.unwrap().is_none());
    assert!(db.list_downloads().await.unwrap().is_empty());

    db.close().await;
}
