mod close;
mod migrations;

use crate::db::{Content, Database};
use tempfile::NamedTempFile;

pub(super) async fn open_db() -> (Database, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let db = Database::new(temp_file.path()).await.unwrap();
    (db, temp_file)
}

pub(super) fn content(id: &str, content_type: &str, released_at: i64) -> Content {
    Content {
        id: id.to_string(),
        content_type: content_type.to_string(),
        name: format!("Content {}", id),
        description: None,
        duration_secs: 600,
        card_artwork_url: None,
        technologies: vec!["iOS".to_string()],
        difficulty: Some("beginner".to_string()),
        released_at,
        popularity: 0.0,
        video_id: Some(1000),
    }
}
