
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;

use super::{ContentMutator, PageLoader, UiState};
use crate::db::{Content, ContentRecord, Database};
use crate::downloader::test_helpers::{FakeGateway, screencast};
use crate::remote::Page;
use crate::types::ContentFilters;

struct Surface {
    loader: PageLoader,
    gateway: Arc<FakeGateway>,
    db: Arc<Database>,
    _db_file: NamedTempFile,
}

async fn surface() -> Surface {
    let db_file = NamedTempFile::new().unwrap();
    let db = Arc::new(Database::new(db_file.path()).await.unwrap());
    let gateway = FakeGateway::new();
    let loader = PageLoader::new(db.clone(), gateway.clone(), ContentFilters::default(), 10);
    gateway.observe(loader.subscribe());

    Surface {
        loader,
        gateway,
        db,
        _db_file: db_file,
    }
}

/// `count` screencasts with ids `{prefix}{n}`, newest first
fn items(prefix: &str, count: usize) -> Vec<Content> {
    (0..count)
        .map(|n| {
            let mut content = screencast(&format!("{}{}", prefix, n), 100 + n as i64);
            content.released_at -= n as i64;
            content
        })
        .collect()
}

fn page(items: Vec<Content>, next_page_number: Option<u32>) -> Page {
    Page {
        items,
        next_page_number,
    }
}

async fn cached(db: &Database, id: &str) -> ContentRecord {
    db.get_content_record(id).await.unwrap().unwrap()
}

/// Wait until the fake API saw `count` calls starting with `prefix`
async fn wait_for_calls(gateway: &FakeGateway, prefix: &str, count: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while gateway.count(prefix) < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}
