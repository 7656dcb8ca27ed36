use super::open_db;
use crate::types::DownloadId;

/// Querying after the pool is closed returns an error rather than hanging.
#[tokio::test]
async fn test_get_download_after_pool_close_returns_error() {
    let (db, _file) = open_db().await;
    let id = DownloadId::from("ep-1");

    db.pool().close().await;

    let result = db.get_download(&id).await;
    assert!(
        result.is_err(),
        "get_download after pool close should return an error, got: {:?}",
        result
    );
}
