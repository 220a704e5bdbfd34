//! Failure injection tests for the feed server.

use reqwest::StatusCode;
use serde_json::Value;

mod common;

#[tokio::test]
async fn test_corrupt_archive_in_store_is_skipped() {
    let feed = common::start_feed().await;
    common::push(&feed, common::archive("Good", "1.0.0")).await;

    let bad_dir = feed.dir.path().join("packages").join("bad").join("1.0.0");
    std::fs::create_dir_all(&bad_dir).unwrap();
    std::fs::write(bad_dir.join("bad.1.0.0.nupkg"), b"this is not a zip file").unwrap();

    let search: Value = common::client()
        .get(feed.url("/v3/query"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["totalHits"], 1);
    assert_eq!(search["data"][0]["id"], "Good");
}

#[tokio::test]
async fn test_invalid_pushes_are_rejected() {
    let feed = common::start_feed().await;

    assert_eq!(common::push(&feed, b"garbage".to_vec()).await, StatusCode::BAD_REQUEST);

    let no_manifest = {
        let mut buffer = std::io::Cursor::new(Vec::new());
        let mut zip = zip::ZipWriter::new(&mut buffer);
        zip.start_file("readme.txt", zip::write::SimpleFileOptions::default()).unwrap();
        zip.finish().unwrap();
        buffer.into_inner()
    };
    assert_eq!(common::push(&feed, no_manifest).await, StatusCode::BAD_REQUEST);

    let bad_id = common::archive_with_manifest("bad", &common::manifest("../evil", "1.0.0", "x", ""));
    assert_eq!(common::push(&feed, bad_id).await, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oversized_push_is_rejected() {
    let feed = common::start_feed_with(|c| c.storage.max_package_size = 128).await;
    assert_eq!(
        common::push(&feed, common::archive("Big", "1.0.0")).await,
        StatusCode::PAYLOAD_TOO_LARGE
    );
}

#[tokio::test]
async fn test_bad_query_string() {
    let feed = common::start_feed().await;
    let res = common::client().get(feed.url("/v3/query?skip=-1")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res.bytes().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_package_directory_is_empty_feed() {
    let feed = common::start_feed_with(|c| c.storage.packages_dir = "/nonexistent/feed/packages".into()).await;
    let search: Value = common::client()
        .get(feed.url("/v3/query"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(search["totalHits"], 0);
    let res = common::client()
        .get(feed.url("/v3/flatcontainer/foo/1.0.0/foo.1.0.0.nupkg"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_max_connections_limit() {
    let feed = common::start_feed_with(|c| c.listener.max_connections = 1).await;
    let client = common::client();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        let url = feed.url("/v3/index.json");
        tasks.push(tokio::spawn(async move { client.get(url).send().await.map(|r| r.status()) }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), StatusCode::OK);
    }
}
