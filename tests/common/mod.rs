//! Shared utilities for integration and load testing.

#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;

use feed_server::config::FeedConfig;
use feed_server::http::HttpServer;
use feed_server::lifecycle::Shutdown;

/// A feed server running on an ephemeral port over a temporary package directory.
pub struct TestFeed {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub dir: TempDir,
}

impl TestFeed {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestFeed {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a feed with default settings.
pub async fn start_feed() -> TestFeed {
    start_feed_with(|_| {}).await
}

/// Start a feed after letting `configure` adjust the defaults.
pub async fn start_feed_with(configure: impl FnOnce(&mut FeedConfig)) -> TestFeed {
    let dir = tempfile::tempdir().unwrap();
    let mut config = FeedConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.storage.packages_dir = dir.path().join("packages").display().to_string();
    configure(&mut config);

    let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    // Wait for server to start
    tokio::time::sleep(Duration::from_millis(100)).await;

    TestFeed { addr, shutdown, dir }
}

/// Client that neither pools nor follows redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Manifest text for a package.
pub fn manifest(id: &str, version: &str, description: &str, tags: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://schemas.microsoft.com/packaging/2013/05/nuspec.xsd">
  <metadata>
    <id>{id}</id>
    <version>{version}</version>
    <authors>Test Author</authors>
    <description>{description}</description>
    <tags>{tags}</tags>
  </metadata>
</package>"#
    )
}

/// A package archive holding `manifest` at its root.
pub fn archive_with_manifest(id: &str, manifest: &str) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file(format!("{}.nuspec", id), options).unwrap();
        zip.write_all(manifest.as_bytes()).unwrap();
        zip.start_file("lib/net8.0/library.dll", options).unwrap();
        zip.write_all(&[0u8; 256]).unwrap();
        zip.finish().unwrap();
    }
    buffer.into_inner()
}

pub fn archive(id: &str, version: &str) -> Vec<u8> {
    archive_with_manifest(id, &manifest(id, version, &format!("The {} package", id), "test"))
}

/// Push `archive` as the raw request body.
pub async fn push(feed: &TestFeed, archive: Vec<u8>) -> reqwest::StatusCode {
    client()
        .put(feed.url("/v3/package"))
        .body(archive)
        .send()
        .await
        .expect("feed unreachable")
        .status()
}
