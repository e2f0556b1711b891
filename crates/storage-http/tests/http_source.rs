//! Integration tests for the HTTP blob source against a mock server.

use std::sync::Arc;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use assetpack_storage::{
    AssetSource, BlobSource, CacheOptions, MemoryRecordStore, RangeCache, RecordStore,
    ServedAsset, SourceError,
};
use assetpack_storage_http::{HttpBlobSource, HttpSourceOptions};

const MANIFEST: &str = r#"{"gameId":"H000001","v":1,"files":[{"p":"a.txt","o":0,"s":2},{"p":"b/c.txt","o":2,"s":3}]}"#;

fn source() -> HttpBlobSource {
    HttpBlobSource::new(HttpSourceOptions::default()).unwrap()
}

fn base(server: &MockServer) -> String {
    format!("{}/Games/H000001", server.uri())
}

#[tokio::test]
async fn test_range_request_returns_partial_content() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Games/H000001/game.core"))
        .and(header("range", "bytes=2-4"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"XYZ".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let bytes: Vec<u8> = source().read_range(&base(&server), 2, 3).await.unwrap();
    assert_eq!(bytes, b"XYZ");
}

#[tokio::test]
async fn test_ignored_range_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Games/H000001/game.core"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"ABXYZ".to_vec()))
        .mount(&server)
        .await;

    let err: SourceError = source().read_range(&base(&server), 2, 3).await.unwrap_err();
    assert!(matches!(err, SourceError::RangeNotSupported { status: 200, .. }));

    // Whole body equal to the requested range is fine
    let bytes: Vec<u8> = source().read_range(&base(&server), 0, 5).await.unwrap();
    assert_eq!(bytes, b"ABXYZ");
}

#[tokio::test]
async fn test_short_body_is_size_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Games/H000001/game.core"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"XY".to_vec()))
        .mount(&server)
        .await;

    let err: SourceError = source().read_range(&base(&server), 2, 3).await.unwrap_err();
    assert!(matches!(
        err,
        SourceError::SizeMismatch {
            expected: 3,
            actual: 2,
            ..
        }
    ));
}

#[tokio::test]
async fn test_zero_size_range_sends_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let bytes: Vec<u8> = source().read_range(&base(&server), 5, 0).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_manifest_fetch_is_cache_busted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Games/H000001/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST))
        .mount(&server)
        .await;

    let bytes: Vec<u8> = source().fetch_manifest(&base(&server)).await.unwrap();
    assert_eq!(bytes, MANIFEST.as_bytes());

    let requests: Vec<Request> = server.received_requests().await.unwrap();
    let query: &str = requests[0].url.query().unwrap_or_default();
    assert!(query.starts_with("v="), "query was {:?}", query);
}

#[tokio::test]
async fn test_status_errors_are_classified() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Games/H000001/manifest.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Games/H000001/game.core"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err: SourceError = source().fetch_manifest(&base(&server)).await.unwrap_err();
    assert!(matches!(err, SourceError::NotFound { .. }));

    let err: SourceError = source().read_range(&base(&server), 0, 2).await.unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_direct_fetch_rejects_escaping_paths() {
    let server = MockServer::start().await;
    let err: SourceError = source()
        .read_direct(&base(&server), "../H000002/secret.txt")
        .await
        .unwrap_err();
    assert!(matches!(err, SourceError::InvalidPath { .. }));
}

#[tokio::test]
async fn test_range_cache_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Games/H000001/manifest.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(MANIFEST))
        .mount(&server)
        .await;
    // No HEAD mock: an unknown blob length skips the bounds check
    Mock::given(method("GET"))
        .and(path("/Games/H000001/game.core"))
        .and(header("range", "bytes=2-4"))
        .respond_with(ResponseTemplate::new(206).set_body_bytes(b"XYZ".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Games/H000001/extra.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body{}"))
        .mount(&server)
        .await;

    let store: Arc<dyn RecordStore> = Arc::new(MemoryRecordStore::new());
    let cache: RangeCache<HttpBlobSource> =
        RangeCache::new(source(), store, CacheOptions::default());
    cache.init("H000001", &base(&server)).await.unwrap();

    // Second read is a store hit; the mock expects exactly one range request
    assert_eq!(cache.read("H000001", "b/c.txt").await.unwrap().as_slice(), b"XYZ");
    assert_eq!(cache.read("H000001", "b/c.txt").await.unwrap().as_slice(), b"XYZ");

    let served: ServedAsset = cache.fetch("H000001", "extra.css").await.unwrap();
    assert_eq!(served.source, AssetSource::Direct);
    assert_eq!(served.bytes.as_slice(), b"body{}");
}
