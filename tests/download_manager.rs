//! Integration tests for batch downloads against mock HTTP servers.

mod support;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sarfetch_core::auth::{BasicAuth, SsoSettings};
use sarfetch_core::download::{
    BatchRequest, ChecksumAlgorithm, DownloadConfig, DownloadError, DownloadManager, EngineError,
    FileDescriptor, Product,
};
use sarfetch_core::{Client, Session};
use support::socket_guard::start_mock_server_or_skip;
use support::{fast_retry_session, loopback_session};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header, header_exists, method, path};
use wiremock::{Mock, ResponseTemplate};

const HELLO_MD5: &str = "5d41402abc4b2a76b9719d911017c592";

fn leftover_partials(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .expect("read dir")
        .filter_map(Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".part"))
        .collect()
}

#[tokio::test]
async fn test_successful_download_leaves_only_final_file() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/products/granule.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;

    let client = Client::new(loopback_session(), DownloadConfig::default());
    let dir = TempDir::new().expect("temp dir");
    let product = Product::new(
        "S1A_IW_GRDH_TEST",
        vec![
            FileDescriptor::new(format!("{}/products/granule.zip", server.uri()))
                .with_checksum(HELLO_MD5.to_uppercase(), ChecksumAlgorithm::Md5),
        ],
    );

    let paths = client
        .download_product(&product, dir.path(), &CancellationToken::new())
        .await
        .expect("product downloads");

    assert_eq!(paths, vec![dir.path().join("granule.zip")]);
    assert_eq!(std::fs::read(&paths[0]).expect("read"), b"hello");
    assert!(leftover_partials(dir.path()).is_empty());
}

#[tokio::test]
async fn test_checksum_mismatch_never_creates_final_file() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/bad.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;

    let client = Client::new(loopback_session(), DownloadConfig::default());
    let dir = TempDir::new().expect("temp dir");
    let descriptor = FileDescriptor::new(format!("{}/bad.zip", server.uri()))
        .with_checksum("ffffffffffffffffffffffffffffffff", ChecksumAlgorithm::Md5);

    let error = client
        .download(&descriptor, &dir.path().join("bad.zip"), &CancellationToken::new())
        .await
        .expect_err("checksum must not match");

    match error {
        DownloadError::ChecksumMismatch { actual, .. } => assert_eq!(actual, HELLO_MD5),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("bad.zip").exists());
    assert!(leftover_partials(dir.path()).is_empty());
}

#[tokio::test]
async fn test_explicit_none_checksum_type_accepts_any_body() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/unchecked.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello".to_vec()))
        .mount(&server)
        .await;

    let client = Client::new(loopback_session(), DownloadConfig::default());
    let dir = TempDir::new().expect("temp dir");
    let descriptor: FileDescriptor = serde_json::from_value(serde_json::json!({
        "url": format!("{}/unchecked.zip", server.uri()),
        "checksum": "deadbeef",
        "checksumType": "none",
    }))
    .expect("descriptor parses");

    let path = client
        .download(&descriptor, &dir.path().join("unchecked.zip"), &CancellationToken::new())
        .await
        .expect("declared checksum is not verified");
    assert_eq!(std::fs::read(path).expect("read"), b"hello");
}

#[tokio::test]
async fn test_partial_failure_reports_exactly_the_failed_files_and_is_repeatable() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/ok.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"good bytes".to_vec()))
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/broken.zip"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let client = Client::new(loopback_session(), DownloadConfig::default());
    let dir = TempDir::new().expect("temp dir");
    let urls = [
        format!("{}/ok.zip", server.uri()),
        format!("{}/broken.zip", server.uri()),
    ];

    for _ in 0..2 {
        let error = client
            .download_urls(&urls, dir.path(), Some(2), &CancellationToken::new())
            .await
            .expect_err("one file fails");
        let batch = error.batch().expect("batch error");
        assert_eq!(batch.len(), 1);
        assert!(matches!(
            &batch.errors()[0],
            DownloadError::HttpStatus { status: 500, preview, .. } if preview == "upstream exploded"
        ));
        assert!(error.to_string().contains("broken.zip"));

        assert_eq!(
            std::fs::read(dir.path().join("ok.zip")).expect("read"),
            b"good bytes"
        );
        assert!(!dir.path().join("broken.zip").exists());
        assert!(leftover_partials(dir.path()).is_empty());
    }
}

#[tokio::test]
async fn test_transient_errors_are_retried_before_success() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/flaky.zip"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"eventually".to_vec()))
        .mount(&server)
        .await;

    let client = Client::new(fast_retry_session(3), DownloadConfig::default());
    let dir = TempDir::new().expect("temp dir");
    let descriptor = FileDescriptor::new(format!("{}/flaky.zip", server.uri()));
    let path = client
        .download(&descriptor, &dir.path().join("flaky.zip"), &CancellationToken::new())
        .await
        .expect("third attempt succeeds");
    assert_eq!(std::fs::read(path).expect("read"), b"eventually");
}

#[tokio::test]
async fn test_concurrency_one_runs_files_sequentially() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    for name in ["a", "b", "c"] {
        Mock::given(method("GET"))
            .and(path(format!("/{name}.zip")))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(name.as_bytes().to_vec())
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
    }

    let client = Client::new(loopback_session(), DownloadConfig::default());
    let dir = TempDir::new().expect("temp dir");
    let urls: Vec<String> = ["a", "b", "c"]
        .iter()
        .map(|name| format!("{}/{name}.zip", server.uri()))
        .collect();

    let started = Instant::now();
    let paths = client
        .download_urls(&urls, dir.path(), Some(1), &CancellationToken::new())
        .await
        .expect("all succeed");
    let elapsed = started.elapsed();

    assert_eq!(paths.len(), 3);
    assert!(
        elapsed >= Duration::from_millis(550),
        "expected sequential execution, took {elapsed:?}"
    );
}

#[tokio::test]
async fn test_cancellation_stops_running_and_queued_files() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(b"slow".to_vec())
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = Client::new(loopback_session(), DownloadConfig::default());
    let dir = TempDir::new().expect("temp dir");
    let urls: Vec<String> = (0..4)
        .map(|index| format!("{}/slow-{index}.zip", server.uri()))
        .collect();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let error = client
        .download_urls(&urls, dir.path(), Some(2), &cancel)
        .await
        .expect_err("cancelled");
    assert!(started.elapsed() < Duration::from_secs(4));

    let batch = error.batch().expect("batch error");
    assert_eq!(batch.len(), 4);
    assert!(batch.iter().all(DownloadError::is_cancelled));
    let remaining: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .collect();
    assert!(remaining.is_empty(), "no files expected: {remaining:?}");
}

#[tokio::test]
async fn test_colliding_names_fail_the_later_descriptor() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/first/data.h5"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"first".to_vec()))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/second/data.h5"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"second".to_vec()))
        .expect(0)
        .mount(&server)
        .await;

    let manager = DownloadManager::new(loopback_session(), DownloadConfig::default(), None);
    let dir = TempDir::new().expect("temp dir");
    let request = BatchRequest::new(dir.path(), 2)
        .with_item("p", FileDescriptor::new(format!("{}/first/data.h5", server.uri())))
        .with_item("p", FileDescriptor::new(format!("{}/second/data.h5", server.uri())));

    let error = manager
        .download_batch(request, &CancellationToken::new())
        .await
        .expect_err("collision");
    let batch = error.batch().expect("batch error");
    assert_eq!(batch.len(), 1);
    assert!(matches!(
        &batch.errors()[0],
        DownloadError::FilenameCollision { url, .. } if url.ends_with("/second/data.h5")
    ));
    assert_eq!(std::fs::read(dir.path().join("data.h5")).expect("read"), b"first");
}

#[tokio::test]
async fn test_html_login_page_is_rejected() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/protected.zip"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(
                "<html><body>Please log in</body></html>",
                "text/html; charset=utf-8",
            ),
        )
        .mount(&server)
        .await;

    let client = Client::new(loopback_session(), DownloadConfig::default());
    let dir = TempDir::new().expect("temp dir");
    let error = client
        .download(
            &FileDescriptor::new(format!("{}/protected.zip", server.uri())),
            &dir.path().join("protected.zip"),
            &CancellationToken::new(),
        )
        .await
        .expect_err("html is not a product");

    match error {
        DownloadError::HtmlResponse { preview, .. } => assert!(preview.contains("Please log in")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!dir.path().join("protected.zip").exists());
}

#[tokio::test]
async fn test_duplicate_urls_are_downloaded_once() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/dup.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"dup".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(loopback_session(), DownloadConfig::default());
    let dir = TempDir::new().expect("temp dir");
    let url = format!("{}/dup.zip", server.uri());
    let paths = client
        .download_urls(
            [url.as_str(), "", url.as_str()],
            dir.path(),
            Some(2),
            &CancellationToken::new(),
        )
        .await
        .expect("deduped batch succeeds");
    assert_eq!(paths.len(), 1);
}

#[tokio::test]
async fn test_download_all_spans_products() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    for name in ["one.zip", "two.zip"] {
        Mock::given(method("GET"))
            .and(path(format!("/{name}")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(name.as_bytes().to_vec()))
            .expect(1)
            .mount(&server)
            .await;
    }

    let client = Client::new(loopback_session(), DownloadConfig::default().with_concurrency(2));
    let dir = TempDir::new().expect("temp dir");
    let shared = FileDescriptor::new(format!("{}/one.zip", server.uri()));
    let products = [
        Product::new("A", vec![shared.clone()]),
        Product::new(
            "B",
            vec![shared, FileDescriptor::new(format!("{}/two.zip", server.uri()))],
        ),
    ];

    let mut paths = client
        .download_all(&products, dir.path(), &CancellationToken::new())
        .await
        .expect("all products download");
    paths.sort();
    assert_eq!(
        paths,
        vec![dir.path().join("one.zip"), dir.path().join("two.zip")]
    );
}

#[tokio::test]
async fn test_sso_login_runs_once_and_cookies_reach_downloads() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/oauth/authorize"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(
            ResponseTemplate::new(200).insert_header("Set-Cookie", "asf-urs=session-jwt; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;
    for name in ["x.zip", "y.zip"] {
        Mock::given(method("GET"))
            .and(path(format!("/data/{name}")))
            .and(header("cookie", "asf-urs=session-jwt"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
    }

    let sso = SsoSettings {
        authorize_url: format!("{}/oauth/authorize", server.uri()),
        cookie_urls: vec![format!("{}/", server.uri())],
        cookie_names: vec!["asf-urs".to_string()],
    };
    let config = DownloadConfig::default()
        .with_basic_auth(BasicAuth::new("user", "pass"))
        .with_sso(sso);
    let client = Client::new(loopback_session(), config);
    let dir = TempDir::new().expect("temp dir");
    let urls = [
        format!("{}/data/x.zip", server.uri()),
        format!("{}/data/y.zip", server.uri()),
    ];

    let paths = client
        .download_urls(&urls, dir.path(), Some(1), &CancellationToken::new())
        .await
        .expect("authenticated downloads succeed");
    assert_eq!(paths.len(), 2);
}

#[tokio::test]
async fn test_missing_sso_cookie_is_an_auth_failure() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/oauth/authorize"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let sso = SsoSettings {
        authorize_url: format!("{}/oauth/authorize", server.uri()),
        cookie_urls: vec![format!("{}/", server.uri())],
        cookie_names: vec!["asf-urs".to_string()],
    };
    let config = DownloadConfig::default()
        .with_basic_auth(BasicAuth::new("user", "wrong"))
        .with_sso(sso);
    let manager = DownloadManager::new(loopback_session(), config, None);
    let dir = TempDir::new().expect("temp dir");

    let error = manager
        .download_file(
            &FileDescriptor::new(format!("{}/data/z.zip", server.uri())),
            &dir.path().join("z.zip"),
            "",
            &CancellationToken::new(),
        )
        .await
        .expect_err("login fails");
    assert!(matches!(error, DownloadError::Login { .. }));
    assert!(error.to_string().starts_with("[AUTH]"));
}

#[tokio::test]
async fn test_invalid_concurrency_is_a_configuration_error() {
    let session = Arc::new(Session::new().expect("session builds"));
    let client = Client::new(session, DownloadConfig::default());
    let result = client
        .download_urls(
            ["https://example.com/a.zip"],
            Path::new("/tmp/sarfetch-unused"),
            Some(0),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(
        result,
        Err(EngineError::InvalidConcurrency { value: 0 })
    ));
}
