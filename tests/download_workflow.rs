//! End-to-end checkpoint download tests against a local HTTP server

mod common;

use common::http_server::{unreachable_url, Reply, TestServer};
use common::payload;
use sam_prep::{
    CallbackProgressReporter, DownloadProgress, FetchConfig, FetchError, FetchOutcome,
    ModelDownloader, RetryPolicy, TransferTarget,
};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

fn downloader(chunk_size: usize) -> ModelDownloader {
    let config = FetchConfig::builder()
        .no_probe()
        .chunk_size(chunk_size)
        .read_timeout(Duration::from_secs(5))
        .build()
        .unwrap();
    ModelDownloader::new(config).unwrap()
}

fn part_file(dest: &Path) -> std::path::PathBuf {
    sam_prep::download::part_path(dest).unwrap()
}

#[tokio::test]
async fn test_download_streams_in_chunks_with_progress() {
    let body = payload(10_000);
    let server = TestServer::start(vec![("/model.pth", vec![Reply::Body(body.clone())])]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("nested").join("model.pth");

    let updates: Arc<Mutex<Vec<DownloadProgress>>> = Arc::default();
    let sink = Arc::clone(&updates);
    let downloader = downloader(4096).with_reporter(Box::new(CallbackProgressReporter::new(
        move |p: &DownloadProgress| sink.lock().unwrap().push(*p),
    )));

    let outcome = downloader
        .fetch(&server.url("/model.pth"), &dest, 5_000)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        FetchOutcome::Downloaded {
            bytes: 10_000,
            attempts: 1
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert!(!part_file(&dest).exists());

    let updates = updates.lock().unwrap();
    assert!(updates.len() >= 3, "expected one update per chunk, got {}", updates.len());
    assert!(updates.windows(2).all(|w| w[0].downloaded < w[1].downloaded));
    let last = updates.last().unwrap();
    assert_eq!(last.downloaded, 10_000);
    assert_eq!(last.total, Some(10_000));
    assert_eq!(last.percent(), Some(100));
}

#[tokio::test]
async fn test_existing_complete_file_is_kept() {
    let server = TestServer::start(vec![("/model.pth", vec![Reply::Body(payload(200))])]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");
    let downloader = downloader(64);

    let first = downloader.fetch(&server.url("/model.pth"), &dest, 200).await.unwrap();
    assert!(first.was_downloaded());

    let second = downloader.fetch(&server.url("/model.pth"), &dest, 200).await.unwrap();
    assert_eq!(second, FetchOutcome::AlreadyPresent { bytes: 200 });
    assert_eq!(server.hits("/model.pth"), 1);
}

#[tokio::test]
async fn test_stale_small_file_is_replaced() {
    let body = payload(300);
    let server = TestServer::start(vec![("/model.pth", vec![Reply::Body(body.clone())])]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");
    std::fs::write(&dest, b"truncated").unwrap();

    let outcome = downloader(128)
        .fetch(&server.url("/model.pth"), &dest, 300)
        .await
        .unwrap();

    assert!(outcome.was_downloaded());
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn test_probe_failure_skips_transfer() {
    let server = TestServer::start(vec![
        ("/probe", vec![Reply::Status(503)]),
        ("/model.pth", vec![Reply::Body(payload(10))]),
    ]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");

    for probe in [server.url("/probe"), unreachable_url()] {
        let config = FetchConfig::builder()
            .probe_url(probe)
            .probe_timeout(Duration::from_secs(2))
            .build()
            .unwrap();
        let err = ModelDownloader::new(config)
            .unwrap()
            .fetch(&server.url("/model.pth"), &dest, 0)
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::NetworkUnavailable { .. }), "{err:?}");
    }

    assert_eq!(server.hits("/probe"), 1);
    assert_eq!(server.hits("/model.pth"), 0);
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_successful_probe_allows_transfer() {
    let server = TestServer::start(vec![
        ("/probe", vec![Reply::Body(b"ok".to_vec())]),
        ("/model.pth", vec![Reply::Body(payload(50))]),
    ]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");

    let config = FetchConfig::builder()
        .probe_url(server.url("/probe"))
        .build()
        .unwrap();
    let outcome = ModelDownloader::new(config)
        .unwrap()
        .fetch(&server.url("/model.pth"), &dest, 0)
        .await
        .unwrap();

    assert_eq!(outcome.bytes(), 50);
    assert_eq!(server.hits("/probe"), 1);
}

#[tokio::test]
async fn test_truncated_body_is_incomplete_and_cleaned_up() {
    let server = TestServer::start(vec![(
        "/model.pth",
        vec![Reply::Truncated {
            body: payload(500),
            declared: 1000,
        }],
    )]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");

    let err = downloader(256)
        .fetch(&server.url("/model.pth"), &dest, 0)
        .await
        .unwrap_err();

    match err {
        FetchError::IncompleteTransfer { expected, actual, .. } => {
            assert_eq!(expected, 1000);
            assert!(actual < 1000);
        },
        other => panic!("expected IncompleteTransfer, got {other:?}"),
    }
    assert!(!dest.exists());
    assert!(!part_file(&dest).exists());
}

#[tokio::test]
async fn test_http_status_error() {
    let server = TestServer::start(vec![("/model.pth", vec![Reply::Status(404)])]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");

    let err = downloader(64)
        .fetch(&server.url("/model.pth"), &dest, 0)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert!(matches!(err, FetchError::HttpError { .. }));
    assert!(!err.is_retryable());
    assert!(!dest.exists());
}

#[tokio::test]
async fn test_stalled_body_times_out() {
    let server = TestServer::start(vec![(
        "/model.pth",
        vec![Reply::Stall {
            body: payload(100),
            declared: 1000,
            hold: Duration::from_secs(3),
        }],
    )]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");

    let config = FetchConfig::builder()
        .no_probe()
        .read_timeout(Duration::from_millis(500))
        .build()
        .unwrap();
    let err = ModelDownloader::new(config)
        .unwrap()
        .fetch(&server.url("/model.pth"), &dest, 0)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Timeout { .. }), "{err:?}");
    assert!(!dest.exists());
    assert!(!part_file(&dest).exists());
}

#[tokio::test]
async fn test_missing_content_length_counts_as_zero() {
    let server = TestServer::start(vec![
        ("/model.pth", vec![Reply::BodyWithoutLength(payload(500))]),
        ("/empty.pth", vec![Reply::BodyWithoutLength(Vec::new())]),
    ]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");

    let err = downloader(100)
        .fetch(&server.url("/model.pth"), &dest, 0)
        .await
        .unwrap_err();

    match err {
        FetchError::IncompleteTransfer { expected, actual, .. } => {
            assert_eq!(expected, 0);
            assert_eq!(actual, 500);
        },
        other => panic!("expected IncompleteTransfer, got {other:?}"),
    }
    assert!(!dest.exists());
    assert!(!part_file(&dest).exists());

    let empty = temp_dir.path().join("empty.pth");
    let outcome = downloader(100)
        .fetch(&server.url("/empty.pth"), &empty, 0)
        .await
        .unwrap();
    assert_eq!(outcome.bytes(), 0);
    assert!(empty.exists());
}

#[tokio::test]
async fn test_retry_recovers_from_truncation() {
    let body = payload(1000);
    let server = TestServer::start(vec![(
        "/model.pth",
        vec![
            Reply::Truncated {
                body: payload(400),
                declared: 1000,
            },
            Reply::Body(body.clone()),
        ],
    )]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");
    let target = TransferTarget::new(server.url("/model.pth"), &dest);
    let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(10));

    let outcome = downloader(256)
        .fetch_with_retry(&target, &policy)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        FetchOutcome::Downloaded {
            bytes: 1000,
            attempts: 2
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), body);
    assert_eq!(server.hits("/model.pth"), 2);
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = TestServer::start(vec![("/model.pth", vec![Reply::Status(404)])]);
    let temp_dir = TempDir::new().unwrap();
    let target = TransferTarget::new(server.url("/model.pth"), temp_dir.path().join("m"));
    let policy = RetryPolicy::default().with_base_delay(Duration::from_millis(10));

    let err = downloader(64)
        .fetch_with_retry(&target, &policy)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(404));
    assert_eq!(server.hits("/model.pth"), 1);
}

#[tokio::test]
async fn test_retry_gives_up_after_max_attempts() {
    let server = TestServer::start(vec![("/model.pth", vec![Reply::Status(503)])]);
    let temp_dir = TempDir::new().unwrap();
    let target = TransferTarget::new(server.url("/model.pth"), temp_dir.path().join("m"));
    let policy = RetryPolicy::default()
        .with_max_attempts(2)
        .with_base_delay(Duration::from_millis(10));

    let err = downloader(64)
        .fetch_with_retry(&target, &policy)
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(503));
    assert_eq!(server.hits("/model.pth"), 2);
}

#[tokio::test]
async fn test_checksum_mismatch_removes_file() {
    let body = payload(64);
    let server = TestServer::start(vec![("/model.pth", vec![Reply::Body(body)])]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");
    let target = TransferTarget::new(server.url("/model.pth"), &dest).with_sha256("0".repeat(64));

    let err = downloader(16).fetch_target(&target).await.unwrap_err();

    assert!(matches!(err, FetchError::ChecksumMismatch { .. }), "{err:?}");
    assert!(!dest.exists());
    assert!(!part_file(&dest).exists());
}

#[tokio::test]
async fn test_checksum_match_keeps_file() {
    let body = b"segment anything".to_vec();
    let server = TestServer::start(vec![("/model.pth", vec![Reply::Body(body.clone())])]);
    let temp_dir = TempDir::new().unwrap();
    let dest = temp_dir.path().join("model.pth");

    // sha256("segment anything") computed from a scratch copy
    let scratch = temp_dir.path().join("scratch");
    std::fs::write(&scratch, &body).unwrap();
    let digest = {
        use sha2::{Digest, Sha256};
        format!("{:x}", Sha256::digest(&body))
    };
    assert!(sam_prep::verify_sha256(&scratch, &digest).unwrap());

    let target = TransferTarget::new(server.url("/model.pth"), &dest).with_sha256(digest);
    let outcome = downloader(4).fetch_target(&target).await.unwrap();
    assert_eq!(outcome.bytes(), body.len() as u64);
}

#[tokio::test]
async fn test_directory_destination_is_unexpected() {
    let server = TestServer::start(vec![("/model.pth", vec![Reply::Body(payload(10))])]);
    let temp_dir = TempDir::new().unwrap();

    let err = downloader(64)
        .fetch(&server.url("/model.pth"), temp_dir.path(), 0)
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Unexpected(_)), "{err:?}");
    assert_eq!(server.hits("/model.pth"), 0);
}
