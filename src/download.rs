//! Checkpoint downloading with pre-check, connectivity probe and size validation
//!
//! A transfer streams into a `<destination>.part` sibling and is renamed onto
//! the destination only after the byte count matches the size the server
//! declared. Every failure path removes the part file, so re-running a failed
//! download always starts from a clean slate.

use crate::config::FetchConfig;
use crate::error::{FetchError, Result, SamPrepError};
use crate::retry::{RetryDecision, RetryPolicy};
use crate::services::progress::{DownloadProgress, NoOpProgressReporter, ProgressReporter};
use crate::tracing_config::{events, spans};
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tracing::Instrument;

/// Remote resource and local destination for one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferTarget {
    pub url: String,
    pub destination: PathBuf,
    /// Existing files smaller than this are treated as truncated
    pub min_existing_size: u64,
    /// Lowercase hex SHA-256 the finished file must match
    pub expected_sha256: Option<String>,
}

impl TransferTarget {
    #[must_use]
    pub fn new<S: Into<String>, P: Into<PathBuf>>(url: S, destination: P) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            min_existing_size: 0,
            expected_sha256: None,
        }
    }

    #[must_use]
    pub fn with_min_size(mut self, bytes: u64) -> Self {
        self.min_existing_size = bytes;
        self
    }

    #[must_use]
    pub fn with_sha256<S: Into<String>>(mut self, digest: S) -> Self {
        self.expected_sha256 = Some(digest.into().trim().to_ascii_lowercase());
        self
    }
}

/// What a successful fetch did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// A file of acceptable size was already present; nothing was transferred
    AlreadyPresent { bytes: u64 },
    /// The file was transferred and validated
    Downloaded { bytes: u64, attempts: u32 },
}

impl FetchOutcome {
    /// Size of the destination file
    #[must_use]
    pub fn bytes(&self) -> u64 {
        match self {
            Self::AlreadyPresent { bytes } | Self::Downloaded { bytes, .. } => *bytes,
        }
    }

    #[must_use]
    pub fn was_downloaded(&self) -> bool {
        matches!(self, Self::Downloaded { .. })
    }
}

/// Result of comparing the on-disk size with the declared size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeValidation {
    pub passed: bool,
    pub observed: u64,
    /// Declared size; an absent `Content-Length` counts as 0
    pub expected: u64,
}

impl SizeValidation {
    /// Compare the size of `path` with the declared size
    ///
    /// `None` is treated as a declared size of zero, so only an empty body
    /// passes when the server did not send a length.
    ///
    /// # Errors
    /// - File metadata cannot be read
    pub fn check(path: &Path, declared: Option<u64>) -> std::io::Result<Self> {
        let observed = fs::metadata(path)?.len();
        let expected = declared.unwrap_or(0);
        Ok(Self {
            passed: observed == expected,
            observed,
            expected,
        })
    }
}

/// Streaming checkpoint downloader
pub struct ModelDownloader {
    client: Client,
    config: FetchConfig,
    reporter: Box<dyn ProgressReporter>,
}

impl std::fmt::Debug for ModelDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDownloader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ModelDownloader {
    /// Create a new downloader
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Failed to create HTTP client
    pub fn new(config: FetchConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| SamPrepError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            config,
            reporter: Box::new(NoOpProgressReporter),
        })
    }

    /// Replace the progress reporter
    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// Download `url` to `destination` unless a file of at least
    /// `expected_min_size` bytes is already there
    ///
    /// # Errors
    /// See [`FetchError`]; the destination never holds a partial file afterwards.
    pub async fn fetch(
        &self,
        url: &str,
        destination: &Path,
        expected_min_size: u64,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        let target = TransferTarget::new(url, destination).with_min_size(expected_min_size);
        self.fetch_target(&target).await
    }

    /// Run one complete fetch attempt for `target`
    ///
    /// # Errors
    /// See [`FetchError`]
    pub async fn fetch_target(
        &self,
        target: &TransferTarget,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        let span = spans::download(&target.url, &target.destination);
        async move {
            if let Some(bytes) = Self::precheck(target)? {
                log::info!(
                    "Found existing file {} ({} bytes), skipping download",
                    target.destination.display(),
                    bytes
                );
                return Ok(FetchOutcome::AlreadyPresent { bytes });
            }

            self.probe().await?;

            let part = part_path(&target.destination)?;
            match self.transfer(target, &part).await {
                Ok(bytes) => {
                    if let Err(e) = fs::rename(&part, &target.destination) {
                        remove_if_exists(&part);
                        let err = FetchError::io("move download into place at", &target.destination, &e);
                        self.reporter.report_error(&err.to_string());
                        return Err(err);
                    }
                    self.reporter.report_completion(bytes);
                    log::info!(
                        "Downloaded {} bytes to {}",
                        bytes,
                        target.destination.display()
                    );
                    Ok(FetchOutcome::Downloaded { bytes, attempts: 1 })
                },
                Err(e) => {
                    remove_if_exists(&part);
                    self.reporter.report_error(&e.to_string());
                    Err(e)
                },
            }
        }
        .instrument(span)
        .await
    }

    /// Run [`Self::fetch_target`] until it succeeds or `policy` gives up
    ///
    /// # Errors
    /// The error of the last attempt
    pub async fn fetch_with_retry(
        &self,
        target: &TransferTarget,
        policy: &RetryPolicy,
    ) -> std::result::Result<FetchOutcome, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_target(target).await {
                Ok(FetchOutcome::Downloaded { bytes, .. }) => {
                    return Ok(FetchOutcome::Downloaded {
                        bytes,
                        attempts: attempt,
                    });
                },
                Ok(outcome) => return Ok(outcome),
                Err(e) => match policy.decide(attempt, &e) {
                    RetryDecision::RetryAfter(delay) => {
                        log::warn!(
                            "Attempt {}/{} failed: {}. Retrying in {:.1}s",
                            attempt,
                            policy.max_attempts,
                            e,
                            delay.as_secs_f64()
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    },
                    RetryDecision::NoRetry => return Err(e),
                },
            }
        }
    }

    /// Inspect an existing destination
    ///
    /// Returns its size when it is large enough to keep, removes it otherwise.
    fn precheck(target: &TransferTarget) -> std::result::Result<Option<u64>, FetchError> {
        let path = &target.destination;
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => Err(FetchError::unexpected(format!(
                "Destination '{}' is a directory",
                path.display()
            ))),
            Ok(meta) if meta.len() < target.min_existing_size => {
                events::warning_with_recommendation(
                    &format!(
                        "Existing file {} is only {} bytes (expected at least {})",
                        path.display(),
                        meta.len(),
                        target.min_existing_size
                    ),
                    "removing it and downloading again",
                );
                fs::remove_file(path).map_err(|e| FetchError::io("remove stale file", path, &e))?;
                Ok(None)
            },
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FetchError::io("inspect", path, &e)),
        }
    }

    /// Fail fast when the configured probe endpoint is unreachable
    async fn probe(&self) -> std::result::Result<(), FetchError> {
        let Some(probe_url) = self.config.probe_url.as_deref() else {
            return Ok(());
        };

        log::info!("Checking network connectivity via {}", probe_url);
        let result = self
            .client
            .get(probe_url)
            .timeout(self.config.probe_timeout)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(_) => {
                log::debug!("Connectivity probe succeeded");
                Ok(())
            },
            Err(e) => Err(FetchError::NetworkUnavailable {
                probe_url: probe_url.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Stream the body into `part` and validate it; returns the byte count
    async fn transfer(
        &self,
        target: &TransferTarget,
        part: &Path,
    ) -> std::result::Result<u64, FetchError> {
        let url = target.url.as_str();
        let timeout = self.config.read_timeout;

        if let Some(parent) = part.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| FetchError::io("create directory", parent, &e))?;
            }
        }

        let response = match tokio::time::timeout(timeout, self.client.get(url).send()).await {
            Err(_) => {
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                    timeout,
                })
            },
            Ok(Err(e)) => return Err(classify_request_error(url, &e, timeout)),
            Ok(Ok(response)) => response,
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpError {
                url: url.to_string(),
                status: Some(status.as_u16()),
                reason: format!("server responded with {}", status),
            });
        }

        let total = response.content_length();
        if total.is_none() {
            events::warning_with_recommendation(
                &format!("Server did not declare a content length for {}", url),
                "only an empty body can be validated without a declared size",
            );
        }
        self.reporter.report_start(url, total);

        let mut file = tokio::fs::File::create(part)
            .await
            .map_err(|e| FetchError::io("create file", part, &e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut buffer = vec![0u8; self.config.chunk_size];
        let mut downloaded = 0u64;

        loop {
            let (filled, eof) = self
                .read_chunk(&mut stream, &mut buffer, url, total, downloaded)
                .await?;

            if filled > 0 {
                file.write_all(buffer.get(..filled).unwrap_or(&[]))
                    .await
                    .map_err(|e| FetchError::io("write to file", part, &e))?;
                downloaded += filled as u64;

                events::download_progress(url, downloaded, total);
                self.reporter
                    .report_progress(&DownloadProgress::new(downloaded, total));
            }

            if eof {
                break;
            }
        }

        file.flush()
            .await
            .map_err(|e| FetchError::io("flush file", part, &e))?;
        drop(file);

        let validation =
            SizeValidation::check(part, total).map_err(|e| FetchError::io("inspect", part, &e))?;
        if !validation.passed {
            log::warn!(
                "Downloaded size {} does not match declared size {}",
                validation.observed,
                validation.expected
            );
            return Err(FetchError::IncompleteTransfer {
                url: url.to_string(),
                expected: validation.expected,
                actual: validation.observed,
            });
        }

        if let Some(expected) = target.expected_sha256.as_deref() {
            let actual = sha256_file_async(part).await?;
            if actual != expected {
                return Err(FetchError::ChecksumMismatch {
                    path: target.destination.clone(),
                    expected: expected.to_string(),
                    actual,
                });
            }
            log::debug!("SHA-256 verified for {}", target.destination.display());
        }

        Ok(validation.observed)
    }

    /// Fill `buffer` from `reader`; returns the bytes filled and whether EOF was hit
    async fn read_chunk<R: AsyncRead + Unpin>(
        &self,
        reader: &mut R,
        buffer: &mut [u8],
        url: &str,
        total: Option<u64>,
        downloaded: u64,
    ) -> std::result::Result<(usize, bool), FetchError> {
        let timeout = self.config.read_timeout;
        let mut filled = 0;

        while filled < buffer.len() {
            let slot = buffer.get_mut(filled..).unwrap_or_default();
            match tokio::time::timeout(timeout, reader.read(slot)).await {
                Err(_) => {
                    return Err(FetchError::Timeout {
                        url: url.to_string(),
                        timeout,
                    })
                },
                Ok(Err(e)) => {
                    return Err(classify_stream_error(
                        url,
                        &e,
                        total,
                        downloaded + filled as u64,
                        timeout,
                    ))
                },
                Ok(Ok(0)) => return Ok((filled, true)),
                Ok(Ok(n)) => filled += n,
            }
        }

        Ok((filled, false))
    }
}

/// Sibling path that receives bytes while a transfer is running
///
/// # Errors
/// - `destination` has no file name
pub fn part_path(destination: &Path) -> std::result::Result<PathBuf, FetchError> {
    let name = destination.file_name().ok_or_else(|| {
        FetchError::unexpected(format!(
            "Destination '{}' has no file name",
            destination.display()
        ))
    })?;
    let mut part_name = name.to_os_string();
    part_name.push(".part");
    Ok(destination.with_file_name(part_name))
}

/// Verify the SHA-256 digest of a file
///
/// # Errors
/// - File cannot be read
pub fn verify_sha256(path: &Path, expected: &str) -> Result<bool> {
    let actual = sha256_file(path)
        .map_err(|e| SamPrepError::file_io_error("read file for verification", path, &e))?;
    let matches = actual.eq_ignore_ascii_case(expected.trim());
    if !matches {
        log::warn!(
            "File integrity check failed for {}: expected {}, got {}",
            path.display(),
            expected,
            actual
        );
    }
    Ok(matches)
}

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

async fn sha256_file_async(path: &Path) -> std::result::Result<String, FetchError> {
    let owned = path.to_path_buf();
    tokio::task::spawn_blocking(move || sha256_file(&owned))
        .await
        .map_err(|e| FetchError::unexpected(format!("Checksum task failed: {}", e)))?
        .map_err(|e| FetchError::io("hash", path, &e))
}

fn remove_if_exists(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => log::debug!("Removed partial file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => log::warn!("Failed to remove partial file {}: {}", path.display(), e),
    }
}

fn classify_request_error(url: &str, error: &reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }
    } else {
        FetchError::HttpError {
            url: url.to_string(),
            status: error.status().map(|s| s.as_u16()),
            reason: error.to_string(),
        }
    }
}

/// Map a failed body read to the transfer taxonomy
///
/// A broken stream before the declared length counts as a truncated transfer.
fn classify_stream_error(
    url: &str,
    error: &std::io::Error,
    total: Option<u64>,
    received: u64,
    timeout: Duration,
) -> FetchError {
    let inner = error
        .get_ref()
        .and_then(|e| e.downcast_ref::<reqwest::Error>());
    if inner.is_some_and(reqwest::Error::is_timeout) || error.kind() == std::io::ErrorKind::TimedOut {
        return FetchError::Timeout {
            url: url.to_string(),
            timeout,
        };
    }

    match total {
        Some(expected) if received < expected => FetchError::IncompleteTransfer {
            url: url.to_string(),
            expected,
            actual: received,
        },
        _ => FetchError::HttpError {
            url: url.to_string(),
            status: None,
            reason: format!("Failed to read download stream: {}", error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn offline_downloader() -> ModelDownloader {
        ModelDownloader::new(FetchConfig::builder().no_probe().build().unwrap()).unwrap()
    }

    #[test]
    fn test_part_path() {
        let part = part_path(Path::new("/models/sam.pth")).unwrap();
        assert_eq!(part, PathBuf::from("/models/sam.pth.part"));
        assert!(part_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_precheck_keeps_large_enough_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("model.bin");
        fs::write(&dest, vec![1u8; 100]).unwrap();

        let target = TransferTarget::new("http://unused", &dest).with_min_size(100);
        assert_eq!(ModelDownloader::precheck(&target).unwrap(), Some(100));
        assert!(dest.exists());
    }

    #[test]
    fn test_precheck_removes_stale_file() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("model.bin");
        fs::write(&dest, vec![1u8; 99]).unwrap();

        let target = TransferTarget::new("http://unused", &dest).with_min_size(100);
        assert_eq!(ModelDownloader::precheck(&target).unwrap(), None);
        assert!(!dest.exists());
    }

    #[test]
    fn test_precheck_rejects_directory() {
        let temp_dir = TempDir::new().unwrap();
        let target = TransferTarget::new("http://unused", temp_dir.path());
        let err = ModelDownloader::precheck(&target).unwrap_err();
        assert!(matches!(err, FetchError::Unexpected(_)));
    }

    #[tokio::test]
    async fn test_existing_file_short_circuits_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let dest = temp_dir.path().join("model.bin");
        fs::write(&dest, vec![7u8; 10]).unwrap();

        // Port 9 on an unroutable address: any network call would fail
        let outcome = offline_downloader()
            .fetch("http://192.0.2.1:9/model.bin", &dest, 10)
            .await
            .unwrap();
        assert_eq!(outcome, FetchOutcome::AlreadyPresent { bytes: 10 });
        assert!(!outcome.was_downloaded());
    }

    #[test]
    fn test_size_validation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f");
        fs::write(&path, vec![0u8; 1000]).unwrap();

        assert!(SizeValidation::check(&path, Some(1000)).unwrap().passed);
        let failed = SizeValidation::check(&path, Some(1001)).unwrap();
        assert!(!failed.passed);
        assert_eq!(failed.observed, 1000);
    }

    #[test]
    fn test_size_validation_without_declared_length() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("f");
        fs::write(&path, vec![0u8; 500]).unwrap();

        let undeclared = SizeValidation::check(&path, None).unwrap();
        assert!(!undeclared.passed);
        assert_eq!(undeclared.expected, 0);
        assert_eq!(undeclared.observed, 500);

        let empty = temp_dir.path().join("empty");
        fs::write(&empty, b"").unwrap();
        assert!(SizeValidation::check(&empty, None).unwrap().passed);
    }

    #[test]
    fn test_verify_sha256() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.txt");
        fs::write(&path, "test content").unwrap();

        let mut hasher = Sha256::new();
        hasher.update(b"test content");
        let expected = format!("{:x}", hasher.finalize());

        assert!(verify_sha256(&path, &expected).unwrap());
        assert!(verify_sha256(&path, &expected.to_uppercase()).unwrap());
        assert!(!verify_sha256(&path, &"0".repeat(64)).unwrap());
        assert!(verify_sha256(&temp_dir.path().join("missing"), &expected)
            .unwrap_err()
            .to_string()
            .contains("read file for verification"));
    }

    #[test]
    fn test_target_normalises_digest() {
        let target = TransferTarget::new("u", "d").with_sha256("  ABCDEF ");
        assert_eq!(target.expected_sha256.as_deref(), Some("abcdef"));
    }

    #[test]
    fn test_classify_stream_error_truncation() {
        let err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "closed");
        let classified =
            classify_stream_error("u", &err, Some(1000), 500, Duration::from_secs(1));
        assert!(matches!(
            classified,
            FetchError::IncompleteTransfer {
                expected: 1000,
                actual: 500,
                ..
            }
        ));

        let classified = classify_stream_error("u", &err, None, 500, Duration::from_secs(1));
        assert!(matches!(classified, FetchError::HttpError { status: None, .. }));

        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        let classified =
            classify_stream_error("u", &timed_out, Some(1000), 10, Duration::from_secs(1));
        assert!(matches!(classified, FetchError::Timeout { .. }));
    }

    #[test]
    fn test_outcome_bytes() {
        assert_eq!(FetchOutcome::AlreadyPresent { bytes: 3 }.bytes(), 3);
        let downloaded = FetchOutcome::Downloaded {
            bytes: 5,
            attempts: 2,
        };
        assert_eq!(downloaded.bytes(), 5);
        assert!(downloaded.was_downloaded());
    }

    #[test]
    fn test_downloader_rejects_invalid_config() {
        let mut config = FetchConfig::default();
        config.chunk_size = 0;
        assert!(ModelDownloader::new(config).is_err());
    }

    #[test]
    fn test_downloader_debug() {
        let debug_str = format!("{:?}", offline_downloader());
        assert!(debug_str.contains("ModelDownloader"));
    }
}
