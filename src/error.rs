//! Error types for checkpoint downloads, mask generation and image fetching

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for sam-prep operations
pub type Result<T> = std::result::Result<T, SamPrepError>;

/// Failure of a single checkpoint transfer
///
/// Every variant is terminal for the attempt that produced it. The downloader
/// removes any partially written file before returning one of these.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The connectivity probe failed before the large transfer was attempted
    #[error("Network unavailable: connectivity probe to {probe_url} failed: {reason}")]
    NetworkUnavailable { probe_url: String, reason: String },

    /// Waiting for headers or for a body chunk exceeded the read timeout
    #[error("Transfer of {url} timed out after {}s", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },

    /// Non-2xx response or transport-level failure
    #[error("HTTP error for {url}: {reason}")]
    HttpError {
        url: String,
        status: Option<u16>,
        reason: String,
    },

    /// Bytes on disk do not match the size declared by the server
    #[error("Incomplete transfer of {url}: expected {expected} bytes, got {actual}")]
    IncompleteTransfer {
        url: String,
        expected: u64,
        actual: u64,
    },

    /// SHA-256 of the downloaded file does not match the expected digest
    #[error("Checksum mismatch for '{}': expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Anything else, typically local I/O
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl FetchError {
    /// Create an unexpected error from any displayable cause
    pub fn unexpected<S: Into<String>>(msg: S) -> Self {
        Self::Unexpected(msg.into())
    }

    /// Create an unexpected error for a failed filesystem operation
    pub fn io<P: AsRef<std::path::Path>>(operation: &str, path: P, error: &std::io::Error) -> Self {
        Self::Unexpected(format!(
            "Failed to {} '{}': {}",
            operation,
            path.as_ref().display(),
            error
        ))
    }

    /// HTTP status carried by the error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpError { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a fresh attempt has a reasonable chance of succeeding
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkUnavailable { .. }
            | Self::Timeout { .. }
            | Self::IncompleteTransfer { .. }
            | Self::ChecksumMismatch { .. } => true,
            Self::HttpError { status, .. } => match status {
                None => true,
                Some(code) => *code == 429 || (500..600).contains(code),
            },
            Self::Unexpected(_) => false,
        }
    }

    /// Human-facing hint shown next to the error message
    #[must_use]
    pub fn suggestion(&self) -> &'static str {
        match self {
            Self::NetworkUnavailable { .. } => {
                "Check that you are connected to the internet and whether a proxy is required, then re-run the download"
            },
            Self::Timeout { .. } => {
                "The connection is too slow or stalled. Check your network speed and re-run the download"
            },
            Self::HttpError { .. } => {
                "Check the URL, your network connection or proxy settings, then re-run the download"
            },
            Self::IncompleteTransfer { .. } | Self::ChecksumMismatch { .. } => {
                "The downloaded file was corrupted and has been removed, re-run the download"
            },
            Self::Unexpected(_) => "Check disk space and permissions, then re-run the download",
        }
    }
}

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum SamPrepError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Checkpoint transfer errors
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Network errors outside the checkpoint downloader
    #[error("Network error: {0}")]
    Network(String),

    /// Model loading or validation errors
    #[error("Model error: {0}")]
    Model(String),

    /// Backend inference errors
    #[error("Inference error: {0}")]
    Inference(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Processing pipeline errors
    #[error("Processing error: {0}")]
    Processing(String),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SamPrepError {
    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new model error
    pub fn model<S: Into<String>>(msg: S) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new processing error
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create network error with context
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create model error with troubleshooting context
    pub fn model_error_with_context<P: AsRef<std::path::Path>>(
        operation: &str,
        model_path: P,
        error: &str,
        suggestions: &[&str],
    ) -> Self {
        let path_display = model_path.as_ref().display();
        let suggestion_text = if suggestions.is_empty() {
            String::new()
        } else {
            format!(" Suggestions: {}", suggestions.join(", "))
        };

        Self::Model(format!(
            "Failed to {} model '{}': {}.{}",
            operation, path_display, error, suggestion_text
        ))
    }

    /// Create processing error with stage context
    pub fn processing_stage_error(stage: &str, details: &str, input_info: Option<&str>) -> Self {
        let input_context = match input_info {
            Some(info) => format!(" (input: {})", info),
            None => String::new(),
        };

        Self::Processing(format!(
            "Processing failed at stage '{}'{}: {}",
            stage, input_context, details
        ))
    }
}
