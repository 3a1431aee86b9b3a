//! Configuration types for downloads, mask generation and image fetching

use crate::error::{Result, SamPrepError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Segment Anything ViT-H checkpoint published by Meta
pub const DEFAULT_CHECKPOINT_URL: &str =
    "https://dl.fbaipublicfiles.com/segment_anything/sam_vit_h_4b8939.pth";

/// File name used for the default checkpoint inside the cache directory
pub const DEFAULT_CHECKPOINT_NAME: &str = "sam_vit_h_4b8939.pth";

/// Any existing checkpoint smaller than this is treated as truncated (2 GiB)
pub const DEFAULT_MIN_CHECKPOINT_SIZE: u64 = 2 * 1024 * 1024 * 1024;

/// Endpoint used to check connectivity before a large transfer
pub const DEFAULT_PROBE_URL: &str = "https://www.google.com";

/// Browser-like client identifier; some CDNs reject unknown agents
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Size of a single body chunk (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Default encoder/decoder file names for the exported SAM ONNX graphs
pub const DEFAULT_ENCODER_NAME: &str = "sam_vit_h_4b8939_encoder.onnx";
pub const DEFAULT_DECODER_NAME: &str = "sam_vit_h_4b8939_decoder.onnx";

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    #[default]
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon acceleration
    CoreMl,
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

impl std::str::FromStr for ExecutionProvider {
    type Err = SamPrepError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            "coreml" => Ok(Self::CoreMl),
            other => Err(SamPrepError::invalid_config(format!(
                "Unknown execution provider '{}'. Expected one of: auto, cpu, cuda, coreml",
                other
            ))),
        }
    }
}

/// Network and streaming settings for the checkpoint downloader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Endpoint probed before the transfer (`None` skips the probe)
    pub probe_url: Option<String>,

    /// Timeout for the connectivity probe
    pub probe_timeout: Duration,

    /// TCP/TLS connect timeout for the transfer
    pub connect_timeout: Duration,

    /// Maximum wait for response headers and for each body chunk
    pub read_timeout: Duration,

    /// Bytes per chunk written to disk and reported as progress
    pub chunk_size: usize,

    /// Value of the `User-Agent` header
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            probe_url: Some(DEFAULT_PROBE_URL.to_string()),
            probe_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            chunk_size: DEFAULT_CHUNK_SIZE,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl FetchConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> FetchConfigBuilder {
        FetchConfigBuilder::default()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// - Zero chunk size
    /// - Zero timeouts
    /// - Empty user agent or probe URL
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(SamPrepError::invalid_config(
                "Chunk size must be greater than zero",
            ));
        }

        for (name, value) in [
            ("probe timeout", self.probe_timeout),
            ("connect timeout", self.connect_timeout),
            ("read timeout", self.read_timeout),
        ] {
            if value.is_zero() {
                return Err(SamPrepError::invalid_config(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.user_agent.trim().is_empty() {
            return Err(SamPrepError::invalid_config("User agent cannot be empty"));
        }

        if let Some(probe) = &self.probe_url {
            if probe.trim().is_empty() {
                return Err(SamPrepError::invalid_config(
                    "Probe URL cannot be empty (omit it to skip the probe)",
                ));
            }
        }

        Ok(())
    }
}

/// Builder for [`FetchConfig`]
#[derive(Debug, Default)]
pub struct FetchConfigBuilder {
    config: FetchConfig,
}

impl FetchConfigBuilder {
    #[must_use]
    pub fn probe_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.probe_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn no_probe(mut self) -> Self {
        self.config.probe_url = None;
        self
    }

    #[must_use]
    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.config.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    #[must_use]
    pub fn user_agent<S: Into<String>>(mut self, agent: S) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// - Any rule checked by [`FetchConfig::validate`]
    pub fn build(self) -> Result<FetchConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Paths of an exported Segment Anything model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamModelFiles {
    /// Image encoder graph (the large file)
    pub encoder: PathBuf,
    /// Prompt/mask decoder graph
    pub decoder: PathBuf,
}

impl SamModelFiles {
    #[must_use]
    pub fn new<E: Into<PathBuf>, D: Into<PathBuf>>(encoder: E, decoder: D) -> Self {
        Self {
            encoder: encoder.into(),
            decoder: decoder.into(),
        }
    }

    /// Check that both graphs exist and the encoder is not truncated
    ///
    /// # Errors
    /// - Either file is missing
    /// - Encoder is smaller than `min_encoder_size`
    pub fn validate(&self, min_encoder_size: u64) -> Result<()> {
        for path in [&self.encoder, &self.decoder] {
            if !path.is_file() {
                return Err(SamPrepError::model_error_with_context(
                    "locate",
                    path,
                    "file does not exist",
                    &["run `sam-prep download` or pass --encoder/--decoder"],
                ));
            }
        }

        let size = std::fs::metadata(&self.encoder)
            .map_err(|e| SamPrepError::file_io_error("read metadata of", &self.encoder, &e))?
            .len();
        if size < min_encoder_size {
            return Err(SamPrepError::model_error_with_context(
                "validate",
                &self.encoder,
                &format!(
                    "file is {:.1} GB, expected at least {:.1} GB and it may be corrupted",
                    size as f64 / GIB,
                    min_encoder_size as f64 / GIB
                ),
                &["re-run `sam-prep download`"],
            ));
        }

        Ok(())
    }
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Configuration for the mask generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    /// Model graphs to load
    pub model_files: SamModelFiles,

    /// Minimum encoder size accepted as a complete file
    pub min_model_size: u64,

    /// Execution provider for ONNX Runtime
    pub execution_provider: ExecutionProvider,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Where masks are written (`None` = `<input>/masks`)
    pub output_dir: Option<PathBuf>,

    /// Logit threshold above which a pixel belongs to the mask
    pub mask_threshold: f32,
}

impl SegmentConfig {
    #[must_use]
    pub fn new(model_files: SamModelFiles) -> Self {
        Self {
            model_files,
            min_model_size: DEFAULT_MIN_CHECKPOINT_SIZE,
            execution_provider: ExecutionProvider::default(),
            intra_threads: 0,
            output_dir: None,
            mask_threshold: 0.0,
        }
    }

    /// Validate the configuration without touching the model files
    ///
    /// # Errors
    /// - Non-finite mask threshold
    pub fn validate(&self) -> Result<()> {
        if !self.mask_threshold.is_finite() {
            return Err(SamPrepError::invalid_config(format!(
                "Mask threshold must be finite, got {}",
                self.mask_threshold
            )));
        }
        Ok(())
    }
}

/// Configuration for the image batch downloader
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageFetchConfig {
    /// Total timeout per image request
    pub request_timeout: Duration,
    /// Value of the `User-Agent` header
    pub user_agent: String,
}

impl Default for ImageFetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}
