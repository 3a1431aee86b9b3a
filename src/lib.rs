#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # SAM Data Preparation
//!
//! Tooling around Segment Anything (SAM) dataset preparation:
//!
//! - **Checkpoint download**: resumable-by-rerun download of the multi-gigabyte
//!   ViT-H checkpoint with a size pre-check, connectivity probe, streamed
//!   chunks with progress, post-validation and cleanup on every failure
//! - **Mask generation**: centre-point prompted masks for every PNG in a folder
//!   using an ONNX export of SAM
//! - **Image fetching**: batch download of images from URLs, saved as PNG
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sam_prep::{FetchConfig, FetchOutcome, ModelDownloader, RetryPolicy, TransferTarget};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let downloader = ModelDownloader::new(FetchConfig::default())?;
//! let target = TransferTarget::new(
//!     sam_prep::config::DEFAULT_CHECKPOINT_URL,
//!     "sam_vit_h_4b8939.pth",
//! )
//! .with_min_size(sam_prep::config::DEFAULT_MIN_CHECKPOINT_SIZE);
//!
//! match downloader.fetch_with_retry(&target, &RetryPolicy::default()).await {
//!     Ok(FetchOutcome::AlreadyPresent { bytes }) => println!("already have {bytes} bytes"),
//!     Ok(FetchOutcome::Downloaded { bytes, .. }) => println!("downloaded {bytes} bytes"),
//!     Err(e) => eprintln!("{e}\n{}", e.suggestion()),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Mask Generation
//!
//! ```rust,no_run
//! # #[cfg(feature = "onnx")]
//! # fn example() -> anyhow::Result<()> {
//! use sam_prep::{MaskGenerator, SamModelFiles, SegmentConfig};
//!
//! let files = SamModelFiles::new("sam_vit_h_encoder.onnx", "sam_vit_h_decoder.onnx");
//! let mut generator = MaskGenerator::from_config(SegmentConfig::new(files))?;
//! let summary = generator.process_directory(std::path::Path::new("downloaded_images"))?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime backend for mask generation
//! - `cli` (default): `sam-prep` binary, progress bars and subscriber setup
//! - `webp-support` (default): WebP decoding for fetched images
//! - `tracing-json`: JSON log output

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod image_fetch;
pub mod inference;
pub mod processor;
pub mod retry;
pub mod services;
pub mod tracing_config;
pub mod types;
pub mod utils;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedCheckpoint, CheckpointCache};
pub use config::{
    ExecutionProvider, FetchConfig, FetchConfigBuilder, ImageFetchConfig, SamModelFiles,
    SegmentConfig,
};
pub use download::{
    verify_sha256, FetchOutcome, ModelDownloader, SizeValidation, TransferTarget,
};
pub use error::{FetchError, Result, SamPrepError};
pub use image_fetch::{parse_url_list, ImageBatchDownloader};
pub use inference::SegmentationBackend;
pub use processor::MaskGenerator;
pub use retry::{RetryDecision, RetryPolicy};
pub use services::{
    BatchItemUpdate, CallbackProgressReporter, ConsoleProgressReporter, DownloadProgress,
    ImageIOService, NoOpProgressReporter, ProgressReporter,
};
pub use tracing_config::{events, spans, TracingConfig, TracingFormat};
#[cfg(feature = "cli")]
pub use tracing_config::init_cli_tracing;
pub use types::{BatchFailure, BatchSummary, PointPrompt, PromptLabel, SegmentationMask};
pub use utils::{PreprocessedImage, SamPreprocessor};
