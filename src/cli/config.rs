//! Conversion of CLI arguments into library configuration

use crate::cache::CheckpointCache;
use crate::cli::main_impl::{DownloadArgs, FetchImagesArgs, SegmentArgs};
use crate::config::{
    ExecutionProvider, FetchConfig, ImageFetchConfig, SamModelFiles, SegmentConfig,
};
use crate::download::TransferTarget;
use crate::retry::RetryPolicy;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build downloader settings from `download` arguments
    pub(crate) fn fetch_config(args: &DownloadArgs) -> Result<FetchConfig> {
        let mut builder = FetchConfig::builder()
            .read_timeout(Duration::from_secs(args.timeout))
            .connect_timeout(Duration::from_secs(args.connect_timeout))
            .chunk_size(args.chunk_size);

        builder = if args.no_probe {
            builder.no_probe()
        } else {
            builder.probe_url(args.probe_url.clone())
        };

        builder.build().context("Invalid download configuration")
    }

    /// Resolve the transfer target, defaulting the destination to the cache
    pub(crate) fn transfer_target(args: &DownloadArgs) -> Result<TransferTarget> {
        let destination = match &args.output {
            Some(path) => path.clone(),
            None => CheckpointCache::new()
                .context("Failed to open checkpoint cache")?
                .default_checkpoint_path(),
        };

        let mut target = TransferTarget::new(args.url.clone(), destination).with_min_size(args.min_size);
        if let Some(digest) = &args.sha256 {
            if digest.trim().len() != 64 || !digest.trim().chars().all(|c| c.is_ascii_hexdigit()) {
                anyhow::bail!("--sha256 must be 64 hexadecimal characters");
            }
            target = target.with_sha256(digest.clone());
        }
        Ok(target)
    }

    pub(crate) fn retry_policy(args: &DownloadArgs) -> RetryPolicy {
        RetryPolicy::default().with_max_attempts(args.retries)
    }

    /// Build mask generator settings, defaulting model files to the cache
    pub(crate) fn segment_config(args: &SegmentArgs) -> Result<SegmentConfig> {
        let needs_cache = args.encoder.is_none() || args.decoder.is_none();
        let cache = if needs_cache {
            Some(CheckpointCache::new().context("Failed to open checkpoint cache")?)
        } else {
            None
        };

        let encoder = args
            .encoder
            .clone()
            .or_else(|| cache.as_ref().map(CheckpointCache::default_encoder_path))
            .context("No encoder path available")?;
        let decoder = args
            .decoder
            .clone()
            .or_else(|| cache.as_ref().map(CheckpointCache::default_decoder_path))
            .context("No decoder path available")?;

        let execution_provider: ExecutionProvider = args
            .execution_provider
            .parse()
            .context("Invalid execution provider")?;

        let mut config = SegmentConfig::new(SamModelFiles::new(encoder, decoder));
        config.min_model_size = args.min_model_size;
        config.execution_provider = execution_provider;
        config.intra_threads = args.threads;
        config.output_dir = args.output_dir.clone();
        config.validate().context("Invalid segmentation configuration")?;
        Ok(config)
    }

    pub(crate) fn image_fetch_config(args: &FetchImagesArgs) -> ImageFetchConfig {
        ImageFetchConfig {
            request_timeout: Duration::from_secs(args.timeout.max(1)),
            ..ImageFetchConfig::default()
        }
    }

    /// Input directory with surrounding quotes removed
    pub(crate) fn input_dir(raw: &str) -> PathBuf {
        let stripped = strip_quotes(raw.trim());
        if stripped.is_empty() {
            PathBuf::from(crate::cli::main_impl::DEFAULT_IMAGE_DIR)
        } else {
            PathBuf::from(stripped)
        }
    }
}

/// Strip leading and trailing `"` and `'` characters
pub(crate) fn strip_quotes(s: &str) -> &str {
    s.trim_matches('"').trim_matches('\'')
}
