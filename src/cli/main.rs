//! SAM data preparation CLI
//!
//! Three tools behind one binary: checkpoint download, mask generation over a
//! folder of PNGs and batch image download.

use super::config::CliConfigBuilder;
use crate::{
    cache::{format_size, CheckpointCache, CACHE_DIR_ENV},
    config::{DEFAULT_CHECKPOINT_URL, DEFAULT_MIN_CHECKPOINT_SIZE, DEFAULT_PROBE_URL},
    download::{FetchOutcome, ModelDownloader},
    image_fetch::{parse_url_list, ImageBatchDownloader},
    services::create_cli_progress_reporter,
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::BatchSummary,
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::{error, info, warn};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Instant;
use tracing::Instrument;

/// Default folder shared by `fetch-images` (output) and `segment` (input)
pub const DEFAULT_IMAGE_DIR: &str = "downloaded_images";

/// Data preparation tools for Segment Anything
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "sam-prep")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format (console, compact, or json with the tracing-json feature)
    #[arg(long, default_value = "console", global = true)]
    pub log_format: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download the pretrained SAM checkpoint
    Download(DownloadArgs),
    /// Generate a centre-prompted mask for every PNG in a folder
    Segment(SegmentArgs),
    /// Download images from URLs and save them as PNG
    FetchImages(FetchImagesArgs),
    /// Show the checkpoint cache directory and its contents
    Cache,
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Self::Download(_) => "download",
            Self::Segment(_) => "segment",
            Self::FetchImages(_) => "fetch-images",
            Self::Cache => "cache",
        }
    }
}

#[derive(Args, Debug)]
pub struct DownloadArgs {
    /// Checkpoint URL
    #[arg(long, default_value = DEFAULT_CHECKPOINT_URL)]
    pub url: String,

    /// Destination file [default: checkpoint cache]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Existing files at least this large (bytes) are kept
    #[arg(long, default_value_t = DEFAULT_MIN_CHECKPOINT_SIZE)]
    pub min_size: u64,

    /// Endpoint checked before the transfer starts
    #[arg(long, default_value = DEFAULT_PROBE_URL, conflicts_with = "no_probe")]
    pub probe_url: String,

    /// Skip the connectivity probe
    #[arg(long)]
    pub no_probe: bool,

    /// Seconds to wait for response headers and for each chunk
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,

    /// Seconds to wait for the TCP connection
    #[arg(long, default_value_t = 30)]
    pub connect_timeout: u64,

    /// Read chunk size in bytes
    #[arg(long, default_value_t = crate::config::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Expected SHA-256 of the finished file (hex)
    #[arg(long)]
    pub sha256: Option<String>,

    /// Maximum number of attempts, including the first
    #[arg(long, default_value_t = 3)]
    pub retries: u32,

    /// Hide the progress bar
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// Folder containing PNG images (surrounding quotes are ignored)
    #[arg(value_name = "INPUT_DIR", default_value = DEFAULT_IMAGE_DIR)]
    pub input_dir: String,

    /// Where masks are written [default: INPUT_DIR/masks]
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// SAM image encoder ONNX file [default: checkpoint cache]
    #[arg(long)]
    pub encoder: Option<PathBuf>,

    /// SAM mask decoder ONNX file [default: checkpoint cache]
    #[arg(long)]
    pub decoder: Option<PathBuf>,

    /// Minimum encoder size in bytes accepted as complete
    #[arg(long, default_value_t = DEFAULT_MIN_CHECKPOINT_SIZE)]
    pub min_model_size: u64,

    /// Execution provider: auto, cpu, cuda or coreml
    #[arg(short, long, default_value = "auto")]
    pub execution_provider: String,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,
}

#[derive(Args, Debug)]
pub struct FetchImagesArgs {
    /// Image URLs; read from --input-file or stdin when omitted
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// File with one URL per line (reading stops at the first blank line)
    #[arg(short, long, conflicts_with = "urls")]
    pub input_file: Option<PathBuf>,

    /// Where PNGs are written
    #[arg(short, long, default_value = DEFAULT_IMAGE_DIR)]
    pub output_dir: PathBuf,

    /// Seconds allowed per image request
    #[arg(long, default_value_t = 30)]
    pub timeout: u64,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format: TracingFormat = cli
        .log_format
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))
        .context("Invalid --log-format")?;
    let session_id =
        init_cli_tracing(cli.verbose, format).context("Failed to initialize tracing")?;

    let span = spans::session(&session_id, cli.command.name());
    let start_time = Instant::now();

    let result = async {
        match &cli.command {
            Commands::Download(args) => run_download(args).await,
            Commands::Segment(args) => run_segment(args),
            Commands::FetchImages(args) => run_fetch_images(args).await,
            Commands::Cache => show_cache(),
        }
    }
    .instrument(span)
    .await;

    info!(
        "{} finished in {:.2}s",
        cli.command.name(),
        start_time.elapsed().as_secs_f64()
    );
    result
}

async fn run_download(args: &DownloadArgs) -> Result<()> {
    let config = CliConfigBuilder::fetch_config(args)?;
    let target = CliConfigBuilder::transfer_target(args)?;
    let policy = CliConfigBuilder::retry_policy(args);

    let downloader = ModelDownloader::new(config)
        .context("Failed to create checkpoint downloader")?
        .with_reporter(create_cli_progress_reporter(args.quiet));

    info!("📦 Checkpoint: {}", target.url);
    info!("   Destination: {}", target.destination.display());

    match downloader.fetch_with_retry(&target, &policy).await {
        Ok(FetchOutcome::AlreadyPresent { bytes }) => {
            println!(
                "✅ Checkpoint already present: {} ({})",
                target.destination.display(),
                format_size(bytes)
            );
            Ok(())
        },
        Ok(FetchOutcome::Downloaded { bytes, attempts }) => {
            println!(
                "✅ Downloaded {} to {}",
                format_size(bytes),
                target.destination.display()
            );
            if attempts > 1 {
                info!("Succeeded after {} attempts", attempts);
            }
            Ok(())
        },
        Err(e) => {
            error!("❌ {}", e);
            eprintln!("💡 {}", e.suggestion());
            Err(anyhow::Error::new(e).context("Checkpoint download failed"))
        },
    }
}

#[cfg(feature = "onnx")]
fn run_segment(args: &SegmentArgs) -> Result<()> {
    use crate::backends::OnnxSamBackend;
    use crate::processor::MaskGenerator;

    let input_dir = CliConfigBuilder::input_dir(&args.input_dir);
    let config = CliConfigBuilder::segment_config(args)?;

    for (name, available, description) in OnnxSamBackend::list_providers() {
        log::debug!(
            "Execution provider {}: {} - {}",
            name,
            if available { "available" } else { "not available" },
            description
        );
    }

    info!("🎭 Input directory: {}", input_dir.display());
    let mut generator = MaskGenerator::from_config(config)
        .context("Failed to create mask generator")?
        .with_reporter(create_cli_progress_reporter(false));

    let summary = generator
        .process_directory(&input_dir)
        .with_context(|| format!("Failed to process {}", input_dir.display()))?;
    print_summary("Mask generation", &summary);
    Ok(())
}

#[cfg(not(feature = "onnx"))]
fn run_segment(_args: &SegmentArgs) -> Result<()> {
    anyhow::bail!("Mask generation requires the 'onnx' feature. Rebuild with --features onnx")
}

async fn run_fetch_images(args: &FetchImagesArgs) -> Result<()> {
    let urls = collect_urls(args)?;
    if urls.is_empty() {
        println!("No URLs provided, nothing to do");
        return Ok(());
    }

    let downloader = ImageBatchDownloader::new(&CliConfigBuilder::image_fetch_config(args))
        .context("Failed to create image downloader")?
        .with_reporter(create_cli_progress_reporter(false));

    let summary = downloader
        .batch_download(&urls, &args.output_dir)
        .await
        .context("Image download failed")?;
    print_summary("Image download", &summary);
    Ok(())
}

fn collect_urls(args: &FetchImagesArgs) -> Result<Vec<String>> {
    if !args.urls.is_empty() {
        return Ok(args
            .urls
            .iter()
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .collect());
    }

    if let Some(path) = &args.input_file {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open URL list {}", path.display()))?;
        return parse_url_list(std::io::BufReader::new(file))
            .with_context(|| format!("Failed to read URL list {}", path.display()));
    }

    let stdin = std::io::stdin();
    if stdin.is_terminal() {
        eprintln!("Enter image URLs, one per line (blank line to finish):");
    }
    parse_url_list(stdin.lock()).context("Failed to read URLs from stdin")
}

fn show_cache() -> Result<()> {
    let cache = CheckpointCache::new().context("Failed to access checkpoint cache")?;

    println!("📁 Checkpoint cache: {}", cache.cache_dir().display());
    if std::env::var(CACHE_DIR_ENV).is_ok() {
        println!("   Source: {} environment variable", CACHE_DIR_ENV);
    } else {
        println!("   Source: user cache directory");
    }

    let checkpoints = cache
        .list_checkpoints()
        .context("Failed to list cached checkpoints")?;
    if checkpoints.is_empty() {
        println!("\nNo cached files.");
        println!("\n💡 To download the default checkpoint:");
        println!("   sam-prep download");
        return Ok(());
    }

    println!();
    for checkpoint in checkpoints {
        let marker = if checkpoint.partial { " (incomplete)" } else { "" };
        println!(
            "  • {} - {}{}",
            checkpoint.name,
            format_size(checkpoint.size_bytes),
            marker
        );
    }
    Ok(())
}

fn print_summary(label: &str, summary: &BatchSummary) {
    println!("\n{} complete! Succeeded: {}/{}", label, summary.succeeded, summary.total);
    println!("Output: {}", summary.output_dir.display());
    if summary.failed() > 0 {
        warn!("{} item(s) failed:", summary.failed());
        for failure in &summary.failures {
            warn!("  • {}: {}", failure.item, failure.error);
        }
    }
}
