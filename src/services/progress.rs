//! Progress reporting service
//!
//! Transfer and batch code only emits events through [`ProgressReporter`];
//! frontends decide whether those events become a progress bar, log lines or
//! nothing at all.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a running transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes written so far
    pub downloaded: u64,
    /// Size declared by the server, if any
    pub total: Option<u64>,
}

impl DownloadProgress {
    #[must_use]
    pub fn new(downloaded: u64, total: Option<u64>) -> Self {
        Self { downloaded, total }
    }

    /// Completed fraction in `0.0..=1.0`, `None` when the total is unknown or zero
    #[must_use]
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some((self.downloaded as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }

    /// Completed percentage, `None` when the total is unknown or zero
    #[must_use]
    pub fn percent(&self) -> Option<u8> {
        self.fraction().map(|f| (f * 100.0).floor() as u8)
    }
}

/// Progress of one item inside a sequential batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItemUpdate {
    /// 1-based position of the item
    pub index: usize,
    pub total: usize,
    /// File path or URL
    pub item: String,
    pub succeeded: bool,
}

/// Trait for reporting progress of transfers and batches
pub trait ProgressReporter: Send + Sync {
    /// Called once the response headers arrived
    fn report_start(&self, url: &str, total: Option<u64>) {
        let _ = (url, total);
    }

    /// Called after every chunk written to disk
    fn report_progress(&self, progress: &DownloadProgress);

    /// Called after the file passed validation
    fn report_completion(&self, bytes: u64) {
        let _ = bytes;
    }

    /// Called when the transfer failed
    fn report_error(&self, error: &str) {
        let _ = error;
    }

    /// Called after each batch item finished
    fn report_batch_item(&self, update: &BatchItemUpdate) {
        let _ = update;
    }
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _progress: &DownloadProgress) {}
}

/// Reporter that forwards every update to a closure
pub struct CallbackProgressReporter<F>
where
    F: Fn(&DownloadProgress) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackProgressReporter<F>
where
    F: Fn(&DownloadProgress) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for CallbackProgressReporter<F>
where
    F: Fn(&DownloadProgress) + Send + Sync,
{
    fn report_progress(&self, progress: &DownloadProgress) {
        (self.callback)(progress);
    }
}

/// Console reporter that logs a text progress bar every `step_percent`
pub struct ConsoleProgressReporter {
    step_percent: u8,
    last_reported: AtomicU64,
}

impl ConsoleProgressReporter {
    /// Width of the rendered bar in characters
    const BAR_WIDTH: usize = 50;

    #[must_use]
    pub fn new(step_percent: u8) -> Self {
        Self {
            step_percent: step_percent.clamp(1, 100),
            last_reported: AtomicU64::new(u64::MAX),
        }
    }

    /// Render `[=====     ] 1.2GB/2.4GB`
    #[must_use]
    pub fn render(progress: &DownloadProgress) -> String {
        let filled = progress
            .fraction()
            .map_or(0, |f| (f * Self::BAR_WIDTH as f64) as usize)
            .min(Self::BAR_WIDTH);
        let total = progress
            .total
            .map_or_else(|| "?".to_string(), |t| format!("{:.1}GB", gib(t)));
        format!(
            "[{}{}] {:.1}GB/{}",
            "=".repeat(filled),
            " ".repeat(Self::BAR_WIDTH - filled),
            gib(progress.downloaded),
            total
        )
    }
}

impl Default for ConsoleProgressReporter {
    fn default() -> Self {
        Self::new(5)
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn report_start(&self, url: &str, total: Option<u64>) {
        match total {
            Some(bytes) => log::info!("📥 Downloading {} ({:.1}GB)", url, gib(bytes)),
            None => log::info!("📥 Downloading {} (size unknown)", url),
        }
    }

    fn report_progress(&self, progress: &DownloadProgress) {
        // Unknown totals are bucketed by 64 MiB so the log stays readable
        let bucket = match progress.percent() {
            Some(p) => u64::from(p / self.step_percent),
            None => progress.downloaded / (64 * 1024 * 1024),
        };
        if self.last_reported.swap(bucket, Ordering::Relaxed) != bucket {
            log::info!("{}", Self::render(progress));
        }
    }

    fn report_completion(&self, bytes: u64) {
        log::info!("✅ Download complete ({} bytes)", bytes);
    }

    fn report_error(&self, error: &str) {
        log::error!("❌ Download failed: {}", error);
    }

    fn report_batch_item(&self, update: &BatchItemUpdate) {
        if update.succeeded {
            log::info!("[{}/{}] ✅ {}", update.index, update.total, update.item);
        } else {
            log::warn!("[{}/{}] ❌ {}", update.index, update.total, update.item);
        }
    }
}

/// Terminal progress bar backed by indicatif
#[cfg(feature = "cli")]
pub struct IndicatifProgressReporter {
    bar: indicatif::ProgressBar,
}

#[cfg(feature = "cli")]
impl IndicatifProgressReporter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            bar: indicatif::ProgressBar::hidden(),
        }
    }

    fn byte_style() -> indicatif::ProgressStyle {
        indicatif::ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("#>-")
    }
}

#[cfg(feature = "cli")]
impl Default for IndicatifProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "cli")]
impl ProgressReporter for IndicatifProgressReporter {
    fn report_start(&self, url: &str, total: Option<u64>) {
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        match total {
            Some(len) => {
                self.bar.set_style(Self::byte_style());
                self.bar.set_length(len);
            },
            None => {
                self.bar.set_style(indicatif::ProgressStyle::default_spinner());
            },
        }
        self.bar.set_message(url.rsplit('/').next().unwrap_or(url).to_string());
    }

    fn report_progress(&self, progress: &DownloadProgress) {
        self.bar.set_position(progress.downloaded);
    }

    fn report_completion(&self, bytes: u64) {
        self.bar
            .finish_with_message(format!("✅ Downloaded {:.2} GB", gib(bytes)));
    }

    fn report_error(&self, error: &str) {
        self.bar.abandon_with_message(format!("❌ {}", error));
    }

    fn report_batch_item(&self, update: &BatchItemUpdate) {
        if update.index == 1 {
            self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
            self.bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            self.bar.set_length(update.total as u64);
        }
        self.bar.set_position(update.index as u64);
        self.bar.set_message(update.item.clone());
        if update.index == update.total {
            self.bar.finish_and_clear();
        }
    }
}

/// Pick the reporter matching CLI flags
#[cfg(feature = "cli")]
#[must_use]
pub fn create_cli_progress_reporter(quiet: bool) -> Box<dyn ProgressReporter> {
    use std::io::IsTerminal;

    if quiet {
        Box::new(NoOpProgressReporter)
    } else if std::io::stderr().is_terminal() {
        Box::new(IndicatifProgressReporter::new())
    } else {
        Box::new(ConsoleProgressReporter::default())
    }
}

fn gib(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0 * 1024.0)
}
