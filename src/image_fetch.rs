//! Batch download of images from URLs, re-encoded as PNG

use crate::config::ImageFetchConfig;
use crate::error::{Result, SamPrepError};
use crate::services::io::ImageIOService;
use crate::services::progress::{BatchItemUpdate, NoOpProgressReporter, ProgressReporter};
use crate::tracing_config::{events, spans};
use crate::types::BatchSummary;
use reqwest::Client;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing::Instrument;

/// Read URLs one per line until the first blank line or EOF
///
/// # Errors
/// - Reading from `reader` failed
pub fn parse_url_list<R: BufRead>(reader: R) -> std::io::Result<Vec<String>> {
    let mut urls = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let url = line.trim();
        if url.is_empty() {
            break;
        }
        urls.push(url.to_string());
    }
    Ok(urls)
}

/// Output file name for the image at 1-based `index`
#[must_use]
pub fn image_file_name(index: usize) -> String {
    format!("image_{}.png", index)
}

/// Downloads images and stores them as `image_{index}.png`
pub struct ImageBatchDownloader {
    client: Client,
    reporter: Box<dyn ProgressReporter>,
}

impl ImageBatchDownloader {
    /// # Errors
    /// - Failed to create HTTP client
    pub fn new(config: &ImageFetchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| SamPrepError::network_error("Failed to create HTTP client", e))?;

        Ok(Self {
            client,
            reporter: Box::new(NoOpProgressReporter),
        })
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Fetch one image and save it as PNG; returns the written path
    ///
    /// # Errors
    /// - Request failed or returned a non-2xx status
    /// - Body is not a decodable image
    /// - PNG could not be written
    pub async fn download_and_convert(
        &self,
        url: &str,
        output_dir: &Path,
        index: usize,
    ) -> Result<PathBuf> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| SamPrepError::network_error(format!("Failed to fetch {}", url), e))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SamPrepError::network_error(format!("Failed to read body of {}", url), e))?;

        let image = ImageIOService::load_from_bytes(&bytes, url)?;
        let output_path = output_dir.join(image_file_name(index));
        ImageIOService::save_png(&image, &output_path)?;

        log::debug!(
            "Saved {}x{} image from {} to {}",
            image.width(),
            image.height(),
            url,
            output_path.display()
        );
        Ok(output_path)
    }

    /// Fetch every URL in order; failures are recorded and skipped
    ///
    /// # Errors
    /// - Output directory cannot be created
    pub async fn batch_download(&self, urls: &[String], output_dir: &Path) -> Result<BatchSummary> {
        std::fs::create_dir_all(output_dir)
            .map_err(|e| SamPrepError::file_io_error("create output directory", output_dir, &e))?;

        let total = urls.len();
        events::progress(
            &format!("Downloading {} images to {}", total, output_dir.display()),
            "📥",
        );

        let mut summary = BatchSummary::new(output_dir.to_path_buf(), total);
        async {
            for (offset, url) in urls.iter().enumerate() {
                let index = offset + 1;
                let succeeded = match self
                    .download_and_convert(url, output_dir, index)
                    .instrument(spans::image_fetch(index, url))
                    .await
                {
                    Ok(path) => {
                        events::batch_item(index, total, &format!("{} -> {}", url, path.display()), None);
                        summary.record_success(path);
                        true
                    },
                    Err(e) => {
                        events::batch_item(index, total, url, Some(&e.to_string()));
                        summary.record_failure(url.as_str(), &e);
                        false
                    },
                };

                self.reporter.report_batch_item(&BatchItemUpdate {
                    index,
                    total,
                    item: url.clone(),
                    succeeded,
                });
            }
        }
        .instrument(spans::batch_processing("image_fetch", total))
        .await;

        log::info!("Download finished: {}", summary);
        Ok(summary)
    }
}
