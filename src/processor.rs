//! Mask generator
//!
//! Runs a [`SegmentationBackend`] over every PNG in a folder, prompting each
//! image with its centre point, and writes one `<stem>_mask.png` per input.

use crate::{
    error::{Result, SamPrepError},
    inference::SegmentationBackend,
    services::{
        io::ImageIOService,
        progress::{BatchItemUpdate, NoOpProgressReporter, ProgressReporter},
    },
    tracing_config::{events, spans},
    types::{BatchSummary, PointPrompt},
};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Name of the output folder created inside the input folder by default
pub const DEFAULT_MASK_DIR: &str = "masks";

/// Batch mask generator over a pluggable backend
pub struct MaskGenerator {
    backend: Box<dyn SegmentationBackend>,
    output_dir: Option<PathBuf>,
    reporter: Box<dyn ProgressReporter>,
}

impl MaskGenerator {
    #[must_use]
    pub fn with_backend(backend: Box<dyn SegmentationBackend>) -> Self {
        Self {
            backend,
            output_dir: None,
            reporter: Box::new(NoOpProgressReporter),
        }
    }

    /// Create a generator backed by ONNX Runtime
    ///
    /// # Errors
    /// - Invalid configuration
    #[cfg(feature = "onnx")]
    pub fn from_config(config: crate::config::SegmentConfig) -> Result<Self> {
        config.validate()?;
        let output_dir = config.output_dir.clone();
        let backend = crate::backends::OnnxSamBackend::new(config);
        Ok(Self::with_backend(Box::new(backend)).with_output_dir(output_dir))
    }

    /// Override the output directory (`None` = `<input>/masks`)
    #[must_use]
    pub fn with_output_dir(mut self, output_dir: Option<PathBuf>) -> Self {
        self.output_dir = output_dir;
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Box<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Where masks for `input_dir` are written
    #[must_use]
    pub fn output_dir_for(&self, input_dir: &Path) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| input_dir.join(DEFAULT_MASK_DIR))
    }

    /// Generate masks for every PNG in `input_dir`
    ///
    /// The backend is loaded only when there is at least one input. Per-file
    /// failures are recorded in the summary and do not stop the batch.
    ///
    /// # Errors
    /// - Input directory missing or unreadable
    /// - Output directory cannot be created
    /// - Backend initialization failed
    pub fn process_directory(&mut self, input_dir: &Path) -> Result<BatchSummary> {
        if !input_dir.is_dir() {
            return Err(SamPrepError::invalid_config(format!(
                "Input directory '{}' does not exist",
                input_dir.display()
            )));
        }

        let output_dir = self.output_dir_for(input_dir);
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| SamPrepError::file_io_error("create output directory", &output_dir, &e))?;

        let inputs = ImageIOService::list_png_inputs(input_dir)?;
        let total = inputs.len();
        let mut summary = BatchSummary::new(output_dir.clone(), total);

        if inputs.is_empty() {
            log::warn!("No PNG files found in {}", input_dir.display());
            return Ok(summary);
        }

        let _batch = spans::batch_processing("segment", total).entered();
        if let Some(load_time) = self.backend.initialize()? {
            events::performance_metric("model_loading", load_time.as_millis() as u64);
        }

        events::progress(&format!("Generating masks for {} images", total), "🎭");
        for (offset, input) in inputs.iter().enumerate() {
            let index = offset + 1;
            let item = input.display().to_string();
            let succeeded = match self.process_file(input, &output_dir) {
                Ok(mask_path) => {
                    events::batch_item(index, total, &format!("{} -> {}", item, mask_path.display()), None);
                    summary.record_success(mask_path);
                    true
                },
                Err(e) => {
                    events::batch_item(index, total, &item, Some(&e.to_string()));
                    summary.record_failure(item.clone(), &e);
                    false
                },
            };
            self.reporter.report_batch_item(&BatchItemUpdate {
                index,
                total,
                item,
                succeeded,
            });
        }

        log::info!("Mask generation finished: {}", summary);
        Ok(summary)
    }

    /// Generate and save the mask of a single image; returns the mask path
    ///
    /// # Errors
    /// - Image cannot be decoded
    /// - Prediction or saving failed
    pub fn process_file(&mut self, input: &Path, output_dir: &Path) -> Result<PathBuf> {
        let _span = spans::file_processing(input).entered();
        let start = Instant::now();

        if !self.backend.is_initialized() {
            self.backend.initialize()?;
        }

        let image = ImageIOService::load_image(input)?;
        let prompt = PointPrompt::center_of(image.width(), image.height());
        log::debug!(
            "Prompting {} ({}x{}) at ({}, {})",
            input.display(),
            image.width(),
            image.height(),
            prompt.x,
            prompt.y
        );

        let mask = self.backend.predict(&image, &prompt)?;
        if (mask.width, mask.height) != (image.width(), image.height()) {
            return Err(SamPrepError::processing_stage_error(
                "mask prediction",
                &format!(
                    "backend returned {}x{} mask for {}x{} image",
                    mask.width,
                    mask.height,
                    image.width(),
                    image.height()
                ),
                Some(&input.display().to_string()),
            ));
        }

        let mask_path = ImageIOService::mask_path_for(input, output_dir);
        mask.save_png(&mask_path)?;

        events::performance_metric("mask_generation", start.elapsed().as_millis() as u64);
        Ok(mask_path)
    }
}
