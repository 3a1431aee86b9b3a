//! Shared value types for prompts, masks and batch results

use crate::error::{Result, SamPrepError};
use image::{GrayImage, Luma};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Label attached to a point prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromptLabel {
    /// The point lies on the object to segment
    Foreground,
    /// The point lies outside the object
    Background,
}

impl PromptLabel {
    /// Numeric label expected by the SAM decoder
    #[must_use]
    pub fn as_f32(self) -> f32 {
        match self {
            Self::Foreground => 1.0,
            Self::Background => 0.0,
        }
    }
}

/// A single image coordinate used to seed mask prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPrompt {
    pub x: u32,
    pub y: u32,
    pub label: PromptLabel,
}

impl PointPrompt {
    #[must_use]
    pub fn foreground(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            label: PromptLabel::Foreground,
        }
    }

    /// Foreground point at the image centre, `(w / 2, h / 2)`
    #[must_use]
    pub fn center_of(width: u32, height: u32) -> Self {
        Self::foreground(width / 2, height / 2)
    }
}

/// Binary segmentation mask, one byte per pixel (0 or 255)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl SegmentationMask {
    /// Create a mask from raw data
    ///
    /// # Errors
    /// - `data.len()` does not equal `width * height`
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize;
        if data.len() != expected {
            return Err(SamPrepError::processing(format!(
                "Mask data has {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Threshold row-major logits into a binary mask
    ///
    /// # Errors
    /// - `logits.len()` does not equal `width * height`
    pub fn from_logits(width: u32, height: u32, logits: &[f32], threshold: f32) -> Result<Self> {
        let data = logits
            .iter()
            .map(|&v| if v > threshold { 255 } else { 0 })
            .collect();
        Self::new(width, height, data)
    }

    /// Number of pixels inside the mask
    #[must_use]
    pub fn foreground_pixels(&self) -> usize {
        self.data.iter().filter(|&&v| v > 0).count()
    }

    /// Convert to an 8-bit grayscale image
    #[must_use]
    pub fn to_image(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            let idx = y as usize * self.width as usize + x as usize;
            Luma([self.data.get(idx).copied().unwrap_or(0)])
        })
    }

    /// Save as grayscale PNG
    ///
    /// # Errors
    /// - Encoding or writing the PNG failed
    pub fn save_png<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.to_image()
            .save_with_format(path.as_ref(), image::ImageFormat::Png)
            .map_err(|e| {
                SamPrepError::processing_stage_error(
                    "mask saving",
                    &e.to_string(),
                    Some(&path.as_ref().display().to_string()),
                )
            })
    }
}

/// One item of a batch that could not be processed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// File path or URL of the failed item
    pub item: String,
    pub error: String,
}

/// Outcome of a sequential batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<BatchFailure>,
    pub output_dir: PathBuf,
    /// Files written, in processing order
    pub outputs: Vec<PathBuf>,
}

impl BatchSummary {
    #[must_use]
    pub fn new(output_dir: PathBuf, total: usize) -> Self {
        Self {
            total,
            succeeded: 0,
            failures: Vec::new(),
            output_dir,
            outputs: Vec::new(),
        }
    }

    pub fn record_success(&mut self, output: PathBuf) {
        self.succeeded += 1;
        self.outputs.push(output);
    }

    pub fn record_failure<I: Into<String>, E: ToString>(&mut self, item: I, error: &E) {
        self.failures.push(BatchFailure {
            item: item.into(),
            error: error.to_string(),
        });
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "succeeded {}/{} (output: {})",
            self.succeeded,
            self.total,
            self.output_dir.display()
        )
    }
}
