//! Segmentation backend abstraction

use crate::error::Result;
use crate::types::{PointPrompt, SegmentationMask};
use image::DynamicImage;
use std::time::Duration;

/// A promptable segmentation model
///
/// Backends load their weights in [`SegmentationBackend::initialize`] and
/// predict one mask per image and point prompt. The returned mask always has
/// the dimensions of the input image.
pub trait SegmentationBackend {
    /// Load the model
    ///
    /// Returns the load time on the first call and `None` once initialized.
    ///
    /// # Errors
    /// - Model files missing, truncated or rejected by the runtime
    fn initialize(&mut self) -> Result<Option<Duration>>;

    /// Predict the mask of the object under `prompt`
    ///
    /// # Errors
    /// - Backend not initialized
    /// - Inference or tensor conversion failures
    fn predict(&mut self, image: &DynamicImage, prompt: &PointPrompt) -> Result<SegmentationMask>;

    fn is_initialized(&self) -> bool;

    /// Short name used in logs
    fn name(&self) -> &str {
        "segmentation"
    }
}

impl<B: SegmentationBackend + ?Sized> SegmentationBackend for Box<B> {
    fn initialize(&mut self) -> Result<Option<Duration>> {
        (**self).initialize()
    }

    fn predict(&mut self, image: &DynamicImage, prompt: &PointPrompt) -> Result<SegmentationMask> {
        (**self).predict(image, prompt)
    }

    fn is_initialized(&self) -> bool {
        (**self).is_initialized()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
