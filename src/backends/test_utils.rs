//! Mock segmentation backend for exercising the mask pipeline without
//! model files or ONNX Runtime

use crate::{
    error::{Result, SamPrepError},
    inference::SegmentationBackend,
    types::{PointPrompt, SegmentationMask},
};
use image::DynamicImage;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock backend that paints a disc around the prompt
#[derive(Debug, Clone, Default)]
pub struct MockSegmenter {
    initialized: bool,
    /// Prompts received by `predict`, for verification in tests
    call_history: Arc<Mutex<Vec<PointPrompt>>>,
    should_fail_init: bool,
    /// Images with this width fail during prediction
    fail_on_width: Option<u32>,
}

impl MockSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_failing_init() -> Self {
        Self {
            should_fail_init: true,
            ..Self::default()
        }
    }

    /// Fail prediction for images of the given width
    #[must_use]
    pub fn failing_on_width(mut self, width: u32) -> Self {
        self.fail_on_width = Some(width);
        self
    }

    /// Shared handle to the recorded prompts
    #[must_use]
    pub fn call_history(&self) -> Arc<Mutex<Vec<PointPrompt>>> {
        Arc::clone(&self.call_history)
    }
}

impl SegmentationBackend for MockSegmenter {
    fn initialize(&mut self) -> Result<Option<Duration>> {
        if self.should_fail_init {
            return Err(SamPrepError::model("Mock initialization failure"));
        }
        if self.initialized {
            return Ok(None);
        }
        self.initialized = true;
        Ok(Some(Duration::from_millis(1)))
    }

    fn predict(&mut self, image: &DynamicImage, prompt: &PointPrompt) -> Result<SegmentationMask> {
        if !self.initialized {
            return Err(SamPrepError::internal("Backend not initialized"));
        }
        if let Ok(mut history) = self.call_history.lock() {
            history.push(*prompt);
        }

        let (width, height) = (image.width(), image.height());
        if self.fail_on_width == Some(width) {
            return Err(SamPrepError::inference("Mock inference failure"));
        }

        let radius = f64::from(width.min(height)) / 4.0;
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                let dx = f64::from(x) - f64::from(prompt.x);
                let dy = f64::from(y) - f64::from(prompt.y);
                data.push(if dx.hypot(dy) <= radius { 255 } else { 0 });
            }
        }
        SegmentationMask::new(width, height, data)
    }

    fn is_initialized(&self) -> bool {
        self.initialized
    }

    fn name(&self) -> &str {
        "mock-segmenter"
    }
}
