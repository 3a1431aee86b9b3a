//! Image and prompt preprocessing for Segment Anything
//!
//! The encoder expects a 1024x1024 NCHW tensor: the image is resized so its
//! longest side is 1024, normalised with the SAM pixel statistics on the
//! 0-255 scale and zero-padded on the bottom and right.

use crate::error::{Result, SamPrepError};
use crate::types::PointPrompt;
use image::DynamicImage;
use ndarray::{Array2, Array3, Array4};

/// Side length of the square encoder input
pub const SAM_INPUT_SIZE: u32 = 1024;

/// Per-channel RGB mean on the 0-255 scale
pub const PIXEL_MEAN: [f32; 3] = [123.675, 116.28, 103.53];

/// Per-channel RGB standard deviation on the 0-255 scale
pub const PIXEL_STD: [f32; 3] = [58.395, 57.12, 57.375];

/// Label of the padding point the decoder expects after real prompts
pub const PADDING_POINT_LABEL: f32 = -1.0;

/// Encoder input together with the geometry needed to map prompts
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    /// `[1, 3, 1024, 1024]`
    pub tensor: Array4<f32>,
    /// `(width, height)` of the source image
    pub original_size: (u32, u32),
    /// `(width, height)` after the longest-side resize
    pub resized_size: (u32, u32),
}

impl PreprocessedImage {
    /// Map a prompt from source pixels into encoder-input pixels
    #[must_use]
    pub fn scale_point(&self, prompt: &PointPrompt) -> (f32, f32) {
        let (ow, oh) = self.original_size;
        let (rw, rh) = self.resized_size;
        (
            prompt.x as f32 * (rw as f32 / ow as f32),
            prompt.y as f32 * (rh as f32 / oh as f32),
        )
    }
}

/// SAM encoder and decoder input preparation
pub struct SamPreprocessor;

impl SamPreprocessor {
    /// Size after resizing so the longest side equals [`SAM_INPUT_SIZE`]
    ///
    /// # Errors
    /// - Either dimension is zero
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn target_size(width: u32, height: u32) -> Result<(u32, u32)> {
        if width == 0 || height == 0 {
            return Err(SamPrepError::processing(format!(
                "Cannot preprocess empty image ({}x{})",
                width, height
            )));
        }

        let scale = SAM_INPUT_SIZE as f64 / f64::from(width.max(height));
        let new_width = (f64::from(width) * scale + 0.5) as u32;
        let new_height = (f64::from(height) * scale + 0.5) as u32;
        Ok((
            new_width.clamp(1, SAM_INPUT_SIZE),
            new_height.clamp(1, SAM_INPUT_SIZE),
        ))
    }

    /// Build the encoder input tensor
    ///
    /// # Errors
    /// - Image has a zero dimension
    pub fn preprocess(image: &DynamicImage) -> Result<PreprocessedImage> {
        let rgb_image = image.to_rgb8();
        let original_size = rgb_image.dimensions();
        let resized_size = Self::target_size(original_size.0, original_size.1)?;

        let _span = crate::tracing_config::spans::preprocessing(original_size, resized_size)
            .entered();

        let resized = image::imageops::resize(
            &rgb_image,
            resized_size.0,
            resized_size.1,
            image::imageops::FilterType::Triangle,
        );

        let side = SAM_INPUT_SIZE as usize;
        // Zeros double as the padding value after normalisation
        let mut tensor = Array4::<f32>::zeros((1, 3, side, side));

        #[allow(clippy::indexing_slicing)]
        // Safe: resized dimensions never exceed SAM_INPUT_SIZE
        for (x, y, pixel) in resized.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for channel in 0..3 {
                tensor[[0, channel, y, x]] =
                    (f32::from(pixel[channel]) - PIXEL_MEAN[channel]) / PIXEL_STD[channel];
            }
        }

        Ok(PreprocessedImage {
            tensor,
            original_size,
            resized_size,
        })
    }

    /// Decoder point inputs: coordinates `[1, 2, 2]` and labels `[1, 2]`
    ///
    /// The prompt is followed by the `(0, 0)` padding point labelled `-1`.
    #[must_use]
    pub fn prompt_tensors(
        preprocessed: &PreprocessedImage,
        prompt: &PointPrompt,
    ) -> (Array3<f32>, Array2<f32>) {
        let (x, y) = preprocessed.scale_point(prompt);
        let coords = Array3::from_shape_fn((1, 2, 2), |(_, point, axis)| match (point, axis) {
            (0, 0) => x,
            (0, _) => y,
            _ => 0.0,
        });
        let labels = Array2::from_shape_fn((1, 2), |(_, point)| {
            if point == 0 {
                prompt.label.as_f32()
            } else {
                PADDING_POINT_LABEL
            }
        });
        (coords, labels)
    }
}
