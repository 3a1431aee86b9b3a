//! ONNX Runtime backend for exported Segment Anything models
//!
//! SAM is exported as two graphs: a heavy image encoder producing embeddings
//! and a light prompt decoder turning embeddings plus points into mask
//! logits at the original image resolution.

use crate::config::{ExecutionProvider, SegmentConfig};
use crate::error::{Result, SamPrepError};
use crate::inference::SegmentationBackend;
use crate::tracing_config::spans;
use crate::types::{PointPrompt, SegmentationMask};
use crate::utils::preprocessing::SamPreprocessor;
use image::DynamicImage;
use ndarray::{Array1, Array4, ArrayD};
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, builder::SessionBuilder, Session};
use ort::value::Value;
use std::path::Path;
use std::time::{Duration, Instant};

/// Side length of the low-resolution mask prompt the decoder accepts
const MASK_INPUT_SIZE: usize = 256;

/// Name of the decoder output holding full-resolution mask logits
const MASKS_OUTPUT: &str = "masks";

/// Segment Anything encoder and decoder running on ONNX Runtime
#[derive(Debug)]
pub struct OnnxSamBackend {
    config: SegmentConfig,
    encoder: Option<Session>,
    decoder: Option<Session>,
}

impl OnnxSamBackend {
    #[must_use]
    pub fn new(config: SegmentConfig) -> Self {
        Self {
            config,
            encoder: None,
            decoder: None,
        }
    }

    /// List ONNX Runtime execution providers with availability status
    pub fn list_providers() -> Vec<(String, bool, String)> {
        vec![
            (
                "CPU".to_string(),
                true,
                "Always available, uses CPU for inference".to_string(),
            ),
            (
                "CUDA".to_string(),
                OrtExecutionProvider::is_available(&CUDAExecutionProvider::default())
                    .unwrap_or(false),
                "NVIDIA GPU acceleration (requires CUDA toolkit and compatible GPU)".to_string(),
            ),
            (
                "CoreML".to_string(),
                OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                    .unwrap_or(false),
                "Apple Silicon GPU acceleration (macOS only)".to_string(),
            ),
        ]
    }

    fn configure_providers(&self, builder: SessionBuilder) -> Result<SessionBuilder> {
        let cuda_available =
            OrtExecutionProvider::is_available(&CUDAExecutionProvider::default()).unwrap_or(false);
        let coreml_available =
            OrtExecutionProvider::is_available(&CoreMLExecutionProvider::default())
                .unwrap_or(false);

        let mut providers = Vec::new();
        match self.config.execution_provider {
            ExecutionProvider::Auto => {
                if cuda_available {
                    log::info!("🚀 CUDA execution provider is available and will be used");
                    providers.push(CUDAExecutionProvider::default().build());
                }
                if coreml_available {
                    log::info!("🍎 CoreML execution provider is available and will be used");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                }
                if providers.is_empty() {
                    log::warn!("⚠️ No hardware acceleration available, falling back to CPU");
                }
            },
            ExecutionProvider::Cpu => log::info!("Using CPU execution provider"),
            ExecutionProvider::Cuda => {
                if cuda_available {
                    log::info!("Using CUDA execution provider");
                    providers.push(CUDAExecutionProvider::default().build());
                } else {
                    log::warn!(
                        "CUDA execution provider requested but not available, falling back to CPU"
                    );
                }
            },
            ExecutionProvider::CoreMl => {
                if coreml_available {
                    log::info!("🍎 Using CoreML execution provider (explicitly requested)");
                    providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
                } else {
                    log::warn!(
                        "CoreML execution provider requested but not available, falling back to CPU"
                    );
                }
            },
        }

        if providers.is_empty() {
            return Ok(builder);
        }
        builder.with_execution_providers(providers).map_err(|e| {
            SamPrepError::inference(format!("Failed to set execution providers: {e}"))
        })
    }

    fn build_session(&self, path: &Path) -> Result<Session> {
        let _span = spans::model_loading(
            &path.display().to_string(),
            &self.config.execution_provider.to_string(),
        )
        .entered();

        let builder = Session::builder()
            .map_err(|e| {
                SamPrepError::inference(format!("Failed to create session builder: {e}"))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                SamPrepError::inference(format!("Failed to set optimization level: {e}"))
            })?;

        let intra_threads = if self.config.intra_threads > 0 {
            self.config.intra_threads
        } else {
            std::thread::available_parallelism()
                .map(std::num::NonZero::get)
                .unwrap_or(8)
        };

        self.configure_providers(builder)?
            .with_intra_threads(intra_threads)
            .map_err(|e| SamPrepError::inference(format!("Failed to set intra threads: {e}")))?
            .commit_from_file(path)
            .map_err(|e| {
                SamPrepError::model_error_with_context(
                    "load",
                    path,
                    &e.to_string(),
                    &["check that the file is a Segment Anything ONNX export"],
                )
            })
    }

    fn encode(&mut self, tensor: Array4<f32>) -> Result<ArrayD<f32>> {
        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| SamPrepError::internal("Encoder session not initialized"))?;

        let input = Value::from_array(tensor).map_err(|e| {
            SamPrepError::processing(format!("Failed to convert encoder input tensor: {e}"))
        })?;
        let outputs = encoder
            .run(ort::inputs![input])
            .map_err(|e| SamPrepError::inference(format!("Encoder inference failed: {e}")))?;

        let first_key = outputs
            .keys()
            .next()
            .ok_or_else(|| SamPrepError::inference("Encoder produced no outputs"))?;
        let embeddings = outputs
            .get(first_key)
            .ok_or_else(|| SamPrepError::inference("Encoder output not found"))?
            .try_extract_array::<f32>()
            .map_err(|e| {
                SamPrepError::inference(format!("Failed to extract image embeddings: {e}"))
            })?
            .to_owned();
        Ok(embeddings)
    }
}

impl SegmentationBackend for OnnxSamBackend {
    fn initialize(&mut self) -> Result<Option<Duration>> {
        if self.is_initialized() {
            return Ok(None);
        }

        let start = Instant::now();
        self.config.validate()?;
        self.config
            .model_files
            .validate(self.config.min_model_size)?;

        log::info!(
            "Loading SAM encoder from {}",
            self.config.model_files.encoder.display()
        );
        let encoder = self.build_session(&self.config.model_files.encoder)?;
        log::info!(
            "Loading SAM decoder from {}",
            self.config.model_files.decoder.display()
        );
        let decoder = self.build_session(&self.config.model_files.decoder)?;

        self.encoder = Some(encoder);
        self.decoder = Some(decoder);

        let elapsed = start.elapsed();
        log::info!(
            "📊 Model loading complete: {:.0}ms",
            elapsed.as_secs_f64() * 1000.0
        );
        Ok(Some(elapsed))
    }

    fn predict(&mut self, image: &DynamicImage, prompt: &PointPrompt) -> Result<SegmentationMask> {
        if !self.is_initialized() {
            return Err(SamPrepError::internal("Backend not initialized"));
        }

        let (width, height) = (image.width(), image.height());
        let _span = spans::inference(self.name(), (width, height)).entered();
        let start = Instant::now();

        let preprocessed = SamPreprocessor::preprocess(image)?;
        let (coords, labels) = SamPreprocessor::prompt_tensors(&preprocessed, prompt);
        let embeddings = self.encode(preprocessed.tensor)?;
        log::debug!(
            "  ⚡ Encoder: {:.2}ms, embeddings {:?}",
            start.elapsed().as_secs_f64() * 1000.0,
            embeddings.shape()
        );

        let to_value = |name: &str, result: std::result::Result<_, ort::Error>| {
            result.map_err(|e| {
                SamPrepError::processing(format!("Failed to convert decoder input '{name}': {e}"))
            })
        };
        let embeddings = to_value("image_embeddings", Value::from_array(embeddings))?;
        let coords = to_value("point_coords", Value::from_array(coords))?;
        let labels = to_value("point_labels", Value::from_array(labels))?;
        let mask_input = to_value(
            "mask_input",
            Value::from_array(Array4::<f32>::zeros((1, 1, MASK_INPUT_SIZE, MASK_INPUT_SIZE))),
        )?;
        let has_mask_input = to_value("has_mask_input", Value::from_array(Array1::from(vec![0.0f32])))?;
        let orig_im_size = to_value(
            "orig_im_size",
            Value::from_array(Array1::from(vec![height as f32, width as f32])),
        )?;

        let threshold = self.config.mask_threshold;
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| SamPrepError::internal("Decoder session not initialized"))?;
        let outputs = decoder
            .run(ort::inputs![
                "image_embeddings" => embeddings,
                "point_coords" => coords,
                "point_labels" => labels,
                "mask_input" => mask_input,
                "has_mask_input" => has_mask_input,
                "orig_im_size" => orig_im_size,
            ])
            .map_err(|e| SamPrepError::inference(format!("Decoder inference failed: {e}")))?;

        let masks = outputs
            .get(MASKS_OUTPUT)
            .ok_or_else(|| {
                SamPrepError::inference(format!("Decoder output '{MASKS_OUTPUT}' not found"))
            })?
            .try_extract_array::<f32>()
            .map_err(|e| SamPrepError::inference(format!("Failed to extract masks: {e}")))?;

        // [batch, masks, height, width]; the first mask answers the prompt
        let shape = masks.shape();
        if shape.len() != 4
            || shape.get(2).copied() != Some(height as usize)
            || shape.get(3).copied() != Some(width as usize)
        {
            return Err(SamPrepError::inference(format!(
                "Unexpected mask shape {:?} for {}x{} image",
                shape, width, height
            )));
        }

        let pixels = width as usize * height as usize;
        let logits: Vec<f32> = masks.iter().take(pixels).copied().collect();
        let mask = SegmentationMask::from_logits(width, height, &logits, threshold)?;

        log::debug!(
            "📊 Inference complete: {:.2}ms, {} foreground pixels",
            start.elapsed().as_secs_f64() * 1000.0,
            mask.foreground_pixels()
        );
        Ok(mask)
    }

    fn is_initialized(&self) -> bool {
        self.encoder.is_some() && self.decoder.is_some()
    }

    fn name(&self) -> &str {
        "sam-onnx"
    }
}
