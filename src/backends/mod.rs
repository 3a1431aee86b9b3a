//! Segmentation backend implementations
//!
//! - ONNX Runtime backend for exported Segment Anything encoder/decoder pairs

#[cfg(feature = "onnx")]
pub mod onnx;

// Test utilities for backend testing
#[cfg(test)]
pub mod test_utils;

#[cfg(feature = "onnx")]
pub use self::onnx::OnnxSamBackend;
