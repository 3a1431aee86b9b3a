//! Shared utilities
//!
//! Model-specific tensor preparation lives here so backends only deal with
//! runtime sessions.

pub mod preprocessing;

pub use preprocessing::{PreprocessedImage, SamPreprocessor, SAM_INPUT_SIZE};
