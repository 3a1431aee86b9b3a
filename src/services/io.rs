//! Image I/O operations service
//!
//! Keeps file handling out of the mask generator and the batch downloader so
//! both can be tested against temporary directories.

use crate::error::{Result, SamPrepError};
use image::DynamicImage;
use std::path::{Path, PathBuf};

/// Suffix that marks files produced by the mask generator
pub const MASK_SUFFIX: &str = "_mask";

/// Service for handling image file input/output operations
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension does not match the data.
    ///
    /// # Errors
    /// - File does not exist or cannot be read
    /// - Data is not a decodable image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(SamPrepError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );

                let data = std::fs::read(path_ref).map_err(|io_err| {
                    SamPrepError::file_io_error("read image data", path_ref, &io_err)
                })?;

                image::load_from_memory(&data).map_err(|content_err| {
                    SamPrepError::processing_stage_error(
                        "image loading",
                        &format!(
                            "Extension error: {}. Content error: {}",
                            e, content_err
                        ),
                        Some(&format!("path: {}, size: {} bytes", path_ref.display(), data.len())),
                    )
                })
            },
        }
    }

    /// Decode an in-memory image, naming `source` in errors
    ///
    /// # Errors
    /// - Data is not a decodable image
    pub fn load_from_bytes(bytes: &[u8], source: &str) -> Result<DynamicImage> {
        image::load_from_memory(bytes).map_err(|e| {
            SamPrepError::processing_stage_error(
                "image decoding",
                &e.to_string(),
                Some(&format!("{} ({} bytes)", source, bytes.len())),
            )
        })
    }

    /// Save an image as PNG, creating the parent directory when missing
    ///
    /// # Errors
    /// - Parent directory cannot be created
    /// - PNG encoding or writing failed
    pub fn save_png<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    SamPrepError::file_io_error("create output directory", parent, &e)
                })?;
            }
        }

        // PNG has no 32-bit float layouts; narrow those to 8 bits first
        let encodable = match image {
            DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb8(image.to_rgb8()),
            DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba8(image.to_rgba8()),
            other => other.clone(),
        };

        encodable
            .save_with_format(path_ref, image::ImageFormat::Png)
            .map_err(|e| {
                SamPrepError::processing_stage_error(
                    "image save",
                    &format!("Failed to save as PNG: {}", e),
                    Some(&path_ref.display().to_string()),
                )
            })
    }

    /// Whether `path` names a generated mask (`*_mask.png`)
    #[must_use]
    pub fn is_mask_file(path: &Path) -> bool {
        path.file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|stem| stem.ends_with(MASK_SUFFIX))
    }

    /// Whether `path` has a `.png` extension (any case)
    #[must_use]
    pub fn is_png_file(path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
    }

    /// List PNG inputs directly inside `dir`, skipping generated masks
    ///
    /// # Errors
    /// - Directory cannot be read
    pub fn list_png_inputs<P: AsRef<Path>>(dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| SamPrepError::file_io_error("read input directory", dir, &e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| SamPrepError::file_io_error("read directory entry in", dir, &e))?
                .path();
            if path.is_file() && Self::is_png_file(&path) && !Self::is_mask_file(&path) {
                files.push(path);
            }
        }

        files.sort();
        Ok(files)
    }

    /// Output path for the mask of `input`: `<output_dir>/<stem>_mask.png`
    #[must_use]
    pub fn mask_path_for(input: &Path, output_dir: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map_or_else(|| "image".into(), |s| s.to_string_lossy());
        output_dir.join(format!("{}{}.png", stem, MASK_SUFFIX))
    }
}
