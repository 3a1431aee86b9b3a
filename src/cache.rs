//! Checkpoint cache directory management
//!
//! Downloads and model exports default to a per-user cache directory:
//! - Linux: `~/.cache/sam-prep/checkpoints/`
//! - macOS: `~/Library/Caches/sam-prep/checkpoints/`
//! - Windows: `%LOCALAPPDATA%/sam-prep/checkpoints/`
//!
//! `SAM_PREP_CACHE_DIR` replaces the platform cache root.

use crate::config::{DEFAULT_CHECKPOINT_NAME, DEFAULT_DECODER_NAME, DEFAULT_ENCODER_NAME};
use crate::error::{Result, SamPrepError};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "SAM_PREP_CACHE_DIR";

/// A file found in the cache directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedCheckpoint {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Left behind by an interrupted transfer
    pub partial: bool,
}

/// Checkpoint cache manager
#[derive(Debug, Clone)]
pub struct CheckpointCache {
    cache_dir: PathBuf,
}

impl CheckpointCache {
    /// Open the default cache, creating the directory if needed
    ///
    /// # Errors
    /// - No user cache directory and no override
    /// - Failed to create cache directory
    pub fn new() -> Result<Self> {
        Self::at(Self::resolve_cache_dir()?)
    }

    /// Open a cache rooted at `base` (`<base>/checkpoints`)
    ///
    /// # Errors
    /// - Failed to create cache directory
    pub fn with_custom_cache_dir(base: &Path) -> Result<Self> {
        Self::at(base.join("checkpoints"))
    }

    fn at(cache_dir: PathBuf) -> Result<Self> {
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                SamPrepError::file_io_error("create cache directory", &cache_dir, &e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    fn resolve_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            if !cache_override.trim().is_empty() {
                return Ok(PathBuf::from(cache_override).join("checkpoints"));
            }
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                SamPrepError::invalid_config(format!(
                    "Failed to determine cache directory. Set {} environment variable.",
                    CACHE_DIR_ENV
                ))
            })?
            .join("sam-prep")
            .join("checkpoints"))
    }

    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of a cached file; the file may not exist
    ///
    /// # Errors
    /// - `name` is empty or contains a path separator
    pub fn checkpoint_path(&self, name: &str) -> Result<PathBuf> {
        let trimmed = name.trim();
        if trimmed.is_empty()
            || trimmed == "."
            || trimmed == ".."
            || trimmed.contains(['/', '\\'])
        {
            return Err(SamPrepError::invalid_config(format!(
                "Invalid checkpoint name '{}'",
                name
            )));
        }
        Ok(self.cache_dir.join(trimmed))
    }

    /// Where `download` writes the ViT-H checkpoint by default
    #[must_use]
    pub fn default_checkpoint_path(&self) -> PathBuf {
        self.cache_dir.join(DEFAULT_CHECKPOINT_NAME)
    }

    #[must_use]
    pub fn default_encoder_path(&self) -> PathBuf {
        self.cache_dir.join(DEFAULT_ENCODER_NAME)
    }

    #[must_use]
    pub fn default_decoder_path(&self) -> PathBuf {
        self.cache_dir.join(DEFAULT_DECODER_NAME)
    }

    /// List cached files sorted by name
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn list_checkpoints(&self) -> Result<Vec<CachedCheckpoint>> {
        let mut checkpoints = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(checkpoints);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            SamPrepError::file_io_error("read cache directory", &self.cache_dir, &e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                SamPrepError::file_io_error("read cache directory entry in", &self.cache_dir, &e)
            })?;
            let path = entry.path();
            let Ok(meta) = entry.metadata() else {
                log::debug!("Skipping unreadable cache entry {}", path.display());
                continue;
            };
            if !meta.is_file() {
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();
            checkpoints.push(CachedCheckpoint {
                partial: name.ends_with(".part"),
                name,
                path,
                size_bytes: meta.len(),
            });
        }

        checkpoints.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(checkpoints)
    }
}

/// Format file size in human-readable format
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
