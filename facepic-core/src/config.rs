use crate::embed::ARCFACE_DIM;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub fixup: FixupConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Dimension the detector produces (512 for ArcFace, 128 for dlib)
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_dimension() -> usize {
    ARCFACE_DIM
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Cosine similarity a face must exceed to join an existing person.
    /// Tune per embedding model.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
}

fn default_threshold() -> f32 {
    0.6
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            threshold: default_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Minimum detector score for a face to be kept
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Faces closer than this to the image border are partial (pixels)
    #[serde(default = "default_edge_margin")]
    pub edge_margin: u32,
}

fn default_min_score() -> f32 {
    0.65
}

fn default_edge_margin() -> u32 {
    10
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            edge_margin: default_edge_margin(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixupConfig {
    /// Similarity above which two persons count as duplicates.
    /// Falls back to the matching threshold.
    #[serde(default)]
    pub merge_threshold: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_library_path")]
    pub library_path: PathBuf,
}

fn default_library_path() -> PathBuf {
    PathBuf::from("/var/lib/facepic/library")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            library_path: default_library_path(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain:
    /// 1. /etc/facepic/facepic.toml (system-wide)
    /// 2. ~/.config/facepic/facepic.toml (user)
    /// 3. Compiled defaults
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(config) = Self::load_from_path("/etc/facepic/facepic.toml") {
            config.validate()?;
            return Ok(config);
        }

        if let Some(home) = std::env::var_os("HOME") {
            let user_config = PathBuf::from(home)
                .join(".config")
                .join("facepic")
                .join("facepic.toml");
            if let Ok(config) = Self::load_from_path(&user_config) {
                config.validate()?;
                return Ok(config);
            }
        }

        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Load and validate an explicitly named config file
    pub fn load_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_path(path)?;
        config.validate()?;
        Ok(config)
    }

    fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Threshold used when merging duplicate persons
    pub fn merge_threshold(&self) -> f32 {
        self.fixup.merge_threshold.unwrap_or(self.matching.threshold)
    }

    /// Library path with a leading `~` expanded
    pub fn library_path(&self) -> PathBuf {
        expand_home(&self.storage.library_path)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.embedding.dimension == 0 {
            return Err(ConfigError::Validation(
                "Embedding dimension must be greater than 0".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.matching.threshold) {
            return Err(ConfigError::Validation(
                "Matching threshold must be between -1.0 and 1.0".to_string(),
            ));
        }

        if let Some(threshold) = self.fixup.merge_threshold {
            if !(-1.0..=1.0).contains(&threshold) {
                return Err(ConfigError::Validation(
                    "Merge threshold must be between -1.0 and 1.0".to_string(),
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.filter.min_score) {
            return Err(ConfigError::Validation(
                "Minimum detection score must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.storage.library_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "Library path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
