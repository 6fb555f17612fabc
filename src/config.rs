//! Configuration for the extractor.
//!
//! Loaded once at startup from config.json and passed by value into the
//! engine, pipeline and batch driver. Every field has a default, so an empty
//! JSON object is a valid configuration.

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::batch::DedupKey;
use crate::ocr::LayoutMode;

/// Complete extractor configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Prefix for untagged 10-digit numbers
    pub default_country_code: String,
    /// File extensions (without dot, case-insensitive) picked up from the input directory
    pub image_extensions: Vec<String>,
    /// Global threshold for the fallback pass (pixels above become white)
    pub fallback_threshold: u8,
    /// Which fields make two exported rows duplicates
    pub dedup_key: DedupKey,
    /// Number of images processed concurrently (1 = sequential)
    pub workers: usize,
    pub ocr: OcrConfig,
}

/// Recognition engine settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Explicit path to the tesseract executable
    pub tesseract_path: Option<PathBuf>,
    /// Explicit tessdata directory
    pub tessdata_dir: Option<PathBuf>,
    /// Tesseract language code
    pub language: String,
    /// Per-call timeout in seconds; `null` or `0` waits forever
    pub timeout_secs: Option<u64>,
    /// Page segmentation used by the fallback pass
    pub fallback_layout: LayoutMode,
    /// Download `<language>.traineddata` into the local cache when missing
    pub download_language_data: bool,
}

impl OcrConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: None,
            tessdata_dir: None,
            language: "eng".to_string(),
            timeout_secs: Some(60),
            fallback_layout: LayoutMode::DenseParagraph,
            download_language_data: false,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            default_country_code: "+91".to_string(),
            image_extensions: ["png", "jpg", "jpeg", "tiff", "bmp"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            fallback_threshold: 127,
            dedup_key: DedupKey::FullRow,
            workers: 1,
            ocr: OcrConfig::default(),
        }
    }
}

/// Parses a configuration from JSON text.
pub fn parse_config(contents: &str) -> Result<ExtractorConfig> {
    let mut config: ExtractorConfig =
        serde_json::from_str(contents).context("Failed to parse config JSON")?;
    config.workers = config.workers.max(1);
    Ok(config)
}

/// Loads configuration.
///
/// An explicitly requested file must exist and parse. Without one, looks for
/// config.json next to the executable and falls back to defaults if it is
/// missing or broken.
pub fn load_config(explicit: Option<&Path>) -> Result<ExtractorConfig> {
    if let Some(path) = explicit {
        let contents = fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let config = parse_config(&contents)
            .context(format!("Invalid config file: {}", path.display()))?;
        info!("Config loaded from {}", path.display());
        return Ok(config);
    }

    let config_path = crate::paths::get_default_config_path();
    info!("Looking for config at: {}", config_path.display());

    if !config_path.exists() {
        info!("config.json not found. Using default config.");
        return Ok(ExtractorConfig::default());
    }

    match fs::read_to_string(&config_path) {
        Ok(contents) => match parse_config(&contents) {
            Ok(config) => {
                info!("Config loaded from config.json");
                Ok(config)
            }
            Err(e) => {
                warn!("Failed to parse config.json: {:#}. Using defaults.", e);
                Ok(ExtractorConfig::default())
            }
        },
        Err(e) => {
            warn!("Failed to read config.json: {}. Using defaults.", e);
            Ok(ExtractorConfig::default())
        }
    }
}
