use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

use super::engine::TesseractEngine;
use crate::config::OcrConfig;
use crate::paths::get_tessdata_cache_dir;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";

/// Install locations checked when tesseract is not on PATH.
const COMMON_EXECUTABLE_PATHS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
];

const COMMON_TESSDATA_PATHS: &[&str] = &[
    r"C:\Program Files\Tesseract-OCR\tessdata",
    r"C:\Program Files (x86)\Tesseract-OCR\tessdata",
];

/// Builds the engine from configuration, locating the executable and
/// language data.
///
/// A missing executable is not fatal here: the engine falls back to the bare
/// program name and every recognition call reports the failure for its image.
pub fn build_engine(config: &OcrConfig) -> TesseractEngine {
    let executable = match find_tesseract_executable(config.tesseract_path.as_deref()) {
        Ok(path) => {
            info!("Using tesseract at: {}", path.display());
            path
        }
        Err(e) => {
            warn!("{}", e);
            PathBuf::from("tesseract")
        }
    };

    let tessdata = match find_tessdata_dir(config.tessdata_dir.as_deref(), &config.language) {
        Some(dir) => Some(dir),
        None if config.download_language_data => {
            match download_tessdata(&get_tessdata_cache_dir(), &config.language) {
                Ok(dir) => Some(dir),
                Err(e) => {
                    warn!("Language data download failed: {:#}", e);
                    None
                }
            }
        }
        None => None,
    };

    match &tessdata {
        Some(dir) => info!("Using tessdata at: {}", dir.display()),
        None => info!("Using tesseract's built-in tessdata location"),
    }

    TesseractEngine {
        executable,
        tessdata,
        language: config.language.clone(),
        timeout: config.timeout(),
    }
}

fn responds_to_version(program: &Path) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// Finds the tesseract executable: explicit path, then PATH, then common
/// install locations.
pub fn find_tesseract_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        warn!("Configured tesseract_path does not exist: {}", path.display());
    }

    // Check PATH
    let on_path = PathBuf::from("tesseract");
    if responds_to_version(&on_path) {
        return Ok(on_path);
    }

    for path in COMMON_EXECUTABLE_PATHS {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!(
        "Tesseract not found. Install Tesseract-OCR or set ocr.tesseract_path in config.json."
    ))
}

fn has_language(dir: &Path, language: &str) -> bool {
    dir.join(format!("{}.traineddata", language)).exists()
}

/// Finds a tessdata directory containing `<language>.traineddata`.
///
/// Returns `None` when nothing is found, which leaves the choice to
/// tesseract's compiled-in default.
pub fn find_tessdata_dir(explicit: Option<&Path>, language: &str) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        if has_language(dir, language) {
            return Some(dir.to_path_buf());
        }
        warn!(
            "Configured tessdata_dir has no {}.traineddata: {}",
            language,
            dir.display()
        );
    }

    // Check TESSDATA_PREFIX environment variable
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if has_language(&p, language) {
            return Some(p);
        }
        let p = p.join("tessdata");
        if has_language(&p, language) {
            return Some(p);
        }
    }

    let cache = get_tessdata_cache_dir();
    if has_language(&cache, language) {
        return Some(cache);
    }

    COMMON_TESSDATA_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| has_language(p, language))
}

/// Downloads `<language>.traineddata` into `dir` and returns `dir`.
fn download_tessdata(dir: &Path, language: &str) -> Result<PathBuf> {
    let url = format!("{}/{}.traineddata", TESSDATA_REPO, language);
    let target = dir.join(format!("{}.traineddata", language));

    info!("Downloading {}.traineddata...", language);
    fs::create_dir_all(dir).context(format!("Failed to create {}", dir.display()))?;

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&url)
        .header("User-Agent", "phone-extractor")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}.traineddata: HTTP {}",
            language,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    install_file(dir, &target, &bytes)?;

    info!(
        "Downloaded {}.traineddata ({} bytes)",
        language,
        bytes.len()
    );

    Ok(dir.to_path_buf())
}

/// Writes `bytes` to `target` through a temporary file in `dir`, so an
/// interrupted write never leaves a truncated `target` behind.
fn install_file(dir: &Path, target: &Path, bytes: &[u8]) -> Result<()> {
    let mut temp = NamedTempFile::new_in(dir)
        .context(format!("Failed to create temporary file in {}", dir.display()))?;
    temp.write_all(bytes)
        .context(format!("Failed to write {}", target.display()))?;
    temp.persist(target)
        .context(format!("Failed to move download into {}", target.display()))?;
    Ok(())
}
