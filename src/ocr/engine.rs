use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Glyphs allowed during the primary passes: digits and phone punctuation.
pub const PHONE_CHAR_WHITELIST: &str = "+0123456789()- ";

/// Tesseract OCR engine mode: default (LSTM when available).
const ENGINE_MODE: u8 = 3;

/// How often a running tesseract process is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Page layout assumption handed to the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutMode {
    /// A single uniform block of text (psm 6)
    DenseParagraph,
    /// A single column of text of variable sizes (psm 4)
    Column,
    /// As much text as possible in no particular order (psm 11)
    SparseText,
    /// Whatever the engine does by default (no psm flag)
    Default,
}

impl LayoutMode {
    /// Tesseract page segmentation mode, if one is forced.
    pub fn page_segmentation(self) -> Option<u8> {
        match self {
            LayoutMode::DenseParagraph => Some(6),
            LayoutMode::Column => Some(4),
            LayoutMode::SparseText => Some(11),
            LayoutMode::Default => None,
        }
    }
}

/// Options for one recognition call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecognitionConfig {
    pub engine_mode: u8,
    pub layout: LayoutMode,
    pub whitelist: Option<String>,
}

impl RecognitionConfig {
    /// The three whitelisted passes run over every enhanced image.
    pub fn primary_passes() -> [RecognitionConfig; 3] {
        [
            LayoutMode::DenseParagraph,
            LayoutMode::Column,
            LayoutMode::SparseText,
        ]
        .map(|layout| RecognitionConfig {
            engine_mode: ENGINE_MODE,
            layout,
            whitelist: Some(PHONE_CHAR_WHITELIST.to_string()),
        })
    }

    /// Minimal configuration for the fallback pass: no whitelist.
    pub fn fallback(layout: LayoutMode) -> RecognitionConfig {
        RecognitionConfig {
            engine_mode: ENGINE_MODE,
            layout,
            whitelist: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("could not start tesseract ({path}): {source}")]
    Spawn {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("tesseract failed ({status}): {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("tesseract did not finish within {0:?}")]
    TimedOut(Duration),
    #[error("could not write image for tesseract: {0}")]
    Encode(#[from] image::ImageError),
    #[error("tesseract I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A text recognition backend.
///
/// One call is one synchronous recognition; implementations do not retry.
pub trait TextRecognizer: Send + Sync {
    fn recognize(
        &self,
        image: &GrayImage,
        config: &RecognitionConfig,
    ) -> Result<String, RecognitionError>;
}

/// Runs the tesseract command-line program.
#[derive(Clone, Debug)]
pub struct TesseractEngine {
    pub executable: PathBuf,
    pub tessdata: Option<PathBuf>,
    pub language: String,
    pub timeout: Option<Duration>,
}

impl TesseractEngine {
    /// Arguments following `<input> <output_base>`.
    pub fn build_args(&self, config: &RecognitionConfig) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(tessdata) = &self.tessdata {
            args.push("--tessdata-dir".to_string());
            args.push(tessdata.to_string_lossy().to_string());
        }

        args.push("-l".to_string());
        args.push(self.language.clone());
        args.push("--oem".to_string());
        args.push(config.engine_mode.to_string());

        if let Some(psm) = config.layout.page_segmentation() {
            args.push("--psm".to_string());
            args.push(psm.to_string());
        }

        if let Some(whitelist) = &config.whitelist {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={}", whitelist));
        }

        args
    }

    /// Waits for the child, killing it once the timeout has passed.
    fn wait_with_timeout(
        &self,
        child: &mut std::process::Child,
    ) -> Result<ExitStatus, RecognitionError> {
        let Some(timeout) = self.timeout else {
            return Ok(child.wait()?);
        };

        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
            if Instant::now() >= deadline {
                let _ = child.kill();
                let _ = child.wait();
                return Err(RecognitionError::TimedOut(timeout));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl TextRecognizer for TesseractEngine {
    fn recognize(
        &self,
        image: &GrayImage,
        config: &RecognitionConfig,
    ) -> Result<String, RecognitionError> {
        // Save image to temporary file
        let temp_input = NamedTempFile::with_suffix(".png")?;
        image.save(temp_input.path())?;

        // Tesseract appends .txt to the output base
        let temp_output = NamedTempFile::new()?;
        let output_base = temp_output.path().to_string_lossy().to_string();
        let txt_path = PathBuf::from(format!("{}.txt", output_base));

        let mut child = Command::new(&self.executable)
            .arg(temp_input.path())
            .arg(&output_base)
            .args(self.build_args(config))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| RecognitionError::Spawn {
                path: self.executable.clone(),
                source,
            })?;

        // Drained while the child runs so a chatty engine never blocks on a
        // full pipe
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut stderr = String::new();
                let _ = pipe.read_to_string(&mut stderr);
                stderr
            })
        });

        let status = match self.wait_with_timeout(&mut child) {
            Ok(status) => status,
            Err(e) => {
                // The reader is left to finish on its own; a killed child's
                // descendants may still hold the pipe
                let _ = std::fs::remove_file(&txt_path);
                return Err(e);
            }
        };
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();

        if !status.success() {
            let _ = std::fs::remove_file(&txt_path);
            return Err(RecognitionError::Failed {
                status,
                stderr: stderr.trim().to_string(),
            });
        }

        let text = std::fs::read_to_string(&txt_path);
        let _ = std::fs::remove_file(&txt_path);
        Ok(text?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TesseractEngine {
        TesseractEngine {
            executable: PathBuf::from("tesseract"),
            tessdata: None,
            language: "eng".to_string(),
            timeout: Some(Duration::from_secs(5)),
        }
    }

    #[test]
    fn test_primary_passes() {
        let passes = RecognitionConfig::primary_passes();
        let psms: Vec<Option<u8>> = passes.iter().map(|c| c.layout.page_segmentation()).collect();
        assert_eq!(psms, vec![Some(6), Some(4), Some(11)]);
        assert!(passes
            .iter()
            .all(|c| c.whitelist.as_deref() == Some(PHONE_CHAR_WHITELIST) && c.engine_mode == 3));
    }

    #[test]
    fn test_fallback_has_no_whitelist() {
        let config = RecognitionConfig::fallback(LayoutMode::DenseParagraph);
        assert_eq!(config.whitelist, None);
        assert_eq!(config.layout.page_segmentation(), Some(6));
    }

    #[test]
    fn test_build_args_primary() {
        let config = &RecognitionConfig::primary_passes()[2];
        let args = engine().build_args(config);
        assert_eq!(
            args,
            vec![
                "-l",
                "eng",
                "--oem",
                "3",
                "--psm",
                "11",
                "-c",
                "tessedit_char_whitelist=+0123456789()- ",
            ]
        );
    }

    #[test]
    fn test_build_args_default_layout_with_tessdata() {
        let mut engine = engine();
        engine.tessdata = Some(PathBuf::from("/data/tessdata"));

        let args = engine.build_args(&RecognitionConfig::fallback(LayoutMode::Default));
        assert_eq!(
            args,
            vec!["--tessdata-dir", "/data/tessdata", "-l", "eng", "--oem", "3"]
        );
    }

    #[test]
    fn test_missing_executable_is_spawn_error() {
        let mut engine = engine();
        engine.executable = PathBuf::from("definitely-not-a-real-tesseract-binary");

        let img = GrayImage::new(4, 4);
        let config = RecognitionConfig::fallback(LayoutMode::DenseParagraph);
        let err = engine.recognize(&img, &config).unwrap_err();
        assert!(matches!(err, RecognitionError::Spawn { .. }), "got {err}");
    }

    #[test]
    fn test_layout_mode_serde() {
        let mode: LayoutMode = serde_json::from_str("\"sparse_text\"").unwrap();
        assert_eq!(mode, LayoutMode::SparseText);
        assert_eq!(serde_json::to_string(&LayoutMode::DenseParagraph).unwrap(), "\"dense_paragraph\"");
    }

    /// Engine whose executable is a shell script. `$1` is the input image,
    /// `$2` the output base.
    #[cfg(unix)]
    fn script_engine(dir: &std::path::Path, body: &str, timeout: Option<Duration>) -> TesseractEngine {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("fake-tesseract");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        TesseractEngine {
            executable: path,
            tessdata: None,
            language: "eng".to_string(),
            timeout,
        }
    }

    #[cfg(unix)]
    fn run(engine: &TesseractEngine) -> Result<String, RecognitionError> {
        let config = RecognitionConfig::primary_passes()[0].clone();
        engine.recognize(&GrayImage::new(4, 4), &config)
    }

    #[cfg(unix)]
    #[test]
    fn test_reads_and_removes_output_text() {
        let dir = tempfile::tempdir().unwrap();
        let base_record = dir.path().join("base");
        let body = format!(
            "echo \"$2\" > '{}'\nprintf '+91 98765 43210\\n' > \"$2.txt\"",
            base_record.display()
        );
        let engine = script_engine(dir.path(), &body, Some(Duration::from_secs(10)));

        assert_eq!(run(&engine).unwrap(), "+91 98765 43210\n");

        let base = std::fs::read_to_string(&base_record).unwrap();
        let txt = PathBuf::from(format!("{}.txt", base.trim()));
        assert!(!txt.exists(), "{} left behind", txt.display());
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_carries_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let engine = script_engine(dir.path(), "echo boom >&2\nexit 3", Some(Duration::from_secs(10)));

        match run(&engine) {
            Err(RecognitionError::Failed { status, stderr }) => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_slow_engine_is_killed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let engine = script_engine(dir.path(), "exec sleep 10", Some(Duration::from_millis(300)));

        let started = Instant::now();
        let err = run(&engine).unwrap_err();
        assert!(matches!(err, RecognitionError::TimedOut(d) if d == Duration::from_millis(300)));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_large_stderr_output_does_not_stall() {
        let dir = tempfile::tempdir().unwrap();
        // Well past the pipe buffer before the result is written
        let body = "yes 'Warning: invalid resolution' | head -n 20000 >&2\nprintf '+91 98765 43210\\n' > \"$2.txt\"";
        let engine = script_engine(dir.path(), body, Some(Duration::from_secs(10)));

        assert_eq!(run(&engine).unwrap(), "+91 98765 43210\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_large_stderr_output_with_failure_is_captured() {
        let dir = tempfile::tempdir().unwrap();
        let body = "yes 'Warning: invalid resolution' | head -n 20000 >&2\nexit 1";
        let engine = script_engine(dir.path(), body, None);

        match run(&engine) {
            Err(RecognitionError::Failed { stderr, .. }) => {
                assert_eq!(stderr.lines().count(), 20000);
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }
}
