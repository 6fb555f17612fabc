//! Per-image processing.
//!
//! One image goes through these states:
//!
//! ```text
//! Start -> Enhanced -> PrimaryRecognized -> Done(numbers)
//!                                        -> FallbackRecognized -> Done(numbers or empty)
//! ```
//!
//! Any error on the way ends in `Failed` for that image only. The outcome is
//! returned as a value; nothing here aborts the batch.

use chrono::Local;
use image::{DynamicImage, GrayImage};
use log::debug;
use std::fmt;
use thiserror::Error;

use super::collector::PhoneRecord;
use super::listing::{ImageFile, ImageSource};
use crate::ocr::{
    enhance_for_ocr, threshold_global, LayoutMode, PhoneNumberExtractor, PreprocessError,
    RecognitionConfig, RecognitionError, TextRecognizer,
};

/// Which recognition pass produced the numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecognitionPass {
    Primary,
    Fallback,
}

impl fmt::Display for RecognitionPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecognitionPass::Primary => write!(f, "primary"),
            RecognitionPass::Fallback => write!(f, "fallback"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("invalid image: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("{pass} recognition failed: {source}")]
    Recognition {
        pass: RecognitionPass,
        #[source]
        source: RecognitionError,
    },
}

/// Result of processing one image.
#[derive(Debug)]
pub enum ImageOutcome {
    Found {
        records: Vec<PhoneRecord>,
        pass: RecognitionPass,
    },
    /// Both passes ran and found nothing
    NoNumbers,
    Failed(PipelineError),
}

/// Enhancement, recognition passes and extraction for one image at a time.
pub struct ImagePipeline<R> {
    recognizer: R,
    extractor: PhoneNumberExtractor,
    fallback_threshold: u8,
    fallback_layout: LayoutMode,
}

impl<R: TextRecognizer> ImagePipeline<R> {
    pub fn new(
        recognizer: R,
        extractor: PhoneNumberExtractor,
        fallback_threshold: u8,
        fallback_layout: LayoutMode,
    ) -> Self {
        Self {
            recognizer,
            extractor,
            fallback_threshold,
            fallback_layout,
        }
    }

    #[cfg(test)]
    pub fn recognizer(&self) -> &R {
        &self.recognizer
    }

    /// Processes one image. Pixel buffers live only for this call.
    pub fn process(&self, source: &dyn ImageSource, file: &ImageFile) -> ImageOutcome {
        match self.run(source, file) {
            Ok(Some((numbers, pass))) => ImageOutcome::Found {
                records: PhoneRecord::stamp_all(&file.name, numbers, Local::now()),
                pass,
            },
            Ok(None) => ImageOutcome::NoNumbers,
            Err(e) => ImageOutcome::Failed(e),
        }
    }

    fn run(
        &self,
        source: &dyn ImageSource,
        file: &ImageFile,
    ) -> Result<Option<(Vec<String>, RecognitionPass)>, PipelineError> {
        let raw = source.open(file)?;

        let enhanced = enhance_for_ocr(&raw)?;
        let numbers = self.primary_pass(&enhanced)?;
        drop(enhanced);

        if !numbers.is_empty() {
            return Ok(Some((numbers, RecognitionPass::Primary)));
        }

        debug!("Primary pass found nothing in {}, trying fallback", file.name);
        let numbers = self.fallback_pass(&raw)?;
        if numbers.is_empty() {
            Ok(None)
        } else {
            Ok(Some((numbers, RecognitionPass::Fallback)))
        }
    }

    /// Three page layouts over the enhanced image, texts joined before
    /// extraction.
    fn primary_pass(&self, enhanced: &GrayImage) -> Result<Vec<String>, PipelineError> {
        let mut all_text = String::new();
        for config in RecognitionConfig::primary_passes() {
            let text = self
                .recognizer
                .recognize(enhanced, &config)
                .map_err(|source| PipelineError::Recognition {
                    pass: RecognitionPass::Primary,
                    source,
                })?;
            all_text.push('\n');
            all_text.push_str(&text);
        }
        Ok(self.extractor.extract(&all_text))
    }

    /// One unrestricted recognition over a plain global threshold of the
    /// raw image.
    fn fallback_pass(&self, raw: &DynamicImage) -> Result<Vec<String>, PipelineError> {
        let binary = threshold_global(raw, self.fallback_threshold)?;
        let config = RecognitionConfig::fallback(self.fallback_layout);
        let text = self
            .recognizer
            .recognize(&binary, &config)
            .map_err(|source| PipelineError::Recognition {
                pass: RecognitionPass::Fallback,
                source,
            })?;
        Ok(self.extractor.extract(&text))
    }
}
