//! In-memory doubles for the batch tests.

use image::error::{DecodingError, ImageFormatHint};
use image::{DynamicImage, GrayImage, ImageError, Rgb, RgbImage};
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use super::listing::{ImageFile, ImageSource};
use crate::ocr::{RecognitionConfig, RecognitionError, TextRecognizer};

const IMAGE_HEIGHT: u32 = 6;

/// Returns canned text keyed by image width and pass.
///
/// The enhanced image of the primary passes is three times as wide as the
/// source, the fallback image is the source size, so a source width picks
/// one image and the whitelist picks the pass.
#[derive(Default)]
pub struct ScriptedRecognizer {
    responses: HashMap<(u32, bool), String>,
    failing: HashSet<u32>,
    calls: Mutex<Vec<(u32, RecognitionConfig)>>,
}

impl ScriptedRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text returned by every primary pass over an image `width` pixels wide.
    pub fn primary(mut self, width: u32, text: &str) -> Self {
        self.responses.insert((width * 3, true), text.to_string());
        self
    }

    /// Text returned by the fallback pass over an image `width` pixels wide.
    pub fn fallback(mut self, width: u32, text: &str) -> Self {
        self.responses.insert((width, false), text.to_string());
        self
    }

    /// Every call on an image exactly `width` pixels wide times out.
    pub fn failing(mut self, width: u32) -> Self {
        self.failing.insert(width);
        self
    }

    /// Image width and options of every call so far.
    pub fn calls(&self) -> Vec<(u32, RecognitionConfig)> {
        self.calls.lock().unwrap().clone()
    }
}

impl TextRecognizer for ScriptedRecognizer {
    fn recognize(
        &self,
        image: &GrayImage,
        config: &RecognitionConfig,
    ) -> Result<String, RecognitionError> {
        let width = image.width();
        self.calls.lock().unwrap().push((width, config.clone()));

        if self.failing.contains(&width) {
            return Err(RecognitionError::TimedOut(Duration::from_secs(1)));
        }
        Ok(self
            .responses
            .get(&(width, config.whitelist.is_some()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Images held in memory, listed in insertion order.
#[derive(Default)]
pub struct MemorySource {
    images: Vec<(ImageFile, Option<DynamicImage>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// A decodable light gray image `width` pixels wide.
    pub fn with_image(mut self, name: &str, width: u32) -> Self {
        let img = RgbImage::from_pixel(width, IMAGE_HEIGHT, Rgb([200, 200, 200]));
        self.images
            .push((ImageFile::new(PathBuf::from(name)), Some(DynamicImage::ImageRgb8(img))));
        self
    }

    /// An image that fails to decode.
    pub fn with_corrupt(mut self, name: &str) -> Self {
        self.images.push((ImageFile::new(PathBuf::from(name)), None));
        self
    }

    pub fn files(&self) -> Vec<ImageFile> {
        self.images.iter().map(|(file, _)| file.clone()).collect()
    }
}

impl ImageSource for MemorySource {
    fn list(&self) -> io::Result<Vec<ImageFile>> {
        Ok(self.files())
    }

    fn open(&self, file: &ImageFile) -> image::ImageResult<DynamicImage> {
        let decoded = self
            .images
            .iter()
            .find(|(f, _)| f == file)
            .and_then(|(_, img)| img.clone());

        decoded.ok_or_else(|| {
            ImageError::Decoding(DecodingError::new(ImageFormatHint::Unknown, "corrupt"))
        })
    }
}
