//! Image listing for a batch.
//!
//! The pipeline only needs two things from storage: the list of images to
//! process and a way to decode one of them.

use image::DynamicImage;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// One image to process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    /// Where the image lives
    pub path: PathBuf,
    /// File name used in records and logs
    pub name: String,
}

impl ImageFile {
    pub fn new(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, name }
    }
}

/// Supplies images to a batch.
pub trait ImageSource: Sync {
    /// Lists the images to process. An error here aborts the batch.
    fn list(&self) -> io::Result<Vec<ImageFile>>;

    /// Opens and decodes one listed image.
    fn open(&self, file: &ImageFile) -> image::ImageResult<DynamicImage>;
}

/// Images directly inside one directory, filtered by extension.
pub struct DirectoryListing {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl DirectoryListing {
    pub fn new(dir: impl Into<PathBuf>, extensions: &[String]) -> Self {
        Self {
            dir: dir.into(),
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext))
    }
}

impl ImageSource for DirectoryListing {
    /// Non-recursive; sorted by file name so progress output is stable.
    fn list(&self) -> io::Result<Vec<ImageFile>> {
        let with_dir = |e: io::Error| io::Error::new(e.kind(), format!("{}: {}", self.dir.display(), e));

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(with_dir)? {
            let path = entry.map_err(with_dir)?.path();
            if path.is_file() && self.is_image(&path) {
                files.push(ImageFile::new(path));
            }
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    fn open(&self, file: &ImageFile) -> image::ImageResult<DynamicImage> {
        image::open(&file.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExtractorConfig;
    use image::{ImageBuffer, Rgb, RgbImage};
    use tempfile::tempdir;

    fn default_listing(dir: &Path) -> DirectoryListing {
        DirectoryListing::new(dir, &ExtractorConfig::default().image_extensions)
    }

    #[test]
    fn test_image_file_name() {
        let file = ImageFile::new(PathBuf::from("shots/chat 01.png"));
        assert_eq!(file.name, "chat 01.png");
    }

    #[test]
    fn test_lists_images_by_extension_case_insensitive() {
        let dir = tempdir().unwrap();
        for name in ["b.PNG", "a.jpg", "c.jpeg", "d.tiff", "e.bmp", "notes.txt", "f.gif", "noext"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let names: Vec<String> = default_listing(dir.path())
            .list()
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();

        assert_eq!(names, vec!["a.jpg", "b.PNG", "c.jpeg", "d.tiff", "e.bmp"]);
    }

    #[test]
    fn test_listing_is_not_recursive() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("nested.png");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(nested.join("inner.png"), b"x").unwrap();
        std::fs::write(dir.path().join("top.png"), b"x").unwrap();

        let files = default_listing(dir.path()).list().unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "top.png");
    }

    #[test]
    fn test_missing_directory_is_error() {
        let dir = tempdir().unwrap();
        let listing = default_listing(&dir.path().join("missing"));
        let err = listing.list().unwrap_err();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_open_decodes_and_reports_corrupt_files() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.png");
        let img: RgbImage = ImageBuffer::from_pixel(4, 3, Rgb([10, 20, 30]));
        img.save(&good).unwrap();
        std::fs::write(dir.path().join("bad.png"), b"not a png").unwrap();

        let listing = default_listing(dir.path());
        let files = listing.list().unwrap();
        assert_eq!(files.len(), 2);

        assert!(listing.open(&files[0]).is_err(), "bad.png sorts first");
        let decoded = listing.open(&files[1]).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }
}
