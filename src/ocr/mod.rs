//! Image enhancement, text recognition and phone number extraction.

pub mod engine;
pub mod extract;
pub mod preprocess;
pub mod setup;

pub use engine::{LayoutMode, RecognitionConfig, RecognitionError, TextRecognizer};
pub use extract::PhoneNumberExtractor;
pub use preprocess::{enhance_for_ocr, threshold_global, PreprocessError};
pub use setup::build_engine;
