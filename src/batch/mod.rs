//! Batch processing of a directory of screenshots.
//!
//! - `listing`: which images to process and how to decode them
//! - `pipeline`: enhancement, recognition passes and extraction for one image
//! - `collector`: rows and deduplication
//! - `runner`: drives the pipeline over a listing, sequential or parallel

pub mod collector;
pub mod listing;
pub mod pipeline;
pub mod runner;

#[cfg(test)]
mod testing;

pub use collector::{DedupKey, PhoneRecord};
pub use listing::DirectoryListing;
pub use pipeline::ImagePipeline;
pub use runner::run_batch;
