//! Batch driver: lists the images, runs the pipeline on each one and
//! collects the rows.
//!
//! Per-image failures are logged and counted; only a listing failure aborts
//! the batch. With more than one worker, images are processed on scoped
//! threads and the outcomes are folded back in listing order, so the rows
//! come out the same as a sequential run.

use log::{error, info, warn};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use thiserror::Error;

use super::collector::{DedupKey, PhoneRecord, ResultCollector};
use super::listing::{ImageFile, ImageSource};
use super::pipeline::{ImageOutcome, ImagePipeline};
use crate::ocr::TextRecognizer;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("could not list images: {0}")]
    Listing(#[source] io::Error),
}

/// Rows and per-image tallies of one batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Deduplicated rows in processing order
    pub records: Vec<PhoneRecord>,
    pub images_total: usize,
    pub images_with_numbers: usize,
    pub images_without_numbers: usize,
    pub images_failed: usize,
}

/// Processes every listed image.
///
/// `workers` of 0 or 1 runs on the calling thread.
pub fn run_batch<R: TextRecognizer>(
    source: &dyn ImageSource,
    pipeline: &ImagePipeline<R>,
    dedup_key: DedupKey,
    workers: usize,
) -> Result<BatchReport, BatchError> {
    let files = source.list().map_err(BatchError::Listing)?;
    let total = files.len();
    info!("Found {} images to process", total);

    let mut report = BatchReport {
        images_total: total,
        ..Default::default()
    };
    let mut collector = ResultCollector::new(dedup_key);

    if workers <= 1 || total <= 1 {
        for (index, file) in files.iter().enumerate() {
            info!("Processing image {}/{}: {}", index + 1, total, file.name);
            let outcome = pipeline.process(source, file);
            record_outcome(file, outcome, &mut collector, &mut report);
        }
    } else {
        for (index, outcome) in process_parallel(source, pipeline, &files, workers) {
            record_outcome(&files[index], outcome, &mut collector, &mut report);
        }
    }

    report.records = collector.finalize();
    Ok(report)
}

/// Runs the pipeline on `workers` scoped threads. Returns outcomes sorted by
/// listing index.
fn process_parallel<R: TextRecognizer>(
    source: &dyn ImageSource,
    pipeline: &ImagePipeline<R>,
    files: &[ImageFile],
    workers: usize,
) -> Vec<(usize, ImageOutcome)> {
    let total = files.len();
    let next = AtomicUsize::new(0);
    let (sender, receiver) = mpsc::channel();

    thread::scope(|scope| {
        for _ in 0..workers.min(total) {
            let sender = sender.clone();
            let next = &next;
            scope.spawn(move || {
                loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let Some(file) = files.get(index) else {
                        break;
                    };
                    info!("Processing image {}/{}: {}", index + 1, total, file.name);
                    let outcome = pipeline.process(source, file);
                    if sender.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(sender);

    let mut outcomes: Vec<(usize, ImageOutcome)> = receiver.into_iter().collect();
    outcomes.sort_by_key(|(index, _)| *index);
    outcomes
}

fn record_outcome(
    file: &ImageFile,
    outcome: ImageOutcome,
    collector: &mut ResultCollector,
    report: &mut BatchReport,
) {
    match outcome {
        ImageOutcome::Found { records, pass } => {
            info!(
                "Found {} phone numbers in {} ({} pass)",
                records.len(),
                file.name,
                pass
            );
            report.images_with_numbers += 1;
            collector.add(records);
        }
        ImageOutcome::NoNumbers => {
            warn!("No phone numbers found in {}", file.name);
            report.images_without_numbers += 1;
        }
        ImageOutcome::Failed(e) => {
            error!("Error processing {}: {}", file.name, e);
            report.images_failed += 1;
        }
    }
}
