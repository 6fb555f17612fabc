//! Phone Number Extractor
//!
//! Scans a directory of screenshots, recognizes the text in each one with
//! Tesseract and writes every phone number it finds to a CSV (or JSON) table.

mod batch;
mod config;
mod export;
mod logging;
mod ocr;
mod paths;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use batch::{run_batch, DirectoryListing, ImagePipeline};
use ocr::PhoneNumberExtractor;

/// Extract phone numbers from screenshots.
#[derive(Parser, Debug)]
#[command(name = "phone-extractor", version, about)]
struct Args {
    /// Directory containing the images [default: the executable's directory]
    dir: Option<PathBuf>,

    /// Output file; `.json` writes JSON, anything else CSV. Relative paths
    /// are resolved against DIR
    #[arg(short, long, default_value = export::DEFAULT_OUTPUT_NAME)]
    output: PathBuf,

    /// Configuration file [default: config.json next to the executable]
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of images processed in parallel (overrides the config file)
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Log file [default: logs/phone_extraction.log next to the executable]
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log debug messages
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_path = args
        .log_file
        .clone()
        .unwrap_or_else(paths::get_default_log_path);
    install_panic_hook(log_path.clone());

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    if let Err(e) = logging::init(&log_path, level) {
        eprintln!("Warning: {:#}", e);
    }

    println!("Phone Number Extractor");
    println!("======================");

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Application error: {:#}", e);
            println!("\nAn error occurred: {:#}", e);
            println!("Check the log file for details.");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = config::load_config(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.workers = workers.max(1);
    }

    let dir = args
        .dir
        .clone()
        .unwrap_or_else(|| paths::get_exe_dir().clone());
    let output = resolve_output(&dir, &args.output);
    println!("Looking for images in {}...", dir.display());

    let engine = ocr::build_engine(&config.ocr);
    let extractor = PhoneNumberExtractor::new(&config.default_country_code)
        .context("Failed to build phone number patterns")?;
    let pipeline = ImagePipeline::new(
        engine,
        extractor,
        config.fallback_threshold,
        config.ocr.fallback_layout,
    );
    let listing = DirectoryListing::new(&dir, &config.image_extensions);

    let report = run_batch(&listing, &pipeline, config.dedup_key, config.workers)?;
    info!(
        "Processed {} images: {} with numbers, {} without, {} failed",
        report.images_total,
        report.images_with_numbers,
        report.images_without_numbers,
        report.images_failed
    );

    if report.records.is_empty() {
        warn!("No phone numbers found in any images");
        println!("\nNo phone numbers found in any images");
        return Ok(());
    }

    let exporter = export::exporter_for(&output);
    exporter.export(&report.records)?;

    info!("Results saved to {}", exporter.path().display());
    println!("\nExtracted {} unique phone numbers", report.records.len());
    println!("Results saved to {}", exporter.path().display());
    Ok(())
}

/// Relative output paths land next to the images.
fn resolve_output(dir: &Path, output: &Path) -> PathBuf {
    if output.is_absolute() {
        output.to_path_buf()
    } else {
        dir.join(output)
    }
}

/// Writes panics to the log file as well as stderr.
fn install_panic_hook(log_path: PathBuf) {
    std::panic::set_hook(Box::new(move |panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();

        let line = logging::format_line(log::Level::Error, &format!("[PANIC]{} {}", location, msg));
        eprint!("{}", line);
        if let Ok(mut file) = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
        {
            use std::io::Write;
            let _ = file.write_all(line.as_bytes());
        }
    }));
}
