//! Log sink for the `log` facade.
//!
//! Every record is written to the console and appended to a log file with a
//! timestamp, so a run can be diagnosed after the console is gone.

use anyhow::{Context, Result};
use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub struct FileLogger {
    level: LevelFilter,
    file: Mutex<Option<File>>,
    echo: bool,
}

impl FileLogger {
    /// Opens (or creates) the log file in append mode.
    ///
    /// A file that cannot be opened is not fatal: the logger keeps echoing to
    /// the console and the caller gets the error to report.
    pub fn open(path: &Path, level: LevelFilter, echo: bool) -> (Self, Option<std::io::Error>) {
        let opened = path
            .parent()
            .map(std::fs::create_dir_all)
            .unwrap_or(Ok(()))
            .and_then(|_| OpenOptions::new().create(true).append(true).open(path));

        let (file, err) = match opened {
            Ok(file) => (Some(file), None),
            Err(e) => (None, Some(e)),
        };

        let logger = Self {
            level,
            file: Mutex::new(file),
            echo,
        };
        (logger, err)
    }
}

/// Formats one log line: `[2024-01-31 12:00:00.123] WARN  message`
pub fn format_line(level: log::Level, msg: &str) -> String {
    let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
    format!("[{}] {:<5} {}\n", timestamp, level, msg)
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let line = format_line(record.level(), &record.args().to_string());
        if self.echo {
            print!("{}", line);
        }
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

/// Installs the file logger as the global `log` backend. Call once at startup.
pub fn init(path: &Path, level: LevelFilter) -> Result<()> {
    let (logger, open_err) = FileLogger::open(path, level, true);
    log::set_boxed_logger(Box::new(logger)).context("Logger already initialized")?;
    log::set_max_level(level);

    if let Some(e) = open_err {
        log::warn!(
            "Could not open log file {}: {}. Logging to console only.",
            path.display(),
            e
        );
    }
    Ok(())
}
