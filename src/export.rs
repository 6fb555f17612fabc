//! Writes the final table of phone numbers.
//!
//! CSV is the default; an output path ending in `.json` gets a
//! pretty-printed JSON array with the same three columns.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::batch::PhoneRecord;

/// Default file name for the results table.
pub const DEFAULT_OUTPUT_NAME: &str = "phone_numbers.csv";

/// One output row. Field order is column order.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    #[serde(rename = "Image")]
    image: &'a str,
    #[serde(rename = "Phone Number")]
    phone_number: &'a str,
    #[serde(rename = "Extraction Date")]
    extraction_date: String,
}

impl<'a> From<&'a PhoneRecord> for ExportRow<'a> {
    fn from(record: &'a PhoneRecord) -> Self {
        Self {
            image: &record.image,
            phone_number: &record.phone_number,
            extraction_date: record.timestamp(),
        }
    }
}

/// Destination for the finalized records.
pub trait ExportSink {
    fn export(&self, records: &[PhoneRecord]) -> Result<()>;

    fn path(&self) -> &Path;
}

pub struct CsvExporter {
    path: PathBuf,
}

impl CsvExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExportSink for CsvExporter {
    /// Overwrites the file with a header row followed by one row per record.
    fn export(&self, records: &[PhoneRecord]) -> Result<()> {
        let mut writer = csv::Writer::from_path(&self.path)
            .with_context(|| format!("Failed to create CSV file: {}", self.path.display()))?;

        for record in records {
            writer
                .serialize(ExportRow::from(record))
                .context("Failed to write CSV row")?;
        }

        writer.flush().context("Failed to flush CSV file")?;
        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

pub struct JsonExporter {
    path: PathBuf,
}

impl JsonExporter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ExportSink for JsonExporter {
    fn export(&self, records: &[PhoneRecord]) -> Result<()> {
        let rows: Vec<ExportRow> = records.iter().map(ExportRow::from).collect();
        let json = serde_json::to_string_pretty(&rows).context("Failed to serialize records to JSON")?;

        let mut file = File::create(&self.path)
            .with_context(|| format!("Failed to create JSON file: {}", self.path.display()))?;
        file.write_all(json.as_bytes())
            .context("Failed to write JSON data")?;

        Ok(())
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Picks the exporter from the output extension.
pub fn exporter_for(path: &Path) -> Box<dyn ExportSink> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        Box::new(JsonExporter::new(path))
    } else {
        Box::new(CsvExporter::new(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::tempdir;

    fn records() -> Vec<PhoneRecord> {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        vec![
            PhoneRecord {
                image: "chat.png".to_string(),
                phone_number: "+919876543210".to_string(),
                extracted_at: at,
            },
            PhoneRecord {
                image: "group, old.jpg".to_string(),
                phone_number: "+12345678901".to_string(),
                extracted_at: at,
            },
        ]
    }

    #[test]
    fn test_csv_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phone_numbers.csv");

        CsvExporter::new(&path).export(&records()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Image,Phone Number,Extraction Date",
                "chat.png,+919876543210,2024-03-09 14:05:07",
                "\"group, old.jpg\",+12345678901,2024-03-09 14:05:07",
            ]
        );
    }

    #[test]
    fn test_csv_export_overwrites() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale,data\n1,2,3\n4,5,6\n7,8,9\n").unwrap();

        CsvExporter::new(&path).export(&records()[..1]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(!content.contains("stale"));
    }

    #[test]
    fn test_json_export() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("phone_numbers.json");

        JsonExporter::new(&path).export(&records()).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Image"], "chat.png");
        assert_eq!(rows[0]["Phone Number"], "+919876543210");
        assert_eq!(rows[1]["Extraction Date"], "2024-03-09 14:05:07");
    }

    #[test]
    fn test_exporter_for_picks_by_extension() {
        let dir = tempdir().unwrap();

        let json_path = dir.path().join("OUT.JSON");
        exporter_for(&json_path).export(&records()).unwrap();
        assert!(std::fs::read_to_string(&json_path).unwrap().trim_start().starts_with('['));

        let csv_path = dir.path().join("out.txt");
        let exporter = exporter_for(&csv_path);
        assert_eq!(exporter.path(), csv_path.as_path());
        exporter.export(&records()).unwrap();
        assert!(std::fs::read_to_string(&csv_path).unwrap().starts_with("Image,"));
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("out.csv");
        let err = CsvExporter::new(&path).export(&records()).unwrap_err();
        assert!(err.to_string().contains("Failed to create CSV file"));
    }
}
