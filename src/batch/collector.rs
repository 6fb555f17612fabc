use chrono::{DateTime, Local, SubsecRound};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Timestamp format used in records and exports.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One phone number found in one image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhoneRecord {
    pub image: String,
    pub phone_number: String,
    /// Second resolution
    pub extracted_at: DateTime<Local>,
}

impl PhoneRecord {
    /// Builds one record per number, all stamped with the same time.
    pub fn stamp_all(image: &str, numbers: Vec<String>, at: DateTime<Local>) -> Vec<PhoneRecord> {
        let at = at.trunc_subsecs(0);
        numbers
            .into_iter()
            .map(|phone_number| PhoneRecord {
                image: image.to_string(),
                phone_number,
                extracted_at: at,
            })
            .collect()
    }

    pub fn timestamp(&self) -> String {
        self.extracted_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Fields that decide whether two rows are duplicates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKey {
    /// Image, number and timestamp must all match
    #[default]
    FullRow,
    /// The timestamp is ignored
    ImageAndNumber,
}

impl DedupKey {
    fn key_of(self, record: &PhoneRecord) -> (String, String, Option<DateTime<Local>>) {
        let at = match self {
            DedupKey::FullRow => Some(record.extracted_at),
            DedupKey::ImageAndNumber => None,
        };
        (record.image.clone(), record.phone_number.clone(), at)
    }
}

/// Accumulates records for a whole batch.
#[derive(Debug, Default)]
pub struct ResultCollector {
    records: Vec<PhoneRecord>,
    dedup_key: DedupKey,
}

impl ResultCollector {
    pub fn new(dedup_key: DedupKey) -> Self {
        Self {
            records: Vec::new(),
            dedup_key,
        }
    }

    /// Appends the records of one image.
    pub fn add(&mut self, records: impl IntoIterator<Item = PhoneRecord>) {
        self.records.extend(records);
    }

    /// Drops duplicate rows, keeping the first occurrence and the original
    /// order. The same number in different images is never a duplicate.
    pub fn finalize(self) -> Vec<PhoneRecord> {
        let key = self.dedup_key;
        let mut seen = HashSet::new();
        self.records
            .into_iter()
            .filter(|record| seen.insert(key.key_of(record)))
            .collect()
    }
}
