use anyhow::Result;
use regex::Regex;
use std::collections::BTreeSet;

/// International formats, each applied independently to every line.
///
/// - Indian mobile, 5+5 grouping: +91 12345 67890
/// - North American, 3+3+4 grouping: +1 234-567-8901
/// - Generic 2-4 / 3-4 / 3-4 grouping: +44 20 7946 0958
/// - Catch-all: + followed by 10-15 digits
const INTERNATIONAL_PATTERNS: [&str; 4] = [
    r"\+[0-9]{1,3}[\s-]?[0-9]{5}[\s-]?[0-9]{5}",
    r"\+[0-9]{1,3}[\s-]?[0-9]{3}[\s-]?[0-9]{3}[\s-]?[0-9]{4}",
    r"\+[0-9]{1,3}[\s-]?[0-9]{2,4}[\s-]?[0-9]{3,4}[\s-]?[0-9]{3,4}",
    r"\+[0-9]{10,15}",
];

/// Digit runs with an optional leading plus; bare 10-digit runs are
/// domestic numbers without a country code.
const DIGIT_RUN_PATTERN: &str = r"\+?[0-9]+";

const DOMESTIC_DIGITS: usize = 10;

/// Full-width plus sign produced by some fonts and copy/paste paths.
const FULLWIDTH_PLUS: char = '\u{FF0B}';

/// Finds phone numbers in recognized text and normalizes them.
pub struct PhoneNumberExtractor {
    patterns: Vec<Regex>,
    digit_run: Regex,
    default_country_code: String,
}

impl PhoneNumberExtractor {
    pub fn new(default_country_code: &str) -> Result<Self> {
        let patterns = INTERNATIONAL_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            digit_run: Regex::new(DIGIT_RUN_PATTERN)?,
            default_country_code: default_country_code.to_string(),
        })
    }

    /// Extracts the unique normalized numbers found in `text`.
    ///
    /// Matching is per line. Every pattern contributes all of its
    /// non-overlapping matches and the results are merged into a set, so the
    /// same number found by several patterns or on several lines appears
    /// once. The returned order carries no meaning.
    pub fn extract(&self, text: &str) -> Vec<String> {
        let mut found: BTreeSet<String> = BTreeSet::new();

        for raw_line in text.lines() {
            let line = raw_line.replace(FULLWIDTH_PLUS, "+");
            let line = line.trim();

            for pattern in &self.patterns {
                for m in pattern.find_iter(line) {
                    // A match that stops inside a digit run is a truncated
                    // prefix of a longer number
                    if followed_by_digit(line, m.end()) {
                        continue;
                    }
                    found.insert(self.normalize(m.as_str()));
                }
            }

            for m in self.digit_run.find_iter(line) {
                let run = m.as_str();
                if !run.starts_with('+') && run.len() == DOMESTIC_DIGITS {
                    found.insert(self.normalize(run));
                }
            }
        }

        found.into_iter().collect()
    }

    /// Removes separators and tags untagged 10-digit numbers with the
    /// default country code.
    pub fn normalize(&self, candidate: &str) -> String {
        let number: String = candidate
            .chars()
            .filter(|c| !c.is_whitespace() && !matches!(c, '(' | ')' | '-'))
            .collect();

        if number.len() == DOMESTIC_DIGITS && number.chars().all(|c| c.is_ascii_digit()) {
            format!("{}{}", self.default_country_code, number)
        } else {
            number
        }
    }
}

fn followed_by_digit(line: &str, end: usize) -> bool {
    line[end..].chars().next().is_some_and(|c| c.is_ascii_digit())
}
