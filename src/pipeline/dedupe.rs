use crate::config::SeriesTypeConfig;
use crate::error::Result;
use crate::pipeline::fill::FilledSeries;
use crate::pipeline::SeriesKind;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use tracing::warn;

/// Fingerprint of a filled series: the label (labeled kind only) and the
/// bit-exact ordered sample sequence. The timestamp is deliberately excluded
/// so re-ingested content is recognized regardless of when it arrived.
pub fn series_fingerprint(label: Option<i64>, samples: &[f64]) -> String {
    let mut hasher = Sha256::new();
    if let Some(label) = label {
        hasher.update(label.to_le_bytes());
        hasher.update(b"|");
    }
    for value in samples {
        hasher.update(value.to_bits().to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Tracks the acceptance set for one run.
///
/// Seeded from the full existing output store (the conservative duplicate
/// scope), then grown as series are accepted. Only ever touched by the
/// single writer, never by workers.
#[derive(Debug, Default)]
pub struct DuplicateDetector {
    seen: HashSet<String>,
}

impl DuplicateDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans the existing output store and folds every stored series into
    /// the acceptance set. Rows that don't parse are skipped with a warning;
    /// they can never be reproduced by this service and so can't collide.
    ///
    /// Returns the number of stored series seeded.
    pub fn seed_from_store(&mut self, cfg: &SeriesTypeConfig, kind: SeriesKind) -> Result<usize> {
        if !cfg.output_file_path.is_file() {
            return Ok(0);
        }
        let content = fs::read_to_string(&cfg.output_file_path)?;
        let mut seeded = 0;
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_store_row(line, &cfg.output_series_separator, kind) {
                Some((label, samples)) => {
                    self.seen.insert(series_fingerprint(label, &samples));
                    seeded += 1;
                }
                None => {
                    warn!(
                        "Skipping unparseable row {} of the {} output store \"{}\" while \
                         seeding the duplicate set",
                        line_no + 1,
                        kind,
                        cfg.output_file_path.display()
                    );
                }
            }
        }
        Ok(seeded)
    }

    /// Records the series as accepted. Returns `true` when an identical
    /// series was already in the acceptance set.
    pub fn check_and_record(&mut self, series: &FilledSeries) -> bool {
        !self
            .seen
            .insert(series_fingerprint(series.label, &series.samples))
    }

    /// Drops a series from the acceptance set again, used when its store
    /// append failed after the duplicate check.
    pub fn forget(&mut self, series: &FilledSeries) {
        self.seen
            .remove(&series_fingerprint(series.label, &series.samples));
    }
}

/// Splits one output-store row back into (label, samples). The first column
/// is the timestamp and is not part of the duplicate identity.
fn parse_store_row(
    line: &str,
    separator: &str,
    kind: SeriesKind,
) -> Option<(Option<i64>, Vec<f64>)> {
    let mut fields = line.split(separator);
    let _timestamp = fields.next()?;

    let label = match kind {
        SeriesKind::Labeled => Some(fields.next()?.trim().parse::<i64>().ok()?),
        SeriesKind::Unlabeled => None,
    };

    let mut samples = Vec::new();
    for field in fields {
        samples.push(field.trim().parse::<f64>().ok()?);
    }
    if samples.is_empty() {
        return None;
    }
    Some((label, samples))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn filled(label: Option<i64>, samples: Vec<f64>) -> FilledSeries {
        FilledSeries {
            id: "sample_1".to_string(),
            timestamp: NaiveDateTime::default(),
            samples,
            label,
        }
    }

    #[test]
    fn identical_series_share_a_fingerprint() {
        assert_eq!(
            series_fingerprint(None, &[1.0, 2.0, 3.0]),
            series_fingerprint(None, &[1.0, 2.0, 3.0])
        );
    }

    #[test]
    fn sample_order_changes_the_fingerprint() {
        assert_ne!(
            series_fingerprint(None, &[1.0, 2.0, 3.0]),
            series_fingerprint(None, &[3.0, 2.0, 1.0])
        );
    }

    #[test]
    fn label_is_part_of_the_identity() {
        assert_ne!(
            series_fingerprint(Some(0), &[1.0, 2.0]),
            series_fingerprint(Some(1), &[1.0, 2.0])
        );
    }

    #[test]
    fn second_identical_series_is_flagged_as_duplicate() {
        let mut detector = DuplicateDetector::new();
        let series = filled(Some(1), vec![1.0, 2.0, 3.0]);
        assert!(!detector.check_and_record(&series));
        assert!(detector.check_and_record(&series));
    }

    #[test]
    fn forget_reopens_the_slot() {
        let mut detector = DuplicateDetector::new();
        let series = filled(None, vec![1.0, 2.0]);
        assert!(!detector.check_and_record(&series));
        detector.forget(&series);
        assert!(!detector.check_and_record(&series));
    }

    #[test]
    fn store_rows_round_trip_into_the_acceptance_set() {
        let labeled = parse_store_row("2026-01-02 10:00:00,1,1.5,2.5", ",", SeriesKind::Labeled)
            .expect("labeled row should parse");
        assert_eq!(labeled, (Some(1), vec![1.5, 2.5]));

        let unlabeled = parse_store_row("2026-01-02 10:00:00,1.5,2.5", ",", SeriesKind::Unlabeled)
            .expect("unlabeled row should parse");
        assert_eq!(unlabeled, (None, vec![1.5, 2.5]));

        assert!(parse_store_row("garbage row", ",", SeriesKind::Unlabeled).is_none());
    }
}
