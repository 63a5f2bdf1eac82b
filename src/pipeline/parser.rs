use crate::config::SeriesTypeConfig;
use crate::pipeline::{RejectReason, SeriesKind};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Hands out series identifiers for one run: the configured default label
/// followed by an index seeded at `startingIndex`.
///
/// Scoped per run and shared across workers, so identifiers never leak
/// between runs and stay unique under concurrency.
#[derive(Debug)]
pub struct SeriesIdAllocator {
    label: String,
    next: AtomicU64,
}

impl SeriesIdAllocator {
    pub fn new(label: &str, starting_index: u64) -> Self {
        Self {
            label: label.to_string(),
            next: AtomicU64::new(starting_index),
        }
    }

    pub fn next_id(&self) -> String {
        let index = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", self.label, index)
    }
}

/// One raw input file parsed into an ordered sample sequence plus metadata.
/// Lives for a single pipeline pass and is never persisted itself.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSeries {
    pub id: String,
    pub timestamp: NaiveDateTime,
    /// Ordered samples; `None` marks a NULL position.
    pub samples: Vec<Option<f64>>,
    pub null_count: usize,
    pub max_null_run: usize,
    /// Declared label (0 or 1), labeled series only.
    pub label: Option<i64>,
}

/// Reads one raw series file into a [`ParsedSeries`].
#[derive(Debug, Clone)]
pub struct SeriesParser {
    cfg: SeriesTypeConfig,
    kind: SeriesKind,
    sample_size: usize,
    ids: Arc<SeriesIdAllocator>,
}

impl SeriesParser {
    pub fn new(
        cfg: SeriesTypeConfig,
        kind: SeriesKind,
        sample_size: usize,
        ids: Arc<SeriesIdAllocator>,
    ) -> Self {
        Self {
            cfg,
            kind,
            sample_size,
            ids,
        }
    }

    /// Parses one raw series file. Any `Err` is a parse failure that routes
    /// the file to the malformed path; it is never fatal for the run.
    pub fn parse(&self, path: &Path) -> Result<ParsedSeries, RejectReason> {
        let content =
            fs::read_to_string(path).map_err(|e| RejectReason::Unreadable(e.to_string()))?;
        if content.trim().is_empty() {
            return Err(RejectReason::EmptyFile);
        }

        let mut lines = content.lines().filter(|line| !line.trim().is_empty());
        let row = lines.next().ok_or(RejectReason::EmptyFile)?;
        let extra_rows = lines.count();
        if extra_rows > 0 {
            return Err(RejectReason::MultiRow(extra_rows + 1));
        }

        let fields: Vec<&str> = row.split(self.cfg.input_series_separator.as_str()).collect();
        let expected = match self.kind {
            SeriesKind::Labeled => self.sample_size + 1,
            SeriesKind::Unlabeled => self.sample_size,
        };
        if fields.len() != expected {
            return Err(RejectReason::FieldCountMismatch {
                expected,
                actual: fields.len(),
            });
        }

        let (label, sample_fields) = match self.kind {
            SeriesKind::Labeled => {
                let raw = fields[0].trim();
                let label = match raw.parse::<f64>() {
                    Ok(v) if v == 0.0 || v == 1.0 => v as i64,
                    _ => return Err(RejectReason::InvalidLabel(raw.to_string())),
                };
                (Some(label), &fields[1..])
            }
            SeriesKind::Unlabeled => (None, &fields[..]),
        };

        let mut samples = Vec::with_capacity(self.sample_size);
        let mut null_count = 0;
        let mut max_null_run = 0;
        let mut current_run = 0;
        for field in sample_fields {
            let sample = parse_sample(field);
            if sample.is_none() {
                null_count += 1;
                current_run += 1;
                max_null_run = max_null_run.max(current_run);
            } else {
                current_run = 0;
            }
            samples.push(sample);
        }

        Ok(ParsedSeries {
            id: self.ids.next_id(),
            timestamp: self.file_timestamp(path),
            samples,
            null_count,
            max_null_run,
            label,
        })
    }

    /// Derives the series timestamp from the file name, falling back to the
    /// file modification time when the name doesn't match the configured
    /// datetime format.
    fn file_timestamp(&self, path: &Path) -> NaiveDateTime {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stem = name
            .strip_suffix(self.cfg.input_file_extension.as_str())
            .unwrap_or(&name);

        match NaiveDateTime::parse_from_str(stem, &self.cfg.input_file_datetime_format) {
            Ok(ts) => ts,
            Err(_) => {
                warn!(
                    "The file name of series \"{}\" doesn't match the configured datetime \
                     format, using its modification time as timestamp",
                    name
                );
                fs::metadata(path)
                    .and_then(|m| m.modified())
                    .map(|t| DateTime::<Utc>::from(t).naive_utc())
                    .unwrap_or_else(|_| Utc::now().naive_utc())
            }
        }
    }
}

/// A sample that is empty, marked NULL, or not parseable as a number is
/// recorded as a NULL position.
fn parse_sample(field: &str) -> Option<f64> {
    let token = field.trim();
    if token.is_empty() || token.eq_ignore_ascii_case("null") || token.eq_ignore_ascii_case("nan") {
        return None;
    }
    token.parse::<f64>().ok()
}
