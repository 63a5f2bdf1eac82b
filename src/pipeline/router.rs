use crate::config::SeriesTypeConfig;
use crate::pipeline::fill::FilledSeries;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Timestamp column format used in the output store.
const STORE_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes accepted series to the kind's append-only output store and rejected
/// raw files to its malformed store.
///
/// Append and save never raise on success paths; an `Err` is an I/O failure
/// that is fatal for that single file only.
#[derive(Debug, Clone)]
pub struct OutputRouter {
    output_file_path: PathBuf,
    output_separator: String,
    malformed_dir: PathBuf,
}

impl OutputRouter {
    pub fn new(cfg: &SeriesTypeConfig) -> Self {
        Self {
            output_file_path: cfg.output_file_path.clone(),
            output_separator: cfg.output_series_separator.clone(),
            malformed_dir: cfg.malformed_output_dir_path.clone(),
        }
    }

    /// Appends one accepted series as a single row.
    ///
    /// The whole row goes through one `writeln!` on a file opened in append
    /// mode, so concurrent runs never interleave partial rows; within a run
    /// only the single writer calls this.
    pub fn append(&self, series: &FilledSeries) -> io::Result<()> {
        if let Some(parent) = self.output_file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.output_file_path)?;
        writeln!(file, "{}", self.format_row(series))?;
        Ok(())
    }

    /// Copies a rejected raw file verbatim into the malformed store,
    /// preserving the source filename. Returns the destination path.
    pub fn save_malformed(&self, raw_path: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.malformed_dir)?;
        let file_name = raw_path.file_name().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("input path '{}' has no file name", raw_path.display()),
            )
        })?;
        let destination = self.malformed_dir.join(file_name);
        fs::copy(raw_path, &destination)?;
        Ok(destination)
    }

    /// One store row: timestamp, label (labeled series only), then samples,
    /// joined by the configured output separator.
    fn format_row(&self, series: &FilledSeries) -> String {
        let mut columns =
            Vec::with_capacity(series.samples.len() + 1 + usize::from(series.label.is_some()));
        columns.push(series.timestamp.format(STORE_TIMESTAMP_FORMAT).to_string());
        if let Some(label) = series.label {
            columns.push(label.to_string());
        }
        columns.extend(series.samples.iter().map(|v| v.to_string()));
        columns.join(&self.output_separator)
    }
}
