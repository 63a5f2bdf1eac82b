pub mod dedupe;
pub mod fill;
pub mod parser;
pub mod quality;
pub mod router;
pub mod run;

pub use run::{RunCoordinator, RunSummary};

use std::fmt;

/// The two kinds of series the service ingests, each with its own
/// configuration subtree and stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    Labeled,
    Unlabeled,
}

impl SeriesKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SeriesKind::Labeled => "labeled",
            SeriesKind::Unlabeled => "unlabeled",
        }
    }
}

impl fmt::Display for SeriesKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a series was routed to the malformed path instead of acceptance.
///
/// All of these are recovered locally: they mark a single file as malformed
/// and never abort the run.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// The input file holds no content at all.
    EmptyFile,
    /// The input file could not be opened or read.
    Unreadable(String),
    /// The file spans more than one row of values.
    MultiRow(usize),
    /// The number of fields does not match the configured width.
    FieldCountMismatch { expected: usize, actual: usize },
    /// A labeled series declared a label other than 0 or 1.
    InvalidLabel(String),
    /// NULL ratio above the configured `maxNULLperc`.
    NullRatioExceeded { ratio: f64, limit: f64 },
    /// Longest consecutive-NULL run above the configured `maxConsecNULL`.
    ConsecutiveNullsExceeded { run: usize, limit: usize },
    /// The fill strategy could not resolve a boundary NULL.
    UnfillableNull { position: usize },
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::EmptyFile => write!(f, "empty series"),
            RejectReason::Unreadable(e) => write!(f, "series file could not be read ({e})"),
            RejectReason::MultiRow(rows) => {
                write!(f, "series spans {rows} rows, expected a single row")
            }
            RejectReason::FieldCountMismatch { expected, actual } => {
                write!(f, "field count mismatch (expected {expected}, found {actual})")
            }
            RejectReason::InvalidLabel(value) => {
                write!(f, "invalid label value \"{value}\" (expected 0 or 1)")
            }
            RejectReason::NullRatioExceeded { ratio, limit } => {
                write!(f, "NULL ratio {ratio:.3} exceeds threshold {limit}")
            }
            RejectReason::ConsecutiveNullsExceeded { run, limit } => {
                write!(f, "{run} consecutive NULL values exceed threshold {limit}")
            }
            RejectReason::UnfillableNull { position } => {
                write!(f, "NULL at position {position} cannot be filled by the configured strategy")
            }
        }
    }
}
