use crate::config::SeriesTypeConfig;
use crate::pipeline::parser::ParsedSeries;
use crate::pipeline::RejectReason;

/// Outcome of the quality checks for one parsed series.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Valid,
    Malformed(Vec<RejectReason>),
}

/// Applies the NULL-ratio and consecutive-NULL thresholds to a parsed series.
///
/// Both thresholds are evaluated independently and either breach is enough to
/// reject. The comparison is strictly greater-than: a series exactly at a
/// threshold is valid.
#[derive(Debug, Clone, Copy)]
pub struct QualityEvaluator {
    max_null_perc: f64,
    max_consec_null: usize,
    sample_size: usize,
}

impl QualityEvaluator {
    pub fn new(cfg: &SeriesTypeConfig, sample_size: usize) -> Self {
        Self {
            max_null_perc: cfg.max_null_perc,
            max_consec_null: cfg.max_consec_null,
            sample_size,
        }
    }

    pub fn evaluate(&self, series: &ParsedSeries) -> Verdict {
        let mut reasons = Vec::new();

        let ratio = series.null_count as f64 / self.sample_size as f64;
        if ratio > self.max_null_perc {
            reasons.push(RejectReason::NullRatioExceeded {
                ratio,
                limit: self.max_null_perc,
            });
        }
        if series.max_null_run > self.max_consec_null {
            reasons.push(RejectReason::ConsecutiveNullsExceeded {
                run: series.max_null_run,
                limit: self.max_consec_null,
            });
        }

        if reasons.is_empty() {
            Verdict::Valid
        } else {
            Verdict::Malformed(reasons)
        }
    }
}
