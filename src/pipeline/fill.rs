use crate::config::FillStrategy;
use crate::pipeline::parser::ParsedSeries;
use crate::pipeline::RejectReason;
use chrono::NaiveDateTime;

/// A parsed series with every NULL position resolved, ready for the
/// duplicate check and the output store.
#[derive(Debug, Clone, PartialEq)]
pub struct FilledSeries {
    pub id: String,
    pub timestamp: NaiveDateTime,
    pub samples: Vec<f64>,
    pub label: Option<i64>,
}

/// Applies the configured fill strategy to a series that passed the quality
/// thresholds.
#[derive(Debug, Clone, Copy)]
pub struct NullFiller {
    strategy: FillStrategy,
}

impl NullFiller {
    pub fn new(strategy: FillStrategy) -> Self {
        Self { strategy }
    }

    /// Resolves the NULL positions of `series`.
    ///
    /// An `Err` means the strategy left an unfillable NULL; the series is
    /// demoted to malformed even though the quality verdict was valid. This
    /// is the one place a verdict is revised mid-pipeline, so the revision is
    /// carried as a value instead of unwinding through the validation logic.
    pub fn fill(&self, series: ParsedSeries) -> Result<FilledSeries, RejectReason> {
        let samples = fill_samples(self.strategy, &series.samples)?;
        Ok(FilledSeries {
            id: series.id,
            timestamp: series.timestamp,
            samples,
            label: series.label,
        })
    }
}

fn fill_samples(
    strategy: FillStrategy,
    samples: &[Option<f64>],
) -> Result<Vec<f64>, RejectReason> {
    match strategy {
        FillStrategy::ZeroFill => Ok(samples.iter().map(|s| s.unwrap_or(0.0)).collect()),
        FillStrategy::Pad => {
            let mut out = Vec::with_capacity(samples.len());
            let mut previous = None;
            for (position, sample) in samples.iter().enumerate() {
                match sample.or(previous) {
                    Some(v) => {
                        previous = Some(v);
                        out.push(v);
                    }
                    None => return Err(RejectReason::UnfillableNull { position }),
                }
            }
            Ok(out)
        }
        FillStrategy::Backfill => {
            let mut out = vec![0.0; samples.len()];
            let mut following = None;
            for (position, sample) in samples.iter().enumerate().rev() {
                match sample.or(following) {
                    Some(v) => {
                        following = Some(v);
                        out[position] = v;
                    }
                    None => return Err(RejectReason::UnfillableNull { position }),
                }
            }
            Ok(out)
        }
        FillStrategy::LinearInterpolation => {
            let mut out = Vec::with_capacity(samples.len());
            let mut i = 0;
            while i < samples.len() {
                match samples[i] {
                    Some(v) => {
                        out.push(v);
                        i += 1;
                    }
                    None => {
                        let run_start = i;
                        let mut run_end = i;
                        while run_end < samples.len() && samples[run_end].is_none() {
                            run_end += 1;
                        }
                        // Runs touching a boundary have no value on one side
                        // and cannot be interpolated.
                        let left = if run_start == 0 {
                            None
                        } else {
                            samples[run_start - 1]
                        };
                        let right = if run_end == samples.len() {
                            None
                        } else {
                            samples[run_end]
                        };
                        match (left, right) {
                            (Some(l), Some(r)) => {
                                let span = (run_end - run_start + 1) as f64;
                                for k in 0..(run_end - run_start) {
                                    out.push(l + (r - l) * ((k + 1) as f64) / span);
                                }
                            }
                            _ => {
                                return Err(RejectReason::UnfillableNull {
                                    position: run_start,
                                })
                            }
                        }
                        i = run_end;
                    }
                }
            }
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(strategy: FillStrategy, samples: Vec<Option<f64>>) -> Result<Vec<f64>, RejectReason> {
        fill_samples(strategy, &samples)
    }

    #[test]
    fn zero_fill_resolves_every_null() {
        let filled = fill(
            FillStrategy::ZeroFill,
            vec![None, Some(2.0), Some(3.0)],
        )
        .unwrap();
        assert_eq!(filled, vec![0.0, 2.0, 3.0]);
    }

    #[test]
    fn zero_fill_handles_all_null_series() {
        let filled = fill(FillStrategy::ZeroFill, vec![None, None, None]).unwrap();
        assert_eq!(filled, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn pad_carries_preceding_value_forward() {
        let filled = fill(
            FillStrategy::Pad,
            vec![Some(1.0), None, None, Some(4.0), None],
        )
        .unwrap();
        assert_eq!(filled, vec![1.0, 1.0, 1.0, 4.0, 4.0]);
    }

    #[test]
    fn pad_rejects_leading_null() {
        assert_eq!(
            fill(FillStrategy::Pad, vec![None, Some(2.0), Some(3.0)]),
            Err(RejectReason::UnfillableNull { position: 0 })
        );
    }

    #[test]
    fn backfill_carries_following_value_backward() {
        let filled = fill(
            FillStrategy::Backfill,
            vec![None, Some(2.0), None, None, Some(5.0)],
        )
        .unwrap();
        assert_eq!(filled, vec![2.0, 2.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn backfill_rejects_trailing_null() {
        assert_eq!(
            fill(FillStrategy::Backfill, vec![Some(1.0), Some(2.0), None]),
            Err(RejectReason::UnfillableNull { position: 2 })
        );
    }

    #[test]
    fn linear_interpolation_fills_interior_runs() {
        let filled = fill(
            FillStrategy::LinearInterpolation,
            vec![Some(1.0), None, None, Some(4.0)],
        )
        .unwrap();
        assert_eq!(filled, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn linear_interpolation_rejects_boundary_runs() {
        // [NULL, 2, 4, NULL]: both boundary NULLs lack a bounding value.
        assert_eq!(
            fill(
                FillStrategy::LinearInterpolation,
                vec![None, Some(2.0), Some(4.0), None],
            ),
            Err(RejectReason::UnfillableNull { position: 0 })
        );
    }

    #[test]
    fn linear_interpolation_is_total_on_interior_nulls_only() {
        let filled = fill(
            FillStrategy::LinearInterpolation,
            vec![Some(0.0), None, Some(1.0), None, Some(3.0)],
        )
        .unwrap();
        assert_eq!(filled, vec![0.0, 0.5, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn filler_preserves_identity_fields() {
        let series = ParsedSeries {
            id: "sample_7".to_string(),
            timestamp: NaiveDateTime::default(),
            samples: vec![Some(1.0), None],
            null_count: 1,
            max_null_run: 1,
            label: Some(1),
        };
        let filled = NullFiller::new(FillStrategy::ZeroFill).fill(series).unwrap();
        assert_eq!(filled.id, "sample_7");
        assert_eq!(filled.label, Some(1));
        assert_eq!(filled.samples, vec![1.0, 0.0]);
    }
}
