use crate::config::{DuplicatedPolicy, IngestConfig, MalformedPolicy, SeriesTypeConfig};
use crate::error::Result;
use crate::pipeline::dedupe::DuplicateDetector;
use crate::pipeline::fill::{FilledSeries, NullFiller};
use crate::pipeline::parser::{SeriesIdAllocator, SeriesParser};
use crate::pipeline::quality::{QualityEvaluator, Verdict};
use crate::pipeline::router::OutputRouter;
use crate::pipeline::{RejectReason, SeriesKind};
use metrics::counter;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Counts reported at the end of one ingestion run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub kind: &'static str,
    pub discovered: usize,
    pub accepted: usize,
    pub duplicated: usize,
    pub malformed_saved: usize,
    pub malformed_dropped: usize,
    pub store_errors: usize,
}

impl RunSummary {
    fn new(kind: SeriesKind) -> Self {
        Self {
            kind: kind.as_str(),
            discovered: 0,
            accepted: 0,
            duplicated: 0,
            malformed_saved: 0,
            malformed_dropped: 0,
            store_errors: 0,
        }
    }

    pub fn malformed(&self) -> usize {
        self.malformed_saved + self.malformed_dropped
    }
}

/// Where one file ended up after parse → evaluate → fill.
#[derive(Debug)]
enum FileOutcome {
    Accepted(FilledSeries),
    Rejected(Vec<RejectReason>),
}

#[derive(Debug)]
struct ProcessedFile {
    path: PathBuf,
    outcome: FileOutcome,
}

/// Runs one file through the per-file stages that need no shared state.
/// Strictly sequential within the file; freely parallel across files.
fn process_file(
    parser: &SeriesParser,
    evaluator: &QualityEvaluator,
    filler: &NullFiller,
    path: &Path,
) -> FileOutcome {
    let parsed = match parser.parse(path) {
        Ok(parsed) => parsed,
        Err(reason) => return FileOutcome::Rejected(vec![reason]),
    };
    match evaluator.evaluate(&parsed) {
        Verdict::Malformed(reasons) => FileOutcome::Rejected(reasons),
        // A valid verdict can still be revised here: an unfillable NULL
        // demotes the series to malformed.
        Verdict::Valid => match filler.fill(parsed) {
            Ok(filled) => FileOutcome::Accepted(filled),
            Err(reason) => FileOutcome::Rejected(vec![reason]),
        },
    }
}

/// The single writer: the only owner of the duplicate-acceptance set and the
/// two stores. Serializing the duplicate-check-plus-append step here is what
/// keeps the store duplicate-free under the `drop` policy.
struct AcceptanceWriter {
    detector: DuplicateDetector,
    router: OutputRouter,
    duplicated_policy: DuplicatedPolicy,
    malformed_policy: MalformedPolicy,
}

impl AcceptanceWriter {
    fn route(&mut self, file: ProcessedFile, summary: &mut RunSummary) {
        match file.outcome {
            FileOutcome::Accepted(series) => {
                if self.duplicated_policy == DuplicatedPolicy::Drop
                    && self.detector.check_and_record(&series)
                {
                    debug!(
                        "Series \"{}\" duplicates an already accepted series and will be dropped",
                        series.id
                    );
                    summary.duplicated += 1;
                    return;
                }
                match self.router.append(&series) {
                    Ok(()) => summary.accepted += 1,
                    Err(e) => {
                        error!(
                            "Failed to append series \"{}\" (from \"{}\") to the output store: {}",
                            series.id,
                            file.path.display(),
                            e
                        );
                        if self.duplicated_policy == DuplicatedPolicy::Drop {
                            self.detector.forget(&series);
                        }
                        summary.store_errors += 1;
                    }
                }
            }
            FileOutcome::Rejected(reasons) => {
                let causes: Vec<String> = reasons.iter().map(ToString::to_string).collect();
                warn!(
                    "The series \"{}\" is malformed: {}",
                    file.path.display(),
                    causes.join("; ")
                );
                match self.malformed_policy {
                    MalformedPolicy::Save => match self.router.save_malformed(&file.path) {
                        Ok(_) => summary.malformed_saved += 1,
                        Err(e) => {
                            error!(
                                "Failed to save malformed series \"{}\": {}",
                                file.path.display(),
                                e
                            );
                            summary.store_errors += 1;
                        }
                    },
                    MalformedPolicy::Drop => summary.malformed_dropped += 1,
                }
            }
        }
    }
}

/// Drives one ingestion run per series kind: enumerates candidate files and
/// dispatches each through parse → evaluate → fill → duplicate check → route,
/// sequentially or via a bounded worker pool.
pub struct RunCoordinator {
    conf: Arc<IngestConfig>,
}

impl RunCoordinator {
    pub fn new(conf: IngestConfig) -> Self {
        Self {
            conf: Arc::new(conf),
        }
    }

    fn kind_config(&self, kind: SeriesKind) -> &SeriesTypeConfig {
        match kind {
            SeriesKind::Labeled => &self.conf.labeled,
            SeriesKind::Unlabeled => &self.conf.unlabeled,
        }
    }

    /// Ingests all currently discovered input files of one kind.
    ///
    /// `max_series` overrides the configured `maxSeriesPerRun` cap; both
    /// apply in single-core mode only. Per-file failures are recovered
    /// locally; an `Err` here is systemic and means no file was processed.
    pub async fn ingest(&self, kind: SeriesKind, max_series: Option<usize>) -> Result<RunSummary> {
        let cfg = self.kind_config(kind);
        info!("[Data Ingestion]: ingesting {} series", kind);

        let mut files = discover_files(cfg, kind)?;
        let mut summary = RunSummary::new(kind);
        summary.discovered = files.len();
        if files.is_empty() {
            info!("No {} series found in the input directory, stopping ingestion", kind);
            return Ok(summary);
        }
        info!("Found {} {} series in the input directory", files.len(), kind);

        // The duplicate set only matters when duplicates are dropped; seed it
        // from the full existing store so re-ingested content is recognized
        // across runs.
        let mut detector = DuplicateDetector::new();
        if cfg.duplicated_policy == DuplicatedPolicy::Drop {
            let seeded = detector.seed_from_store(cfg, kind)?;
            if seeded > 0 {
                info!("Seeded the duplicate set with {} stored {} series", seeded, kind);
            }
        }

        let ids = Arc::new(SeriesIdAllocator::new(
            &self.conf.default_label,
            self.conf.starting_index,
        ));
        let parser = SeriesParser::new(cfg.clone(), kind, self.conf.sample_size, ids);
        let evaluator = QualityEvaluator::new(cfg, self.conf.sample_size);
        let filler = NullFiller::new(cfg.null_filling_strategy);
        let mut writer = AcceptanceWriter {
            detector,
            router: OutputRouter::new(cfg),
            duplicated_policy: cfg.duplicated_policy,
            malformed_policy: cfg.malformed_policy,
        };

        let workers = self.worker_count(files.len());
        if workers > 1 {
            if max_series.is_some() || self.conf.max_series_per_run > 0 {
                warn!(
                    "Limiting the number of series per run has no effect in multi-core mode: \
                     all discovered series will be processed"
                );
            }
            self.ingest_parallel(files, workers, parser, evaluator, filler, &mut writer, &mut summary)
                .await;
        } else {
            let cap = max_series.unwrap_or(self.conf.max_series_per_run);
            if cap > 0 && files.len() > cap {
                info!(
                    "Limiting the run to the first {} of {} discovered series",
                    cap,
                    files.len()
                );
                files.truncate(cap);
            }
            for (index, path) in files.iter().enumerate() {
                info!(
                    "Processing {} series \"{}\" ({}/{})",
                    kind,
                    path.file_name().unwrap_or_default().to_string_lossy(),
                    index + 1,
                    files.len()
                );
                let outcome = process_file(&parser, &evaluator, &filler, path);
                writer.route(
                    ProcessedFile {
                        path: path.clone(),
                        outcome,
                    },
                    &mut summary,
                );
            }
        }

        record_metrics(&summary);
        info!(
            "Processed {} series summary: accepted: {}, duplicated: {}, malformed: {} ({} saved, \
             {} dropped), store errors: {}",
            kind,
            summary.accepted,
            summary.duplicated,
            summary.malformed(),
            summary.malformed_saved,
            summary.malformed_dropped,
            summary.store_errors
        );
        Ok(summary)
    }

    /// Fans files out to a bounded pool of blocking workers; outcomes funnel
    /// into the single writer over an mpsc channel.
    #[allow(clippy::too_many_arguments)]
    async fn ingest_parallel(
        &self,
        files: Vec<PathBuf>,
        workers: usize,
        parser: SeriesParser,
        evaluator: QualityEvaluator,
        filler: NullFiller,
        writer: &mut AcceptanceWriter,
        summary: &mut RunSummary,
    ) {
        info!("Processing with {} parallel workers", workers);
        let (tx, mut rx) = mpsc::channel::<ProcessedFile>(64);

        let chunk_size = files.len().div_ceil(workers);
        let mut handles = Vec::with_capacity(workers);
        for chunk in files.chunks(chunk_size) {
            let chunk: Vec<PathBuf> = chunk.to_vec();
            let tx = tx.clone();
            let parser = parser.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                for path in chunk {
                    let outcome = process_file(&parser, &evaluator, &filler, &path);
                    if tx.blocking_send(ProcessedFile { path, outcome }).is_err() {
                        // Writer side is gone; nothing useful left to do.
                        break;
                    }
                }
            }));
        }
        drop(tx);

        // Single-writer discipline: only this loop touches the duplicate set
        // and the stores.
        while let Some(file) = rx.recv().await {
            writer.route(file, summary);
        }
        for handle in handles {
            if let Err(e) = handle.await {
                error!("A series worker task failed: {}", e);
            }
        }
    }

    /// Pool size: `min(multiCoreLimit, available cores)` when the limit is
    /// set, else all available cores, never more than there are files.
    /// Multi-core mode with a single usable worker falls back to sequential.
    fn worker_count(&self, file_count: usize) -> usize {
        if !self.conf.multi_core_enable {
            return 1;
        }
        let available = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let limit = if self.conf.multi_core_limit > 0 {
            available.min(self.conf.multi_core_limit)
        } else {
            available
        };
        let workers = limit.min(file_count);
        if workers <= 1 {
            warn!(
                "Multi-core mode is enabled but a single worker is usable, falling back to \
                 sequential processing"
            );
        }
        workers
    }
}

/// Enumerates candidate files for one kind: regular files under the input
/// directory carrying the configured extension, in name order. Files of any
/// other extension are reported and ignored.
fn discover_files(cfg: &SeriesTypeConfig, kind: SeriesKind) -> Result<Vec<PathBuf>> {
    let mut series = Vec::new();
    let mut unexpected = Vec::new();
    for entry in fs::read_dir(&cfg.input_dir_path)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(cfg.input_file_extension.as_str()) {
            series.push(path);
        } else {
            unexpected.push(name);
        }
    }
    if !unexpected.is_empty() {
        warn!(
            "The {} input directory contains files of unexpected extension that will be \
             ignored: {:?}",
            kind, unexpected
        );
    }
    series.sort();
    Ok(series)
}

fn record_metrics(summary: &RunSummary) {
    let kind = summary.kind;
    counter!("ingest_runs_total", "kind" => kind).increment(1);
    counter!("ingest_series_accepted_total", "kind" => kind).increment(summary.accepted as u64);
    counter!("ingest_series_duplicated_total", "kind" => kind).increment(summary.duplicated as u64);
    counter!("ingest_series_malformed_total", "kind" => kind).increment(summary.malformed() as u64);
    counter!("ingest_store_errors_total", "kind" => kind).increment(summary.store_errors as u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FillStrategy;
    use std::io::Write;
    use tempfile::TempDir;

    fn test_cfg(dir: &TempDir) -> SeriesTypeConfig {
        SeriesTypeConfig {
            input_dir_path: dir.path().join("input"),
            input_file_extension: ".csv".to_string(),
            input_file_datetime_format: "%Y-%m-%d_%H.%M.%S".to_string(),
            input_series_separator: ",".to_string(),
            output_file_path: dir.path().join("output").join("series.csv"),
            output_series_separator: ",".to_string(),
            max_null_perc: 0.4,
            max_consec_null: 2,
            null_filling_strategy: FillStrategy::ZeroFill,
            duplicated_policy: DuplicatedPolicy::Drop,
            malformed_policy: MalformedPolicy::Save,
            malformed_output_dir_path: dir.path().join("malformed"),
        }
    }

    fn write_input(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let input_dir = dir.path().join("input");
        std::fs::create_dir_all(&input_dir).unwrap();
        let path = input_dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, "{}", content).unwrap();
        path
    }

    fn stages(cfg: &SeriesTypeConfig) -> (SeriesParser, QualityEvaluator, NullFiller) {
        let ids = Arc::new(SeriesIdAllocator::new("sample_", 1));
        (
            SeriesParser::new(cfg.clone(), SeriesKind::Unlabeled, 5, ids),
            QualityEvaluator::new(cfg, 5),
            NullFiller::new(cfg.null_filling_strategy),
        )
    }

    #[test]
    fn discover_files_filters_by_extension_and_sorts() {
        let dir = TempDir::new().unwrap();
        write_input(&dir, "2026-01-02_10.00.01.csv", "1,2,3,4,5\n");
        write_input(&dir, "2026-01-02_10.00.00.csv", "1,2,3,4,5\n");
        write_input(&dir, "notes.txt", "not a series\n");
        let cfg = test_cfg(&dir);

        let files = discover_files(&cfg, SeriesKind::Unlabeled).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec!["2026-01-02_10.00.00.csv", "2026-01-02_10.00.01.csv"]
        );
    }

    #[test]
    fn process_file_accepts_valid_series() {
        let dir = TempDir::new().unwrap();
        let path = write_input(&dir, "2026-01-02_10.00.00.csv", "1,,3,4,5\n");
        let cfg = test_cfg(&dir);
        let (parser, evaluator, filler) = stages(&cfg);

        match process_file(&parser, &evaluator, &filler, &path) {
            FileOutcome::Accepted(series) => {
                assert_eq!(series.samples, vec![1.0, 0.0, 3.0, 4.0, 5.0]);
            }
            FileOutcome::Rejected(reasons) => panic!("unexpected reject: {reasons:?}"),
        }
    }

    #[test]
    fn process_file_rejects_threshold_breach() {
        let dir = TempDir::new().unwrap();
        let path = write_input(&dir, "2026-01-02_10.00.00.csv", "1,,,,5\n");
        let cfg = test_cfg(&dir);
        let (parser, evaluator, filler) = stages(&cfg);

        match process_file(&parser, &evaluator, &filler, &path) {
            FileOutcome::Rejected(reasons) => {
                assert!(!reasons.is_empty());
            }
            FileOutcome::Accepted(_) => panic!("expected reject"),
        }
    }

    #[test]
    fn process_file_demotes_unfillable_series() {
        let dir = TempDir::new().unwrap();
        // Trailing NULL passes the thresholds but cannot be interpolated.
        let path = write_input(&dir, "2026-01-02_10.00.00.csv", "1,2,3,4,\n");
        let cfg = test_cfg(&dir);
        let ids = Arc::new(SeriesIdAllocator::new("sample_", 1));
        let parser = SeriesParser::new(cfg.clone(), SeriesKind::Unlabeled, 5, ids);
        let evaluator = QualityEvaluator::new(&cfg, 5);
        let filler = NullFiller::new(FillStrategy::LinearInterpolation);

        match process_file(&parser, &evaluator, &filler, &path) {
            FileOutcome::Rejected(reasons) => {
                assert_eq!(reasons, vec![RejectReason::UnfillableNull { position: 4 }]);
            }
            FileOutcome::Accepted(_) => panic!("expected reject"),
        }
    }

    #[test]
    fn writer_drops_duplicates_and_saves_malformed() {
        let dir = TempDir::new().unwrap();
        let cfg = test_cfg(&dir);
        let raw = write_input(&dir, "2026-01-02_10.00.00.csv", "bad content\n");
        let mut writer = AcceptanceWriter {
            detector: DuplicateDetector::new(),
            router: OutputRouter::new(&cfg),
            duplicated_policy: DuplicatedPolicy::Drop,
            malformed_policy: MalformedPolicy::Save,
        };
        let mut summary = RunSummary::new(SeriesKind::Unlabeled);

        let series = FilledSeries {
            id: "sample_1".to_string(),
            timestamp: chrono::NaiveDateTime::default(),
            samples: vec![1.0, 2.0, 3.0],
            label: None,
        };
        writer.route(
            ProcessedFile {
                path: raw.clone(),
                outcome: FileOutcome::Accepted(series.clone()),
            },
            &mut summary,
        );
        writer.route(
            ProcessedFile {
                path: raw.clone(),
                outcome: FileOutcome::Accepted(series),
            },
            &mut summary,
        );
        writer.route(
            ProcessedFile {
                path: raw.clone(),
                outcome: FileOutcome::Rejected(vec![RejectReason::EmptyFile]),
            },
            &mut summary,
        );

        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.duplicated, 1);
        assert_eq!(summary.malformed_saved, 1);

        let store = std::fs::read_to_string(&cfg.output_file_path).unwrap();
        assert_eq!(store.lines().count(), 1);
        assert!(cfg
            .malformed_output_dir_path
            .join("2026-01-02_10.00.00.csv")
            .is_file());
    }
}
