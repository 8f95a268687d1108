//! Batch run: load → artifact → clean → infer → write.

use crate::cleaning::Cleaner;
use crate::config::{AppConfig, RunConfig};
use crate::error::{Error, Stage, StageError};
use crate::models::inference::InferenceRunner;
use crate::models::loader::ArtifactLoader;
use crate::reader::load_csv;
use crate::summary::{log_preview, RunSummary};
use crate::writer::{write_csv, OutputTable};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunReport {
    /// File the output was written to
    pub output: PathBuf,
    /// Rows written (equals the input row count)
    pub rows_written: usize,
    pub summary: RunSummary,
}

/// Executes one batch run. Each stage hands its output to the next; the first
/// failure stops the run before anything is written.
pub struct BatchRunner<'a> {
    app: &'a AppConfig,
}

impl<'a> BatchRunner<'a> {
    pub fn new(app: &'a AppConfig) -> Self {
        Self { app }
    }

    pub fn run(&self, run: &RunConfig) -> Result<RunReport, StageError> {
        let mut summary = RunSummary::new();

        info!(csv = %run.csv.display(), "Stage: load");
        let raw = timed(&mut summary, Stage::Load, || load_csv(&run.csv))?;
        summary.raw_shape = raw.shape();

        info!(artifact = %run.artifact.display(), "Stage: artifact");
        let loader = ArtifactLoader::with_threads(self.app.models.onnx_threads);
        let pipeline = timed(&mut summary, Stage::Artifact, || loader.load(&run.artifact))?;
        summary.pipeline = pipeline.name.clone();

        info!("Stage: clean");
        let cleaner = Cleaner::new(&self.app.cleaning).with_id_column(run.id_column.clone());
        let cleaned = timed(&mut summary, Stage::Clean, || {
            cleaner.clean(raw, &pipeline.schema)
        })?;
        summary.cleaned_shape = cleaned.shape();

        info!("Stage: infer");
        let predictions = timed(&mut summary, Stage::Infer, || {
            InferenceRunner::new(&pipeline).run(&cleaned)
        })?;
        summary.record_predictions(&predictions);

        info!(out = %run.out.display(), "Stage: write");
        let rows_written = timed(&mut summary, Stage::Write, || {
            let output = OutputTable::build(&cleaned, &predictions, &self.app.output)?;
            write_csv(&output, &run.out)?;
            Ok(output.n_rows())
        })?;

        log_preview(&cleaned, &predictions, run.preview_rows);
        summary.print_summary();

        Ok(RunReport {
            output: run.out.clone(),
            rows_written,
            summary,
        })
    }
}

/// Run one stage, recording its wall time and tagging any error with the stage.
fn timed<T>(
    summary: &mut RunSummary,
    stage: Stage,
    f: impl FnOnce() -> Result<T, Error>,
) -> Result<T, StageError> {
    let start = Instant::now();
    let result = f();
    summary.record_stage(stage, start.elapsed());
    result.map_err(|e| StageError::new(stage, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_OUTPUT_PATH;
    use std::path::Path;

    const MANIFEST: &str = r#"{
        "schema_version": "batch_inference_pipeline_v1",
        "name": "random_forest_pipeline",
        "features": [
            {"name": "LIMIT_BAL", "kind": "numeric", "impute": 50000},
            {"name": "SEX", "kind": "categorical", "categories": [1, 2], "impute": 2},
            {"name": "AGE", "kind": "integer", "impute": 35}
        ],
        "classes": [0, 1],
        "model": {
            "type": "forest",
            "trees": [
                {"nodes": [
                    {"feature": 2, "threshold": 30, "left": 1, "right": 2},
                    {"value": [1, 3]},
                    {"value": [4, 1]}
                ]},
                {"nodes": [
                    {"feature": 0, "threshold": 100000, "left": 1, "right": 2},
                    {"value": [1, 1]},
                    {"value": [9, 1]}
                ]}
            ]
        }
    }"#;

    const CSV: &str = "\
ID,LIMIT_BAL,SEX,AGE,default payment next month
1,20000,2,24,1
2,120000,2,26,1
3,90000,2,34,0
4,50000,1,NA,0
5,oops,3,57,0
";

    fn fixtures(dir: &Path) -> (PathBuf, PathBuf) {
        let csv = dir.join("test_inferencia.csv");
        let pkl = dir.join("random_forest_pipeline.pkl");
        std::fs::write(&csv, CSV).unwrap();
        std::fs::write(&pkl, MANIFEST).unwrap();
        (csv, pkl)
    }

    #[test]
    fn test_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let (csv, pkl) = fixtures(dir.path());
        let out = dir.path().join(DEFAULT_OUTPUT_PATH);

        let app = AppConfig::default();
        let report = BatchRunner::new(&app)
            .run(&RunConfig::new(&csv, &pkl).with_output(&out))
            .unwrap();

        assert_eq!(report.rows_written, 5);
        assert_eq!(report.summary.pipeline, "random_forest_pipeline");
        assert_eq!(report.summary.raw_shape, (5, 5));
        assert_eq!(report.summary.cleaned_shape, (5, 3));
        assert_eq!(report.summary.stage_times.len(), 5);

        let written = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(
            lines[0],
            "ID,LIMIT_BAL,SEX,AGE,Prediccion,Probabilidad_No_Default,Probabilidad_Default"
        );
        // Rows keep input order
        let ids: Vec<&str> = lines[1..]
            .iter()
            .map(|l| l.split(',').next().unwrap())
            .collect();
        assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);
        // Missing AGE imputed; malformed LIMIT_BAL imputed; unseen SEX bucketed
        assert!(lines[4].starts_with("4,50000,1,35,"));
        assert!(lines[5].starts_with("5,50000,__unknown__,57,"));
        // AGE 24 and LIMIT_BAL 20000: (0.75 + 0.5) / 2 for class 1
        assert_eq!(lines[1], "1,20000,2,24,1,0.375,0.625");
    }

    #[test]
    fn test_runs_are_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let (csv, pkl) = fixtures(dir.path());
        let app = AppConfig::default();

        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        BatchRunner::new(&app)
            .run(&RunConfig::new(&csv, &pkl).with_output(&first))
            .unwrap();
        BatchRunner::new(&app)
            .run(&RunConfig::new(&csv, &pkl).with_output(&second))
            .unwrap();

        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    }

    #[test]
    fn test_missing_required_column_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let (csv, _) = fixtures(dir.path());
        let pkl = dir.path().join("strict.pkl");
        std::fs::write(&pkl, MANIFEST.replace(", \"impute\": 35", "")).unwrap();
        std::fs::write(&csv, "ID,LIMIT_BAL,SEX\n1,20000,2\n").unwrap();
        let out = dir.path().join("out.csv");

        let app = AppConfig::default();
        let err = BatchRunner::new(&app)
            .run(&RunConfig::new(&csv, &pkl).with_output(&out))
            .unwrap_err();

        assert_eq!(err.stage, Stage::Clean);
        assert!(matches!(err.source, Error::SchemaMismatch(_)));
        assert!(err.to_string().contains("AGE"));
        assert!(!out.exists());
    }

    #[test]
    fn test_unwritable_output_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let (csv, pkl) = fixtures(dir.path());
        let out = dir.path().join("missing_dir").join("out.csv");

        let app = AppConfig::default();
        let err = BatchRunner::new(&app)
            .run(&RunConfig::new(&csv, &pkl).with_output(&out))
            .unwrap_err();

        assert_eq!(err.stage, Stage::Write);
        assert!(matches!(err.source, Error::Io { .. }));
    }

    #[test]
    fn test_corrupt_artifact_is_artifact_error() {
        let dir = tempfile::tempdir().unwrap();
        let (csv, pkl) = fixtures(dir.path());
        std::fs::write(&pkl, b"\x80\x04\x95").unwrap();

        let app = AppConfig::default();
        let err = BatchRunner::new(&app)
            .run(&RunConfig::new(&csv, &pkl).with_output(dir.path().join("out.csv")))
            .unwrap_err();

        assert_eq!(err.stage, Stage::Artifact);
        assert!(matches!(err.source, Error::ArtifactLoad { .. }));
    }

    #[test]
    fn test_header_only_csv_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let (csv, pkl) = fixtures(dir.path());
        std::fs::write(&csv, "ID,LIMIT_BAL,SEX,AGE\n").unwrap();
        let out = dir.path().join("out.csv");

        let app = AppConfig::default();
        let report = BatchRunner::new(&app)
            .run(&RunConfig::new(&csv, &pkl).with_output(&out))
            .unwrap();

        assert_eq!(report.rows_written, 0);
        assert_eq!(std::fs::read_to_string(&out).unwrap().lines().count(), 1);
    }
}
