//! Run summary: table shapes, prediction statistics and stage timings.

use crate::error::Stage;
use crate::types::cleaned::CleanedTable;
use crate::types::prediction::Predictions;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::info;

/// Statistics collected over one run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Pipeline that produced the predictions
    pub pipeline: String,
    /// Raw input shape (rows, columns)
    pub raw_shape: (usize, usize),
    /// Cleaned table shape (rows, feature columns)
    pub cleaned_shape: (usize, usize),
    /// Number of predictions written
    pub predictions: usize,
    /// Prediction count per label, sorted by label text
    pub distribution: BTreeMap<String, usize>,
    /// Positive-class probability histogram, 10 buckets over [0, 1]
    pub score_buckets: Option<[u64; 10]>,
    /// Wall time per stage, in execution order
    pub stage_times: Vec<(Stage, Duration)>,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record how long a stage took
    pub fn record_stage(&mut self, stage: Stage, elapsed: Duration) {
        self.stage_times.push((stage, elapsed));
    }

    /// Record prediction statistics
    pub fn record_predictions(&mut self, predictions: &Predictions) {
        self.predictions = predictions.len();

        self.distribution.clear();
        for label in &predictions.labels {
            *self.distribution.entry(label.to_string()).or_insert(0) += 1;
        }

        self.score_buckets = predictions
            .probabilities
            .as_ref()
            .map(|probs| score_histogram(&probs.positive_scores()));
    }

    /// Total wall time over all recorded stages
    pub fn total_time(&self) -> Duration {
        self.stage_times.iter().map(|(_, d)| *d).sum()
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              BATCH INFERENCE - RUN SUMMARY                   ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Pipeline: {}", self.pipeline);
        info!(
            "║ Raw table:     {:>8} rows x {:>4} columns",
            self.raw_shape.0, self.raw_shape.1
        );
        info!(
            "║ Cleaned table: {:>8} rows x {:>4} features",
            self.cleaned_shape.0, self.cleaned_shape.1
        );
        info!("║ Predictions:   {:>8}", self.predictions);
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Prediction Distribution:                                     ║");
        for (label, count) in &self.distribution {
            info!(
                "║   {:10}: {:>8} ({:>5.1}%)",
                label,
                count,
                percent(*count as u64, self.predictions as u64)
            );
        }

        if let Some(buckets) = &self.score_buckets {
            info!("╠══════════════════════════════════════════════════════════════╣");
            info!("║ Positive-Class Probability Distribution:                     ║");
            let total: u64 = buckets.iter().sum();
            for (i, &count) in buckets.iter().enumerate() {
                let pct = percent(count, total);
                let bar: String = "█".repeat(((pct / 2.0) as usize).min(20));
                info!(
                    "║   {:.1}-{:.1}: {:>8} ({:>5.1}%) {}",
                    i as f64 / 10.0,
                    (i + 1) as f64 / 10.0,
                    count,
                    pct,
                    bar
                );
            }
        }

        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Stage Times (ms):                                            ║");
        for (stage, elapsed) in &self.stage_times {
            info!("║   {:10}: {:>10.2}", stage.to_string(), elapsed.as_secs_f64() * 1000.0);
        }
        info!(
            "║   {:10}: {:>10.2}",
            "total",
            self.total_time().as_secs_f64() * 1000.0
        );
        info!("╚══════════════════════════════════════════════════════════════╝");
    }
}

/// Bucket probabilities into ten equal-width bins; 1.0 lands in the last bin.
/// Non-finite scores are not counted.
pub fn score_histogram(scores: &[f64]) -> [u64; 10] {
    let mut buckets = [0u64; 10];
    for &score in scores.iter().filter(|s| s.is_finite()) {
        let bucket = (score.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        buckets[bucket] += 1;
    }
    buckets
}

fn percent(count: u64, total: u64) -> f64 {
    if total > 0 {
        (count as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

/// First `n` rows of identifier (or row number), prediction and positive-class
/// probability.
pub fn preview_lines(cleaned: &CleanedTable, predictions: &Predictions, n: usize) -> Vec<String> {
    let scores = predictions
        .probabilities
        .as_ref()
        .map(|probs| probs.positive_scores());

    predictions
        .labels
        .iter()
        .take(n)
        .enumerate()
        .map(|(row, label)| {
            let id = match cleaned.id_column() {
                Some(id) => format!("{}={}", id.name, id.values[row]),
                None => format!("row={}", row),
            };
            match &scores {
                Some(scores) => format!("{} prediction={} probability={:.4}", id, label, scores[row]),
                None => format!("{} prediction={}", id, label),
            }
        })
        .collect()
}

/// Log the preview rows
pub fn log_preview(cleaned: &CleanedTable, predictions: &Predictions, n: usize) {
    if n == 0 || predictions.is_empty() {
        return;
    }
    info!(rows = n.min(predictions.len()), "Prediction preview");
    for line in preview_lines(cleaned, predictions, n) {
        info!("  {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cleaned::{CleanedColumn, ColumnData, IdColumn};
    use crate::types::prediction::{ClassProbabilities, Label};

    fn predictions() -> Predictions {
        Predictions::new(vec![Label::Class(1), Label::Class(0), Label::Class(1)]).with_probabilities(
            ClassProbabilities {
                classes: vec!["0".into(), "1".into()],
                rows: vec![vec![0.25, 0.75], vec![0.95, 0.05], vec![0.0, 1.0]],
            },
        )
    }

    #[test]
    fn test_score_histogram() {
        let buckets = score_histogram(&[0.0, 0.05, 0.55, 0.99, 1.0, f64::NAN]);
        assert_eq!(buckets[0], 2);
        assert_eq!(buckets[5], 1);
        assert_eq!(buckets[9], 2);
        assert_eq!(buckets.iter().sum::<u64>(), 5);
    }

    #[test]
    fn test_record_predictions() {
        let mut summary = RunSummary::new();
        summary.record_predictions(&predictions());

        assert_eq!(summary.predictions, 3);
        assert_eq!(summary.distribution.get("1"), Some(&2));
        assert_eq!(summary.distribution.get("0"), Some(&1));
        let buckets = summary.score_buckets.unwrap();
        assert_eq!(buckets[0], 1);
        assert_eq!(buckets[7], 1);
        assert_eq!(buckets[9], 1);
    }

    #[test]
    fn test_stage_times() {
        let mut summary = RunSummary::new();
        summary.record_stage(Stage::Load, Duration::from_millis(5));
        summary.record_stage(Stage::Infer, Duration::from_millis(7));
        assert_eq!(summary.total_time(), Duration::from_millis(12));
        summary.print_summary();
    }

    #[test]
    fn test_preview_lines() {
        let cleaned = CleanedTable::new(
            vec![CleanedColumn {
                name: "AGE".to_string(),
                data: ColumnData::Integer(vec![Some(25), Some(40), Some(33)]),
            }],
            Some(IdColumn {
                name: "ID".to_string(),
                values: vec!["a1".into(), "a2".into(), "a3".into()],
            }),
        )
        .unwrap();

        let lines = preview_lines(&cleaned, &predictions(), 2);
        assert_eq!(
            lines,
            vec![
                "ID=a1 prediction=1 probability=0.7500",
                "ID=a2 prediction=0 probability=0.0500",
            ]
        );
    }
}
