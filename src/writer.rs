//! Output writer: cleaned table plus predictions, written as CSV

use crate::config::OutputConfig;
use crate::error::{Error, Result};
use crate::types::cleaned::CleanedTable;
use crate::types::prediction::{ClassProbabilities, Predictions};
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info, warn};

/// Output records, one per input row, rendered as text.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl OutputTable {
    /// Identifier column (if any), cleaned columns, prediction column, then
    /// probability columns.
    pub fn build(
        cleaned: &CleanedTable,
        predictions: &Predictions,
        config: &OutputConfig,
    ) -> Result<Self> {
        predictions
            .check_rows(cleaned.n_rows())
            .map_err(Error::Inference)?;

        let mut headers = Vec::with_capacity(cleaned.n_cols() + 4);
        if let Some(id) = cleaned.id_column() {
            headers.push(id.name.clone());
        }
        headers.extend(cleaned.columns().iter().map(|c| c.name.clone()));
        headers.push(config.prediction_column.clone());

        match &predictions.probabilities {
            Some(probs) => headers.extend(probability_columns(probs, config)),
            None => warn!("Pipeline provides no class probabilities; no probability columns written"),
        }

        let rows = (0..cleaned.n_rows())
            .map(|row| {
                let mut record = Vec::with_capacity(headers.len());
                if let Some(id) = cleaned.id_column() {
                    record.push(id.values[row].clone());
                }
                record.extend(cleaned.columns().iter().map(|c| c.data.cell_text(row)));
                record.push(predictions.labels[row].to_string());
                if let Some(probs) = &predictions.probabilities {
                    record.extend(probs.rows[row].iter().map(|p| p.to_string()));
                }
                record
            })
            .collect();

        let table = Self { headers, rows };
        debug!(
            rows = table.n_rows(),
            columns = table.headers.len(),
            "Output table assembled"
        );
        Ok(table)
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }
}

/// Column names for the class probabilities.
fn probability_columns(probs: &ClassProbabilities, config: &OutputConfig) -> Vec<String> {
    match probs.n_classes() {
        1 => vec![config.probability_prefix.clone()],
        2 => config.binary_probability_columns.to_vec(),
        _ => probs
            .classes
            .iter()
            .map(|class| format!("{}_{}", config.probability_prefix, class))
            .collect(),
    }
}

/// Write the output table, replacing any existing file at `path`.
///
/// Rows go to a temporary file in the destination directory which is then
/// renamed over the target, so a failed write leaves nothing behind.
pub fn write_csv<P: AsRef<Path>>(output: &OutputTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| Error::io(path, e))?;
    {
        let mut writer = csv::Writer::from_writer(BufWriter::new(tmp.as_file()));
        writer
            .write_record(&output.headers)
            .map_err(|e| Error::io(path, e.into()))?;
        for record in &output.rows {
            writer
                .write_record(record)
                .map_err(|e| Error::io(path, e.into()))?;
        }
        writer.flush().map_err(|e| Error::io(path, e))?;
    }
    tmp.as_file().sync_all().map_err(|e| Error::io(path, e))?;
    tmp.persist(path).map_err(|e| Error::io(path, e.error))?;

    info!(
        path = %path.display(),
        rows = output.n_rows(),
        columns = output.headers.len(),
        "Output CSV written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::cleaned::{CleanedColumn, ColumnData, IdColumn};
    use crate::types::prediction::Label;

    fn cleaned() -> CleanedTable {
        CleanedTable::new(
            vec![
                CleanedColumn {
                    name: "LIMIT_BAL".to_string(),
                    data: ColumnData::Numeric(vec![Some(20000.0), None]),
                },
                CleanedColumn {
                    name: "SEX".to_string(),
                    data: ColumnData::Categorical(vec![
                        Some("2".to_string()),
                        Some("__unknown__".to_string()),
                    ]),
                },
            ],
            Some(IdColumn {
                name: "ID".to_string(),
                values: vec!["7".to_string(), "9".to_string()],
            }),
        )
        .unwrap()
    }

    fn predictions(classes: &[&str], rows: Vec<Vec<f64>>) -> Predictions {
        Predictions::new(vec![Label::Class(1), Label::Class(0)]).with_probabilities(
            ClassProbabilities {
                classes: classes.iter().map(|c| c.to_string()).collect(),
                rows,
            },
        )
    }

    #[test]
    fn test_binary_layout() {
        let preds = predictions(&["0", "1"], vec![vec![0.25, 0.75], vec![0.8, 0.2]]);
        let table = OutputTable::build(&cleaned(), &preds, &OutputConfig::default()).unwrap();

        assert_eq!(
            table.headers(),
            &[
                "ID",
                "LIMIT_BAL",
                "SEX",
                "Prediccion",
                "Probabilidad_No_Default",
                "Probabilidad_Default"
            ]
        );
        assert_eq!(table.rows()[0], vec!["7", "20000", "2", "1", "0.25", "0.75"]);
        assert_eq!(table.rows()[1], vec!["9", "", "__unknown__", "0", "0.8", "0.2"]);
    }

    #[test]
    fn test_multiclass_and_single_probability_columns() {
        let config = OutputConfig::default();
        let probs = ClassProbabilities {
            classes: vec!["a".into(), "b".into(), "c".into()],
            rows: vec![],
        };
        assert_eq!(
            probability_columns(&probs, &config),
            vec!["Probabilidad_a", "Probabilidad_b", "Probabilidad_c"]
        );

        let probs = ClassProbabilities {
            classes: vec!["score".into()],
            rows: vec![],
        };
        assert_eq!(probability_columns(&probs, &config), vec!["Probabilidad"]);
    }

    #[test]
    fn test_no_probabilities() {
        let preds = Predictions::new(vec![Label::Value(1.5), Label::Value(-2.0)]);
        let table = OutputTable::build(&cleaned(), &preds, &OutputConfig::default()).unwrap();

        assert_eq!(table.headers().last().unwrap(), "Prediccion");
        assert_eq!(table.rows()[1][3], "-2");
    }

    #[test]
    fn test_write_overwrites_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "stale contents that are longer than the new output\n".repeat(20))
            .unwrap();

        let preds = predictions(&["0", "1"], vec![vec![0.25, 0.75], vec![0.8, 0.2]]);
        let table = OutputTable::build(&cleaned(), &preds, &OutputConfig::default()).unwrap();
        write_csv(&table, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(!written.contains("stale"));
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "ID,LIMIT_BAL,SEX,Prediccion,Probabilidad_No_Default,Probabilidad_Default"
        );
        assert_eq!(lines[2], "9,,__unknown__,0,0.8,0.2");
    }

    #[test]
    fn test_write_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("no_such_dir").join("out.csv");

        let preds = predictions(&["0", "1"], vec![vec![0.25, 0.75], vec![0.8, 0.2]]);
        let table = OutputTable::build(&cleaned(), &preds, &OutputConfig::default()).unwrap();
        let err = write_csv(&table, &path).unwrap_err();

        assert!(matches!(err, Error::Io { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn test_prediction_count_mismatch() {
        let preds = Predictions::new(vec![Label::Class(1)]);
        let err = OutputTable::build(&cleaned(), &preds, &OutputConfig::default()).unwrap_err();
        assert!(matches!(err, Error::Inference(_)));
    }
}
