//! Prediction data structures

use std::fmt;

/// A predicted value for one row.
#[derive(Debug, Clone, PartialEq)]
pub enum Label {
    /// Integer class id
    Class(i64),
    /// Regression output, or a float-encoded class
    Value(f64),
    /// Named class
    Text(String),
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Class(c) => write!(f, "{}", c),
            Label::Value(v) => write!(f, "{}", v),
            Label::Text(t) => f.write_str(t),
        }
    }
}

/// Per-row class probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassProbabilities {
    /// Class names, one per column
    pub classes: Vec<String>,
    /// One probability vector per row
    pub rows: Vec<Vec<f64>>,
}

impl ClassProbabilities {
    pub fn n_classes(&self) -> usize {
        self.classes.len()
    }

    /// Probability of the positive class: column 1 when there are at least two
    /// classes, otherwise the single column.
    pub fn positive_scores(&self) -> Vec<f64> {
        let col = if self.n_classes() >= 2 { 1 } else { 0 };
        self.rows
            .iter()
            .map(|row| row.get(col).copied().unwrap_or(f64::NAN))
            .collect()
    }
}

/// Output of a pipeline: one label per cleaned row, in row order.
#[derive(Debug, Clone, PartialEq)]
pub struct Predictions {
    pub labels: Vec<Label>,
    pub probabilities: Option<ClassProbabilities>,
}

impl Predictions {
    pub fn new(labels: Vec<Label>) -> Self {
        Self {
            labels,
            probabilities: None,
        }
    }

    pub fn with_probabilities(mut self, probabilities: ClassProbabilities) -> Self {
        self.probabilities = Some(probabilities);
        self
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Check that labels and probabilities both cover `n_rows` rows.
    pub fn check_rows(&self, n_rows: usize) -> Result<(), String> {
        if self.labels.len() != n_rows {
            return Err(format!(
                "pipeline returned {} predictions for {} rows",
                self.labels.len(),
                n_rows
            ));
        }
        if let Some(probs) = &self.probabilities {
            if probs.rows.len() != n_rows {
                return Err(format!(
                    "pipeline returned {} probability rows for {} rows",
                    probs.rows.len(),
                    n_rows
                ));
            }
            if let Some(row) = probs.rows.iter().find(|r| r.len() != probs.n_classes()) {
                return Err(format!(
                    "probability row has {} values for {} classes",
                    row.len(),
                    probs.n_classes()
                ));
            }
        }
        Ok(())
    }
}
