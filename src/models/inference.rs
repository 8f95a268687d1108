//! Batch inference over a cleaned table

use crate::error::{Error, Result};
use crate::models::aggregator::ProbabilityAggregator;
use crate::models::forest::ForestModel;
use crate::models::loader::{LoadedPipeline, Model};
use crate::types::cleaned::CleanedTable;
use crate::types::prediction::{ClassProbabilities, Label, Predictions};
use crate::types::schema::FeatureSchema;
use std::time::Instant;
use tracing::{debug, info};

/// A trained pipeline that maps cleaned rows to predictions.
pub trait Pipeline {
    /// Name used in logs and the run summary
    fn name(&self) -> &str;

    /// Features the pipeline was trained on, in input order
    fn schema(&self) -> &FeatureSchema;

    /// Class labels, in probability column order (empty for regressors)
    fn classes(&self) -> &[String];

    /// One prediction per row of `table`, in row order
    fn predict(&self, table: &CleanedTable) -> Result<Predictions>;
}

impl Pipeline for LoadedPipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn predict(&self, table: &CleanedTable) -> Result<Predictions> {
        match &self.model {
            Model::Onnx(model) => model.predict(table, &self.schema, &self.classes),
            Model::Forest(forest) => Ok(predict_forest(forest, table, &self.schema, &self.classes)),
        }
    }
}

/// Forest predictions: argmax label plus the averaged distribution.
fn predict_forest(
    forest: &ForestModel,
    table: &CleanedTable,
    schema: &FeatureSchema,
    classes: &[String],
) -> Predictions {
    let rows = forest.predict_proba(&table.feature_matrix(schema));
    let labels = rows
        .iter()
        .map(|dist| class_label(&classes[ProbabilityAggregator::argmax(dist)]))
        .collect();

    Predictions::new(labels).with_probabilities(ClassProbabilities {
        classes: classes.to_vec(),
        rows,
    })
}

/// Integer class names become class ids; anything else stays text.
fn class_label(class: &str) -> Label {
    class
        .parse::<i64>()
        .map(Label::Class)
        .unwrap_or_else(|_| Label::Text(class.to_string()))
}

/// Runs a pipeline over a cleaned table and checks its output.
pub struct InferenceRunner<'a> {
    pipeline: &'a dyn Pipeline,
}

impl<'a> InferenceRunner<'a> {
    pub fn new(pipeline: &'a dyn Pipeline) -> Self {
        Self { pipeline }
    }

    /// Predict every row. The table must match the pipeline schema exactly,
    /// and the pipeline must return exactly one prediction per row.
    pub fn run(&self, table: &CleanedTable) -> Result<Predictions> {
        table.ensure_conforms(self.pipeline.schema())?;

        let start = Instant::now();
        let predictions = self.pipeline.predict(table)?;
        predictions
            .check_rows(table.n_rows())
            .map_err(Error::Inference)?;

        debug!(
            pipeline = %self.pipeline.name(),
            has_probabilities = predictions.probabilities.is_some(),
            "Pipeline output validated"
        );
        info!(
            pipeline = %self.pipeline.name(),
            rows = table.n_rows(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Inference complete"
        );

        Ok(predictions)
    }
}
