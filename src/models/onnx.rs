//! ONNX Runtime execution of an exported pipeline

use crate::error::{Error, Result};
use crate::types::cleaned::CleanedTable;
use crate::types::prediction::{ClassProbabilities, Label, Predictions};
use crate::types::schema::FeatureSchema;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionInputValue};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Loaded ONNX session with its input/output names
pub struct OnnxModel {
    /// `Session::run` takes `&mut self`; predictions only need `&self`
    session: Mutex<Session>,
    /// Input names, in session order
    input_names: Vec<String>,
    /// Output holding predicted labels
    label_output: String,
    /// Output holding class probabilities, if the model exports one
    probability_output: Option<String>,
}

impl OnnxModel {
    /// Load an ONNX model and check its inputs against the schema.
    pub fn load(path: &Path, schema: &FeatureSchema, onnx_threads: usize) -> Result<Self> {
        ort::init()
            .with_name("batch_inference")
            .commit()
            .map_err(|e| Error::artifact(path, format!("ONNX Runtime init failed: {e}")))?;

        info!(path = %path.display(), threads = onnx_threads, "Loading ONNX model");

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(onnx_threads))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| Error::artifact(path, format!("ONNX Runtime could not load model: {e}")))?;

        let input_names: Vec<String> = session.inputs.iter().map(|i| i.name.clone()).collect();
        let output_names: Vec<String> = session.outputs.iter().map(|o| o.name.clone()).collect();

        check_inputs(&input_names, schema).map_err(|e| Error::artifact(path, e))?;
        let (label_output, probability_output) =
            select_outputs(&output_names).map_err(|e| Error::artifact(path, e))?;

        info!(
            inputs = ?input_names,
            label = %label_output,
            probabilities = ?probability_output,
            "ONNX model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_names,
            label_output,
            probability_output,
        })
    }

    /// Run the model over every row of the cleaned table.
    pub fn predict(
        &self,
        table: &CleanedTable,
        schema: &FeatureSchema,
        classes: &[String],
    ) -> Result<Predictions> {
        let n_rows = table.n_rows();
        if n_rows == 0 {
            let predictions = Predictions::new(Vec::new());
            return Ok(if classes.is_empty() || self.probability_output.is_none() {
                predictions
            } else {
                predictions.with_probabilities(ClassProbabilities {
                    classes: classes.to_vec(),
                    rows: Vec::new(),
                })
            });
        }

        let inputs = self.build_inputs(table, schema)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| Error::inference("ONNX session lock poisoned", e))?;
        let outputs = session
            .run(inputs)
            .map_err(|e| Error::inference("ONNX Runtime rejected the input", e))?;

        let label_value = outputs.get(self.label_output.as_str()).ok_or_else(|| {
            Error::inference("missing model output", &self.label_output)
        })?;
        let labels = extract_labels(label_value)?;

        let mut predictions = Predictions::new(labels);
        if let Some(name) = &self.probability_output {
            match outputs.get(name.as_str()) {
                Some(value) => {
                    let probabilities = extract_probabilities(value, n_rows, classes)?;
                    predictions = predictions.with_probabilities(probabilities);
                }
                None => warn!(output = %name, "Probability output not produced by the model"),
            }
        }

        debug!(rows = n_rows, "ONNX inference complete");
        Ok(predictions)
    }

    /// One `[rows, features]` tensor for single-input models, otherwise one
    /// `[rows, 1]` tensor per feature selected by input name.
    fn build_inputs(
        &self,
        table: &CleanedTable,
        schema: &FeatureSchema,
    ) -> Result<Vec<(String, SessionInputValue<'static>)>> {
        let n_rows = table.n_rows() as i64;

        if let [name] = self.input_names.as_slice() {
            let shape = vec![n_rows, schema.len() as i64];
            let tensor = Tensor::from_array((shape, table.feature_matrix(schema)))
                .map_err(|e| Error::inference("failed to create input tensor", e))?;
            return Ok(vec![(name.clone(), tensor.into())]);
        }

        self.input_names
            .iter()
            .map(|name| {
                let idx = schema.position(name).ok_or_else(|| {
                    Error::inference("model input is not a schema feature", name)
                })?;
                let column = table.feature_column(idx, &schema.features()[idx]);
                let tensor = Tensor::from_array((vec![n_rows, 1], column))
                    .map_err(|e| Error::inference("failed to create input tensor", e))?;
                Ok((name.clone(), tensor.into()))
            })
            .collect()
    }
}

/// Either one matrix input, or one input per schema feature.
fn check_inputs(input_names: &[String], schema: &FeatureSchema) -> std::result::Result<(), String> {
    match input_names.len() {
        0 => Err("model declares no inputs".to_string()),
        1 => Ok(()),
        _ => {
            let unknown: Vec<&str> = input_names
                .iter()
                .filter(|n| schema.position(n).is_none())
                .map(String::as_str)
                .collect();
            if !unknown.is_empty() {
                return Err(format!(
                    "model inputs not declared as features: {}",
                    unknown.join(", ")
                ));
            }
            if input_names.len() != schema.len() {
                return Err(format!(
                    "model has {} inputs, manifest declares {} features",
                    input_names.len(),
                    schema.len()
                ));
            }
            Ok(())
        }
    }
}

/// Pick the label output and, if present, the probability output.
fn select_outputs(
    output_names: &[String],
) -> std::result::Result<(String, Option<String>), String> {
    let probability = output_names.iter().find(|n| n.contains("prob")).cloned();
    let label = output_names
        .iter()
        .find(|n| n.contains("label"))
        .or_else(|| {
            output_names
                .iter()
                .find(|n| Some(n.as_str()) != probability.as_deref())
        })
        .cloned()
        .ok_or_else(|| "model declares no label output".to_string())?;
    Ok((label, probability))
}

/// Labels from an int64 (class ids) or float (regression) tensor.
fn extract_labels(value: &DynValue) -> Result<Vec<Label>> {
    if let Ok((_, data)) = value.try_extract_tensor::<i64>() {
        return Ok(data.iter().map(|&c| Label::Class(c)).collect());
    }
    if let Ok((_, data)) = value.try_extract_tensor::<f32>() {
        return Ok(data.iter().map(|&v| Label::Value(f64::from(v))).collect());
    }
    if let Ok((_, data)) = value.try_extract_tensor::<f64>() {
        return Ok(data.iter().map(|&v| Label::Value(v)).collect());
    }
    Err(Error::inference(
        "unsupported label output type",
        format!("{:?}", value.dtype()),
    ))
}

/// Probabilities from a `[rows, classes]` tensor or a `seq(map(int64, float))`.
fn extract_probabilities(
    value: &DynValue,
    n_rows: usize,
    classes: &[String],
) -> Result<ClassProbabilities> {
    if let Ok((shape, data)) = value.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        let rows = probability_rows(&dims, data, n_rows)
            .map_err(|e| Error::inference("malformed probability output", e))?;
        let classes = class_names(classes, rows.first().map(Vec::len).unwrap_or(0));
        return Ok(ClassProbabilities { classes, rows });
    }

    if DynSequenceValueType::can_downcast(&value.dtype()) {
        let maps = extract_sequence_maps(value)?;
        let (keys, rows) = rows_from_class_maps(maps)
            .map_err(|e| Error::inference("malformed probability output", e))?;
        let classes = if classes.len() == keys.len() {
            classes.to_vec()
        } else {
            keys.iter().map(i64::to_string).collect()
        };
        return Ok(ClassProbabilities { classes, rows });
    }

    Err(Error::inference(
        "unsupported probability output type",
        format!("{:?}", value.dtype()),
    ))
}

/// Key/value pairs of every map in a `seq(map(int64, float))` output.
fn extract_sequence_maps(value: &DynValue) -> Result<Vec<Vec<(i64, f32)>>> {
    let allocator = Allocator::default();

    let sequence = value
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| Error::inference("failed to downcast to sequence", e))?;
    let maps = sequence
        .try_extract_sequence::<DynMapValueType>(&allocator)
        .map_err(|e| Error::inference("failed to read probability sequence", e))?;

    maps.iter()
        .map(|map| {
            map.try_extract_key_values::<i64, f32>()
                .map_err(|e| Error::inference("failed to read probability map", e))
        })
        .collect()
}

/// Split a flat probability tensor into one row per record.
pub(crate) fn probability_rows(
    dims: &[i64],
    data: &[f32],
    n_rows: usize,
) -> std::result::Result<Vec<Vec<f64>>, String> {
    let n_classes = match dims {
        [rows, classes] if *rows as usize == n_rows => *classes as usize,
        [len] if *len as usize == n_rows => 1,
        _ => {
            return Err(format!(
                "shape {:?} does not match {} rows",
                dims, n_rows
            ))
        }
    };
    if n_classes == 0 || data.len() != n_rows * n_classes {
        return Err(format!(
            "{} values for shape {:?}",
            data.len(),
            dims
        ));
    }
    Ok(data
        .chunks(n_classes)
        .map(|row| row.iter().map(|&p| f64::from(p)).collect())
        .collect())
}

/// Turn per-row class maps into rows ordered by class id.
pub(crate) fn rows_from_class_maps(
    maps: Vec<Vec<(i64, f32)>>,
) -> std::result::Result<(Vec<i64>, Vec<Vec<f64>>), String> {
    let mut keys: Vec<i64> = maps
        .first()
        .map(|m| m.iter().map(|(k, _)| *k).collect())
        .unwrap_or_default();
    keys.sort_unstable();

    let rows = maps
        .into_iter()
        .enumerate()
        .map(|(i, mut map)| {
            map.sort_by_key(|(k, _)| *k);
            let row_keys: Vec<i64> = map.iter().map(|(k, _)| *k).collect();
            if row_keys != keys {
                return Err(format!("row {i} has classes {:?}, expected {:?}", row_keys, keys));
            }
            Ok(map.into_iter().map(|(_, p)| f64::from(p)).collect())
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok((keys, rows))
}

/// Declared class names when they fit, otherwise class indices.
fn class_names(declared: &[String], n_classes: usize) -> Vec<String> {
    if declared.len() == n_classes {
        declared.to_vec()
    } else {
        (0..n_classes).map(|i| i.to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::schema::FeatureSpec;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_probability_rows_from_matrix() {
        let rows = probability_rows(&[2, 2], &[0.9, 0.1, 0.4, 0.6], 2).unwrap();
        assert_eq!(rows.len(), 2);
        assert!((rows[1][1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_probability_rows_single_column() {
        let rows = probability_rows(&[3], &[0.1, 0.2, 0.3], 3).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].len(), 1);
    }

    #[test]
    fn test_probability_rows_shape_mismatch() {
        let err = probability_rows(&[4, 2], &[0.0; 8], 3).unwrap_err();
        assert!(err.contains("does not match 3 rows"));
    }

    #[test]
    fn test_rows_from_class_maps_sorted_by_class() {
        let maps = vec![vec![(1, 0.3), (0, 0.7)], vec![(0, 0.2), (1, 0.8)]];
        let (keys, rows) = rows_from_class_maps(maps).unwrap();
        assert_eq!(keys, vec![0, 1]);
        assert!((rows[0][0] - 0.7).abs() < 1e-6);
        assert!((rows[1][1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_rows_from_class_maps_inconsistent() {
        let maps = vec![vec![(0, 0.5), (1, 0.5)], vec![(0, 1.0)]];
        assert!(rows_from_class_maps(maps).is_err());
    }

    #[test]
    fn test_select_outputs() {
        let (label, prob) =
            select_outputs(&names(&["output_label", "output_probability"])).unwrap();
        assert_eq!(label, "output_label");
        assert_eq!(prob.as_deref(), Some("output_probability"));

        let (label, prob) = select_outputs(&names(&["variable"])).unwrap();
        assert_eq!(label, "variable");
        assert!(prob.is_none());
    }

    #[test]
    fn test_check_inputs() {
        let schema = FeatureSchema::new(vec![
            FeatureSpec::numeric("LIMIT_BAL"),
            FeatureSpec::integer("AGE"),
        ])
        .unwrap();

        assert!(check_inputs(&names(&["float_input"]), &schema).is_ok());
        assert!(check_inputs(&names(&["AGE", "LIMIT_BAL"]), &schema).is_ok());
        let err = check_inputs(&names(&["AGE", "PAY_0"]), &schema).unwrap_err();
        assert!(err.contains("PAY_0"));
        assert!(check_inputs(&[], &schema).is_err());
    }

    #[test]
    fn test_class_names_fallback() {
        assert_eq!(class_names(&names(&["no", "yes"]), 2), vec!["no", "yes"]);
        assert_eq!(class_names(&[], 3), vec!["0", "1", "2"]);
    }
}
