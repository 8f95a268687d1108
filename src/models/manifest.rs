//! Pipeline artifact manifest schema.
//!
//! A trained pipeline ships as a JSON manifest describing the feature schema it
//! was trained on, its class labels, and the model itself: either a path to an
//! ONNX export or an inline decision-tree ensemble.

use crate::types::schema::{FeatureKind, FeatureSchema, FeatureSpec, Imputation};
use serde::Deserialize;
use serde_json::Value;

/// Expected value of [`PipelineManifest::schema_version`] for the current format.
pub const PIPELINE_MANIFEST_SCHEMA_VERSION: &str = "batch_inference_pipeline_v1";

/// Top-level pipeline manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineManifest {
    /// Schema version tag (must be `"batch_inference_pipeline_v1"`).
    pub schema_version: String,
    /// Pipeline name, for logs.
    #[serde(default)]
    pub name: Option<String>,
    /// Features in model input order.
    pub features: Vec<FeatureEntry>,
    /// Class labels in probability column order. Empty for regressors.
    #[serde(default)]
    pub classes: Vec<Value>,
    /// The trained model.
    pub model: ModelEntry,
    /// Optional training provenance metadata.
    #[serde(default)]
    pub training: Option<Value>,
}

/// One feature as declared in the manifest.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureEntry {
    pub name: String,
    pub kind: FeatureKind,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Fill value: a number for numeric/integer features, a category otherwise.
    #[serde(default)]
    pub impute: Option<Value>,
    /// Known categories; numbers are accepted and compared as text.
    #[serde(default)]
    pub categories: Vec<Value>,
}

/// Model section of the manifest.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ModelEntry {
    /// ONNX export of the pipeline, relative to the manifest directory.
    Onnx { path: String },
    /// Inline tree ensemble.
    Forest {
        trees: Vec<TreeEntry>,
        /// Per-tree weights; equal weights when empty.
        #[serde(default)]
        weights: Vec<f64>,
    },
}

/// A single decision tree, nodes indexed from the root at 0.
#[derive(Debug, Clone, Deserialize)]
pub struct TreeEntry {
    pub nodes: Vec<NodeEntry>,
}

/// Tree node: a threshold split or a leaf with a class distribution.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum NodeEntry {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        missing_left: bool,
    },
    Leaf {
        value: Vec<f64>,
    },
}

impl PipelineManifest {
    /// Parse a manifest from JSON bytes and check its version.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let manifest: Self =
            serde_json::from_slice(bytes).map_err(|e| format!("invalid manifest JSON: {e}"))?;
        if manifest.schema_version != PIPELINE_MANIFEST_SCHEMA_VERSION {
            return Err(format!(
                "unsupported manifest schema_version: '{}' (expected '{}')",
                manifest.schema_version, PIPELINE_MANIFEST_SCHEMA_VERSION
            ));
        }
        Ok(manifest)
    }

    /// Build the typed feature schema.
    pub fn schema(&self) -> Result<FeatureSchema, String> {
        let features = self
            .features
            .iter()
            .map(FeatureEntry::to_spec)
            .collect::<Result<Vec<_>, _>>()?;
        FeatureSchema::new(features)
    }

    /// Class labels as text.
    pub fn class_names(&self) -> Result<Vec<String>, String> {
        self.classes
            .iter()
            .map(|c| label_text(c).ok_or_else(|| format!("invalid class label {c}")))
            .collect()
    }
}

impl FeatureEntry {
    fn to_spec(&self) -> Result<FeatureSpec, String> {
        let categories = self
            .categories
            .iter()
            .map(|c| {
                label_text(c).ok_or_else(|| {
                    format!("feature '{}': invalid category {c}", self.name)
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let impute = match &self.impute {
            None | Some(Value::Null) => None,
            Some(value) => Some(self.imputation(value)?),
        };

        Ok(FeatureSpec {
            name: self.name.clone(),
            kind: self.kind,
            aliases: self.aliases.clone(),
            impute,
            categories,
        })
    }

    fn imputation(&self, value: &Value) -> Result<Imputation, String> {
        let invalid = || format!("feature '{}': invalid imputation value {value}", self.name);
        match self.kind {
            FeatureKind::Numeric => value.as_f64().map(Imputation::Number).ok_or_else(invalid),
            FeatureKind::Integer => value
                .as_i64()
                .or_else(|| {
                    value
                        .as_f64()
                        .filter(|x| x.fract() == 0.0)
                        .map(|x| x as i64)
                })
                .map(Imputation::Integer)
                .ok_or_else(invalid),
            FeatureKind::Categorical => label_text(value)
                .map(Imputation::Category)
                .ok_or_else(invalid),
        }
    }
}

/// Text form of a label or category; integral numbers lose their fraction.
fn label_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i.to_string())
            } else {
                let x = n.as_f64()?;
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    Some((x as i64).to_string())
                } else {
                    Some(x.to_string())
                }
            }
        }
        _ => None,
    }
}
