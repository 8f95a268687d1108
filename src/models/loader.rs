//! Pipeline artifact loader

use crate::error::{Error, Result};
use crate::models::forest::ForestModel;
use crate::models::manifest::{ModelEntry, PipelineManifest};
use crate::models::onnx::OnnxModel;
use crate::types::schema::FeatureSchema;
use std::path::Path;
use tracing::{debug, info};

/// The trained model inside a pipeline artifact
pub enum Model {
    Onnx(OnnxModel),
    Forest(ForestModel),
}

impl Model {
    pub fn kind(&self) -> &'static str {
        match self {
            Model::Onnx(_) => "onnx",
            Model::Forest(_) => "forest",
        }
    }
}

/// Loaded pipeline with its schema and classes
pub struct LoadedPipeline {
    /// Pipeline name
    pub name: String,
    /// Feature schema the model was trained on
    pub schema: FeatureSchema,
    /// Class labels, in probability column order
    pub classes: Vec<String>,
    /// The model itself
    pub model: Model,
}

/// Loader for pipeline artifacts
#[derive(Debug, Clone)]
pub struct ArtifactLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl Default for ArtifactLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ArtifactLoader {
    /// Create a new loader with default settings (1 thread)
    pub fn new() -> Self {
        Self::with_threads(1)
    }

    /// Create a new loader with the given ONNX thread count
    pub fn with_threads(onnx_threads: usize) -> Self {
        Self {
            onnx_threads: onnx_threads.max(1),
        }
    }

    /// Load a pipeline artifact from its manifest file.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<LoadedPipeline> {
        let path = path.as_ref();

        info!(path = %path.display(), "Loading pipeline artifact");

        let bytes = std::fs::read(path).map_err(|e| Error::artifact(path, e.to_string()))?;
        let manifest =
            PipelineManifest::from_slice(&bytes).map_err(|e| Error::artifact(path, e))?;

        let schema = manifest.schema().map_err(|e| Error::artifact(path, e))?;
        let classes = manifest
            .class_names()
            .map_err(|e| Error::artifact(path, e))?;

        let model = match &manifest.model {
            ModelEntry::Onnx { path: model_path } => {
                let model_path = path
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(model_path);
                debug!(model = %model_path.display(), "Resolved ONNX model path");
                if !model_path.is_file() {
                    return Err(Error::artifact(
                        path,
                        format!("ONNX model not found: {}", model_path.display()),
                    ));
                }
                Model::Onnx(OnnxModel::load(&model_path, &schema, self.onnx_threads)?)
            }
            ModelEntry::Forest { trees, weights } => Model::Forest(
                ForestModel::new(trees, weights, schema.len(), classes.len())
                    .map_err(|e| Error::artifact(path, e))?,
            ),
        };

        let name = manifest.name.clone().unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "pipeline".to_string())
        });

        info!(
            pipeline = %name,
            model = model.kind(),
            features = schema.len(),
            classes = ?classes,
            "Pipeline loaded successfully"
        );

        Ok(LoadedPipeline {
            name,
            schema,
            classes,
            model,
        })
    }
}
