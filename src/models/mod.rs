//! Pipeline artifacts and model inference

pub mod aggregator;
pub mod forest;
pub mod inference;
pub mod loader;
pub mod manifest;
pub mod onnx;

pub use aggregator::ProbabilityAggregator;
pub use inference::{InferenceRunner, Pipeline};
pub use loader::{ArtifactLoader, LoadedPipeline, Model};
