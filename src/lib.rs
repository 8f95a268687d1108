//! Batch Inference Library
//!
//! Loads a trained classification pipeline, cleans a CSV of raw records into
//! the feature schema the pipeline was trained on, predicts every row, and
//! writes the cleaned table with its predictions.

pub mod cleaning;
pub mod config;
pub mod error;
pub mod models;
pub mod reader;
pub mod runner;
pub mod summary;
pub mod types;
pub mod writer;

pub use cleaning::Cleaner;
pub use config::{AppConfig, RunConfig};
pub use error::{Error, Result, Stage, StageError};
pub use models::{ArtifactLoader, InferenceRunner, LoadedPipeline, Pipeline};
pub use runner::{BatchRunner, RunReport};
pub use types::{CleanedTable, FeatureSchema, Predictions, RawTable};
