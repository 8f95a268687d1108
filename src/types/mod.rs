//! Type definitions for the batch inference run

pub mod cleaned;
pub mod prediction;
pub mod schema;
pub mod table;

pub use cleaned::{CleanedColumn, CleanedTable, ColumnData, IdColumn};
pub use prediction::{ClassProbabilities, Label, Predictions};
pub use schema::{FeatureKind, FeatureSchema, FeatureSpec, Imputation};
pub use table::{RawTable, RawValue};
