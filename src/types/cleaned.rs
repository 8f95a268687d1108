//! Cleaned records aligned to a feature schema

use crate::error::{Error, Result};
use crate::types::schema::{FeatureKind, FeatureSchema, FeatureSpec};

/// Typed values of one cleaned column. `None` is the missing sentinel.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Integer(Vec<Option<i64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnData {
    pub fn kind(&self) -> FeatureKind {
        match self {
            ColumnData::Numeric(_) => FeatureKind::Numeric,
            ColumnData::Integer(_) => FeatureKind::Integer,
            ColumnData::Categorical(_) => FeatureKind::Categorical,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Integer(v) => v.len(),
            ColumnData::Categorical(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of missing cells.
    pub fn missing_count(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Integer(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Categorical(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    /// Text written to the output CSV for one cell; missing is empty.
    pub fn cell_text(&self, row: usize) -> String {
        match self {
            ColumnData::Numeric(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Integer(v) => v[row].map(|x| x.to_string()).unwrap_or_default(),
            ColumnData::Categorical(v) => v[row].clone().unwrap_or_default(),
        }
    }

    /// Model input value for one cell.
    pub fn encode(&self, row: usize, spec: &FeatureSpec) -> f32 {
        match self {
            ColumnData::Numeric(v) => v[row].map(|x| x as f32).unwrap_or(f32::NAN),
            ColumnData::Integer(v) => v[row].map(|x| x as f32).unwrap_or(f32::NAN),
            ColumnData::Categorical(v) => v[row]
                .as_deref()
                .map(|c| spec.category_code(c))
                .unwrap_or(f32::NAN),
        }
    }
}

/// A cleaned feature column.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedColumn {
    pub name: String,
    pub data: ColumnData,
}

/// Identifier column carried through cleaning untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct IdColumn {
    pub name: String,
    pub values: Vec<String>,
}

/// Records after cleaning: one typed column per schema feature, rows in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedTable {
    columns: Vec<CleanedColumn>,
    id: Option<IdColumn>,
    n_rows: usize,
}

impl CleanedTable {
    /// Assemble a table; all columns must have the same length.
    pub fn new(columns: Vec<CleanedColumn>, id: Option<IdColumn>) -> Result<Self> {
        let n_rows = columns
            .first()
            .map(|c| c.data.len())
            .or_else(|| id.as_ref().map(|id| id.values.len()))
            .unwrap_or(0);

        for column in &columns {
            if column.data.len() != n_rows {
                return Err(Error::SchemaMismatch(format!(
                    "column '{}' has {} rows, expected {}",
                    column.name,
                    column.data.len(),
                    n_rows
                )));
            }
        }
        if let Some(id) = &id {
            if id.values.len() != n_rows {
                return Err(Error::SchemaMismatch(format!(
                    "identifier column '{}' has {} rows, expected {}",
                    id.name,
                    id.values.len(),
                    n_rows
                )));
            }
        }

        Ok(Self {
            columns,
            id,
            n_rows,
        })
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of feature columns (the identifier is not counted).
    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows, self.n_cols())
    }

    pub fn columns(&self) -> &[CleanedColumn] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&CleanedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn id_column(&self) -> Option<&IdColumn> {
        self.id.as_ref()
    }

    /// Check names, order and dtypes against the schema.
    pub fn ensure_conforms(&self, schema: &FeatureSchema) -> Result<()> {
        if self.columns.len() != schema.len() {
            return Err(Error::SchemaMismatch(format!(
                "cleaned table has {} feature columns, pipeline expects {}",
                self.columns.len(),
                schema.len()
            )));
        }

        let mut problems = Vec::new();
        for (column, spec) in self.columns.iter().zip(schema.features()) {
            if column.name != spec.name {
                problems.push(format!(
                    "expected column '{}', found '{}'",
                    spec.name, column.name
                ));
            } else if column.data.kind() != spec.kind {
                problems.push(format!(
                    "column '{}' is {}, pipeline expects {}",
                    column.name,
                    column.data.kind(),
                    spec.kind
                ));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::SchemaMismatch(problems.join("; ")))
        }
    }

    /// Row-major `[rows, features]` model input.
    pub fn feature_matrix(&self, schema: &FeatureSchema) -> Vec<f32> {
        let mut matrix = Vec::with_capacity(self.n_rows * self.columns.len());
        for row in 0..self.n_rows {
            for (column, spec) in self.columns.iter().zip(schema.features()) {
                matrix.push(column.data.encode(row, spec));
            }
        }
        matrix
    }

    /// Encoded values of a single feature column.
    pub fn feature_column(&self, idx: usize, spec: &FeatureSpec) -> Vec<f32> {
        let data = &self.columns[idx].data;
        (0..self.n_rows).map(|row| data.encode(row, spec)).collect()
    }
}
