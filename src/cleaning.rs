//! Cleaning stage: raw records into the feature schema a trained pipeline expects.
//!
//! Policy, applied per feature column:
//! - columns are matched by exact name, then by alias, then (optionally) ignoring
//!   case and surrounding whitespace; unmatched raw columns are dropped
//! - empty cells and configured markers (`NA`, `null`, ...) become missing
//! - values that cannot be coerced to the feature's dtype become missing
//! - missing cells take the feature's imputation value when it has one
//! - categorical values outside the trained categories go to the unknown bucket
//!
//! A feature whose column is absent is filled with its imputation value, or the
//! run fails with a schema mismatch when it has none.

use crate::config::CleaningConfig;
use crate::error::{Error, Result};
use crate::types::cleaned::{CleanedColumn, CleanedTable, ColumnData, IdColumn};
use crate::types::schema::{FeatureKind, FeatureSchema, FeatureSpec, Imputation};
use crate::types::table::{RawTable, RawValue};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// A raw cell after missing-value normalization.
#[derive(Debug, Clone, PartialEq)]
enum Cell<'a> {
    Missing,
    Number(f64),
    Text(&'a str),
}

/// Counters for one cleaned feature column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnReport {
    pub feature: String,
    /// Raw column the feature was read from; `None` when filled from its default
    pub source_column: Option<String>,
    /// Values that could not be coerced to the feature's dtype
    pub malformed: usize,
    /// Missing cells filled with the imputation value
    pub imputed: usize,
    /// Categorical values mapped to the unknown bucket
    pub unseen: usize,
    /// Cells still missing after imputation
    pub missing: usize,
}

/// What the cleaning stage did to the raw table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleaningReport {
    pub columns: Vec<ColumnReport>,
    /// Raw columns that matched no feature
    pub dropped_columns: Vec<String>,
}

impl CleaningReport {
    pub fn total_malformed(&self) -> usize {
        self.columns.iter().map(|c| c.malformed).sum()
    }

    pub fn total_imputed(&self) -> usize {
        self.columns.iter().map(|c| c.imputed).sum()
    }

    pub fn total_unseen(&self) -> usize {
        self.columns.iter().map(|c| c.unseen).sum()
    }
}

/// Transforms raw records into a [`CleanedTable`] aligned to a [`FeatureSchema`].
pub struct Cleaner {
    missing_markers: HashSet<String>,
    unknown_category: String,
    case_insensitive_headers: bool,
    id_column: Option<String>,
}

impl Cleaner {
    /// Create a cleaner with the given policy.
    pub fn new(policy: &CleaningConfig) -> Self {
        Self {
            missing_markers: policy.missing_markers.iter().cloned().collect(),
            unknown_category: policy.unknown_category.clone(),
            case_insensitive_headers: policy.case_insensitive_headers,
            id_column: None,
        }
    }

    /// Carry this raw column through as the row identifier, when present.
    pub fn with_id_column(mut self, id_column: Option<String>) -> Self {
        self.id_column = id_column;
        self
    }

    pub fn unknown_category(&self) -> &str {
        &self.unknown_category
    }

    /// Clean a raw table.
    pub fn clean(&self, raw: RawTable, schema: &FeatureSchema) -> Result<CleanedTable> {
        self.clean_with_report(raw, schema).map(|(table, _)| table)
    }

    /// Clean a raw table and report per-column counters.
    pub fn clean_with_report(
        &self,
        raw: RawTable,
        schema: &FeatureSchema,
    ) -> Result<(CleanedTable, CleaningReport)> {
        let sources = self.resolve_columns(&raw, schema)?;

        let mut columns = Vec::with_capacity(schema.len());
        let mut report = CleaningReport::default();

        for (spec, source) in schema.features().iter().zip(&sources) {
            let (data, column_report) = match source {
                Some(idx) => self.clean_column(&raw, *idx, spec),
                None => fill_absent_column(raw.n_rows(), spec)?,
            };

            if column_report.malformed > 0 {
                warn!(
                    feature = %spec.name,
                    malformed = column_report.malformed,
                    "Values not coercible to {} were treated as missing",
                    spec.kind
                );
            }
            if column_report.unseen > 0 {
                info!(
                    feature = %spec.name,
                    unseen = column_report.unseen,
                    bucket = %self.unknown_category,
                    "Unseen categories mapped to the unknown bucket"
                );
            }

            columns.push(CleanedColumn {
                name: spec.name.clone(),
                data,
            });
            report.columns.push(column_report);
        }

        let used: HashSet<usize> = sources.iter().flatten().copied().collect();
        let id = self.id_values(&raw, schema);
        report.dropped_columns = raw
            .headers()
            .iter()
            .enumerate()
            .filter(|(idx, header)| {
                !used.contains(idx) && id.as_ref().map(|id| &id.name) != Some(*header)
            })
            .map(|(_, header)| header.clone())
            .collect();

        if !report.dropped_columns.is_empty() {
            debug!(dropped = ?report.dropped_columns, "Raw columns not used by the pipeline");
        }

        let table = CleanedTable::new(columns, id)?;
        table.ensure_conforms(schema)?;

        info!(
            rows = table.n_rows(),
            columns = table.n_cols(),
            malformed = report.total_malformed(),
            imputed = report.total_imputed(),
            unseen = report.total_unseen(),
            "Records cleaned"
        );

        Ok((table, report))
    }

    /// Map each feature to a raw column index.
    ///
    /// Fails listing every feature that is absent and has no default.
    fn resolve_columns(
        &self,
        raw: &RawTable,
        schema: &FeatureSchema,
    ) -> Result<Vec<Option<usize>>> {
        let mut sources = Vec::with_capacity(schema.len());
        let mut claimed: Vec<(usize, &str)> = Vec::new();
        let mut absent = Vec::new();

        for spec in schema.features() {
            let source = self.find_column(raw, spec);
            if let Some(idx) = source {
                if let Some((_, other)) = claimed.iter().find(|(i, _)| *i == idx) {
                    return Err(Error::SchemaMismatch(format!(
                        "raw column '{}' matches both feature '{}' and feature '{}'",
                        raw.headers()[idx],
                        other,
                        spec.name
                    )));
                }
                claimed.push((idx, spec.name.as_str()));
                if raw.headers()[idx] != spec.name {
                    debug!(
                        feature = %spec.name,
                        column = %raw.headers()[idx],
                        "Raw column renamed to feature"
                    );
                }
            } else if !spec.has_default() {
                absent.push(spec.name.as_str());
            }
            sources.push(source);
        }

        if !absent.is_empty() {
            return Err(Error::SchemaMismatch(format!(
                "missing required feature columns with no default: {}",
                absent.join(", ")
            )));
        }

        Ok(sources)
    }

    fn find_column(&self, raw: &RawTable, spec: &FeatureSpec) -> Option<usize> {
        let candidates: Vec<&str> = std::iter::once(spec.name.as_str())
            .chain(spec.aliases.iter().map(String::as_str))
            .collect();

        if let Some(idx) = candidates.iter().find_map(|c| raw.column_index(c)) {
            return Some(idx);
        }

        if self.case_insensitive_headers {
            let wanted: Vec<String> = candidates
                .iter()
                .map(|c| c.trim().to_lowercase())
                .collect();
            return raw
                .headers()
                .iter()
                .position(|h| wanted.contains(&h.trim().to_lowercase()));
        }

        None
    }

    fn normalize<'a>(&self, value: &'a RawValue) -> Cell<'a> {
        match value {
            RawValue::Missing => Cell::Missing,
            RawValue::Number(x) if x.is_nan() => Cell::Missing,
            RawValue::Number(x) => Cell::Number(*x),
            RawValue::Text(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() || self.missing_markers.contains(trimmed) {
                    Cell::Missing
                } else {
                    Cell::Text(trimmed)
                }
            }
        }
    }

    fn clean_column(
        &self,
        raw: &RawTable,
        idx: usize,
        spec: &FeatureSpec,
    ) -> (ColumnData, ColumnReport) {
        let mut report = ColumnReport {
            feature: spec.name.clone(),
            source_column: Some(raw.headers()[idx].clone()),
            ..ColumnReport::default()
        };
        let cells = raw.column(idx).map(|v| self.normalize(v));

        let data = match spec.kind {
            FeatureKind::Numeric => {
                let fill = match &spec.impute {
                    Some(Imputation::Number(x)) => Some(*x),
                    Some(Imputation::Integer(i)) => Some(*i as f64),
                    _ => None,
                };
                let values = cells
                    .map(|cell| {
                        let value = coerce_numeric(&cell);
                        if value.is_none() && cell != Cell::Missing {
                            report.malformed += 1;
                        }
                        impute(value, &fill, &mut report)
                    })
                    .collect();
                ColumnData::Numeric(values)
            }
            FeatureKind::Integer => {
                let fill = match &spec.impute {
                    Some(Imputation::Integer(i)) => Some(*i),
                    _ => None,
                };
                let values = cells
                    .map(|cell| {
                        let value = coerce_integer(&cell);
                        if value.is_none() && cell != Cell::Missing {
                            report.malformed += 1;
                        }
                        impute(value, &fill, &mut report)
                    })
                    .collect();
                ColumnData::Integer(values)
            }
            FeatureKind::Categorical => {
                let fill = match &spec.impute {
                    Some(Imputation::Category(c)) => Some(c.clone()),
                    _ => None,
                };
                let values = cells
                    .map(|cell| {
                        let value = coerce_category(&cell).map(|category| {
                            if spec.is_known_category(&category) {
                                category
                            } else {
                                report.unseen += 1;
                                self.unknown_category.clone()
                            }
                        });
                        impute(value, &fill, &mut report)
                    })
                    .collect();
                ColumnData::Categorical(values)
            }
        };

        report.missing = data.missing_count();
        (data, report)
    }

    fn id_values(&self, raw: &RawTable, schema: &FeatureSchema) -> Option<IdColumn> {
        let name = self.id_column.as_deref()?;
        if schema.get(name).is_some() {
            return None;
        }
        let idx = raw.column_index(name)?;
        Some(IdColumn {
            name: name.to_string(),
            values: raw.column(idx).map(|v| v.to_string()).collect(),
        })
    }
}

impl Default for Cleaner {
    fn default() -> Self {
        Self::new(&CleaningConfig::default())
    }
}

fn impute<T: Clone>(value: Option<T>, fill: &Option<T>, report: &mut ColumnReport) -> Option<T> {
    match (value, fill) {
        (Some(v), _) => Some(v),
        (None, Some(f)) => {
            report.imputed += 1;
            Some(f.clone())
        }
        (None, None) => None,
    }
}

fn coerce_numeric(cell: &Cell<'_>) -> Option<f64> {
    let value = match cell {
        Cell::Missing => return None,
        Cell::Number(x) => *x,
        Cell::Text(text) => text.parse::<f64>().ok()?,
    };
    value.is_finite().then_some(value)
}

fn coerce_integer(cell: &Cell<'_>) -> Option<i64> {
    if let Cell::Text(text) = cell {
        if let Ok(i) = text.parse::<i64>() {
            return Some(i);
        }
    }
    let value = coerce_numeric(cell)?;
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.fract() == 0.0 && in_range).then_some(value as i64)
}

fn coerce_category(cell: &Cell<'_>) -> Option<String> {
    match cell {
        Cell::Missing => None,
        Cell::Text(text) => Some(text.to_string()),
        Cell::Number(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e15 => {
            Some(format!("{}", *x as i64))
        }
        Cell::Number(x) => Some(x.to_string()),
    }
}

fn fill_absent_column(n_rows: usize, spec: &FeatureSpec) -> Result<(ColumnData, ColumnReport)> {
    let data = match (&spec.kind, &spec.impute) {
        (FeatureKind::Numeric, Some(Imputation::Number(x))) => {
            ColumnData::Numeric(vec![Some(*x); n_rows])
        }
        (FeatureKind::Numeric, Some(Imputation::Integer(i))) => {
            ColumnData::Numeric(vec![Some(*i as f64); n_rows])
        }
        (FeatureKind::Integer, Some(Imputation::Integer(i))) => {
            ColumnData::Integer(vec![Some(*i); n_rows])
        }
        (FeatureKind::Categorical, Some(Imputation::Category(c))) => {
            ColumnData::Categorical(vec![Some(c.clone()); n_rows])
        }
        _ => {
            return Err(Error::SchemaMismatch(format!(
                "feature '{}' is absent and has no usable default",
                spec.name
            )))
        }
    };

    info!(feature = %spec.name, rows = n_rows, "Absent feature column filled with its default");

    let report = ColumnReport {
        feature: spec.name.clone(),
        source_column: None,
        imputed: n_rows,
        ..ColumnReport::default()
    };
    Ok((data, report))
}
