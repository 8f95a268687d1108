//! Raw tabular records as read from the input CSV

use std::fmt;

/// A single raw cell.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// Empty field
    Missing,
    /// Field that parses as a number
    Number(f64),
    /// Anything else, kept exactly as read
    Text(String),
}

impl RawValue {
    /// Classify a CSV field.
    pub fn from_field(field: &str) -> Self {
        if field.is_empty() {
            return RawValue::Missing;
        }
        match field.trim().parse::<f64>() {
            Ok(value) => RawValue::Number(value),
            Err(_) => RawValue::Text(field.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, RawValue::Missing)
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawValue::Missing => Ok(()),
            RawValue::Number(value) => write!(f, "{}", value),
            RawValue::Text(text) => f.write_str(text),
        }
    }
}

/// The parsed input CSV: a header plus rows in file order.
///
/// Every row has exactly one value per header column.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    headers: Vec<String>,
    rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    /// Build a table, rejecting rows whose width differs from the header.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<RawValue>>) -> Result<Self, String> {
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != headers.len())
        {
            return Err(format!(
                "row {} has {} fields, header has {}",
                idx + 1,
                row.len(),
                headers.len()
            ));
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<RawValue>] {
        &self.rows
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.headers.len()
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        (self.n_rows(), self.n_cols())
    }

    /// Position of a column by exact name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Values of one column, in row order.
    pub fn column(&self, idx: usize) -> impl Iterator<Item = &RawValue> + '_ {
        self.rows.iter().map(move |row| &row[idx])
    }
}
