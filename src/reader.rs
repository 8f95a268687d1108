//! Input loader: raw CSV into a [`RawTable`]

use crate::error::{Error, Result};
use crate::types::table::{RawTable, RawValue};
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::{debug, info};

/// Read a comma-delimited CSV with a header row.
pub fn load_csv<P: AsRef<Path>>(path: P) -> Result<RawTable> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.to_string())
        .collect();
    validate_headers(path, &headers)?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| csv_error(path, e))?;
        rows.push(record.iter().map(RawValue::from_field).collect());
    }

    let table = RawTable::new(headers, rows).map_err(|e| Error::parse(path, e))?;

    info!(
        path = %path.display(),
        rows = table.n_rows(),
        columns = table.n_cols(),
        "Input CSV loaded"
    );
    debug!(headers = ?table.headers(), "Input columns");

    Ok(table)
}

fn validate_headers(path: &Path, headers: &[String]) -> Result<()> {
    // An empty file yields a single empty header
    if headers.is_empty() || (headers.len() == 1 && headers[0].trim().is_empty()) {
        return Err(Error::parse(path, "missing header row"));
    }
    if let Some(pos) = headers.iter().position(|h| h.trim().is_empty()) {
        return Err(Error::parse(
            path,
            format!("header column {} has an empty name", pos + 1),
        ));
    }

    let mut seen = HashSet::new();
    for header in headers {
        if !seen.insert(header.as_str()) {
            return Err(Error::parse(path, format!("duplicate column '{}'", header)));
        }
    }
    Ok(())
}

fn csv_error(path: &Path, err: csv::Error) -> Error {
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(io) => Error::io(path, io),
        _ => Error::parse(path, message),
    }
}
