//! Delimited text tables using the csv crate

use std::path::Path;

use crate::{Result, Table, TableError};

fn csv_error(path: &Path, e: csv::Error) -> TableError {
    TableError::CsvError {
        path: path.to_path_buf(),
        message: e.to_string(),
    }
}

/// Read a delimited file whose first record is the header row
///
/// Short records are padded, long ones truncated, and blank lines skipped.
pub fn read_delimited(path: &Path, delimiter: u8) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        return Err(TableError::EmptyTable(path.to_path_buf()));
    }

    let mut table = Table::new().with_headers(headers);
    for result in reader.records() {
        let record = result.map_err(|e| csv_error(path, e))?;
        let row: Vec<String> = record.iter().map(str::to_string).collect();
        if row.iter().all(|s| s.is_empty()) {
            continue;
        }
        table.add_row(row);
    }

    tracing::debug!("Read {} rows from {}", table.len(), path.display());
    Ok(table)
}

/// Write a table as delimited text with a header row
pub fn write_delimited(table: &Table, path: &Path, delimiter: u8) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| csv_error(path, e))?;

    writer
        .write_record(&table.headers)
        .map_err(|e| csv_error(path, e))?;
    for row in &table.rows {
        writer.write_record(row).map_err(|e| csv_error(path, e))?;
    }

    writer.flush().map_err(|e| TableError::IoError {
        path: path.to_path_buf(),
        source: e,
    })
}
