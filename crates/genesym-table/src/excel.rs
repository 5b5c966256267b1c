//! Excel tables: reading with calamine, writing with rust_xlsxwriter

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::{Format, Workbook};

use crate::{Result, Table, TableError};

/// Worksheet name used for exported results
pub const RESULTS_SHEET: &str = "results";

fn excel_error(path: &Path, message: impl std::fmt::Display) -> TableError {
    TableError::ExcelError {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}

/// Largest float that still prints as an exact integer identifier
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Cell text as it would appear in a delimited export of the sheet
///
/// Whole-number floats print without a fraction so numeric class ids
/// (`9305.0`) join against their text form (`9305`).
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT => {
            (*f as i64).to_string()
        }
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string().to_uppercase(),
        Data::DateTime(dt) => dt.to_string(),
        Data::Error(e) => format!("#ERROR: {e:?}"),
    }
}

/// Read the first worksheet, treating its first row as the header
pub fn read_first_sheet(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path).map_err(|e| excel_error(path, e))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| TableError::EmptyTable(path.to_path_buf()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| excel_error(path, e))?;

    let mut rows_iter = range.rows();
    let headers: Vec<String> = rows_iter
        .next()
        .map(|row| row.iter().map(cell_text).collect())
        .ok_or_else(|| TableError::EmptyTable(path.to_path_buf()))?;

    let mut table = Table::new().with_headers(headers);
    for row in rows_iter {
        let row_data: Vec<String> = row.iter().map(cell_text).collect();
        if row_data.iter().all(|s| s.is_empty()) {
            continue;
        }
        table.add_row(row_data);
    }

    tracing::debug!(
        "Read {} rows from sheet {:?} of {}",
        table.len(),
        sheet_name,
        path.display()
    );
    Ok(table)
}

/// Write a table to a single-sheet XLSX workbook with a bold header row
pub fn write_xlsx(table: &Table, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();

    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(RESULTS_SHEET)
        .map_err(|e| excel_error(path, e))?;

    for (col, header) in table.headers.iter().enumerate() {
        let col = column_number(path, col)?;
        worksheet
            .write_string_with_format(0, col, header, &header_format)
            .map_err(|e| excel_error(path, e))?;
    }

    for (i, row) in table.rows.iter().enumerate() {
        let row_num = u32::try_from(i + 1)
            .map_err(|_| excel_error(path, format!("row {} out of range", i + 1)))?;
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let col = column_number(path, col)?;
            worksheet
                .write_string(row_num, col, value)
                .map_err(|e| excel_error(path, e))?;
        }
    }

    workbook.save(path).map_err(|e| excel_error(path, e))?;
    tracing::debug!("Wrote {} rows to {}", table.len(), path.display());
    Ok(())
}

fn column_number(path: &Path, col: usize) -> Result<u16> {
    u16::try_from(col).map_err(|_| excel_error(path, format!("column {col} out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(
            cell_text(&Data::String(
                "http://purl.obolibrary.org/obo/MONDO_0011466".to_string()
            )),
            "http://purl.obolibrary.org/obo/MONDO_0011466"
        );
        // numeric class ids read back as their join key
        assert_eq!(cell_text(&Data::Float(11466.0)), "11466");
        assert_eq!(cell_text(&Data::Int(9305)), "9305");
        assert_eq!(cell_text(&Data::Float(0.25)), "0.25");
        assert_eq!(cell_text(&Data::Float(1e20)), "100000000000000000000");
        assert_eq!(cell_text(&Data::Bool(false)), "FALSE");
    }

    #[test]
    fn test_written_workbook_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_results.xlsx");

        let mut table = Table::new().with_headers(vec![
            "?cls".into(),
            "old_def_gene_symbol".into(),
            "updated_gene_symbol".into(),
        ]);
        table.add_row(vec!["MONDO:1".into(), "SCA12".into(), "PPP2R2B".into()]);
        table.add_row(vec![
            "MONDO:2".into(),
            "No gene symbol found in definition.".into(),
            String::new(),
        ]);

        write_xlsx(&table, &path).unwrap();
        let read = read_first_sheet(&path).unwrap();

        assert_eq!(read.headers, table.headers);
        assert_eq!(read.len(), 2);
        assert_eq!(read.rows[0], table.rows[0]);
        assert_eq!(read.rows[1][1], "No gene symbol found in definition.");
        assert_eq!(read.rows[1][2], "");
    }

    #[test]
    fn test_read_missing_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_first_sheet(&dir.path().join("absent.xlsx")).unwrap_err();
        assert!(matches!(err, TableError::ExcelError { .. }));
    }
}
