//! genesym Table - Tabular input and output
//!
//! Supports reading:
//! - Comma-separated text (default for any unrecognised extension)
//! - Tab-separated text (`.tsv`, `.tab`)
//! - Microsoft Excel (XLSX, XLS), first worksheet only
//!
//! and writing the joined result table as XLSX, CSV or TSV.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use genesym_core::{InputRow, OutputRecord};
use thiserror::Error;

pub mod delimited;
pub mod excel;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur reading or writing tables
#[derive(Error, Debug)]
pub enum TableError {
    /// File format is not supported for this operation
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// IO error while reading or writing the file
    #[error("IO error on file: {path}")]
    IoError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Delimited text error
    #[error("CSV error in {path}: {message}")]
    CsvError { path: PathBuf, message: String },

    /// Excel error
    #[error("Excel error in {path}: {message}")]
    ExcelError { path: PathBuf, message: String },

    /// A required column is absent
    #[error("Missing required column {column:?} (found: {found:?})")]
    MissingColumn { column: String, found: Vec<String> },

    /// The file has no header row
    #[error("Table has no header row: {0}")]
    EmptyTable(PathBuf),
}

pub type Result<T> = std::result::Result<T, TableError>;

// ============================================================================
// File Types
// ============================================================================

/// Supported table formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Csv,
    Tsv,
    Xlsx,
    Xls,
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "csv" => Self::Csv,
            "tsv" | "tab" => Self::Tsv,
            "xlsx" | "xlsm" => Self::Xlsx,
            "xls" => Self::Xls,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csv => write!(f, "csv"),
            Self::Tsv => write!(f, "tsv"),
            Self::Xlsx => write!(f, "xlsx"),
            Self::Xls => write!(f, "xls"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

// ============================================================================
// Table
// ============================================================================

/// An in-memory table with a header row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    /// Column headers
    pub headers: Vec<String>,

    /// Table rows, each padded to the header width
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create a new table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add headers
    pub fn with_headers(mut self, headers: Vec<String>) -> Self {
        self.headers = headers;
        self
    }

    /// Add a row, padding or truncating it to the header width
    pub fn add_row(&mut self, mut row: Vec<String>) {
        if !self.headers.is_empty() {
            row.resize(self.headers.len(), String::new());
        }
        self.rows.push(row);
    }

    /// Number of data rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column named `name`
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| TableError::MissingColumn {
                column: name.to_string(),
                found: self.headers.clone(),
            })
    }

    /// Project the table onto the three enrichment columns
    pub fn input_rows(
        &self,
        iri_column: &str,
        label_column: &str,
        definition_column: &str,
    ) -> Result<Vec<InputRow>> {
        let iri = self.column_index(iri_column)?;
        let label = self.column_index(label_column)?;
        let definition = self.column_index(definition_column)?;

        Ok(self
            .rows
            .iter()
            .map(|row| {
                let cell = |i: usize| row.get(i).cloned().unwrap_or_default();
                InputRow::new(cell(iri), cell(label), cell(definition))
            })
            .collect())
    }

    /// Inner join of this table with `records` on the `key_column`
    ///
    /// Rows without a record are dropped; a key present on several rows
    /// joins with each of them. Input row order is kept.
    pub fn inner_join(&self, records: &[OutputRecord], key_column: &str) -> Result<Table> {
        let key = self.column_index(key_column)?;

        let mut by_iri: HashMap<&str, Vec<&OutputRecord>> = HashMap::new();
        for record in records {
            by_iri.entry(record.iri.as_str()).or_default().push(record);
        }

        let mut headers = self.headers.clone();
        headers.extend(OutputRecord::COLUMNS.iter().map(|c| c.to_string()));
        let mut joined = Table::new().with_headers(headers);

        for row in &self.rows {
            let Some(matches) = row.get(key).and_then(|k| by_iri.get(k.as_str())) else {
                continue;
            };
            for record in matches {
                let mut out = row.clone();
                out.extend(record.column_values().iter().map(|v| v.to_string()));
                joined.add_row(out);
            }
        }

        Ok(joined)
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Read a table, choosing the reader from the file extension
pub fn read_table(path: &Path) -> Result<Table> {
    let file_type = FileType::from_path(path);
    tracing::debug!("Reading {} as {}", path.display(), file_type);

    match file_type {
        FileType::Xlsx | FileType::Xls => excel::read_first_sheet(path),
        FileType::Tsv => delimited::read_delimited(path, b'\t'),
        FileType::Csv | FileType::Unknown => delimited::read_delimited(path, b','),
    }
}

/// Write a table, choosing the writer from the file extension
///
/// Parent directories are created as needed.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| TableError::IoError {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    match FileType::from_path(path) {
        FileType::Xlsx => excel::write_xlsx(table, path),
        FileType::Csv => delimited::write_delimited(table, path, b','),
        FileType::Tsv => delimited::write_delimited(table, path, b'\t'),
        other => Err(TableError::UnsupportedFormat(format!(
            "cannot write {other} output: {}",
            path.display()
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
