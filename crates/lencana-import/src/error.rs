//! Error types for the spreadsheet importer.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unsupported file type: {0}")]
  UnsupportedFile(PathBuf),

  #[error("workbook {path} has no worksheets")]
  NoSheets { path: PathBuf },

  #[error("{path} contains no rows")]
  EmptySheet { path: PathBuf },

  #[error("could not read workbook: {0}")]
  Workbook(#[from] calamine::Error),

  #[error("could not read CSV: {0}")]
  Csv(#[from] csv::Error),

  #[error("column {index} is outside the sheet ({width} columns)")]
  ColumnOutOfRange { index: usize, width: usize },

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
