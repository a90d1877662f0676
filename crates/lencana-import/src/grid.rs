//! Raw cell grids read from the first sheet of an uploaded file.

use std::{io, path::Path};

use calamine::{Data, Reader, open_workbook_auto};
use strum::EnumString;

use crate::{Error, Result};

/// File formats the importer understands, keyed by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FileFormat {
  Xlsx,
  Xlsm,
  Xls,
  Xlsb,
  Ods,
  Csv,
}

impl FileFormat {
  pub fn from_path(path: &Path) -> Option<Self> {
    path.extension()?.to_str()?.parse().ok()
  }
}

/// A rectangular-ish table of trimmed cell strings. Rows may be ragged;
/// missing cells read as empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
  rows: Vec<Vec<String>>,
}

impl Grid {
  pub fn new(rows: Vec<Vec<String>>) -> Self { Self { rows } }

  /// Convenience for tests and callers that build grids by hand.
  pub fn from_rows<R, C>(rows: R) -> Self
  where
    R: IntoIterator<Item = C>,
    C: IntoIterator,
    C::Item: AsRef<str>,
  {
    Self::new(
      rows
        .into_iter()
        .map(|r| r.into_iter().map(|c| c.as_ref().trim().to_owned()).collect())
        .collect(),
    )
  }

  /// Parse CSV with no header handling; every record becomes a row.
  pub fn from_csv<R: io::Read>(reader: R) -> Result<Self> {
    let mut rdr = csv::ReaderBuilder::new()
      .has_headers(false)
      .flexible(true)
      .from_reader(reader);
    let mut rows = Vec::new();
    for record in rdr.records() {
      let record = record?;
      rows.push(record.iter().map(|c| c.trim().to_owned()).collect());
    }
    Ok(Self::new(rows))
  }

  pub fn rows(&self) -> &[Vec<String>] { &self.rows }

  pub fn row(&self, index: usize) -> Option<&[String]> {
    self.rows.get(index).map(Vec::as_slice)
  }

  pub fn height(&self) -> usize { self.rows.len() }

  /// Length of the longest row.
  pub fn width(&self) -> usize { self.rows.iter().map(Vec::len).max().unwrap_or(0) }

  /// The cell at (`row`, `col`), or `""` outside the grid.
  pub fn cell(&self, row: usize, col: usize) -> &str {
    self
      .rows
      .get(row)
      .and_then(|r| r.get(col))
      .map_or("", String::as_str)
  }

  pub fn is_blank_row(&self, row: usize) -> bool {
    self
      .row(row)
      .is_none_or(|cells| cells.iter().all(|c| c.is_empty()))
  }
}

/// Read the first sheet of `path` into a [`Grid`].
///
/// Spreadsheets go through calamine, `.csv` through the csv reader; any
/// other extension is rejected without opening the file.
pub fn read_grid(path: impl AsRef<Path>) -> Result<Grid> {
  let path = path.as_ref();
  let format = FileFormat::from_path(path)
    .ok_or_else(|| Error::UnsupportedFile(path.to_path_buf()))?;

  let grid = match format {
    FileFormat::Csv => Grid::from_csv(std::fs::File::open(path)?)?,
    _ => read_workbook(path)?,
  };
  if grid.height() == 0 {
    return Err(Error::EmptySheet { path: path.to_path_buf() });
  }

  tracing::debug!(
    path = %path.display(),
    ?format,
    rows = grid.height(),
    cols = grid.width(),
    "read import grid"
  );
  Ok(grid)
}

fn read_workbook(path: &Path) -> Result<Grid> {
  let mut workbook = open_workbook_auto(path)?;
  let range = workbook
    .worksheet_range_at(0)
    .ok_or_else(|| Error::NoSheets { path: path.to_path_buf() })??;

  // calamine trims leading empty rows and columns; pad them back so row
  // indices match what the user sees in the sheet.
  let (top, left) = range
    .start()
    .map_or((0, 0), |(r, c)| (r as usize, c as usize));

  let mut rows: Vec<Vec<String>> = vec![Vec::new(); top];
  for cells in range.rows() {
    let mut row = vec![String::new(); left];
    row.extend(cells.iter().map(cell_text));
    rows.push(row);
  }
  Ok(Grid::new(rows))
}

/// Stringify a cell. Whole-number floats lose their `.0` so IC numbers typed
/// into numeric cells come through intact.
fn cell_text(cell: &Data) -> String {
  match cell {
    Data::Empty => String::new(),
    Data::String(s) => s.trim().to_owned(),
    Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
    other => other.to_string().trim().to_owned(),
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::*;

  #[test]
  fn format_from_extension() {
    assert_eq!(FileFormat::from_path(Path::new("a/b.XLSX")), Some(FileFormat::Xlsx));
    assert_eq!(FileFormat::from_path(Path::new("data.csv")), Some(FileFormat::Csv));
    assert_eq!(FileFormat::from_path(Path::new("notes.pdf")), None);
    assert_eq!(FileFormat::from_path(Path::new("README")), None);
  }

  #[test]
  fn unsupported_file_is_an_error_not_a_panic() {
    let err = read_grid("/nonexistent/list.docx").unwrap_err();
    assert!(matches!(err, Error::UnsupportedFile(_)));
  }

  #[test]
  fn corrupt_workbook_is_an_error() {
    let mut file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
    file.write_all(b"this is not a zip archive").unwrap();
    assert!(read_grid(file.path()).is_err());
  }

  #[test]
  fn empty_csv_is_an_error() {
    let file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    assert!(matches!(read_grid(file.path()), Err(Error::EmptySheet { .. })));
  }

  #[test]
  fn csv_file_reads_ragged_rows() {
    let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
    writeln!(file, "BIL,NAMA,NO. KP").unwrap();
    writeln!(file, "1, Ali bin Abu ,900101011234,extra").unwrap();
    writeln!(file, "2,Siti").unwrap();

    let grid = read_grid(file.path()).unwrap();
    assert_eq!(grid.height(), 3);
    assert_eq!(grid.width(), 4);
    assert_eq!(grid.cell(1, 1), "Ali bin Abu");
    assert_eq!(grid.cell(2, 2), "");
    assert_eq!(grid.cell(9, 9), "");
  }

  #[test]
  fn whole_floats_print_as_integers() {
    assert_eq!(cell_text(&Data::Float(900101011234.0)), "900101011234");
    assert_eq!(cell_text(&Data::Float(1.5)), "1.5");
    assert_eq!(cell_text(&Data::Int(42)), "42");
    assert_eq!(cell_text(&Data::String("  ali ".into())), "ali");
  }
}
