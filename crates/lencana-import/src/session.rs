//! A parsed upload held in memory while the user adjusts the mapping.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use lencana_core::registration::RegistrationBatch;

use crate::{
  Error,
  Result,
  detect::{ColumnMapping, Field, detect_columns, detect_header},
  grid::{Grid, read_grid},
  group::group_batches,
  rows::{ImportDefaults, ImportRow, normalize_rows},
};

/// The file is read once; every mapping change re-derives the rows from
/// the cached grid.
#[derive(Debug, Clone)]
pub struct ImportSession {
  source:     Option<PathBuf>,
  grid:       Grid,
  header_row: Option<usize>,
  mapping:    ColumnMapping,
  defaults:   ImportDefaults,
  rows:       Vec<ImportRow>,
}

impl ImportSession {
  /// Read `path` and run detection.
  pub fn open(path: impl AsRef<Path>, defaults: ImportDefaults) -> Result<Self> {
    let path = path.as_ref();
    let grid = read_grid(path)?;
    let mut session = Self::from_grid(grid, defaults);
    session.source = Some(path.to_path_buf());
    Ok(session)
  }

  pub fn from_grid(grid: Grid, defaults: ImportDefaults) -> Self {
    let header_row = detect_header(&grid);
    let header = header_row.and_then(|i| grid.row(i)).unwrap_or(&[]);
    let mapping = detect_columns(header, grid.width());

    match header_row {
      Some(row) => tracing::info!(row, "detected header row"),
      None => tracing::info!("no header row found; reading from the first row"),
    }

    let mut session = Self {
      source: None,
      grid,
      header_row,
      mapping,
      defaults,
      rows: Vec::new(),
    };
    session.refresh();
    session
  }

  /// Remap `field` to `column` (or unmap it) and re-read the rows.
  pub fn set_column(&mut self, field: Field, column: Option<usize>) -> Result<()> {
    if let Some(index) = column {
      let width = self.grid.width();
      if index >= width {
        return Err(Error::ColumnOutOfRange { index, width });
      }
    }
    self.mapping.set(field, column);
    self.refresh();
    Ok(())
  }

  fn refresh(&mut self) {
    self.rows = normalize_rows(&self.grid, self.data_start(), &self.mapping, &self.defaults);
  }

  pub fn source(&self) -> Option<&Path> { self.source.as_deref() }

  pub fn grid(&self) -> &Grid { &self.grid }

  pub fn header_row(&self) -> Option<usize> { self.header_row }

  /// First row read as data: the one after the header, or row 0.
  pub fn data_start(&self) -> usize { self.header_row.map_or(0, |h| h + 1) }

  pub fn mapping(&self) -> &ColumnMapping { &self.mapping }

  pub fn rows(&self) -> &[ImportRow] { &self.rows }

  pub fn batches(&self, badge: &str, date: NaiveDate) -> Vec<RegistrationBatch> {
    group_batches(&self.rows, badge, date)
  }
}
