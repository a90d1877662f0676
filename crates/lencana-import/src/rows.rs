//! Row normalisation under a column mapping.

use lencana_core::role::Role;
use serde::Serialize;

use crate::{
  detect::{ColumnMapping, Field},
  grid::Grid,
};

pub const DEFAULT_GENDER: &str = "Lelaki";
pub const DEFAULT_RACE: &str = "Lain-lain";

const HEADER_LEAKS: &[&str] = &["NAMA", "NAME"];

/// Values used when the sheet has no school column, or a row leaves it
/// blank: normally the school doing the upload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportDefaults {
  pub school: String,
  pub code:   Option<String>,
}

/// One person read from the sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRow {
  /// Zero-based sheet row, for pointing the user at the source.
  pub source_row:    usize,
  pub name:          String,
  pub ic:            Option<String>,
  pub role:          Role,
  pub school:        String,
  pub code:          Option<String>,
  pub phone:         Option<String>,
  pub gender:        String,
  pub race:          String,
  pub membership_id: Option<String>,
}

/// Read every row from `start` under `mapping`.
///
/// Blank rows, rows with no name, and repeated header rows are skipped.
/// Returns nothing when no name column is mapped.
pub fn normalize_rows(
  grid: &Grid,
  start: usize,
  mapping: &ColumnMapping,
  defaults: &ImportDefaults,
) -> Vec<ImportRow> {
  let Some(name_col) = mapping.get(Field::Name) else {
    tracing::warn!("no name column mapped; nothing to import");
    return Vec::new();
  };

  let text = |row, field| field_text(grid, mapping, row, field);

  let mut out = Vec::new();
  for row in start..grid.height() {
    if grid.is_blank_row(row) {
      continue;
    }
    let name = upper(grid.cell(row, name_col));
    if name.is_empty() || HEADER_LEAKS.contains(&name.as_str()) {
      continue;
    }

    let school = text(row, Field::School)
      .map(upper)
      .unwrap_or_else(|| upper(&defaults.school));
    let code = text(row, Field::Code)
      .map(str::to_owned)
      .or_else(|| defaults.code.clone());

    out.push(ImportRow {
      source_row: row,
      name,
      ic: text(row, Field::Ic).map(str::to_owned),
      role: text(row, Field::Category).map_or(Role::Peserta, Role::from_free_text),
      school,
      code,
      phone: text(row, Field::Phone).map(str::to_owned),
      gender: text(row, Field::Gender).map_or_else(|| DEFAULT_GENDER.to_owned(), gender),
      race: text(row, Field::Race).map_or_else(|| DEFAULT_RACE.to_owned(), str::to_owned),
      membership_id: text(row, Field::MembershipId).map(str::to_owned),
    });
  }

  tracing::debug!(start, rows = out.len(), "normalized import rows");
  out
}

fn field_text<'g>(
  grid: &'g Grid,
  mapping: &ColumnMapping,
  row: usize,
  field: Field,
) -> Option<&'g str> {
  mapping
    .get(field)
    .map(|c| grid.cell(row, c).trim())
    .filter(|s| !s.is_empty())
}

fn upper(raw: &str) -> String {
  raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Map the usual abbreviations onto the two stored spellings. Anything
/// unrecognised is kept as typed.
fn gender(raw: &str) -> String {
  match raw.to_uppercase().as_str() {
    "L" | "LELAKI" | "M" | "MALE" => "Lelaki".to_owned(),
    "P" | "PEREMPUAN" | "F" | "FEMALE" => "Perempuan".to_owned(),
    _ => raw.to_owned(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::detect::detect_columns;

  fn defaults() -> ImportDefaults {
    ImportDefaults { school: "sk bukit".into(), code: Some("JBA1234".into()) }
  }

  #[test]
  fn fills_defaults_and_uppercases() {
    let grid = Grid::from_rows([
      vec!["BIL", "NAMA", "NO. KP", "JANTINA"],
      vec!["1", "  ali  bin abu ", "900101-01-1234", "p"],
      vec!["2", "siti", "", ""],
    ]);
    let mapping = detect_columns(grid.row(0).unwrap(), grid.width());
    let rows = normalize_rows(&grid, 1, &mapping, &defaults());

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].name, "ALI BIN ABU");
    assert_eq!(rows[0].ic.as_deref(), Some("900101-01-1234"));
    assert_eq!(rows[0].gender, "Perempuan");
    assert_eq!(rows[0].race, DEFAULT_RACE);
    assert_eq!(rows[0].school, "SK BUKIT");
    assert_eq!(rows[0].code.as_deref(), Some("JBA1234"));
    assert_eq!(rows[0].role, Role::Peserta);
    assert_eq!(rows[1].ic, None);
    assert_eq!(rows[1].gender, DEFAULT_GENDER);
    assert_eq!(rows[1].source_row, 2);
  }

  #[test]
  fn skips_blank_rows_and_header_leaks() {
    let grid = Grid::from_rows([
      vec!["NAMA", "NO. KP"],
      vec!["ALI", "1"],
      vec!["", ""],
      vec!["nama", "NO. KP"],
      vec!["", "2"],
      vec!["ABU", "3"],
    ]);
    let mapping = detect_columns(grid.row(0).unwrap(), grid.width());
    let rows = normalize_rows(&grid, 1, &mapping, &defaults());
    let names: Vec<_> = rows.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["ALI", "ABU"]);
  }

  #[test]
  fn category_goes_through_free_text_lookup() {
    let grid = Grid::from_rows([
      vec!["NAMA", "NO. KP", "KATEGORI"],
      vec!["A", "1", "Pen. Pemimpin"],
      vec!["B", "2", "penguji"],
      vec!["C", "3", "Pemimpin"],
      vec!["D", "4", "murid"],
    ]);
    let mapping = detect_columns(grid.row(0).unwrap(), grid.width());
    let roles: Vec<_> = normalize_rows(&grid, 1, &mapping, &defaults())
      .into_iter()
      .map(|r| r.role)
      .collect();
    assert_eq!(
      roles,
      vec![Role::PenolongPemimpin, Role::Penguji, Role::Pemimpin, Role::Peserta]
    );
  }

  #[test]
  fn no_name_column_yields_nothing() {
    let grid = Grid::from_rows([vec!["ALI"]]);
    let rows = normalize_rows(&grid, 0, &ColumnMapping::default(), &defaults());
    assert!(rows.is_empty());
  }
}
