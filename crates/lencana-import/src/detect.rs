//! Header-row and column detection.
//!
//! Uploaded sheets come from many hands: a title block above the table,
//! columns in any order, Malay or English labels. Detection is keyword
//! based. Positional guesses are recorded for the caller to confirm.

use std::collections::BTreeMap;

use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use crate::grid::Grid;

/// How many leading rows are searched for a header.
pub const HEADER_SCAN_ROWS: usize = 20;

const NAME_TOKENS: &[&str] = &["NAMA", "NAME"];
const HEADER_COMPANION_TOKENS: &[&str] = &["KP", "IC", "NO", "SEKOLAH"];

/// Index of the header row, if any.
///
/// The first of the leading rows whose joined, uppercased text contains a
/// name label plus an IC, number or school label wins.
pub fn detect_header(grid: &Grid) -> Option<usize> {
  grid
    .rows()
    .iter()
    .take(HEADER_SCAN_ROWS)
    .position(|row| {
      let joined = row.join(" ").to_uppercase();
      NAME_TOKENS.iter().any(|t| joined.contains(t))
        && HEADER_COMPANION_TOKENS.iter().any(|t| joined.contains(t))
    })
}

// ─── Fields ──────────────────────────────────────────────────────────────────

/// The semantic columns an import row can carry.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Display,
  EnumString,
  EnumIter,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum Field {
  Name,
  Ic,
  Category,
  School,
  Code,
  Phone,
  Gender,
  Race,
  MembershipId,
}

impl Field {
  /// Header labels that identify this field (matched as substrings of the
  /// uppercased header cell).
  pub fn keywords(self) -> &'static [&'static str] {
    match self {
      Self::Name => &["NAMA", "NAME", "STUDENT", "PESERTA"],
      Self::Ic => &["KP", "IC", "MYKAD", "PENGENALAN"],
      Self::Category => &["KATEGORI", "CATEGORY", "JAWATAN", "PERANAN", "ROLE"],
      Self::School => &["SEKOLAH", "SCHOOL"],
      Self::Code => &["KOD", "CODE"],
      Self::Phone => &["TEL", "PHONE", "H/P"],
      Self::Gender => &["JANTINA", "GENDER"],
      Self::Race => &["BANGSA", "KAUM", "RACE", "ETNIK"],
      Self::MembershipId => &["KEAHLIAN", "AHLI", "MEMBERSHIP"],
    }
  }

  /// Column assumed when nothing in the header matched.
  fn fallback_column(self) -> Option<usize> {
    match self {
      Self::Name => Some(1),
      Self::Ic => Some(2),
      Self::Category => Some(6),
      _ => None,
    }
  }
}

/// Order in which fields claim header cells. More specific labels go first
/// so "KOD SEKOLAH" is a code, "NAMA SEKOLAH" a school, and "KATEGORI
/// PESERTA" a category rather than a name.
const CLAIM_ORDER: [Field; 9] = [
  Field::Code,
  Field::MembershipId,
  Field::School,
  Field::Phone,
  Field::Ic,
  Field::Gender,
  Field::Race,
  Field::Category,
  Field::Name,
];

// ─── Mapping ─────────────────────────────────────────────────────────────────

/// Field → column index. Unmapped fields are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
  columns:     BTreeMap<Field, usize>,
  /// Fields placed by positional fallback rather than a header match.
  pub guessed: Vec<Field>,
}

impl ColumnMapping {
  pub fn get(&self, field: Field) -> Option<usize> { self.columns.get(&field).copied() }

  /// Map `field` to `column`, or unmap it. A manual choice is never a
  /// guess.
  pub fn set(&mut self, field: Field, column: Option<usize>) {
    match column {
      Some(c) => {
        self.columns.insert(field, c);
      }
      None => {
        self.columns.remove(&field);
      }
    }
    self.guessed.retain(|f| *f != field);
  }

  pub fn is_guessed(&self, field: Field) -> bool { self.guessed.contains(&field) }

  pub fn iter(&self) -> impl Iterator<Item = (Field, usize)> + '_ {
    self.columns.iter().map(|(f, c)| (*f, *c))
  }

  fn is_claimed(&self, column: usize) -> bool { self.columns.values().any(|c| *c == column) }
}

/// Map fields to columns from the `header` cells of a grid `width` columns
/// wide.
///
/// Each field takes the first unclaimed header cell containing one of its
/// keywords. Name, IC and category then fall back to columns 1, 2 and 6 if
/// still unmapped and the grid is wide enough.
pub fn detect_columns(header: &[String], width: usize) -> ColumnMapping {
  let labels: Vec<String> = header.iter().map(|h| h.trim().to_uppercase()).collect();
  let mut mapping = ColumnMapping::default();

  for field in CLAIM_ORDER {
    let hit = labels.iter().enumerate().find(|(i, label)| {
      !label.is_empty()
        && !mapping.is_claimed(*i)
        && field.keywords().iter().any(|k| label.contains(k))
    });
    if let Some((i, _)) = hit {
      mapping.columns.insert(field, i);
    }
  }

  for field in Field::iter() {
    if mapping.get(field).is_some() {
      continue;
    }
    if let Some(col) = field.fallback_column()
      && col < width
      && !mapping.is_claimed(col)
    {
      tracing::warn!(%field, col, "column not found in header; guessing by position");
      mapping.columns.insert(field, col);
      mapping.guessed.push(field);
    }
  }

  mapping
}
