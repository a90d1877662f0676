//! Cohort builder: per-student multi-year history, and the three-year
//! progression blocks derived from it.
//!
//! Nothing here is persisted; both projections are rebuilt from the latest
//! normalised record list every time they are shown.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use fuzzy_matcher::{FuzzyMatcher, skim::SkimMatcherV2};

use crate::record::{AwardYear, IdentityKey, SubmissionRecord};

/// Width of a progression block: the first year and the two after it.
pub const BLOCK_YEARS: usize = 3;

const PLACEHOLDER: &str = "-";

// ─── History ─────────────────────────────────────────────────────────────────

/// What a student holds in one award year.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YearCell {
  /// `"-"` while the membership ID is pending.
  pub membership_id: String,
  pub badge:         String,
}

/// One student's row in the history table.
#[derive(Debug, Clone)]
pub struct CohortEntry {
  pub key:   IdentityKey,
  pub name:  String,
  /// `"-"` when no IC is recorded.
  pub ic:    String,
  pub years: BTreeMap<AwardYear, YearCell>,
}

impl CohortEntry {
  /// The earliest known award year, if any.
  pub fn first_year(&self) -> Option<i32> {
    self.years.keys().find_map(|y| y.get())
  }

  pub fn cell(&self, year: i32) -> Option<&YearCell> {
    self.years.get(&AwardYear::known(year))
  }
}

/// The history projection: students sorted by name, plus the column years.
#[derive(Debug, Clone)]
pub struct CohortHistory {
  pub entries: Vec<CohortEntry>,
  /// Distinct known years across the full, unfiltered dataset.
  pub years:   Vec<i32>,
}

impl CohortHistory {
  /// Build entries from `normalized` and column years from `all`.
  ///
  /// `all` is typically the raw snapshot; the column set does not shrink
  /// when filters hide a year.
  pub fn build<'a, I, J>(normalized: I, all: J) -> Self
  where
    I: IntoIterator<Item = &'a SubmissionRecord>,
    J: IntoIterator<Item = &'a SubmissionRecord>,
  {
    Self { entries: build_entries(normalized), years: available_years(all) }
  }

  /// Entries whose name or IC fuzzy-matches `query`. Empty query → all.
  pub fn search(&self, query: &str) -> Vec<&CohortEntry> {
    let query = query.trim();
    if query.is_empty() {
      return self.entries.iter().collect();
    }
    let matcher = SkimMatcherV2::default().ignore_case();
    self
      .entries
      .iter()
      .filter(|e| {
        matcher.fuzzy_match(&e.name, query).is_some()
          || matcher.fuzzy_match(&e.ic, query).is_some()
      })
      .collect()
  }

  pub fn get(&self, key: &IdentityKey) -> Option<&CohortEntry> {
    self.entries.iter().find(|e| &e.key == key)
  }
}

/// Group records by identity key. A later record for the same year
/// overwrites an earlier one.
pub fn build_entries<'a, I>(records: I) -> Vec<CohortEntry>
where
  I: IntoIterator<Item = &'a SubmissionRecord>,
{
  let mut by_key: HashMap<IdentityKey, CohortEntry> = HashMap::new();

  for record in records {
    let key = record.identity_key();
    let entry = by_key.entry(key.clone()).or_insert_with(|| CohortEntry {
      key,
      name: record.name.trim().to_owned(),
      ic: record.ic.clone().unwrap_or_else(|| PLACEHOLDER.to_owned()),
      years: BTreeMap::new(),
    });
    entry.years.insert(
      record.award_year(),
      YearCell {
        membership_id: record
          .membership_id
          .clone()
          .unwrap_or_else(|| PLACEHOLDER.to_owned()),
        badge:         record.badge.clone(),
      },
    );
  }

  let mut entries: Vec<CohortEntry> = by_key.into_values().collect();
  entries.sort_by(|a, b| {
    a.name
      .to_lowercase()
      .cmp(&b.name.to_lowercase())
      .then_with(|| a.key.cmp(&b.key))
  });
  entries
}

/// Distinct known award years, ascending.
pub fn available_years<'a, I>(records: I) -> Vec<i32>
where
  I: IntoIterator<Item = &'a SubmissionRecord>,
{
  records
    .into_iter()
    .filter_map(|r| r.award_year().get())
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

// ─── Progression blocks ──────────────────────────────────────────────────────

/// A student's three cells within a block. `None` means no record exists
/// for that year yet, not that the student is ineligible.
#[derive(Debug, Clone)]
pub struct CohortRow<'a> {
  pub entry: &'a CohortEntry,
  pub cells: [Option<&'a YearCell>; BLOCK_YEARS],
}

/// Students whose first known year is `start_year`.
#[derive(Debug, Clone)]
pub struct CohortBlock<'a> {
  pub start_year: i32,
  pub rows:       Vec<CohortRow<'a>>,
}

impl CohortBlock<'_> {
  pub fn columns(&self) -> [i32; BLOCK_YEARS] {
    [self.start_year, self.start_year + 1, self.start_year + 2]
  }
}

#[derive(Debug, Clone, Default)]
pub struct CohortBlocks<'a> {
  /// Ascending by start year.
  pub blocks:  Vec<CohortBlock<'a>>,
  /// Students with no known award year; they belong to no block.
  pub undated: Vec<&'a CohortEntry>,
}

/// Group history entries into progression blocks by first known year.
/// Row order within a block follows the history's name order.
pub fn cohort_blocks(history: &CohortHistory) -> CohortBlocks<'_> {
  let mut by_year: BTreeMap<i32, Vec<CohortRow<'_>>> = BTreeMap::new();
  let mut undated = Vec::new();

  for entry in &history.entries {
    let Some(start) = entry.first_year() else {
      undated.push(entry);
      continue;
    };
    let cells = [entry.cell(start), entry.cell(start + 1), entry.cell(start + 2)];
    by_year.entry(start).or_default().push(CohortRow { entry, cells });
  }

  CohortBlocks {
    blocks: by_year
      .into_iter()
      .map(|(start_year, rows)| CohortBlock { start_year, rows })
      .collect(),
    undated,
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;

  fn rec(name: &str, ic: &str, badge: &str, year: i32) -> SubmissionRecord {
    let mut r = SubmissionRecord::new(
      "SK Bukit",
      badge,
      name,
      NaiveDate::from_ymd_opt(year, 3, 1),
    );
    r.ic = Some(ic.to_owned());
    r
  }

  #[test]
  fn entries_sorted_case_insensitively() {
    let records = vec![
      rec("zainal", "111111111111", "Keris Gangsa", 2023),
      rec("Abu", "222222222222", "Keris Gangsa", 2023),
      rec("BADRUL", "333333333333", "Keris Gangsa", 2023),
    ];
    let names: Vec<_> =
      build_entries(&records).into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["Abu", "BADRUL", "zainal"]);
  }

  #[test]
  fn years_fill_per_student() {
    let mut perak = rec("ALI", "900101011234", "Keris Perak", 2024);
    perak.membership_id = Some("M-77".into());
    let records = vec![rec("ALI", "900101011234", "Keris Gangsa", 2023), perak];
    let entries = build_entries(&records);
    assert_eq!(entries.len(), 1);
    let e = &entries[0];
    assert_eq!(e.cell(2023).unwrap().membership_id, "-");
    assert_eq!(e.cell(2024).unwrap().badge, "Keris Perak");
    assert_eq!(e.cell(2024).unwrap().membership_id, "M-77");
  }

  #[test]
  fn last_write_per_year_wins() {
    let records = vec![
      rec("ALI", "900101011234", "Keris Gangsa", 2023),
      rec("ALI", "900101011234", "Anugerah Rambu", 2023),
    ];
    let entries = build_entries(&records);
    assert_eq!(entries[0].cell(2023).unwrap().badge, "Anugerah Rambu");
  }

  #[test]
  fn available_years_skip_unknown() {
    let mut undated = rec("ALI", "900101011234", "Keris Gangsa", 2023);
    undated.date = None;
    let records = vec![
      rec("ABU", "222222222222", "Keris Gangsa", 2024),
      undated,
      rec("ALI", "900101011234", "Keris Gangsa", 2022),
    ];
    assert_eq!(available_years(&records), vec![2022, 2024]);
  }

  #[test]
  fn search_matches_name_or_ic() {
    let records = vec![
      rec("Ahmad Ali", "900101011234", "Keris Gangsa", 2023),
      rec("Siti", "950505055555", "Keris Gangsa", 2023),
    ];
    let history = CohortHistory::build(&records, &records);
    assert_eq!(history.search("").len(), 2);
    assert_eq!(history.search("ahmad")[0].name, "Ahmad Ali");
    assert_eq!(history.search("95050")[0].name, "Siti");
  }

  #[test]
  fn blocks_group_by_first_year() {
    let mut undated = rec("NODATE", "444444444444", "Keris Gangsa", 2023);
    undated.date = None;
    let records = vec![
      rec("ALI", "900101011234", "Keris Gangsa", 2022),
      rec("ALI", "900101011234", "Keris Emas", 2024),
      rec("ABU", "222222222222", "Keris Gangsa", 2023),
      undated,
    ];
    let history = CohortHistory::build(&records, &records);
    let blocks = cohort_blocks(&history);

    assert_eq!(blocks.blocks.len(), 2);
    let first = &blocks.blocks[0];
    assert_eq!(first.columns(), [2022, 2023, 2024]);
    let ali = &first.rows[0];
    assert_eq!(ali.entry.name, "ALI");
    assert!(ali.cells[0].is_some());
    assert!(ali.cells[1].is_none());
    assert_eq!(ali.cells[2].unwrap().badge, "Keris Emas");

    assert_eq!(blocks.blocks[1].start_year, 2023);
    assert_eq!(blocks.undated.len(), 1);
    assert_eq!(blocks.undated[0].name, "NODATE");
  }
}
