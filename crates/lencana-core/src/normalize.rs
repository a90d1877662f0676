//! Record normaliser: raw sheet rows → one row per person per badge per year.

use std::collections::HashSet;

use crate::{
  record::{AwardYear, IdentityKey, SubmissionRecord},
  school::{self, School},
};

/// Filters applied by [`normalize`].
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
  /// Restrict to one school (case-insensitive name match).
  pub school:            Option<String>,
  /// Drop leaders, assistant leaders and examiners.
  pub participants_only: bool,
  /// Keep records whose badge year the school has not had approved yet.
  pub include_drafts:    bool,
}

impl Default for NormalizeOptions {
  fn default() -> Self {
    Self { school: None, participants_only: true, include_drafts: false }
  }
}

/// Deduplicate and filter `records` for history and reporting views.
///
/// Keeps the first record seen for each (identity key, badge, award year).
/// Applying the function to its own output returns the output unchanged.
pub fn normalize<'a, I>(
  records: I,
  schools: &[School],
  opts: &NormalizeOptions,
) -> Vec<SubmissionRecord>
where
  I: IntoIterator<Item = &'a SubmissionRecord>,
{
  let mut seen: HashSet<(IdentityKey, String, AwardYear)> = HashSet::new();
  let mut out = Vec::new();

  for record in records {
    if record.is_session_marker() || !record.has_name() {
      continue;
    }
    if let Some(name) = &opts.school
      && !record.school.trim().eq_ignore_ascii_case(name.trim())
    {
      continue;
    }
    if opts.participants_only && record.role.is_staff() {
      continue;
    }
    if !opts.include_drafts && !is_approved(record, schools) {
      continue;
    }

    let key = (
      record.identity_key(),
      record.badge.trim().to_owned(),
      record.award_year(),
    );
    if seen.insert(key) {
      out.push(record.clone());
    }
  }
  out
}

/// Whether the record's school has approved its badge year. Rows with an
/// unknown year only match a bare badge name entry.
fn is_approved(record: &SubmissionRecord, schools: &[School]) -> bool {
  let Some(school) = school::find(schools, &record.school) else {
    return false;
  };
  match record.badge_key() {
    Some(key) => school.is_approved(&key),
    None => school.approved_badges.iter().any(|e| *e == record.badge),
  }
}
