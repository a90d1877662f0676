//! Registration batches (the payload of one `submit_form` call) and the
//! pre-flight checks run before a batch is sent.
//!
//! The backend repeats these checks. Errors name the offending entry.

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{
  Error,
  Result,
  badge::BadgeKey,
  record::{MIN_IC_LEN, normalize_ic, normalize_name},
  role::{Role, RoleCategory},
  school,
  snapshot::Snapshot,
};

/// Leader name used when an imported school group has no `PEMIMPIN` row.
pub const PLACEHOLDER_LEADER: &str = "DATA IMPORT";

// ─── Payload types ───────────────────────────────────────────────────────────

/// The leader responsible for a school's submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderInfo {
  pub name:        String,
  pub phone:       Option<String>,
  pub race:        String,
  pub school:      String,
  pub school_code: Option<String>,
}

impl LeaderInfo {
  pub fn placeholder(school: impl Into<String>, code: Option<String>) -> Self {
    Self {
      name:        PLACEHOLDER_LEADER.to_owned(),
      phone:       None,
      race:        String::new(),
      school:      school.into(),
      school_code: code,
    }
  }
}

/// One person inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
  pub name:          String,
  pub ic:            Option<String>,
  pub gender:        String,
  pub race:          String,
  pub role:          Role,
  pub membership_id: Option<String>,
  pub phone:         Option<String>,
  pub remarks:       String,
}

/// Everything a school submits for one badge in one go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationBatch {
  pub date:         NaiveDate,
  pub badge:        String,
  pub leader:       LeaderInfo,
  pub participants: Vec<Participant>,
}

impl RegistrationBatch {
  pub fn year(&self) -> i32 { self.date.year() }

  pub fn key(&self) -> BadgeKey { BadgeKey::new(self.badge.clone(), self.year()) }

  pub fn school(&self) -> &str { &self.leader.school }

  /// Number of people in `category`.
  pub fn count(&self, category: RoleCategory) -> usize {
    self
      .participants
      .iter()
      .filter(|p| category.contains(&p.role))
      .count()
  }
}

// ─── Pre-flight ──────────────────────────────────────────────────────────────

/// Validate `batch` against the latest snapshot.
///
/// Checks, in order: the batch is non-empty, registration and the badge are
/// open, the badge year is not locked for the school, the school may add
/// every role category in the batch, no IC or name repeats
/// inside the batch, and no IC already holds an approved record for the
/// same badge and year.
pub fn preflight(
  batch: &RegistrationBatch,
  snapshot: &Snapshot,
  today: NaiveDate,
) -> Result<()> {
  if batch.participants.is_empty() {
    return Err(Error::EmptyBatch);
  }
  if !snapshot.registration_open {
    return Err(Error::RegistrationClosed);
  }
  if let Some(badge) = snapshot.badge(&batch.badge)
    && !badge.accepts_submissions(today)
  {
    return Err(Error::BadgeClosed(badge.name.clone()));
  }

  let key = batch.key();
  if let Some(school) = snapshot.school(batch.school()) {
    if school.is_locked(&key) {
      return Err(Error::BadgeLocked {
        school: school.name.clone(),
        badge:  key.badge,
        year:   key.year,
      });
    }
    if let Some(category) = batch
      .participants
      .iter()
      .filter_map(|p| p.role.category())
      .find(|c| !school.allows(*c))
    {
      return Err(Error::CategoryNotPermitted(category));
    }
  }

  check_batch_duplicates(batch)?;
  check_existing_records(batch, snapshot)
}

fn check_batch_duplicates(batch: &RegistrationBatch) -> Result<()> {
  let mut ics = HashSet::new();
  let mut names = HashSet::new();
  for p in &batch.participants {
    if let Some(ic) = p.ic.as_deref().map(normalize_ic)
      && ic.len() > MIN_IC_LEN
      && !ics.insert(ic.clone())
    {
      return Err(Error::DuplicateIcInBatch(ic));
    }
    let name = normalize_name(&p.name);
    if !names.insert(name.clone()) {
      return Err(Error::DuplicateNameInBatch(name));
    }
  }
  Ok(())
}

fn check_existing_records(
  batch: &RegistrationBatch,
  snapshot: &Snapshot,
) -> Result<()> {
  let key = batch.key();
  for p in &batch.participants {
    let Some(ic) = p.ic.as_deref().map(normalize_ic) else {
      continue;
    };
    if ic.len() <= MIN_IC_LEN {
      continue;
    }
    let clash = snapshot.records.iter().find(|r| {
      r.badge == key.badge
        && r.award_year().get() == Some(key.year)
        && r.normalized_ic().as_deref() == Some(ic.as_str())
        && school::find(&snapshot.schools, &r.school)
          .is_some_and(|s| s.is_approved(&key))
    });
    if let Some(existing) = clash {
      return Err(Error::AlreadyRecorded {
        ic,
        name: existing.name.clone(),
        badge: key.badge.clone(),
        year: key.year,
      });
    }
  }
  Ok(())
}

/// Refuse to register a school whose name (case-insensitive) or code is
/// already known.
pub fn check_new_school(
  snapshot: &Snapshot,
  name: &str,
  code: Option<&str>,
) -> Result<()> {
  let taken = snapshot.schools.iter().any(|s| {
    s.is_named(name)
      || code.is_some_and(|c| {
        s.code.as_deref().is_some_and(|sc| sc.eq_ignore_ascii_case(c.trim()))
      })
  });
  if taken {
    return Err(Error::SchoolAlreadyRegistered(name.trim().to_owned()));
  }
  Ok(())
}
