//! Permission and lock gate.
//!
//! Pure predicates over the latest snapshot. Nothing is cached: callers
//! build a [`Gate`] from whatever they fetched last and ask it again on
//! every render.

use std::fmt;

use chrono::{Datelike, NaiveDate};

use crate::{
  badge::BadgeKey,
  record::SubmissionRecord,
  role::RoleCategory,
  school::School,
  snapshot::Snapshot,
};

/// Why an action is not allowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
  RegistrationClosed,
  PastYear(i32),
  Locked(BadgeKey),
  /// Locked under a legacy entry that carries no year.
  LockedUndated(String),
  CategoryNotPermitted(RoleCategory),
}

impl fmt::Display for Denial {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::RegistrationClosed => f.write_str("registration is closed"),
      Self::PastYear(y) => write!(f, "records from {y} are frozen"),
      Self::Locked(k) => write!(f, "{} {} is locked", k.badge, k.year),
      Self::LockedUndated(b) => write!(f, "{b} is locked"),
      Self::CategoryNotPermitted(c) => {
        write!(f, "{c} additions are not permitted for this school")
      }
    }
  }
}

impl std::error::Error for Denial {}

/// The inputs every permission decision depends on.
#[derive(Debug, Clone, Copy)]
pub struct Gate<'a> {
  pub registration_open: bool,
  pub current_year:      i32,
  pub school:            &'a School,
}

impl<'a> Gate<'a> {
  pub fn new(registration_open: bool, current_year: i32, school: &'a School) -> Self {
    Self { registration_open, current_year, school }
  }

  /// Gate for `school` as of `today`. `None` if the school is not in the
  /// snapshot.
  pub fn for_school(
    snapshot: &'a Snapshot,
    school: &str,
    today: NaiveDate,
  ) -> Option<Self> {
    let school = snapshot.school(school)?;
    Some(Self::new(snapshot.registration_open, today.year(), school))
  }

  /// Edit/delete check for an existing record.
  ///
  /// Requires registration open, a year not before the current one, and the
  /// record's badge year not locked. A record with an unknown year is not
  /// frozen and only an undated lock entry can block it.
  pub fn check_modify_record(&self, record: &SubmissionRecord) -> Result<(), Denial> {
    if !self.registration_open {
      return Err(Denial::RegistrationClosed);
    }
    match record.badge_key() {
      Some(key) => {
        if key.year < self.current_year {
          return Err(Denial::PastYear(key.year));
        }
        if self.school.is_locked(&key) {
          return Err(Denial::Locked(key));
        }
      }
      None => {
        if self.school.locked_badges.iter().any(|e| *e == record.badge) {
          return Err(Denial::LockedUndated(record.badge.clone()));
        }
      }
    }
    Ok(())
  }

  pub fn can_modify_record(&self, record: &SubmissionRecord) -> bool {
    self.check_modify_record(record).is_ok()
  }

  /// Whether new people of `category` may be added at all.
  pub fn check_add(&self, category: RoleCategory) -> Result<(), Denial> {
    if !self.registration_open {
      return Err(Denial::RegistrationClosed);
    }
    if !self.school.allows(category) {
      return Err(Denial::CategoryNotPermitted(category));
    }
    Ok(())
  }

  pub fn can_add(&self, category: RoleCategory) -> bool {
    self.check_add(category).is_ok()
  }

  /// [`Gate::check_add`], plus the badge must not already be locked for the
  /// current year.
  pub fn check_submit(&self, category: RoleCategory, badge: &str) -> Result<(), Denial> {
    self.check_add(category)?;
    let key = BadgeKey::new(badge, self.current_year);
    if self.school.is_locked(&key) {
      return Err(Denial::Locked(key));
    }
    Ok(())
  }

  pub fn can_submit(&self, category: RoleCategory, badge: &str) -> bool {
    self.check_submit(category, badge).is_ok()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rec(year: i32) -> SubmissionRecord {
    SubmissionRecord::new(
      "SK Bukit",
      "Keris Gangsa",
      "ALI",
      NaiveDate::from_ymd_opt(year, 3, 1),
    )
  }

  #[test]
  fn current_year_unlocked_record_is_mutable() {
    let school = School::new("SK Bukit");
    let gate = Gate::new(true, 2024, &school);
    assert!(gate.can_modify_record(&rec(2024)));
    assert!(gate.can_add(RoleCategory::Participant));
  }

  #[test]
  fn closed_registration_blocks_everything() {
    let school = School::new("SK Bukit");
    let gate = Gate::new(false, 2024, &school);
    assert_eq!(gate.check_modify_record(&rec(2024)), Err(Denial::RegistrationClosed));
    assert!(!gate.can_add(RoleCategory::Participant));
    assert!(!gate.can_submit(RoleCategory::Participant, "Keris Gangsa"));
  }

  #[test]
  fn past_years_are_frozen() {
    let school = School::new("SK Bukit");
    let gate = Gate::new(true, 2024, &school);
    assert_eq!(gate.check_modify_record(&rec(2023)), Err(Denial::PastYear(2023)));
    assert!(gate.can_modify_record(&rec(2025)));
  }

  #[test]
  fn locked_key_blocks_modification_and_submission() {
    let mut school = School::new("SK Bukit");
    school.lock(&BadgeKey::new("Keris Gangsa", 2024));
    let gate = Gate::new(true, 2024, &school);
    assert!(!gate.can_modify_record(&rec(2024)));
    assert!(!gate.can_submit(RoleCategory::Participant, "Keris Gangsa"));
    assert!(gate.can_submit(RoleCategory::Participant, "Keris Perak"));
    assert!(gate.can_add(RoleCategory::Participant));
  }

  #[test]
  fn category_flags() {
    let mut school = School::new("SK Bukit");
    school.permissions.examiners = false;
    let gate = Gate::new(true, 2024, &school);
    assert_eq!(
      gate.check_add(RoleCategory::Examiner),
      Err(Denial::CategoryNotPermitted(RoleCategory::Examiner))
    );
    assert!(gate.can_add(RoleCategory::Assistant));
  }

  #[test]
  fn undated_record_is_not_frozen() {
    let school = School::new("SK Bukit");
    let gate = Gate::new(true, 2024, &school);
    let mut r = rec(2024);
    r.date = None;
    assert!(gate.can_modify_record(&r));
  }
}
