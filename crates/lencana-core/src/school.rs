//! Participating schools, their per-category permission flags and their
//! locked/approved badge lists.

use serde::{Deserialize, Serialize};

use crate::{
  Error,
  Result,
  badge::BadgeKey,
  role::RoleCategory,
};

/// Which role categories a school may currently add.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolPermissions {
  #[serde(default = "yes")]
  pub participants: bool,
  #[serde(default = "yes")]
  pub assistants:   bool,
  #[serde(default = "yes")]
  pub examiners:    bool,
}

fn yes() -> bool { true }

impl Default for SchoolPermissions {
  fn default() -> Self {
    Self { participants: true, assistants: true, examiners: true }
  }
}

impl SchoolPermissions {
  pub fn allows(&self, category: RoleCategory) -> bool {
    match category {
      RoleCategory::Participant => self.participants,
      RoleCategory::Assistant => self.assistants,
      RoleCategory::Examiner => self.examiners,
    }
  }

  pub fn set(&mut self, category: RoleCategory, allowed: bool) {
    match category {
      RoleCategory::Participant => self.participants = allowed,
      RoleCategory::Assistant => self.assistants = allowed,
      RoleCategory::Examiner => self.examiners = allowed,
    }
  }
}

/// A participating institution.
///
/// `approved_badges` is always a subset of `locked_badges`: approval
/// promotes a lock, and unlocking withdraws the approval with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
  pub name:            String,
  #[serde(default)]
  pub code:            Option<String>,
  #[serde(default)]
  pub state_code:      Option<String>,
  #[serde(default)]
  pub district_code:   Option<String>,
  #[serde(default)]
  pub permissions:     SchoolPermissions,
  /// Submitted, pending regional approval.
  #[serde(default)]
  pub locked_badges:   Vec<String>,
  /// Confirmed into official statistics.
  #[serde(default)]
  pub approved_badges: Vec<String>,
}

impl School {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name:            name.into(),
      code:            None,
      state_code:      None,
      district_code:   None,
      permissions:     SchoolPermissions::default(),
      locked_badges:   Vec::new(),
      approved_badges: Vec::new(),
    }
  }

  pub fn is_locked(&self, key: &BadgeKey) -> bool {
    key.is_in(&self.locked_badges)
  }

  pub fn is_approved(&self, key: &BadgeKey) -> bool {
    key.is_in(&self.approved_badges)
  }

  pub fn allows(&self, category: RoleCategory) -> bool {
    self.permissions.allows(category)
  }

  /// Mark a badge year as submitted. Locking twice is a no-op.
  pub fn lock(&mut self, key: &BadgeKey) {
    if !self.is_locked(key) {
      self.locked_badges.push(key.to_string());
    }
  }

  /// Remove a lock, withdrawing any approval that depended on it.
  pub fn unlock(&mut self, key: &BadgeKey) {
    self.locked_badges.retain(|e| !key.matches_entry(e));
    self.approved_badges.retain(|e| !key.matches_entry(e));
  }

  /// Promote a lock to an approval.
  pub fn approve(&mut self, key: &BadgeKey) -> Result<()> {
    if !self.is_locked(key) {
      return Err(Error::ApproveWithoutLock {
        badge: key.badge.clone(),
        year:  key.year,
      });
    }
    if !self.is_approved(key) {
      self.approved_badges.push(key.to_string());
    }
    Ok(())
  }

  /// Case-insensitive name comparison; the sheet is not consistent about
  /// capitalisation.
  pub fn is_named(&self, name: &str) -> bool {
    self.name.trim().eq_ignore_ascii_case(name.trim())
  }
}

/// Find a school by name (case-insensitive).
pub fn find<'a>(schools: &'a [School], name: &str) -> Option<&'a School> {
  schools.iter().find(|s| s.is_named(name))
}
