//! One full read of the backend.
//!
//! The client never patches state incrementally: every mutation is followed
//! by a fresh [`Snapshot`], and all views are recomputed from it.

use serde::{Deserialize, Serialize};

use crate::{
  badge::{self, Badge},
  record::SubmissionRecord,
  school::{self, School},
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
  #[serde(default)]
  pub records:           Vec<SubmissionRecord>,
  #[serde(default)]
  pub schools:           Vec<School>,
  #[serde(default)]
  pub badges:            Vec<Badge>,
  /// The global registration toggle.
  #[serde(default)]
  pub registration_open: bool,
}

impl Snapshot {
  pub fn school(&self, name: &str) -> Option<&School> {
    school::find(&self.schools, name)
  }

  pub fn badge(&self, name: &str) -> Option<&Badge> {
    badge::find(&self.badges, name)
  }

  /// Records belonging to one school.
  pub fn records_for<'a>(
    &'a self,
    school: &'a str,
  ) -> impl Iterator<Item = &'a SubmissionRecord> + 'a {
    self
      .records
      .iter()
      .filter(move |r| r.school.trim().eq_ignore_ascii_case(school.trim()))
  }
}
