//! Badges, badge tiers and the `badge_year` keys schools lock and approve.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

// ─── Badge ───────────────────────────────────────────────────────────────────

/// A badge as configured by the developer role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
  pub name:     String,
  /// Global switch; a closed badge accepts no submissions anywhere.
  #[serde(default = "default_open")]
  pub is_open:  bool,
  #[serde(default)]
  pub deadline: Option<NaiveDate>,
}

fn default_open() -> bool { true }

impl Badge {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), is_open: true, deadline: None }
  }

  /// Open, and `today` is not past the deadline (the deadline day itself is
  /// still accepted).
  pub fn accepts_submissions(&self, today: NaiveDate) -> bool {
    self.is_open && self.deadline.is_none_or(|d| today <= d)
  }
}

/// Look a badge up by exact name.
pub fn find<'a>(badges: &'a [Badge], name: &str) -> Option<&'a Badge> {
  badges.iter().find(|b| b.name == name)
}

// ─── BadgeTier ───────────────────────────────────────────────────────────────

/// The fixed badge vocabulary. Free-text badge names outside this set are
/// legal on records but have no tier.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
pub enum BadgeTier {
  #[strum(serialize = "Keris Gangsa")]
  Gangsa,
  #[strum(serialize = "Keris Perak")]
  Perak,
  #[strum(serialize = "Keris Emas")]
  Emas,
  #[strum(serialize = "Anugerah Rambu")]
  Rambu,
}

impl BadgeTier {
  /// Resolve an exact badge name to its tier.
  pub fn from_name(name: &str) -> Option<Self> {
    Self::iter().find(|t| t.to_string() == name)
  }

  /// Gangsa progresses to Perak, Perak to Emas. Nothing else progresses.
  pub fn next_tier(self) -> Option<Self> {
    match self {
      Self::Gangsa => Some(Self::Perak),
      Self::Perak => Some(Self::Emas),
      Self::Emas | Self::Rambu => None,
    }
  }
}

// ─── BadgeKey ────────────────────────────────────────────────────────────────

/// A badge within one award year, rendered `"{badge}_{year}"` in the
/// school's locked and approved lists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BadgeKey {
  pub badge: String,
  pub year:  i32,
}

impl BadgeKey {
  pub fn new(badge: impl Into<String>, year: i32) -> Self {
    Self { badge: badge.into(), year }
  }

  /// Parse `"{badge}_{year}"`. Returns `None` for legacy bare names.
  pub fn parse(raw: &str) -> Option<Self> {
    let (badge, year) = raw.rsplit_once('_')?;
    let year = year.parse().ok()?;
    Some(Self::new(badge, year))
  }

  /// Whether a stored list entry refers to this key. Bare badge names match
  /// any year so rows written before keys carried a year still count.
  pub fn matches_entry(&self, entry: &str) -> bool {
    match Self::parse(entry) {
      Some(k) => k == *self,
      None => entry == self.badge,
    }
  }

  pub fn is_in(&self, list: &[String]) -> bool {
    list.iter().any(|e| self.matches_entry(e))
  }
}

impl fmt::Display for BadgeKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}_{}", self.badge, self.year)
  }
}
