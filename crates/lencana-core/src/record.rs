//! Submission records, each one person's entry for one badge in one dated
//! session, and the keys derived from them.
//!
//! The backend is a spreadsheet, so cells arrive loosely typed: IC numbers
//! and membership IDs may be JSON numbers, dates may carry a time component,
//! roles may be blank. All of that is resolved here, once, at
//! deserialisation; downstream code only sees [`SubmissionRecord`].

use std::fmt;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::{badge::BadgeKey, role::Role};

/// School value written on the placeholder row that marks a session as
/// opened. Such rows carry no participant and are never shown.
pub const SESSION_MARKER: &str = "SESI DIBUKA";

/// IC numbers at or below this length are treated as missing when building
/// identity keys.
pub const MIN_IC_LEN: usize = 4;

// ─── AwardYear ───────────────────────────────────────────────────────────────

/// The calendar year of a record's date.
///
/// Records without a parseable date have an unknown year. Unknown sorts
/// after every known year and never compares equal to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AwardYear(Option<i32>);

impl AwardYear {
  pub const UNKNOWN: Self = Self(None);

  pub fn known(year: i32) -> Self { Self(Some(year)) }

  pub fn of(date: Option<NaiveDate>) -> Self { Self(date.map(|d| d.year())) }

  pub fn get(self) -> Option<i32> { self.0 }

  pub fn is_known(self) -> bool { self.0.is_some() }
}

impl Ord for AwardYear {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    use std::cmp::Ordering::*;
    match (self.0, other.0) {
      (Some(a), Some(b)) => a.cmp(&b),
      (Some(_), None) => Less,
      (None, Some(_)) => Greater,
      (None, None) => Equal,
    }
  }
}

impl PartialOrd for AwardYear {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl fmt::Display for AwardYear {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self.0 {
      Some(y) => write!(f, "{y}"),
      None => f.write_str("?"),
    }
  }
}

// ─── IdentityKey ─────────────────────────────────────────────────────────────

/// Best-effort identifier for a person across rows and years.
///
/// With an IC longer than [`MIN_IC_LEN`]: `"{ic}|{NAME}"`. Without one:
/// `"{NAME}|{SCHOOL}"`. Two students sharing a name at one school and both
/// lacking an IC collapse into one key; this is a known limitation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
  pub fn derive(ic: Option<&str>, name: &str, school: &str) -> Self {
    let name = normalize_name(name);
    match ic.map(normalize_ic) {
      Some(ic) if ic.len() > MIN_IC_LEN => Self(format!("{ic}|{name}")),
      _ => Self(format!("{name}|{}", normalize_name(school))),
    }
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for IdentityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Strip hyphens and whitespace from an IC number.
pub fn normalize_ic(raw: &str) -> String {
  raw
    .chars()
    .filter(|c| *c != '-' && !c.is_whitespace())
    .collect()
}

/// Trim, collapse inner whitespace and uppercase.
pub fn normalize_name(raw: &str) -> String {
  raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

// ─── SubmissionRecord ────────────────────────────────────────────────────────

/// One row of the backend's submission sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
  #[serde(default, deserialize_with = "de::lenient_date")]
  pub date:          Option<NaiveDate>,
  #[serde(default)]
  pub school:        String,
  #[serde(default, deserialize_with = "de::loose_string")]
  pub school_code:   Option<String>,
  #[serde(default, deserialize_with = "de::loose_string")]
  pub state_code:    Option<String>,
  #[serde(default, deserialize_with = "de::loose_string")]
  pub district_code: Option<String>,
  #[serde(default)]
  pub badge:         String,
  #[serde(default)]
  pub name:          String,
  #[serde(default)]
  pub gender:        String,
  #[serde(default)]
  pub race:          String,
  /// Externally issued; `None` while pending.
  #[serde(default, deserialize_with = "de::loose_string")]
  pub membership_id: Option<String>,
  #[serde(default, deserialize_with = "de::loose_string")]
  pub ic:            Option<String>,
  #[serde(default, deserialize_with = "de::loose_string")]
  pub phone:         Option<String>,
  #[serde(default, deserialize_with = "de::role")]
  pub role:          Role,
  #[serde(default)]
  pub remarks:       String,
  /// Sheet row used to address updates and deletes. Opaque to the client.
  #[serde(default)]
  pub row:           Option<u32>,
}

impl SubmissionRecord {
  /// A record with only the identifying fields set; the rest default.
  pub fn new(
    school: impl Into<String>,
    badge: impl Into<String>,
    name: impl Into<String>,
    date: Option<NaiveDate>,
  ) -> Self {
    Self {
      date,
      school: school.into(),
      school_code: None,
      state_code: None,
      district_code: None,
      badge: badge.into(),
      name: name.into(),
      gender: String::new(),
      race: String::new(),
      membership_id: None,
      ic: None,
      phone: None,
      role: Role::Peserta,
      remarks: String::new(),
      row: None,
    }
  }

  pub fn award_year(&self) -> AwardYear { AwardYear::of(self.date) }

  pub fn identity_key(&self) -> IdentityKey {
    IdentityKey::derive(self.ic.as_deref(), &self.name, &self.school)
  }

  /// The IC with separators removed, if one is recorded.
  pub fn normalized_ic(&self) -> Option<String> {
    self.ic.as_deref().map(normalize_ic).filter(|ic| !ic.is_empty())
  }

  /// `None` when the award year is unknown.
  pub fn badge_key(&self) -> Option<BadgeKey> {
    self
      .award_year()
      .get()
      .map(|year| BadgeKey::new(self.badge.clone(), year))
  }

  pub fn is_session_marker(&self) -> bool {
    self.school.trim() == SESSION_MARKER
  }

  pub fn has_name(&self) -> bool { !self.name.trim().is_empty() }
}

// ─── Loose deserialisers ─────────────────────────────────────────────────────

pub(crate) mod de {
  use chrono::NaiveDate;
  use serde::{Deserialize, Deserializer};
  use serde_json::Value;

  use crate::role::Role;

  /// Accept a string, number or null; blank strings become `None`.
  pub fn loose_string<'de, D>(d: D) -> Result<Option<String>, D::Error>
  where
    D: Deserializer<'de>,
  {
    Ok(match Value::deserialize(d)? {
      Value::String(s) => Some(s.trim().to_owned()).filter(|s| !s.is_empty()),
      Value::Number(n) => Some(number_text(&n)),
      Value::Bool(b) => Some(b.to_string()),
      _ => None,
    })
  }

  /// Render integral floats without the trailing `.0` spreadsheets add.
  fn number_text(n: &serde_json::Number) -> String {
    if let Some(i) = n.as_i64() {
      return i.to_string();
    }
    if let Some(u) = n.as_u64() {
      return u.to_string();
    }
    match n.as_f64() {
      Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
      _ => n.to_string(),
    }
  }

  pub fn lenient_date<'de, D>(d: D) -> Result<Option<NaiveDate>, D::Error>
  where
    D: Deserializer<'de>,
  {
    Ok(match Value::deserialize(d)? {
      Value::String(s) => super::parse_date(&s),
      _ => None,
    })
  }

  pub fn role<'de, D>(d: D) -> Result<Role, D::Error>
  where
    D: Deserializer<'de>,
  {
    Ok(
      loose_string(d)?
        .map(|s| Role::parse(&s))
        .unwrap_or_default(),
    )
  }
}

/// Parse the date formats the sheet produces: ISO dates, ISO datetimes and
/// `DD/MM/YYYY`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
  let raw = raw.trim();
  if let Some(prefix) = raw.get(..10)
    && let Ok(d) = NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
  {
    return Some(d);
  }
  NaiveDate::parse_from_str(raw, "%d/%m/%Y").ok()
}
