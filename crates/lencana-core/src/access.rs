//! Access flags, login sessions and the regional visibility hierarchy
//! (state → district → school).

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::{record::SubmissionRecord, school::School};

// ─── Flags ───────────────────────────────────────────────────────────────────

/// The portal-wide switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessFlags {
  /// Schools may log in.
  pub user_access:     bool,
  /// State admins may log in.
  pub admin_access:    bool,
  /// District admins may log in.
  pub district_access: bool,
  pub maintenance:     bool,
}

impl Default for AccessFlags {
  fn default() -> Self {
    Self {
      user_access:     true,
      admin_access:    true,
      district_access: true,
      maintenance:     false,
    }
  }
}

/// Names of the individual flags, as used in `config.json`, query strings
/// and the local state file.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  EnumIter,
  AsRefStr,
)]
#[serde(rename_all = "camelCase")]
#[strum(serialize_all = "camelCase")]
pub enum AccessFlag {
  UserAccess,
  AdminAccess,
  DistrictAccess,
  Maintenance,
}

impl AccessFlags {
  pub fn get(&self, flag: AccessFlag) -> bool {
    match flag {
      AccessFlag::UserAccess => self.user_access,
      AccessFlag::AdminAccess => self.admin_access,
      AccessFlag::DistrictAccess => self.district_access,
      AccessFlag::Maintenance => self.maintenance,
    }
  }

  pub fn set(&mut self, flag: AccessFlag, value: bool) {
    match flag {
      AccessFlag::UserAccess => self.user_access = value,
      AccessFlag::AdminAccess => self.admin_access = value,
      AccessFlag::DistrictAccess => self.district_access = value,
      AccessFlag::Maintenance => self.maintenance = value,
    }
  }

  /// Layer overrides from lowest to highest priority: local developer
  /// toggles, query parameters, then the deployment `config.json`.
  pub fn resolve(
    local: &AccessOverrides,
    query: &AccessOverrides,
    deployment: Option<&AccessOverrides>,
  ) -> Self {
    let mut flags = Self::default();
    local.apply(&mut flags);
    query.apply(&mut flags);
    if let Some(d) = deployment {
      d.apply(&mut flags);
    }
    flags
  }
}

/// A partial set of flags. Absent fields leave the lower layer untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessOverrides {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_access:     Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub admin_access:    Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub district_access: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub maintenance:     Option<bool>,
}

impl AccessOverrides {
  pub fn get(&self, flag: AccessFlag) -> Option<bool> {
    match flag {
      AccessFlag::UserAccess => self.user_access,
      AccessFlag::AdminAccess => self.admin_access,
      AccessFlag::DistrictAccess => self.district_access,
      AccessFlag::Maintenance => self.maintenance,
    }
  }

  pub fn set(&mut self, flag: AccessFlag, value: bool) {
    let slot = match flag {
      AccessFlag::UserAccess => &mut self.user_access,
      AccessFlag::AdminAccess => &mut self.admin_access,
      AccessFlag::DistrictAccess => &mut self.district_access,
      AccessFlag::Maintenance => &mut self.maintenance,
    };
    *slot = Some(value);
  }

  pub fn apply(&self, flags: &mut AccessFlags) {
    let pairs = [
      (AccessFlag::UserAccess, self.user_access),
      (AccessFlag::AdminAccess, self.admin_access),
      (AccessFlag::DistrictAccess, self.district_access),
      (AccessFlag::Maintenance, self.maintenance),
    ];
    for (flag, value) in pairs {
      if let Some(v) = value {
        flags.set(flag, v);
      }
    }
  }

  pub fn is_empty(&self) -> bool { *self == Self::default() }
}

/// Flags and bypass parsed from `key=value` query pairs.
///
/// A flag is true only for the literal value `"true"`. The `admin` key
/// (any value) bypasses the maintenance page; `t` is a cache buster and
/// ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryParams {
  pub overrides:    AccessOverrides,
  pub admin_bypass: bool,
}

impl QueryParams {
  pub fn parse<'a, I>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (&'a str, &'a str)>,
  {
    let mut out = Self::default();
    for (key, value) in pairs {
      if key == "admin" {
        out.admin_bypass = true;
      } else if let Ok(flag) = key.parse::<AccessFlag>() {
        out.overrides.set(flag, value == "true");
      }
    }
    out
  }

  /// Parse a raw `a=b&c=d` string (leading `?` allowed).
  pub fn parse_str(raw: &str) -> Self {
    Self::parse(
      raw
        .trim_start_matches('?')
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| p.split_once('=').unwrap_or((p, ""))),
    )
  }
}

// ─── Sessions ────────────────────────────────────────────────────────────────

/// The administrative roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum AdminRole {
  /// Super-role: manages badges, toggles and migrations; sees everything.
  Developer,
  State {
    state_code: String,
  },
  District {
    state_code:    String,
    district_code: String,
  },
}

/// Who is logged in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Session {
  School {
    school_name: String,
    school_code: Option<String>,
  },
  Admin(AdminRole),
}

impl Session {
  pub fn is_developer(&self) -> bool {
    matches!(self, Self::Admin(AdminRole::Developer))
  }

  /// Whether the flags still permit this session. Developer sessions are
  /// always permitted.
  pub fn allowed_by(&self, flags: &AccessFlags) -> bool {
    match self {
      Self::School { .. } => flags.user_access,
      Self::Admin(AdminRole::Developer) => true,
      Self::Admin(AdminRole::State { .. }) => flags.admin_access,
      Self::Admin(AdminRole::District { .. }) => flags.district_access,
    }
  }
}

/// Whether the maintenance page hides the portal from `session`.
pub fn maintenance_blocks(
  flags: &AccessFlags,
  session: Option<&Session>,
  admin_bypass: bool,
) -> bool {
  flags.maintenance && !admin_bypass && !session.is_some_and(Session::is_developer)
}

// ─── Regional scope ──────────────────────────────────────────────────────────

/// What an admin may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
  All,
  State(String),
  District { state: String, district: String },
}

impl From<&AdminRole> for Scope {
  fn from(role: &AdminRole) -> Self {
    match role {
      AdminRole::Developer => Self::All,
      AdminRole::State { state_code } => Self::State(state_code.clone()),
      AdminRole::District { state_code, district_code } => Self::District {
        state:    state_code.clone(),
        district: district_code.clone(),
      },
    }
  }
}

fn same(a: Option<&str>, b: &str) -> bool {
  a.is_some_and(|a| a.trim().eq_ignore_ascii_case(b.trim()))
}

impl Scope {
  pub fn visible_school(&self, school: &School) -> bool {
    match self {
      Self::All => true,
      Self::State(state) => same(school.state_code.as_deref(), state),
      Self::District { state, district } => {
        same(school.state_code.as_deref(), state)
          && same(school.district_code.as_deref(), district)
      }
    }
  }

  /// Records are scoped by their own region codes when present, otherwise
  /// by the codes of their school.
  pub fn visible_record(&self, record: &SubmissionRecord, schools: &[School]) -> bool {
    if *self == Self::All {
      return true;
    }
    if record.state_code.is_some() {
      let as_school = School {
        state_code: record.state_code.clone(),
        district_code: record.district_code.clone(),
        ..School::new(record.school.clone())
      };
      return self.visible_school(&as_school);
    }
    crate::school::find(schools, &record.school).is_some_and(|s| self.visible_school(s))
  }
}
