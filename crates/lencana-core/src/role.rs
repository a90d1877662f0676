//! Roles a person can hold in a submission, and the coarser categories the
//! permission flags and promotion filters work with.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

// ─── Role ────────────────────────────────────────────────────────────────────

/// The role recorded on a submission row.
///
/// The backend stores roles as free text. Known values are canonicalised on
/// the way in; anything else is kept verbatim (uppercased) in
/// [`Role::Other`] so category matching can still inspect it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Role {
  #[default]
  Peserta,
  Pemimpin,
  PenolongPemimpin,
  Penguji,
  PenerimaRambu,
  Other(String),
}

impl Role {
  pub fn as_str(&self) -> &str {
    match self {
      Self::Peserta => "PESERTA",
      Self::Pemimpin => "PEMIMPIN",
      Self::PenolongPemimpin => "PENOLONG PEMIMPIN",
      Self::Penguji => "PENGUJI",
      Self::PenerimaRambu => "PENERIMA RAMBU",
      Self::Other(s) => s,
    }
  }

  /// Parse a role as stored by the backend. Blank means `PESERTA`.
  pub fn parse(raw: &str) -> Self {
    let upper = raw.trim().to_uppercase();
    match upper.as_str() {
      "" | "PESERTA" => Self::Peserta,
      "PEMIMPIN" => Self::Pemimpin,
      "PENOLONG PEMIMPIN" => Self::PenolongPemimpin,
      "PENGUJI" => Self::Penguji,
      "PENERIMA RAMBU" => Self::PenerimaRambu,
      _ => Self::Other(upper),
    }
  }

  /// Lenient lookup used for hand-typed spreadsheet cells.
  ///
  /// Only leader, assistant-leader and examiner spellings are recognised;
  /// everything else becomes `PESERTA`.
  pub fn from_free_text(raw: &str) -> Self {
    let upper = raw.trim().to_uppercase();
    let squashed: String = upper
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .collect();

    if upper.contains("PENOLONG")
      || squashed.starts_with("PENPEMIMPIN")
      || squashed == "PP"
      || upper.contains("ASSISTANT")
    {
      Self::PenolongPemimpin
    } else if upper.contains("PENGUJI") || upper.contains("EXAMINER") {
      Self::Penguji
    } else if upper.contains("PEMIMPIN") || upper.contains("LEADER") {
      Self::Pemimpin
    } else {
      Self::Peserta
    }
  }

  /// The category this role falls under, if any.
  ///
  /// Participants are `PESERTA` and `PENERIMA RAMBU`; assistants are
  /// `PEMIMPIN` and any role mentioning `PENOLONG`; examiners are exactly
  /// `PENGUJI`.
  pub fn category(&self) -> Option<RoleCategory> {
    match self {
      Self::Peserta | Self::PenerimaRambu => Some(RoleCategory::Participant),
      Self::Pemimpin | Self::PenolongPemimpin => Some(RoleCategory::Assistant),
      Self::Penguji => Some(RoleCategory::Examiner),
      Self::Other(s) if s.contains("PENOLONG") => Some(RoleCategory::Assistant),
      Self::Other(_) => None,
    }
  }

  /// Leaders, assistants and examiners; excluded from participant views.
  pub fn is_staff(&self) -> bool {
    matches!(
      self.category(),
      Some(RoleCategory::Assistant | RoleCategory::Examiner)
    )
  }
}

impl fmt::Display for Role {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl From<String> for Role {
  fn from(s: String) -> Self { Self::parse(&s) }
}

impl From<Role> for String {
  fn from(r: Role) -> Self { r.as_str().to_owned() }
}

// ─── RoleCategory ────────────────────────────────────────────────────────────

/// The unit per-school permission flags and promotion filters operate on.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RoleCategory {
  Participant,
  Assistant,
  Examiner,
}

impl RoleCategory {
  pub fn contains(self, role: &Role) -> bool { role.category() == Some(self) }

  /// The role given to a person added under this category.
  pub fn default_role(self) -> Role {
    match self {
      Self::Participant => Role::Peserta,
      Self::Assistant => Role::PenolongPemimpin,
      Self::Examiner => Role::Penguji,
    }
  }
}
