//! Error types for `lencana-core`.
//!
//! Every variant is a business-rule rejection detected before any request
//! reaches the backend. Display strings name the conflicting entity so they
//! can be shown to the user as-is.

use thiserror::Error;

use crate::{gate::Denial, role::RoleCategory};

#[derive(Debug, Error)]
pub enum Error {
  #[error("badge {0:?} is closed for submissions")]
  BadgeClosed(String),

  #[error("badge {0:?} has no next tier")]
  NoProgression(String),

  #[error("registration is closed")]
  RegistrationClosed,

  #[error("{0} additions are not permitted for this school")]
  CategoryNotPermitted(RoleCategory),

  #[error("{badge} {year} is already locked for {school}")]
  BadgeLocked {
    school: String,
    badge:  String,
    year:   i32,
  },

  #[error("{badge} {year} must be locked before it can be approved")]
  ApproveWithoutLock { badge: String, year: i32 },

  #[error("IC {0} appears more than once in this submission")]
  DuplicateIcInBatch(String),

  #[error("name {0:?} appears more than once in this submission")]
  DuplicateNameInBatch(String),

  #[error("IC {ic} ({name}) already has an approved {badge} {year} record")]
  AlreadyRecorded {
    ic:    String,
    name:  String,
    badge: String,
    year:  i32,
  },

  #[error("school {0:?} is already registered")]
  SchoolAlreadyRegistered(String),

  #[error("submission has no participants")]
  EmptyBatch,

  #[error("record for {0:?} has no sheet row")]
  MissingRow(String),

  #[error(transparent)]
  Denied(#[from] Denial),

  #[error("invalid date: {0:?}")]
  InvalidDate(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
