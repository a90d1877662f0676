//! Client-side login throttle.
//!
//! A soft guard only; the backend still has the final say.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const MAX_FAILURES: usize = 5;
pub const WINDOW: TimeDelta = TimeDelta::minutes(15);
pub const LOCKOUT: TimeDelta = TimeDelta::minutes(15);

/// Recent failed attempts and the current lockout, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginThrottle {
  #[serde(default)]
  failures:     Vec<DateTime<Utc>>,
  #[serde(default)]
  locked_until: Option<DateTime<Utc>>,
}

impl LoginThrottle {
  /// `Err(RateLimited)` while a lockout is running.
  pub fn check(&self, now: DateTime<Utc>) -> Result<()> {
    match self.locked_until {
      Some(until) if until > now => Err(Error::RateLimited {
        remaining: (until - now).to_std().unwrap_or_default(),
      }),
      _ => Ok(()),
    }
  }

  /// Count a failed attempt. The fifth failure inside the window starts a
  /// lockout and resets the count.
  pub fn record_failure(&mut self, now: DateTime<Utc>) {
    self.failures.retain(|t| now - *t < WINDOW);
    self.failures.push(now);
    if self.failures.len() >= MAX_FAILURES {
      let until = now + LOCKOUT;
      tracing::warn!(%until, "login locked after repeated failures");
      self.locked_until = Some(until);
      self.failures.clear();
    }
  }

  pub fn record_success(&mut self) {
    self.failures.clear();
    self.locked_until = None;
  }

  pub fn failures(&self) -> usize { self.failures.len() }

  pub fn locked_until(&self) -> Option<DateTime<Utc>> { self.locked_until }
}
