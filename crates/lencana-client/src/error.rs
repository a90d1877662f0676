//! Error taxonomy for backend calls.
//!
//! Every variant carries enough to build a message for the person at the
//! keyboard; see [`Error::user_message`]. Nothing here is fatal: a failed
//! call leaves local state as it was and can be retried.

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// Server message the backend returns for a bad school code or password.
const WRONG_CREDENTIALS: &str = "Salah info.";

/// Substrings that mark a backend too old to know the requested action.
const OUTDATED_MARKERS: &[&str] = &["invalid action", "tindakan tidak sah"];

#[derive(Debug, Error)]
pub enum Error {
  /// Transport failure, timeout, or a body that is not JSON.
  #[error("network error: {0}")]
  Network(#[from] reqwest::Error),

  /// `status: "error"` from the backend.
  #[error("server error: {0}")]
  Server(String),

  #[error("backend does not understand this action: {0}")]
  OutdatedBackend(String),

  #[error("login locked for another {}s", .remaining.as_secs())]
  RateLimited { remaining: Duration },

  /// Refused locally before anything was sent.
  #[error(transparent)]
  Rejected(#[from] lencana_core::Error),

  #[error("local state file: {0}")]
  State(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// Text suitable for showing as-is.
  pub fn user_message(&self) -> String {
    match self {
      Self::Network(_) => {
        "Could not reach the server. Check your connection and try again.".to_owned()
      }
      Self::Server(msg) => msg.clone(),
      Self::OutdatedBackend(_) => "The backend script is out of date. Redeploy the \
                                   latest version of the script, then try again."
        .to_owned(),
      Self::RateLimited { remaining } => {
        let minutes = remaining.as_secs().div_ceil(60).max(1);
        format!("Too many failed login attempts. Try again in {minutes} minute(s).")
      }
      Self::Rejected(e) => e.to_string(),
      Self::State(e) => format!("Could not read or write local settings: {e}"),
    }
  }

  pub fn is_server(&self) -> bool { matches!(self, Self::Server(_)) }
}

/// Turn a decoded response body into `Ok(body)` or the matching error.
pub(crate) fn classify(body: Value) -> Result<Value> {
  match body.get("status").and_then(Value::as_str) {
    Some("success") => Ok(body),
    Some(_) => {
      let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .trim()
        .to_owned();
      Err(server_error(message))
    }
    None => Err(Error::Server("unexpected response from server".to_owned())),
  }
}

fn server_error(message: String) -> Error {
  let lower = message.to_lowercase();
  if OUTDATED_MARKERS.iter().any(|m| lower.contains(m)) {
    Error::OutdatedBackend(message)
  } else if message == WRONG_CREDENTIALS {
    Error::Server("school code and password do not match".to_owned())
  } else {
    Error::Server(message)
  }
}
