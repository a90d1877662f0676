//! Runtime settings: `lencana.toml`, then `LENCANA_*` environment variables,
//! then command-line flags.

use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use lencana_client::ClientConfig;
use serde::Deserialize;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Deserialised from the config file and environment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
  /// The backend web-app endpoint.
  #[serde(default)]
  pub backend_url:           String,
  /// Deployment `config.json` carrying the highest-priority access flags.
  #[serde(default)]
  pub deployment_config_url: Option<String>,
  #[serde(default = "default_state_path")]
  pub state_path:            PathBuf,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs:          u64,
}

fn default_state_path() -> PathBuf { PathBuf::from("lencana-state.json") }

fn default_timeout_secs() -> u64 { ClientConfig::DEFAULT_TIMEOUT.as_secs() }

impl Default for Settings {
  fn default() -> Self {
    Self {
      backend_url:           String::new(),
      deployment_config_url: None,
      state_path:            default_state_path(),
      timeout_secs:          default_timeout_secs(),
    }
  }
}

impl Settings {
  /// Layer the optional file at `path` under `LENCANA_*` variables.
  pub fn load(path: PathBuf) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("LENCANA"))
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise settings")
  }

  pub fn client_config(&self) -> anyhow::Result<ClientConfig> {
    if self.backend_url.trim().is_empty() {
      anyhow::bail!(
        "no backend URL configured; set backend_url in lencana.toml, \
         LENCANA_BACKEND_URL, or pass --backend-url"
      );
    }
    Ok(ClientConfig {
      backend_url: self.backend_url.trim().to_owned(),
      timeout:     Duration::from_secs(self.timeout_secs),
    })
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  #[test]
  fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::load(dir.path().join("absent.toml")).unwrap();
    assert_eq!(settings.state_path, PathBuf::from("lencana-state.json"));
    assert_eq!(settings.timeout_secs, 30);
  }

  #[test]
  fn file_values_are_read() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "backend_url = \"https://script.example/exec\"").unwrap();
    writeln!(file, "timeout_secs = 5").unwrap();

    let settings = Settings::load(file.path().to_path_buf()).unwrap();
    assert_eq!(settings.backend_url, "https://script.example/exec");
    let client = settings.client_config().unwrap();
    assert_eq!(client.timeout, Duration::from_secs(5));
  }

  #[test]
  fn blank_backend_url_is_refused() {
    assert!(Settings::default().client_config().is_err());
  }
}
