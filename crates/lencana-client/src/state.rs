//! Local, process-wide state: the session, developer toggles, short-lived
//! caches and the login throttle.
//!
//! The file is a cache, not a store of record. Several processes may share
//! it; writes are whole-file and the last writer wins. Each process polls
//! the file (see [`StateStore::spawn_poller`]) and publishes what changed to
//! its own subscribers through a `watch` channel. Within one process,
//! updates and reloads are serialized so a reload never publishes a file
//! older than an update that already returned.

use std::{
  io,
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use lencana_core::{
  access::{AccessFlags, AccessOverrides, Session},
  registration::LeaderInfo,
};
use serde::{Deserialize, Serialize};
use tokio::{
  sync::{Mutex, watch},
  task::JoinHandle,
};

use crate::{Result, throttle::LoginThrottle};

/// Sessions idle for longer than this are dropped.
pub const IDLE_TIMEOUT: TimeDelta = TimeDelta::minutes(30);

/// A CSRF token and when it stops being valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfToken {
  pub token:      String,
  pub expires_at: DateTime<Utc>,
}

impl CsrfToken {
  pub fn is_valid(&self, now: DateTime<Utc>) -> bool { self.expires_at > now }
}

/// Everything kept between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalState {
  pub session:        Option<Session>,
  pub last_activity:  Option<DateTime<Utc>>,
  pub developer_mode: bool,
  /// Developer toggles; the lowest-priority access layer.
  pub access:         AccessOverrides,
  /// Leader details from the last submission, to pre-fill the next one.
  pub leader:         Option<LeaderInfo>,
  pub csrf:           Option<CsrfToken>,
  pub throttle:       LoginThrottle,
  /// Overrides the configured backend URL.
  pub backend_url:    Option<String>,
}

impl LocalState {
  /// Whether the session has been idle past [`IDLE_TIMEOUT`].
  pub fn is_idle(&self, now: DateTime<Utc>) -> bool {
    self.session.is_some()
      && self
        .last_activity
        .is_none_or(|last| now - last > IDLE_TIMEOUT)
  }
}

struct Inner {
  path:  Option<PathBuf>,
  tx:    watch::Sender<LocalState>,
  /// Held across read-modify-publish-persist and across reloads.
  write: Mutex<()>,
}

impl Inner {
  fn new(path: Option<PathBuf>, state: LocalState) -> Self {
    let (tx, _) = watch::channel(state);
    Self { path, tx, write: Mutex::new(()) }
  }
}

/// Shared handle to the local state. Cheap to clone.
#[derive(Clone)]
pub struct StateStore {
  inner: Arc<Inner>,
}

impl StateStore {
  /// Open the state file at `path`, starting empty if it does not exist.
  ///
  /// A file that no longer parses is treated as empty; it is rewritten on
  /// the next update.
  pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
    let path = path.into();
    let state = read_state(&path).await?.unwrap_or_default();
    Ok(Self { inner: Arc::new(Inner::new(Some(path), state)) })
  }

  /// A store that never touches disk.
  pub fn in_memory() -> Self {
    Self { inner: Arc::new(Inner::new(None, LocalState::default())) }
  }

  pub fn path(&self) -> Option<&Path> { self.inner.path.as_deref() }

  /// A snapshot of the current state.
  pub fn get(&self) -> LocalState { self.inner.tx.borrow().clone() }

  pub fn subscribe(&self) -> watch::Receiver<LocalState> { self.inner.tx.subscribe() }

  /// Apply `f` to a copy of the state, publish the copy if it differs, and
  /// write the file.
  pub async fn update<R>(&self, f: impl FnOnce(&mut LocalState) -> R) -> Result<R> {
    let _guard = self.inner.write.lock().await;
    let mut next = self.get();
    let out = f(&mut next);
    self.inner.tx.send_if_modified(|state| {
      if *state == next {
        return false;
      }
      *state = next.clone();
      true
    });
    self.persist(&next).await?;
    Ok(out)
  }

  async fn persist(&self, state: &LocalState) -> Result<()> {
    let Some(path) = &self.inner.path else {
      return Ok(());
    };
    let json = serde_json::to_vec_pretty(state).map_err(io::Error::from)?;
    if let Some(dir) = path.parent()
      && !dir.as_os_str().is_empty()
    {
      tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
  }

  /// Re-read the file and publish it if another process changed it.
  /// Returns whether anything changed.
  pub async fn reload(&self) -> Result<bool> {
    let Some(path) = &self.inner.path else {
      return Ok(false);
    };
    let _guard = self.inner.write.lock().await;
    let Some(disk) = read_state(path).await? else {
      return Ok(false);
    };
    let changed = self.inner.tx.send_if_modified(|state| {
      if *state == disk {
        return false;
      }
      if state.access != disk.access {
        tracing::info!(access = ?disk.access, "access toggles changed elsewhere");
      }
      *state = disk;
      true
    });
    Ok(changed)
  }

  /// Run [`StateStore::reload`] every `interval` until the task is aborted.
  pub fn spawn_poller(&self, interval: Duration) -> JoinHandle<()> {
    let store = self.clone();
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        if let Err(e) = store.reload().await {
          tracing::warn!(error = %e, "failed to reload local state");
        }
      }
    })
  }

  // ── Session helpers ───────────────────────────────────────────────────────

  pub async fn set_session(&self, session: Session, now: DateTime<Utc>) -> Result<()> {
    self
      .update(|s| {
        s.session = Some(session);
        s.last_activity = Some(now);
      })
      .await
  }

  /// Record activity so the idle timer restarts.
  pub async fn touch(&self, now: DateTime<Utc>) -> Result<()> {
    self.update(|s| s.last_activity = Some(now)).await
  }

  /// Drop a session idle past [`IDLE_TIMEOUT`]. Returns whether one was
  /// dropped.
  pub async fn expire_idle(&self, now: DateTime<Utc>) -> Result<bool> {
    self
      .update(|s| {
        let idle = s.is_idle(now);
        if idle {
          tracing::info!("session expired after inactivity");
          s.session = None;
        }
        idle
      })
      .await
  }

  /// Log out a session that `flags` no longer permit. Returns whether one
  /// was logged out.
  pub async fn enforce_access(&self, flags: &AccessFlags) -> Result<bool> {
    self
      .update(|s| {
        let revoked = s.session.as_ref().is_some_and(|sess| !sess.allowed_by(flags));
        if revoked {
          tracing::warn!(session = ?s.session, "access revoked; logging out");
          s.session = None;
        }
        revoked
      })
      .await
  }
}

async fn read_state(path: &Path) -> Result<Option<LocalState>> {
  let bytes = match tokio::fs::read(path).await {
    Ok(b) => b,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e.into()),
  };
  match serde_json::from_slice(&bytes) {
    Ok(state) => Ok(Some(state)),
    Err(e) => {
      tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable state file");
      Ok(None)
    }
  }
}
