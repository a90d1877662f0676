//! Async HTTP client for the backend script.
//!
//! Every call goes to one URL. Reads are `GET ?action=...`; writes are
//! `POST` with a JSON body carrying `action` and a CSRF token. Replies are
//! JSON with a `status` of `success` or `error`.

use std::time::Duration;

use chrono::{NaiveDate, TimeDelta, Utc};
use lencana_core::{
  access::{AccessFlags, AccessOverrides, AdminRole, QueryParams, Session},
  badge::BadgeKey,
  gate::Gate,
  record::SubmissionRecord,
  registration::{self, RegistrationBatch},
  school::{School, SchoolPermissions},
  snapshot::Snapshot,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::{
  Error,
  Result,
  action::Action,
  error::classify,
  state::{CsrfToken, StateStore},
};

/// Lifetime assumed for a CSRF token when the server does not say.
pub const CSRF_TTL: TimeDelta = TimeDelta::minutes(50);

/// Connection settings for the backend.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub backend_url: String,
  pub timeout:     Duration,
}

impl ClientConfig {
  pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

  pub fn new(backend_url: impl Into<String>) -> Self {
    Self { backend_url: backend_url.into(), timeout: Self::DEFAULT_TIMEOUT }
  }
}

/// Async client for the backend.
///
/// Cheap to clone; the HTTP client and the state store are both shared.
#[derive(Clone)]
pub struct ApiClient {
  http:   Client,
  config: ClientConfig,
  state:  StateStore,
}

impl ApiClient {
  /// A client with an in-memory state store.
  pub fn new(config: ClientConfig) -> Result<Self> {
    Self::with_state(config, StateStore::in_memory())
  }

  pub fn with_state(config: ClientConfig, state: StateStore) -> Result<Self> {
    let http = Client::builder().timeout(config.timeout).build()?;
    Ok(Self { http, config, state })
  }

  pub fn state(&self) -> &StateStore { &self.state }

  /// The configured URL, unless the local state overrides it.
  pub fn backend_url(&self) -> String {
    self
      .state
      .get()
      .backend_url
      .filter(|u| !u.trim().is_empty())
      .unwrap_or_else(|| self.config.backend_url.clone())
  }

  /// Effective access flags: deployment config over query over local
  /// toggles over defaults.
  pub fn access_flags(
    &self,
    query: &QueryParams,
    deployment: Option<&AccessOverrides>,
  ) -> AccessFlags {
    AccessFlags::resolve(&self.state.get().access, &query.overrides, deployment)
  }

  // ── Transport ─────────────────────────────────────────────────────────────

  async fn get(&self, action: Action) -> Result<Value> {
    tracing::debug!(%action, "GET");
    let body = self
      .http
      .get(self.backend_url())
      .query(&[("action", action.as_ref())])
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;
    Ok(body)
  }

  /// `POST {action, csrfToken, ...payload}`.
  ///
  /// A non-object payload is sent under `data`.
  pub async fn post(&self, action: Action, payload: Value) -> Result<Value> {
    let token = self.csrf_token().await?;
    let mut body = match payload {
      Value::Object(map) => map,
      Value::Null => Map::new(),
      other => Map::from_iter([("data".to_owned(), other)]),
    };
    body.insert("action".to_owned(), json!(action));
    body.insert("csrfToken".to_owned(), Value::String(token));

    let reply: Value = self
      .http
      .post(self.backend_url())
      .json(&body)
      .send()
      .await?
      .error_for_status()?
      .json()
      .await?;

    match classify(reply) {
      Ok(reply) => {
        tracing::info!(%action, "request succeeded");
        Ok(reply)
      }
      Err(e) => {
        tracing::warn!(%action, error = %e, "request failed");
        Err(e)
      }
    }
  }

  /// The cached CSRF token, or a fresh one from `?action=get_csrf`.
  pub async fn csrf_token(&self) -> Result<String> {
    let now = Utc::now();
    if let Some(cached) = self.state.get().csrf.filter(|t| t.is_valid(now)) {
      return Ok(cached.token);
    }

    let body = classify(self.get(Action::GetCsrf).await?)?;
    let token = body
      .get("token")
      .and_then(Value::as_str)
      .ok_or_else(|| Error::Server("server did not issue a CSRF token".to_owned()))?
      .to_owned();
    let ttl = body
      .get("expiresIn")
      .and_then(Value::as_i64)
      .and_then(TimeDelta::try_seconds)
      .unwrap_or(CSRF_TTL);

    let cached = CsrfToken { token: token.clone(), expires_at: now + ttl };
    self.state.update(|s| s.csrf = Some(cached)).await?;
    Ok(token)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  /// `GET ?action=get_data`. Accepts the snapshot either bare or under
  /// `data` in a `status` envelope.
  pub async fn fetch_snapshot(&self) -> Result<Snapshot> {
    let body = self.get(Action::GetData).await?;
    let data = if body.get("status").is_some() {
      let mut body = classify(body)?;
      match body.get_mut("data").map(Value::take) {
        Some(data) => data,
        None => body,
      }
    } else {
      body
    };
    let snapshot: Snapshot = serde_json::from_value(data)
      .map_err(|e| Error::Server(format!("unreadable data from server: {e}")))?;
    tracing::debug!(
      records = snapshot.records.len(),
      schools = snapshot.schools.len(),
      "fetched snapshot"
    );
    Ok(snapshot)
  }

  /// The deployment `config.json`, fetched with a cache buster.
  ///
  /// Any failure yields `None`, which callers treat as a non-production
  /// deployment.
  pub async fn load_deployment_config(&self, url: &str) -> Option<AccessOverrides> {
    let millis = Utc::now().timestamp_millis().to_string();
    let resp = match self.http.get(url).query(&[("t", millis)]).send().await {
      Ok(resp) => resp,
      Err(e) => {
        tracing::debug!(url, error = %e, "no deployment config");
        return None;
      }
    };
    if !resp.status().is_success() {
      tracing::debug!(url, status = %resp.status(), "no deployment config");
      return None;
    }
    match resp.json::<AccessOverrides>().await {
      Ok(overrides) => Some(overrides),
      Err(e) => {
        tracing::debug!(url, error = %e, "deployment config unreadable");
        None
      }
    }
  }

  // ── Login ─────────────────────────────────────────────────────────────────

  /// Post a login action under the throttle. Only rejections by the server
  /// count as failures; network errors do not.
  async fn throttled_login(&self, action: Action, payload: Value) -> Result<Value> {
    let now = Utc::now();
    self.state.get().throttle.check(now)?;
    match self.post(action, payload).await {
      Ok(body) => {
        self.state.update(|s| s.throttle.record_success()).await?;
        Ok(body)
      }
      Err(e) if e.is_server() => {
        self.state.update(|s| s.throttle.record_failure(now)).await?;
        Err(e)
      }
      Err(e) => Err(e),
    }
  }

  /// School login. On success the session is stored.
  pub async fn login_user(&self, school_code: &str, password: &str) -> Result<Session> {
    let body = self
      .throttled_login(
        Action::LoginUser,
        json!({ "schoolCode": school_code, "password": password }),
      )
      .await?;
    let reply: SchoolLoginReply = serde_json::from_value(body)
      .map_err(|e| Error::Server(format!("unexpected login reply: {e}")))?;
    let session = Session::School {
      school_name: reply.school_name,
      school_code: reply.school_code.or_else(|| Some(school_code.to_owned())),
    };
    self.state.set_session(session.clone(), Utc::now()).await?;
    Ok(session)
  }

  /// Regional or developer login. On success the session is stored.
  pub async fn login_admin(&self, username: &str, password: &str) -> Result<Session> {
    let body = self
      .throttled_login(
        Action::LoginAdmin,
        json!({ "username": username, "password": password }),
      )
      .await?;
    let reply: AdminLoginReply = serde_json::from_value(body)
      .map_err(|e| Error::Server(format!("unexpected login reply: {e}")))?;
    let role = reply.into_role()?;
    let session = Session::Admin(role);
    self
      .state
      .update(|s| {
        s.developer_mode = session.is_developer();
        s.session = Some(session.clone());
        s.last_activity = Some(Utc::now());
      })
      .await?;
    Ok(session)
  }

  pub async fn logout(&self) -> Result<()> {
    self
      .state
      .update(|s| {
        s.session = None;
        s.developer_mode = false;
      })
      .await
  }

  // ── Submissions ───────────────────────────────────────────────────────────

  /// Send one batch as-is. The leader is cached for the next form.
  pub async fn submit_form(&self, batch: &RegistrationBatch) -> Result<Value> {
    let payload = serde_json::to_value(batch).map_err(lencana_core::Error::from)?;
    let reply = self.post(Action::SubmitForm, payload).await?;
    let leader = batch.leader.clone();
    self.state.update(|s| s.leader = Some(leader)).await?;
    Ok(reply)
  }

  /// Run the pre-flight checks against `snapshot`, then submit.
  pub async fn submit_checked(
    &self,
    batch: &RegistrationBatch,
    snapshot: &Snapshot,
    today: NaiveDate,
  ) -> Result<Value> {
    registration::preflight(batch, snapshot, today)?;
    self.submit_form(batch).await
  }

  /// Membership-ID correction for `record`. Refused locally when `gate`
  /// does not permit editing it.
  pub async fn update_membership_id(
    &self,
    record: &SubmissionRecord,
    gate: &Gate<'_>,
    membership_id: &str,
  ) -> Result<Value> {
    let row = editable_row(record, gate)?;
    self
      .post(Action::UpdateData, json!({ "row": row, "membershipId": membership_id.trim() }))
      .await
  }

  /// Refused locally when `gate` does not permit deleting `record`.
  pub async fn delete_record(&self, record: &SubmissionRecord, gate: &Gate<'_>) -> Result<Value> {
    let row = editable_row(record, gate)?;
    self.post(Action::DeleteRecord, json!({ "row": row })).await
  }

  // ── Locks ─────────────────────────────────────────────────────────────────

  pub async fn lock_school_badge(&self, school: &str, key: &BadgeKey) -> Result<Value> {
    self
      .post(Action::LockSchoolBadge, json!({ "school": school, "badgeKey": key.to_string() }))
      .await
  }

  /// Unlocking also withdraws any approval of the key.
  pub async fn unlock_school_badge(&self, school: &str, key: &BadgeKey) -> Result<Value> {
    self
      .post(Action::UnlockSchoolBadge, json!({ "school": school, "badgeKey": key.to_string() }))
      .await
  }

  /// Refused locally unless `school` has already locked `key`.
  pub async fn approve_school_badge(&self, school: &School, key: &BadgeKey) -> Result<Value> {
    if !school.is_locked(key) {
      return Err(
        lencana_core::Error::ApproveWithoutLock { badge: key.badge.clone(), year: key.year }
          .into(),
      );
    }
    self
      .post(
        Action::ApproveSchoolBadge,
        json!({ "school": school.name, "badgeKey": key.to_string() }),
      )
      .await
  }

  // ── Configuration ─────────────────────────────────────────────────────────

  pub async fn toggle_registration(&self, open: bool) -> Result<Value> {
    self.post(Action::ToggleRegistration, json!({ "open": open })).await
  }

  pub async fn toggle_badge(&self, badge: &str, open: bool) -> Result<Value> {
    self.post(Action::ToggleBadge, json!({ "badge": badge, "open": open })).await
  }

  pub async fn update_school_permissions(
    &self,
    school: &str,
    permissions: &SchoolPermissions,
  ) -> Result<Value> {
    self
      .post(
        Action::UpdateSchoolPermissions,
        json!({ "school": school, "permissions": permissions }),
      )
      .await
  }

  pub async fn change_password(
    &self,
    school_code: &str,
    old_password: &str,
    new_password: &str,
  ) -> Result<Value> {
    self
      .post(
        Action::ChangePassword,
        json!({
          "schoolCode": school_code,
          "oldPassword": old_password,
          "newPassword": new_password,
        }),
      )
      .await
  }

  /// Copy school configuration from one year to the next.
  pub async fn migrate_year(&self, from: i32, to: i32) -> Result<Value> {
    self.post(Action::MigrateYear, json!({ "fromYear": from, "toYear": to })).await
  }

  /// Refused locally if the name or code is already registered.
  pub async fn register_school(
    &self,
    snapshot: &Snapshot,
    school: &School,
    password: &str,
  ) -> Result<Value> {
    registration::check_new_school(snapshot, &school.name, school.code.as_deref())?;
    let mut payload = serde_json::to_value(school).map_err(lencana_core::Error::from)?;
    if let Some(map) = payload.as_object_mut() {
      map.insert("password".to_owned(), Value::String(password.to_owned()));
    }
    self.post(Action::RegisterSchool, payload).await
  }

  pub async fn setup_database(&self) -> Result<Value> {
    self.post(Action::SetupDatabase, Value::Null).await
  }

  pub async fn clear_sheet_data(&self) -> Result<Value> {
    self.post(Action::ClearSheetData, Value::Null).await
  }
}

/// The sheet row of `record`, once `gate` allows changing it.
fn editable_row(record: &SubmissionRecord, gate: &Gate<'_>) -> Result<u32> {
  gate.check_modify_record(record).map_err(lencana_core::Error::from)?;
  record
    .row
    .ok_or_else(|| lencana_core::Error::MissingRow(record.name.trim().to_owned()).into())
}

// ─── Login replies ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SchoolLoginReply {
  #[serde(alias = "school")]
  school_name: String,
  #[serde(default)]
  school_code: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdminLoginReply {
  role:          String,
  #[serde(default)]
  state_code:    Option<String>,
  #[serde(default)]
  district_code: Option<String>,
}

impl AdminLoginReply {
  fn into_role(self) -> Result<AdminRole> {
    let missing = |field: &str| Error::Server(format!("login reply is missing {field}"));
    match self.role.trim().to_lowercase().as_str() {
      "developer" => Ok(AdminRole::Developer),
      "state" => Ok(AdminRole::State {
        state_code: self.state_code.ok_or_else(|| missing("stateCode"))?,
      }),
      "district" => Ok(AdminRole::District {
        state_code:    self.state_code.ok_or_else(|| missing("stateCode"))?,
        district_code: self.district_code.ok_or_else(|| missing("districtCode"))?,
      }),
      other => Err(Error::Server(format!("unknown admin role {other:?}"))),
    }
  }
}
