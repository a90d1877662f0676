//! End-to-end tests against an in-process stand-in for the backend script.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex},
};

use axum::{
  Json,
  Router,
  extract::{Query, State},
  http::StatusCode,
  routing::get,
};
use chrono::NaiveDate;
use lencana_core::{
  badge::{Badge, BadgeKey},
  gate::{Denial, Gate},
  promotion::PromotionRequest,
  record::SubmissionRecord,
  registration::{LeaderInfo, Participant, RegistrationBatch},
  role::{Role, RoleCategory},
  school::School,
  snapshot::Snapshot,
};
use serde_json::{Value, json};

use crate::{ApiClient, ClientConfig, Error, StateStore, throttle::MAX_FAILURES};

// ─── Stand-in backend ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct Backend {
  posts:      Arc<Mutex<Vec<Value>>>,
  gets:       Arc<Mutex<Vec<HashMap<String, String>>>>,
  snapshot:   Arc<Value>,
  deployment: Arc<Option<Value>>,
}

impl Backend {
  fn posts(&self) -> Vec<Value> { self.posts.lock().unwrap().clone() }

  fn csrf_requests(&self) -> usize {
    self
      .gets
      .lock()
      .unwrap()
      .iter()
      .filter(|q| q.get("action").map(String::as_str) == Some("get_csrf"))
      .count()
  }
}

async fn handle_get(
  State(b): State<Backend>,
  Query(query): Query<HashMap<String, String>>,
) -> Json<Value> {
  let action = query.get("action").cloned().unwrap_or_default();
  let n = {
    let mut gets = b.gets.lock().unwrap();
    gets.push(query);
    gets.len()
  };
  Json(match action.as_str() {
    "get_csrf" => json!({ "status": "success", "token": format!("tok-{n}"), "expiresIn": 3600 }),
    "get_data" => json!({ "status": "success", "data": *b.snapshot }),
    _ => json!({ "status": "error", "message": "Invalid action" }),
  })
}

async fn handle_post(State(b): State<Backend>, Json(body): Json<Value>) -> Json<Value> {
  b.posts.lock().unwrap().push(body.clone());
  let action = body["action"].as_str().unwrap_or_default();
  Json(match action {
    "login_user" if body["password"] == "betul" => {
      json!({ "status": "success", "schoolName": "SK BUKIT", "schoolCode": "JBA1234" })
    }
    "login_user" => json!({ "status": "error", "message": "Salah info." }),
    "login_admin" => json!({
      "status": "success",
      "role": "district",
      "stateCode": "J",
      "districtCode": "J01",
    }),
    "submit_form" if body["leader"]["school"] == "SK GAGAL" => {
      json!({ "status": "error", "message": "Sekolah tidak dijumpai" })
    }
    "approve_school_badge" => json!({ "status": "error", "message": "Invalid action" }),
    _ => json!({ "status": "success" }),
  })
}

async fn handle_config(State(b): State<Backend>) -> Result<Json<Value>, StatusCode> {
  (*b.deployment).clone().map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn spawn(backend: Backend) -> String {
  let app = Router::new()
    .route("/exec", get(handle_get).post(handle_post))
    .route("/config.json", get(handle_config))
    .with_state(backend);
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
  let addr = listener.local_addr().unwrap();
  tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
  format!("http://{addr}")
}

async fn client_for(backend: &Backend) -> (ApiClient, String) {
  let base = spawn(backend.clone()).await;
  let client = ApiClient::new(ClientConfig::new(format!("{base}/exec"))).unwrap();
  (client, base)
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn today() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 3, 1).unwrap() }

fn snapshot() -> Snapshot {
  let mut locked = School::new("SK KUNCI");
  locked.lock(&BadgeKey::new("Keris Gangsa", 2025));
  let mut perak = Badge::new("Keris Perak");
  perak.is_open = false;

  let mut ali = SubmissionRecord::new(
    "SK BUKIT",
    "Keris Gangsa",
    "ALI",
    NaiveDate::from_ymd_opt(2024, 2, 1),
  );
  ali.ic = Some("900101011234".into());

  Snapshot {
    records:           vec![ali],
    schools:           vec![
      School::new("SK BUKIT"),
      School::new("SK GAGAL"),
      School::new("SK LAIN"),
      locked,
    ],
    badges:            vec![Badge::new("Keris Gangsa"), perak],
    registration_open: true,
  }
}

fn batch(school: &str, name: &str) -> RegistrationBatch {
  RegistrationBatch {
    date:         today(),
    badge:        "Keris Gangsa".into(),
    leader:       LeaderInfo::placeholder(school, None),
    participants: vec![Participant {
      name:          name.into(),
      ic:            None,
      gender:        "Lelaki".into(),
      race:          "Melayu".into(),
      role:          Role::Peserta,
      membership_id: None,
      phone:         None,
      remarks:       String::new(),
    }],
  }
}

fn record_at(row: u32, year: i32) -> SubmissionRecord {
  let mut r = SubmissionRecord::new(
    "SK BUKIT",
    "Keris Gangsa",
    "ABU",
    NaiveDate::from_ymd_opt(year, 2, 1),
  );
  r.row = Some(row);
  r
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_is_read_from_the_data_envelope() {
  let backend = Backend {
    snapshot: Arc::new(serde_json::to_value(snapshot()).unwrap()),
    ..Default::default()
  };
  let (client, _) = client_for(&backend).await;
  let snap = client.fetch_snapshot().await.unwrap();
  assert_eq!(snap.schools.len(), 4);
  assert_eq!(snap.records[0].name, "ALI");
  assert!(snap.registration_open);
}

#[tokio::test]
async fn posts_carry_action_and_a_cached_csrf_token() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;

  client.toggle_registration(false).await.unwrap();
  client.toggle_badge("Keris Emas", true).await.unwrap();

  let posts = backend.posts();
  assert_eq!(posts[0]["action"], "toggle_registration");
  assert_eq!(posts[0]["open"], false);
  assert_eq!(posts[1]["action"], "toggle_badge");
  assert_eq!(posts[0]["csrfToken"], posts[1]["csrfToken"]);
  assert_eq!(backend.csrf_requests(), 1);
}

#[tokio::test]
async fn bulk_submit_continues_past_a_failed_group() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;
  let batches = vec![
    batch("SK BUKIT", "ABU"),
    batch("SK GAGAL", "SITI"),
    batch("SK KUNCI", "AMIN"),
    batch("SK LAIN", "AHMAD"),
  ];

  let outcomes = client.submit_batches(&batches, &snapshot(), today()).await;
  let summary: Vec<_> = outcomes.iter().map(|o| (o.school.as_str(), o.is_ok())).collect();
  assert_eq!(
    summary,
    vec![("SK BUKIT", true), ("SK GAGAL", false), ("SK KUNCI", false), ("SK LAIN", true)]
  );
  assert!(matches!(&outcomes[1].result, Err(Error::Server(m)) if m == "Sekolah tidak dijumpai"));
  assert!(matches!(
    &outcomes[2].result,
    Err(Error::Rejected(lencana_core::Error::BadgeLocked { .. }))
  ));

  // The locked school never reached the server.
  let submitted: Vec<_> = backend
    .posts()
    .iter()
    .map(|p| p["leader"]["school"].as_str().unwrap_or_default().to_owned())
    .collect();
  assert_eq!(submitted, vec!["SK BUKIT", "SK GAGAL", "SK LAIN"]);
  assert_eq!(client.state().get().leader.unwrap().school, "SK LAIN");
}

#[tokio::test]
async fn promotion_to_closed_badge_sends_nothing() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;
  let snap = snapshot();
  let request = PromotionRequest {
    school:       "SK BUKIT".into(),
    source_year:  2024,
    source_badge: "Keris Gangsa".into(),
    category:     RoleCategory::Participant,
  };

  let err = client
    .promote(
      &snap,
      &request,
      &snap.records,
      LeaderInfo::placeholder("SK BUKIT", None),
      today(),
    )
    .await
    .unwrap_err();
  assert!(matches!(err, Error::Rejected(lencana_core::Error::BadgeClosed(ref b)) if b == "Keris Perak"));
  assert!(err.user_message().contains("Keris Perak"));
  assert!(backend.posts().is_empty());
  assert_eq!(backend.csrf_requests(), 0);
}

#[tokio::test]
async fn wrong_password_is_rewritten_and_throttled() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;

  let err = client.login_user("JBA1234", "salah").await.unwrap_err();
  assert_eq!(err.user_message(), "school code and password do not match");

  for _ in 1..MAX_FAILURES {
    client.login_user("JBA1234", "salah").await.unwrap_err();
  }
  let sent = backend.posts().len();
  let err = client.login_user("JBA1234", "betul").await.unwrap_err();
  assert!(matches!(err, Error::RateLimited { .. }));
  assert_eq!(backend.posts().len(), sent);
}

#[tokio::test]
async fn successful_logins_store_the_session() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;

  let session = client.login_user("JBA1234", "betul").await.unwrap();
  assert_eq!(client.state().get().session, Some(session));

  let admin = client.login_admin("pkd", "rahsia").await.unwrap();
  assert!(!admin.is_developer());
  assert_eq!(client.state().get().session, Some(admin));

  client.logout().await.unwrap();
  assert_eq!(client.state().get().session, None);
}

#[tokio::test]
async fn approve_needs_a_lock_and_detects_old_backends() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;
  let key = BadgeKey::new("Keris Gangsa", 2025);

  let unlocked = School::new("SK BUKIT");
  let err = client.approve_school_badge(&unlocked, &key).await.unwrap_err();
  assert!(matches!(err, Error::Rejected(lencana_core::Error::ApproveWithoutLock { .. })));
  assert!(backend.posts().is_empty());

  let mut locked = School::new("SK BUKIT");
  locked.lock(&key);
  let err = client.approve_school_badge(&locked, &key).await.unwrap_err();
  assert!(matches!(err, Error::OutdatedBackend(_)));
}

#[tokio::test]
async fn duplicate_school_is_refused_locally() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;
  let err = client
    .register_school(&snapshot(), &School::new("sk bukit"), "rahsia")
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Rejected(lencana_core::Error::SchoolAlreadyRegistered(_))
  ));
  assert!(backend.posts().is_empty());
}

#[tokio::test]
async fn deployment_config_loads_with_cache_buster() {
  let backend = Backend {
    deployment: Arc::new(Some(json!({ "maintenance": true, "userAccess": false }))),
    ..Default::default()
  };
  let (client, base) = client_for(&backend).await;

  let overrides = client
    .load_deployment_config(&format!("{base}/config.json"))
    .await
    .unwrap();
  assert_eq!(overrides.maintenance, Some(true));
  assert_eq!(overrides.user_access, Some(false));
  assert_eq!(overrides.admin_access, None);
}

#[tokio::test]
async fn missing_deployment_config_is_none() {
  let backend = Backend::default();
  let (client, base) = client_for(&backend).await;
  assert!(client.load_deployment_config(&format!("{base}/config.json")).await.is_none());
  assert!(client.load_deployment_config("http://127.0.0.1:1/config.json").await.is_none());
}

#[tokio::test]
async fn unreachable_backend_is_a_network_error() {
  let client = ApiClient::new(ClientConfig::new("http://127.0.0.1:1/exec")).unwrap();
  let err = client.fetch_snapshot().await.unwrap_err();
  assert!(matches!(err, Error::Network(_)));
  assert!(err.user_message().starts_with("Could not reach the server"));
}

#[tokio::test]
async fn backend_url_override_comes_from_state() {
  let backend = Backend::default();
  let base = spawn(backend.clone()).await;
  let dir = tempfile::tempdir().unwrap();
  let state = StateStore::open(dir.path().join("state.json")).await.unwrap();
  state
    .update(|s| s.backend_url = Some(format!("{base}/exec")))
    .await
    .unwrap();

  let client =
    ApiClient::with_state(ClientConfig::new("http://127.0.0.1:1/exec"), state).unwrap();
  client.setup_database().await.unwrap();
  assert_eq!(backend.posts()[0]["action"], "setup_database");
}

#[tokio::test]
async fn record_edits_go_through_the_gate() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;
  let school = School::new("SK BUKIT");
  let gate = Gate::new(true, 2025, &school);

  client
    .update_membership_id(&record_at(12, 2025), &gate, " KM-0042 ")
    .await
    .unwrap();
  client.delete_record(&record_at(13, 2025), &gate).await.unwrap();

  let posts = backend.posts();
  assert_eq!(posts[0]["action"], "update_data");
  assert_eq!(posts[0]["row"], 12);
  assert_eq!(posts[0]["membershipId"], "KM-0042");
  assert_eq!(posts[1]["action"], "delete_record");
  assert_eq!(posts[1]["row"], 13);
}

#[tokio::test]
async fn frozen_or_locked_records_are_refused_locally() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;
  let school = School::new("SK BUKIT");
  let gate = Gate::new(true, 2025, &school);

  let err = client
    .update_membership_id(&record_at(12, 2024), &gate, "KM-0042")
    .await
    .unwrap_err();
  assert!(matches!(
    err,
    Error::Rejected(lencana_core::Error::Denied(Denial::PastYear(2024)))
  ));
  assert_eq!(err.user_message(), "records from 2024 are frozen");

  let mut locked = School::new("SK BUKIT");
  locked.lock(&BadgeKey::new("Keris Gangsa", 2025));
  let gate = Gate::new(true, 2025, &locked);
  let err = client.delete_record(&record_at(13, 2025), &gate).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Rejected(lencana_core::Error::Denied(Denial::Locked(_)))
  ));

  let closed = Gate::new(false, 2025, &school);
  let err = client.delete_record(&record_at(13, 2025), &closed).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Rejected(lencana_core::Error::Denied(Denial::RegistrationClosed))
  ));

  let mut unsaved = record_at(0, 2025);
  unsaved.row = None;
  let err = client.delete_record(&unsaved, &Gate::new(true, 2025, &school)).await.unwrap_err();
  assert!(matches!(err, Error::Rejected(lencana_core::Error::MissingRow(_))));

  assert!(backend.posts().is_empty());
  assert_eq!(backend.csrf_requests(), 0);
}

#[tokio::test]
async fn lock_and_unlock_send_the_badge_key() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;
  let key = BadgeKey::new("Keris Gangsa", 2025);

  client.lock_school_badge("SK BUKIT", &key).await.unwrap();
  client.unlock_school_badge("SK BUKIT", &key).await.unwrap();

  let posts = backend.posts();
  assert_eq!(posts[0]["action"], "lock_school_badge");
  assert_eq!(posts[1]["action"], "unlock_school_badge");
  for p in &posts {
    assert_eq!(p["school"], "SK BUKIT");
    assert_eq!(p["badgeKey"], "Keris Gangsa_2025");
  }
}

#[tokio::test]
async fn maintenance_actions_carry_their_fields() {
  let backend = Backend::default();
  let (client, _) = client_for(&backend).await;

  client.migrate_year(2024, 2025).await.unwrap();
  client.change_password("JBA1234", "lama", "baru").await.unwrap();
  client.clear_sheet_data().await.unwrap();

  let posts = backend.posts();
  assert_eq!(posts[0]["action"], "migrate_year");
  assert_eq!(posts[0]["fromYear"], 2024);
  assert_eq!(posts[0]["toYear"], 2025);
  assert_eq!(posts[1]["action"], "change_password");
  assert_eq!(posts[1]["schoolCode"], "JBA1234");
  assert_eq!(posts[1]["oldPassword"], "lama");
  assert_eq!(posts[1]["newPassword"], "baru");
  assert_eq!(posts[2]["action"], "clear_sheet_data");
  assert!(posts[2]["csrfToken"].as_str().is_some_and(|t| t.starts_with("tok-")));
}
