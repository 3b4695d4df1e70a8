//! Router tests against an in-memory `SqliteStore`.

use std::sync::Arc;

use assent_core::{
  clock::ManualClock,
  consent::{ConsentKey, ConsentStatus},
  event::{Event, EventKind, RegistrationWindow},
  workflow::{FlowConfig, SubmissionFlow},
};
use assent_store_sqlite::SqliteStore;
use axum::{
  body::Body,
  http::{Request, StatusCode, header},
};
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::{AppState, api_router};

fn at(day: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 11, day, 8, 0, 0).unwrap()
}

fn event() -> Event {
  Event {
    event_id:            "checkup-11".into(),
    kind:                EventKind::HealthCheck,
    school_year:         "2024-2025".into(),
    location:            "Phòng y tế".into(),
    event_date:          at(25),
    registration_window: RegistrationWindow { start: at(4), end: at(18) },
    lifecycle_override:  None,
  }
}

fn key() -> ConsentKey { ConsentKey::new("checkup-11", "s-12", "g-40") }

const CONSENT_URI: &str = "/events/checkup-11/consent";
const STATUS_URI: &str = "/events/checkup-11/consent?student_id=s-12&guardian_id=g-40";

struct Harness {
  store: Arc<SqliteStore>,
  clock: Arc<ManualClock>,
  flows: FlowConfig,
}

impl Harness {
  async fn new(flows: FlowConfig) -> Self {
    let store = SqliteStore::open_in_memory().await.unwrap();
    store.put_event(&event()).await.unwrap();
    Self {
      store: Arc::new(store),
      clock: Arc::new(ManualClock::new(at(6))),
      flows,
    }
  }

  async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let state = AppState::new(self.store.clone(), self.clock.clone(), self.flows);
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = api_router(state)
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let json = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
  }

  async fn submit(&self, body: Value) -> (StatusCode, Value) {
    self.request("POST", CONSENT_URI, Some(body)).await
  }
}

fn agree() -> Value {
  json!({ "student_id": "s-12", "guardian_id": "g-40", "decision": "agree" })
}

fn decline(reason: &str) -> Value {
  json!({
    "student_id": "s-12",
    "guardian_id": "g-40",
    "decision": "decline",
    "decline_reason": reason,
  })
}

// ── Events ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn get_event_reports_classification() {
  let h = Harness::new(FlowConfig::default()).await;
  let (status, body) = h.request("GET", "/events/checkup-11", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["event"]["event_id"], "checkup-11");
  assert_eq!(body["window"]["code"], "open");
  assert_eq!(body["lifecycle"]["code"], "ongoing");

  h.clock.set(at(26));
  let (_, body) = h.request("GET", "/events/checkup-11", None).await;
  assert_eq!(body["window"]["code"], "closed");
  assert_eq!(body["lifecycle"]["code"], "completed");
}

#[tokio::test]
async fn unknown_event_is_404() {
  let h = Harness::new(FlowConfig::default()).await;
  let (status, body) = h.request("GET", "/events/nope", None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert!(body["error"].as_str().unwrap().contains("nope"));

  let (status, _) = h
    .request("POST", "/events/nope/consent", Some(agree()))
    .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── Status ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn status_of_unregistered_key() {
  let h = Harness::new(FlowConfig::default()).await;
  let (status, body) = h.request("GET", STATUS_URI, None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["can_register"], true);
  assert_eq!(body["record"], Value::Null);
  assert_eq!(body["status"]["consent"]["code"], "not_registered");
}

#[tokio::test]
async fn status_before_window_opens() {
  let h = Harness::new(FlowConfig::default()).await;
  h.clock.set(at(1));
  let (_, body) = h.request("GET", STATUS_URI, None).await;
  assert_eq!(body["can_register"], false);
  assert_eq!(body["status"]["window"]["code"], "not_started");
}

// ── Submit ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn agree_then_duplicate_is_not_eligible() {
  let h = Harness::new(FlowConfig::default()).await;

  let (status, body) = h.submit(agree()).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["outcome"], "success");
  assert_eq!(body["status"], "Pending");
  assert_eq!(body["record"]["decision"], "agree");

  let (_, body) = h.request("GET", STATUS_URI, None).await;
  assert_eq!(body["can_register"], false);
  assert_eq!(body["status"]["consent"]["code"], "pending");

  let (status, body) = h.submit(agree()).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["outcome"], "rejected");
  assert_eq!(body["kind"], "not_eligible");
}

#[tokio::test]
async fn blank_decline_reason_is_422() {
  let h = Harness::new(FlowConfig::default()).await;
  let (status, body) = h.submit(decline("  ")).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["kind"], "validation");

  let (_, body) = h.request("GET", STATUS_URI, None).await;
  assert_eq!(body["can_register"], true);
}

#[tokio::test]
async fn decline_is_stored_rejected_with_reason() {
  let h = Harness::new(FlowConfig::default()).await;
  let (status, body) = h.submit(decline(" đang ốm ")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "Rejected");
  assert_eq!(body["record"]["decline_reason"], "đang ốm");
}

#[tokio::test]
async fn closed_window_is_not_eligible() {
  let h = Harness::new(FlowConfig::default()).await;
  h.clock.set(at(19));
  let (status, body) = h.submit(agree()).await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["kind"], "not_eligible");
}

#[tokio::test]
async fn cancelled_record_can_be_replaced() {
  let h = Harness::new(FlowConfig::default()).await;
  let (_, body) = h.submit(agree()).await;
  let first = body["record"]["record_id"].as_str().unwrap().to_owned();
  h.store
    .set_status(&first.as_str().into(), ConsentStatus::Cancelled)
    .await
    .unwrap();

  let (status, body) = h.submit(decline("chuyển trường")).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["outcome"], "success");
  assert_ne!(body["record"]["record_id"], first.as_str());
}

#[tokio::test]
async fn stub_is_approved_through_update_flow() {
  let h = Harness::new(FlowConfig::uniform(SubmissionFlow::UpdateStub)).await;
  let stub = h.store.create_stub(&key(), "2024-2025").await.unwrap();

  let (_, body) = h.request("GET", STATUS_URI, None).await;
  assert_eq!(body["can_register"], true);
  assert_eq!(body["status"]["consent"]["code"], "awaiting_guardian");

  let (status, body) = h.submit(agree()).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["status"], "Approved");
  assert_eq!(body["record"]["record_id"], stub.record_id.as_str());
}

#[tokio::test]
async fn update_flow_without_stub_is_404() {
  let h = Harness::new(FlowConfig::uniform(SubmissionFlow::UpdateStub)).await;
  let (status, body) = h.submit(agree()).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["kind"], "not_found");
}
