//! Handlers for `/events/{event_id}/consent`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/events/{id}/consent` | `?student_id=..&guardian_id=..` |
//! | `POST` | `/events/{id}/consent` | Body: key plus `{"decision":"agree"}` |
//!
//! `POST` always answers with the [`Outcome`] as JSON. The status code
//! mirrors it: `200` for success or reconciliation, `409` when the record
//! changed underneath or the key is not eligible, `422` for invalid input,
//! `404` when no application exists and `502` when the store failed.

use assent_core::{
  classify::{ClassifiedError, StructuredClassifier},
  consent::{ConsentKey, ConsentRecord},
  error::RejectionKind,
  ids::{EventId, GuardianId, StudentId},
  presentation::StatusView,
  repository::{ConsentRepository, EventDirectory},
  session::ConsentSession,
  workflow::{Outcome, Submission},
};
use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

type Session<S> = ConsentSession<S, StructuredClassifier>;

async fn open_session<S>(
  state: &AppState<S>,
  event_id: EventId,
) -> Result<Session<S>, ApiError>
where
  S: ConsentRepository + EventDirectory + 'static,
  <S as ConsentRepository>::Error: ClassifiedError,
{
  let session = ConsentSession::open(
    state.store.as_ref(),
    event_id,
    state.store.clone(),
    StructuredClassifier,
    state.clock.clone(),
    state.flows,
  )
  .await?;
  Ok(session)
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct KeyParams {
  pub student_id:  StudentId,
  pub guardian_id: GuardianId,
}

#[derive(Debug, Serialize)]
pub struct StatusBody {
  pub can_register: bool,
  pub status:       StatusView,
  pub record:       Option<ConsentRecord>,
}

/// `GET /events/{event_id}/consent?student_id=..&guardian_id=..`
pub async fn status<S>(
  State(state): State<AppState<S>>,
  Path(event_id): Path<EventId>,
  Query(params): Query<KeyParams>,
) -> Result<Json<StatusBody>, ApiError>
where
  S: ConsentRepository + EventDirectory + 'static,
  <S as ConsentRepository>::Error: ClassifiedError,
{
  let session = open_session(&state, event_id).await?;
  let key = session.key(params.student_id, params.guardian_id);
  session.refresh(&key).await?;

  let body = StatusBody {
    can_register: session.can_register(&key),
    status:       session.current_status(&key),
    record:       session.record(&key),
  };
  session.close();
  Ok(Json(body))
}

// ─── Submit ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SubmitBody {
  pub student_id:  StudentId,
  pub guardian_id: GuardianId,
  #[serde(flatten)]
  pub submission:  Submission,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
  #[serde(flatten)]
  pub outcome: Outcome,
  pub record:  Option<ConsentRecord>,
}

/// `POST /events/{event_id}/consent`
pub async fn submit<S>(
  State(state): State<AppState<S>>,
  Path(event_id): Path<EventId>,
  Json(body): Json<SubmitBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: ConsentRepository + EventDirectory + 'static,
  <S as ConsentRepository>::Error: ClassifiedError,
{
  let session = open_session(&state, event_id).await?;
  let key: ConsentKey = session.key(body.student_id, body.guardian_id);
  session.refresh(&key).await?;

  let outcome = session.submit(&key, body.submission).await;
  // Let reconciliation finish so the response carries the stored record.
  session.settle().await;
  let record = session.record(&key);
  session.close();

  Ok((outcome_status(&outcome), Json(SubmitResponse { outcome, record })))
}

fn outcome_status(outcome: &Outcome) -> StatusCode {
  match outcome {
    Outcome::Success { .. } | Outcome::Reconciled { .. } => StatusCode::OK,
    Outcome::NeedsRefresh => StatusCode::CONFLICT,
    Outcome::Rejected { kind, .. } => match kind {
      RejectionKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
      RejectionKind::NotEligible => StatusCode::CONFLICT,
      RejectionKind::NotFound => StatusCode::NOT_FOUND,
      RejectionKind::Transport => StatusCode::BAD_GATEWAY,
    },
  }
}
