//! Handler for `GET /events/{event_id}`.

use assent_core::{
  event::Event,
  ids::EventId,
  presentation::{Presentation, lifecycle_presentation, window_presentation},
  repository::EventDirectory,
  window::{self, EventClassification},
};
use axum::{
  Json,
  extract::{Path, State},
};
use serde::Serialize;

use crate::{AppState, error::ApiError};

#[derive(Debug, Serialize)]
pub struct EventBody {
  pub event:          Event,
  pub classification: EventClassification,
  pub window:         Presentation,
  pub lifecycle:      Presentation,
}

/// `GET /events/{event_id}`: the event and how it classifies right now.
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(event_id): Path<EventId>,
) -> Result<Json<EventBody>, ApiError>
where
  S: EventDirectory,
{
  let event = state
    .store
    .get_event(event_id.clone())
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("event {event_id} not found")))?;

  let classification = window::classify(&event, state.clock.now());
  Ok(Json(EventBody {
    window: window_presentation(classification.window),
    lifecycle: lifecycle_presentation(classification.lifecycle),
    classification,
    event,
  }))
}
