//! Registration-window and lifecycle classification.
//!
//! Everything here is a pure function of its inputs: no clock is read, no
//! state is touched. Callers pass `now` explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

use crate::event::{Event, EventLifecycleState, RegistrationWindow};

/// Position of `now` relative to a registration window.
///
/// The three states partition time: `start` and `end` both belong to `Open`.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  AsRefStr,
  Display,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RegistrationWindowState {
  NotStarted,
  Open,
  Closed,
}

/// Both classifications of one event at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventClassification {
  pub window:    RegistrationWindowState,
  pub lifecycle: EventLifecycleState,
}

pub fn classify_window(
  now: DateTime<Utc>,
  window: &RegistrationWindow,
) -> RegistrationWindowState {
  if now < window.start {
    RegistrationWindowState::NotStarted
  } else if now > window.end {
    RegistrationWindowState::Closed
  } else {
    RegistrationWindowState::Open
  }
}

/// A server-supplied lifecycle wins outright. Otherwise the event is
/// `Completed` once its date has passed, `Ongoing` while registration is
/// open, and `Upcoming` in every other case.
pub fn classify_lifecycle(
  now: DateTime<Utc>,
  event_date: DateTime<Utc>,
  window: RegistrationWindowState,
  server_status: Option<EventLifecycleState>,
) -> EventLifecycleState {
  if let Some(status) = server_status {
    return status;
  }
  if now > event_date {
    EventLifecycleState::Completed
  } else if window == RegistrationWindowState::Open {
    EventLifecycleState::Ongoing
  } else {
    EventLifecycleState::Upcoming
  }
}

/// Classify `event` at `now`.
pub fn classify(event: &Event, now: DateTime<Utc>) -> EventClassification {
  let window = classify_window(now, &event.registration_window);
  let lifecycle = classify_lifecycle(
    now,
    event.event_date,
    window,
    event.lifecycle_override,
  );
  tracing::trace!(event = %event.event_id, %window, %lifecycle, "classified event");
  EventClassification { window, lifecycle }
}
