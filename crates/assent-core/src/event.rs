//! School health events, as produced by the external event directory.
//!
//! Events are immutable from the engine's point of view. The only thing the
//! engine derives from them is window and lifecycle classification (see
//! [`crate::window`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::ids::EventId;

/// What kind of health event this is.
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
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
  /// Periodic health checkup.
  HealthCheck,
  /// Vaccination campaign.
  Vaccination,
}

/// The closed interval `[start, end]` during which new consent submissions
/// are accepted. Both bounds are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationWindow {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

/// Where an event sits in its own lifecycle.
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
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventLifecycleState {
  Upcoming,
  Ongoing,
  Completed,
}

/// A time-bound school health event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  pub event_id:            EventId,
  pub kind:                EventKind,
  /// Academic-year scoping tag, e.g. `"2024-2025"`.
  pub school_year:         String,
  pub location:            String,
  pub event_date:          DateTime<Utc>,
  pub registration_window: RegistrationWindow,
  /// Authoritative lifecycle supplied by the server. When present it wins
  /// over anything derived from timestamps.
  #[serde(default)]
  pub lifecycle_override:  Option<EventLifecycleState>,
}
