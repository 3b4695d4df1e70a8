//! Consent records: a guardian's decision for one student and one event.
//!
//! A record is created either by the guardian's own submission, or ahead of
//! time by the school system as a *stub*: a Pending record with no decision
//! that the guardian's action must update rather than re-create.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};

use crate::ids::{EventId, GuardianId, RecordId, StudentId};

// ─── Key ─────────────────────────────────────────────────────────────────────

/// The uniqueness key: at most one non-cancelled record exists per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsentKey {
  pub event_id:    EventId,
  pub student_id:  StudentId,
  pub guardian_id: GuardianId,
}

impl ConsentKey {
  pub fn new(
    event_id: impl Into<EventId>,
    student_id: impl Into<StudentId>,
    guardian_id: impl Into<GuardianId>,
  ) -> Self {
    Self {
      event_id:    event_id.into(),
      student_id:  student_id.into(),
      guardian_id: guardian_id.into(),
    }
  }
}

impl fmt::Display for ConsentKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}/{}/{}", self.event_id, self.student_id, self.guardian_id)
  }
}

// ─── Decision ────────────────────────────────────────────────────────────────

/// What the guardian chose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
  Agree,
  Decline,
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// Server-side status of a consent record.
///
/// Wire values are the variant names. Anything else decodes to
/// [`ConsentStatus::Unknown`] rather than failing, so a newer server can add
/// statuses without breaking older clients.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumIter,
)]
#[serde(from = "String", into = "String")]
pub enum ConsentStatus {
  Pending,
  Approved,
  Rejected,
  Expired,
  Cancelled,
  Unknown,
}

impl ConsentStatus {
  /// Lenient parse; unrecognised values map to `Unknown`.
  pub fn parse(s: &str) -> Self {
    match s.trim() {
      "Pending" => Self::Pending,
      "Approved" => Self::Approved,
      "Rejected" => Self::Rejected,
      "Expired" => Self::Expired,
      "Cancelled" => Self::Cancelled,
      _ => Self::Unknown,
    }
  }
}

impl From<String> for ConsentStatus {
  fn from(s: String) -> Self { Self::parse(&s) }
}

impl From<ConsentStatus> for String {
  fn from(s: ConsentStatus) -> Self { s.as_ref().to_owned() }
}

impl fmt::Display for ConsentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_ref())
  }
}

// ─── Record ──────────────────────────────────────────────────────────────────

/// The persisted decision for one student, one event, one guardian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentRecord {
  pub record_id:      RecordId,
  pub event_id:       EventId,
  pub student_id:     StudentId,
  pub guardian_id:    GuardianId,
  pub school_year:    String,
  /// `None` only for a stub the guardian has not acted on yet.
  #[serde(default)]
  pub decision:       Option<Decision>,
  pub status:         ConsentStatus,
  /// Set when an agree decision is acknowledged.
  #[serde(default)]
  pub consent_date:   Option<DateTime<Utc>>,
  /// Non-empty whenever the record came from a decline decision.
  #[serde(default)]
  pub decline_reason: Option<String>,
  #[serde(default)]
  pub notes:          Option<String>,
}

impl ConsentRecord {
  pub fn key(&self) -> ConsentKey {
    ConsentKey {
      event_id:    self.event_id.clone(),
      student_id:  self.student_id.clone(),
      guardian_id: self.guardian_id.clone(),
    }
  }

  pub fn matches(&self, key: &ConsentKey) -> bool {
    self.event_id == key.event_id
      && self.student_id == key.student_id
      && self.guardian_id == key.guardian_id
  }

  /// A school-created Pending record still waiting for the guardian.
  pub fn is_stub(&self) -> bool {
    self.status == ConsentStatus::Pending && self.decision.is_none()
  }

  pub fn is_cancelled(&self) -> bool {
    self.status == ConsentStatus::Cancelled
  }

  /// Built locally during conflict reconciliation, not yet confirmed by the
  /// server.
  pub fn is_synthesized(&self) -> bool { self.record_id.is_synthesized() }
}
