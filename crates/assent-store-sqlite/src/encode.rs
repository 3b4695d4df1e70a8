//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Enumerations are stored as their wire
//! names. Ids are stored verbatim.

use std::str::FromStr;

use assent_core::{
  consent::{ConsentRecord, ConsentStatus, Decision},
  event::{Event, EventKind, EventLifecycleState, RegistrationWindow},
  ids::RecordId,
};
use chrono::{DateTime, Utc};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Decision ────────────────────────────────────────────────────────────────

pub fn encode_decision(d: Decision) -> &'static str {
  match d {
    Decision::Agree => "agree",
    Decision::Decline => "decline",
  }
}

pub fn decode_decision(s: &str) -> Result<Decision> {
  match s {
    "agree" => Ok(Decision::Agree),
    "decline" => Ok(Decision::Decline),
    other => Err(Error::Decode { column: "decision", value: other.to_owned() }),
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

pub fn encode_status(s: ConsentStatus) -> &'static str {
  match s {
    ConsentStatus::Pending => "Pending",
    ConsentStatus::Approved => "Approved",
    ConsentStatus::Rejected => "Rejected",
    ConsentStatus::Expired => "Expired",
    ConsentStatus::Cancelled => "Cancelled",
    ConsentStatus::Unknown => "Unknown",
  }
}

/// Lenient: a status written by a newer schema reads back as `Unknown`.
pub fn decode_status(s: &str) -> ConsentStatus { ConsentStatus::parse(s) }

// ─── Event kind / lifecycle ──────────────────────────────────────────────────

pub fn decode_kind(s: &str) -> Result<EventKind> {
  EventKind::from_str(s)
    .map_err(|_| Error::Decode { column: "kind", value: s.to_owned() })
}

/// An unrecognised override is dropped so classification falls back to the
/// timestamps.
pub fn decode_lifecycle(s: Option<&str>) -> Option<EventLifecycleState> {
  let s = s?;
  match EventLifecycleState::from_str(s) {
    Ok(state) => Some(state),
    Err(_) => {
      tracing::warn!(value = s, "ignoring unrecognised event lifecycle status");
      None
    }
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawConsent`]'s field order.
pub const CONSENT_COLUMNS: &str = "record_id, event_id, student_id, guardian_id, \
  school_year, decision, status, consent_date, decline_reason, notes";

/// Raw strings read directly from a `consents` row.
pub struct RawConsent {
  pub record_id:      String,
  pub event_id:       String,
  pub student_id:     String,
  pub guardian_id:    String,
  pub school_year:    String,
  pub decision:       Option<String>,
  pub status:         String,
  pub consent_date:   Option<String>,
  pub decline_reason: Option<String>,
  pub notes:          Option<String>,
}

impl RawConsent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      record_id:      row.get(0)?,
      event_id:       row.get(1)?,
      student_id:     row.get(2)?,
      guardian_id:    row.get(3)?,
      school_year:    row.get(4)?,
      decision:       row.get(5)?,
      status:         row.get(6)?,
      consent_date:   row.get(7)?,
      decline_reason: row.get(8)?,
      notes:          row.get(9)?,
    })
  }

  pub fn into_record(self) -> Result<ConsentRecord> {
    Ok(ConsentRecord {
      record_id:      RecordId::new(self.record_id),
      event_id:       self.event_id.into(),
      student_id:     self.student_id.into(),
      guardian_id:    self.guardian_id.into(),
      school_year:    self.school_year,
      decision:       self.decision.as_deref().map(decode_decision).transpose()?,
      status:         decode_status(&self.status),
      consent_date:   self.consent_date.as_deref().map(decode_dt).transpose()?,
      decline_reason: self.decline_reason,
      notes:          self.notes,
    })
  }
}

/// Raw strings read directly from an `events` row.
pub struct RawEvent {
  pub event_id:           String,
  pub kind:               String,
  pub school_year:        String,
  pub location:           String,
  pub event_date:         String,
  pub registration_start: String,
  pub registration_end:   String,
  pub lifecycle_status:   Option<String>,
}

impl RawEvent {
  pub fn into_event(self) -> Result<Event> {
    Ok(Event {
      event_id:            self.event_id.into(),
      kind:                decode_kind(&self.kind)?,
      school_year:         self.school_year,
      location:            self.location,
      event_date:          decode_dt(&self.event_date)?,
      registration_window: RegistrationWindow {
        start: decode_dt(&self.registration_start)?,
        end:   decode_dt(&self.registration_end)?,
      },
      lifecycle_override:  decode_lifecycle(self.lifecycle_status.as_deref()),
    })
  }
}
