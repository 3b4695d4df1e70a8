//! Stable labels for the presentation layer.
//!
//! Each closed enumeration has exactly one lookup table, written as an
//! exhaustive `match` so a new variant fails to compile until it has a
//! label. Wire values outside the enumeration decode to
//! [`ConsentStatus::Unknown`], whose entry is the fallback.

use serde::Serialize;

use crate::{
  consent::{ConsentRecord, ConsentStatus},
  event::EventLifecycleState,
  window::{EventClassification, RegistrationWindowState},
};

/// A machine-stable code plus the guardian-facing label. Colors and icons
/// are chosen by the UI from `code`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Presentation {
  pub code:  &'static str,
  pub label: &'static str,
}

const fn p(code: &'static str, label: &'static str) -> Presentation {
  Presentation { code, label }
}

/// Fallback for anything the engine does not recognise.
pub const UNKNOWN: Presentation = p("unknown", "Không xác định");

/// Shown when no record exists for the key.
pub const NOT_REGISTERED: Presentation = p("not_registered", "Chưa đăng ký");

/// Shown for a school-created stub the guardian has not answered.
pub const AWAITING_GUARDIAN: Presentation =
  p("awaiting_guardian", "Chờ phụ huynh xác nhận");

pub const fn window_presentation(state: RegistrationWindowState) -> Presentation {
  match state {
    RegistrationWindowState::NotStarted => p("not_started", "Chưa mở đăng ký"),
    RegistrationWindowState::Open => p("open", "Đang mở đăng ký"),
    RegistrationWindowState::Closed => p("closed", "Đã đóng đăng ký"),
  }
}

pub const fn lifecycle_presentation(state: EventLifecycleState) -> Presentation {
  match state {
    EventLifecycleState::Upcoming => p("upcoming", "Sắp diễn ra"),
    EventLifecycleState::Ongoing => p("ongoing", "Đang diễn ra"),
    EventLifecycleState::Completed => p("completed", "Đã hoàn thành"),
  }
}

pub const fn status_presentation(status: ConsentStatus) -> Presentation {
  match status {
    ConsentStatus::Pending => p("pending", "Chờ duyệt"),
    ConsentStatus::Approved => p("approved", "Đã đồng ý"),
    ConsentStatus::Rejected => p("rejected", "Từ chối"),
    ConsentStatus::Expired => p("expired", "Hết hạn"),
    ConsentStatus::Cancelled => p("cancelled", "Đã hủy"),
    ConsentStatus::Unknown => UNKNOWN,
  }
}

/// Label for a raw wire status string.
pub fn raw_status_presentation(raw: &str) -> Presentation {
  status_presentation(ConsentStatus::parse(raw))
}

/// Label for whatever record governs a key, if any.
pub fn record_presentation(record: Option<&ConsentRecord>) -> Presentation {
  match record {
    None => NOT_REGISTERED,
    Some(r) if r.is_stub() => AWAITING_GUARDIAN,
    Some(r) => status_presentation(r.status),
  }
}

/// Everything the presentation layer shows for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusView {
  pub window_state:    RegistrationWindowState,
  pub lifecycle_state: EventLifecycleState,
  pub consent_status:  Option<ConsentStatus>,
  pub window:          Presentation,
  pub lifecycle:       Presentation,
  pub consent:         Presentation,
}

impl StatusView {
  pub fn new(
    classification: EventClassification,
    record: Option<&ConsentRecord>,
  ) -> Self {
    Self {
      window_state:    classification.window,
      lifecycle_state: classification.lifecycle,
      consent_status:  record.map(|r| r.status),
      window:          window_presentation(classification.window),
      lifecycle:       lifecycle_presentation(classification.lifecycle),
      consent:         record_presentation(record),
    }
  }
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator;

  use super::*;

  #[test]
  fn every_status_has_a_distinct_code() {
    let codes: std::collections::HashSet<_> = ConsentStatus::iter()
      .map(|s| status_presentation(s).code)
      .collect();
    assert_eq!(codes.len(), ConsentStatus::iter().count());
  }

  #[test]
  fn unrecognised_wire_status_degrades_to_unknown() {
    assert_eq!(raw_status_presentation("Archived"), UNKNOWN);
    assert_eq!(raw_status_presentation(""), UNKNOWN);
    assert_eq!(raw_status_presentation("Approved").code, "approved");
  }

  #[test]
  fn every_window_and_lifecycle_state_is_labelled() {
    for w in RegistrationWindowState::iter() {
      assert_ne!(window_presentation(w), UNKNOWN);
    }
    for l in EventLifecycleState::iter() {
      assert_ne!(lifecycle_presentation(l), UNKNOWN);
    }
  }
}
