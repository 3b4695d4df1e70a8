//! The external boundary: the remote consent service and the event directory.
//!
//! The traits are implemented by backends (e.g. `assent-store-sqlite`).
//! The engine depends on these abstractions only; it never owns persistence.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  consent::{ConsentKey, ConsentRecord, ConsentStatus, Decision},
  event::Event,
  ids::{EventId, GuardianId, RecordId, StudentId},
};

// ─── Payloads ────────────────────────────────────────────────────────────────

/// Input to [`ConsentRepository::create`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewConsent {
  pub event_id:       EventId,
  pub student_id:     StudentId,
  pub guardian_id:    GuardianId,
  pub school_year:    String,
  pub decision:       Decision,
  /// Status the engine expects the new record to take.
  pub status:         ConsentStatus,
  pub consent_date:   Option<DateTime<Utc>>,
  pub decline_reason: Option<String>,
  pub notes:          Option<String>,
}

/// Input to [`ConsentRepository::update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentUpdate {
  pub decision:        Decision,
  pub status:          ConsentStatus,
  pub consent_date:    Option<DateTime<Utc>>,
  pub decline_reason:  Option<String>,
  pub notes:           Option<String>,
  /// Optimistic-concurrency precondition: the update must only apply if the
  /// stored record still has this status and this decision. Backends enforce
  /// both atomically and report a violation as an error.
  pub expected_status:   ConsentStatus,
  /// `None` for a stub nobody has answered yet.
  pub expected_decision: Option<Decision>,
}

/// Parameters for [`ConsentRepository::find`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentFilter {
  pub event_id:    EventId,
  pub student_id:  StudentId,
  pub guardian_id: GuardianId,
  pub status:      Option<ConsentStatus>,
}

impl ConsentFilter {
  /// Every record for `key`, whatever its status.
  pub fn for_key(key: &ConsentKey) -> Self {
    Self {
      event_id:    key.event_id.clone(),
      student_id:  key.student_id.clone(),
      guardian_id: key.guardian_id.clone(),
      status:      None,
    }
  }

  /// Only Pending records for `key`; used to locate a stub.
  pub fn pending(key: &ConsentKey) -> Self {
    Self { status: Some(ConsentStatus::Pending), ..Self::for_key(key) }
  }

  pub fn matches(&self, record: &ConsentRecord) -> bool {
    record.event_id == self.event_id
      && record.student_id == self.student_id
      && record.guardian_id == self.guardian_id
      && self.status.is_none_or(|s| record.status == s)
  }
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Create/update/find operations against the remote consent service.
///
/// The service, not the engine, is the arbiter of uniqueness. Failures are
/// reported through `Self::Error` and classified by an
/// [`ErrorClassifier`](crate::classify::ErrorClassifier).
///
/// All methods return `Send` futures so background reconciliation can run on
/// a multi-threaded runtime.
pub trait ConsentRepository: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Persist a new record and return it with its server-assigned id.
  fn create(
    &self,
    input: NewConsent,
  ) -> impl Future<Output = Result<ConsentRecord, Self::Error>> + Send + '_;

  /// Apply `update` to `record_id`, honouring `update.expected_status` and
  /// `update.expected_decision`.
  fn update(
    &self,
    record_id: RecordId,
    update: ConsentUpdate,
  ) -> impl Future<Output = Result<ConsentRecord, Self::Error>> + Send + '_;

  /// Return every record matching `filter`.
  fn find(
    &self,
    filter: ConsentFilter,
  ) -> impl Future<Output = Result<Vec<ConsentRecord>, Self::Error>> + Send + '_;
}

/// Read-only lookup of school health events.
pub trait EventDirectory: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Returns `None` if the event does not exist.
  fn get_event(
    &self,
    id: EventId,
  ) -> impl Future<Output = Result<Option<Event>, Self::Error>> + Send + '_;
}
