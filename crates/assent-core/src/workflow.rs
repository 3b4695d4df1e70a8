//! The submission workflow: guardian decision in, registry transition out.
//!
//! A submission runs four steps:
//!
//! 1. local validation (blank decline reason, eligibility), no network;
//! 2. dispatch through the create flow or the stub-update flow;
//! 3. classification of any repository failure;
//! 4. registry reconciliation.
//!
//! The registry is only ever touched in steps 3 and 4, after the repository
//! has answered, so dropping a submission future part-way commits nothing.

use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use crate::{
  classify::{ErrorClassifier, FailureKind, MarkerClassifier},
  clock::Clock,
  consent::{ConsentKey, ConsentRecord, ConsentStatus, Decision},
  error::{RejectionKind, SubmitError},
  event::{Event, EventKind},
  ids::RecordId,
  presentation::StatusView,
  registry::SharedRegistry,
  repository::{ConsentFilter, ConsentRepository, ConsentUpdate, NewConsent},
  window::{self, RegistrationWindowState},
};

// ─── Configuration ───────────────────────────────────────────────────────────

/// Status a freshly created agree decision takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreeStatus {
  /// Awaiting downstream review by the school.
  #[default]
  Pending,
  /// Flows with a direct approval step.
  Approved,
}

/// How a decision reaches the consent service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SubmissionFlow {
  /// No prior record: create one.
  Create {
    #[serde(default)]
    agree_status: AgreeStatus,
  },
  /// The school pre-created a Pending stub: locate it and update it.
  UpdateStub,
}

impl Default for SubmissionFlow {
  fn default() -> Self { Self::Create { agree_status: AgreeStatus::default() } }
}

/// Submission flow per event kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlowConfig {
  #[serde(default)]
  pub health_check: SubmissionFlow,
  #[serde(default)]
  pub vaccination:  SubmissionFlow,
}

impl FlowConfig {
  /// The same flow for every kind.
  pub fn uniform(flow: SubmissionFlow) -> Self {
    Self { health_check: flow, vaccination: flow }
  }

  pub fn for_kind(&self, kind: EventKind) -> SubmissionFlow {
    match kind {
      EventKind::HealthCheck => self.health_check,
      EventKind::Vaccination => self.vaccination,
    }
  }
}

// ─── Input / output ──────────────────────────────────────────────────────────

/// A guardian's decision as entered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
  pub decision:       Decision,
  #[serde(default)]
  pub decline_reason: Option<String>,
  #[serde(default)]
  pub notes:          Option<String>,
}

impl Submission {
  pub fn agree() -> Self {
    Self { decision: Decision::Agree, decline_reason: None, notes: None }
  }

  pub fn decline(reason: impl Into<String>) -> Self {
    Self {
      decision:       Decision::Decline,
      decline_reason: Some(reason.into()),
      notes:          None,
    }
  }

  pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
    self.notes = Some(notes.into());
    self
  }

  /// The trimmed decline reason, required and non-blank for a decline.
  fn validated_reason(&self) -> Result<Option<String>, SubmitError> {
    match self.decision {
      Decision::Agree => Ok(None),
      Decision::Decline => self
        .decline_reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| Some(r.to_owned()))
        .ok_or_else(|| {
          SubmitError::Validation("a reason is required when declining".into())
        }),
    }
  }
}

/// Result of [`ConsentSubmissionWorkflow::submit`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
  /// The service accepted the decision.
  Success { status: ConsentStatus },
  /// The service already held a record for the key; the local view was
  /// reconciled and an authoritative re-fetch is under way.
  Reconciled { status: ConsentStatus },
  /// The record changed underneath us. Refresh before retrying.
  NeedsRefresh,
  /// Nothing was committed; see `kind`.
  Rejected {
    kind:    RejectionKind,
    message: String,
  },
}

impl Outcome {
  pub fn is_success(&self) -> bool {
    matches!(self, Self::Success { .. } | Self::Reconciled { .. })
  }
}

impl From<SubmitError> for Outcome {
  fn from(err: SubmitError) -> Self {
    Self::Rejected { kind: err.rejection_kind(), message: err.to_string() }
  }
}

// ─── In-flight guard ─────────────────────────────────────────────────────────

/// Held for the duration of one submission; released on drop, including when
/// the submission future is cancelled.
struct InFlight<'a> {
  keys: &'a Mutex<HashSet<ConsentKey>>,
  key:  ConsentKey,
}

impl<'a> InFlight<'a> {
  fn acquire(keys: &'a Mutex<HashSet<ConsentKey>>, key: &ConsentKey) -> Option<Self> {
    keys
      .lock()
      .insert(key.clone())
      .then(|| Self { keys, key: key.clone() })
  }
}

impl Drop for InFlight<'_> {
  fn drop(&mut self) { self.keys.lock().remove(&self.key); }
}

// ─── Workflow ────────────────────────────────────────────────────────────────

/// Turns guardian decisions into safe transitions of a [`SharedRegistry`].
pub struct ConsentSubmissionWorkflow<R, C = MarkerClassifier> {
  repository: Arc<R>,
  registry:   SharedRegistry,
  classifier: C,
  clock:      Arc<dyn Clock>,
  flows:      FlowConfig,
  in_flight:  Mutex<HashSet<ConsentKey>>,
  refreshes:  Mutex<Vec<JoinHandle<()>>>,
}

/// What a dispatch step is about to write, kept so a conflict can be
/// reconciled into an equivalent local record.
struct Intent {
  key:            ConsentKey,
  school_year:    String,
  decision:       Decision,
  status:         ConsentStatus,
  consent_date:   Option<DateTime<Utc>>,
  decline_reason: Option<String>,
  notes:          Option<String>,
}

impl Intent {
  fn to_record(&self, record_id: RecordId) -> ConsentRecord {
    ConsentRecord {
      record_id,
      event_id: self.key.event_id.clone(),
      student_id: self.key.student_id.clone(),
      guardian_id: self.key.guardian_id.clone(),
      school_year: self.school_year.clone(),
      decision: Some(self.decision),
      status: self.status,
      consent_date: self.consent_date,
      decline_reason: self.decline_reason.clone(),
      notes: self.notes.clone(),
    }
  }

  /// The same decision, retargeted at a school-created stub.
  fn answering_stub(self) -> Self {
    Self { status: answered_status(self.decision), ..self }
  }

  /// Fill fields the service left out of its reply with what was sent.
  fn complete(&self, mut record: ConsentRecord) -> ConsentRecord {
    record.decision = record.decision.or(Some(self.decision));
    record.consent_date = record.consent_date.or(self.consent_date);
    if record.decline_reason.as_deref().is_none_or(str::is_empty) {
      record.decline_reason = self.decline_reason.clone();
    }
    record.notes = record.notes.or_else(|| self.notes.clone());
    record
  }
}

impl<R, C> ConsentSubmissionWorkflow<R, C>
where
  R: ConsentRepository + 'static,
  C: ErrorClassifier<R::Error>,
{
  pub fn new(
    repository: Arc<R>,
    registry: SharedRegistry,
    classifier: C,
    clock: Arc<dyn Clock>,
    flows: FlowConfig,
  ) -> Self {
    Self {
      repository,
      registry,
      classifier,
      clock,
      flows,
      in_flight: Mutex::new(HashSet::new()),
      refreshes: Mutex::new(Vec::new()),
    }
  }

  pub fn flows(&self) -> FlowConfig { self.flows }

  /// Submit `submission` for `key` against `event`.
  pub async fn submit(
    &self,
    event: &Event,
    key: &ConsentKey,
    submission: Submission,
  ) -> Outcome {
    let outcome = match self.try_submit(event, key, submission).await {
      Ok(outcome) => outcome,
      Err(err) => Outcome::from(err),
    };
    tracing::info!(%key, ?outcome, "consent submission resolved");
    outcome
  }

  async fn try_submit(
    &self,
    event: &Event,
    key: &ConsentKey,
    submission: Submission,
  ) -> Result<Outcome, SubmitError> {
    if key.event_id != event.event_id {
      return Err(SubmitError::Validation(format!(
        "consent key targets event {} but the session is for event {}",
        key.event_id, event.event_id
      )));
    }
    let decline_reason = submission.validated_reason()?;

    let now = self.clock.now();
    let classification = window::classify(event, now);

    let Some(_guard) = InFlight::acquire(&self.in_flight, key) else {
      let status = self.status_view(key, classification);
      return Err(SubmitError::NotEligible {
        reason: "a submission for this key is already in progress".into(),
        status: Box::new(status),
      });
    };

    let existing = {
      let registry = self.registry.lock();
      if registry.is_stale(key) {
        return Ok(Outcome::NeedsRefresh);
      }
      if !registry.can_register(key, classification.window) {
        let existing = registry.find(key);
        return Err(SubmitError::NotEligible {
          reason: ineligibility_reason(classification.window, existing),
          status: Box::new(StatusView::new(classification, existing)),
        });
      }
      registry.find(key).cloned()
    };

    // A stub already in hand is always updated, never re-created.
    let known_stub = existing.as_ref().is_some_and(ConsentRecord::is_stub);
    let flow = match self.flows.for_kind(event.kind) {
      _ if known_stub => SubmissionFlow::UpdateStub,
      flow => flow,
    };

    let intent = Intent {
      key:            key.clone(),
      school_year:    event.school_year.clone(),
      decision:       submission.decision,
      status:         match flow {
        SubmissionFlow::Create { agree_status } => {
          created_status(submission.decision, agree_status)
        }
        SubmissionFlow::UpdateStub => answered_status(submission.decision),
      },
      consent_date:   matches!(submission.decision, Decision::Agree).then_some(now),
      decline_reason,
      notes:          submission.notes,
    };
    match flow {
      SubmissionFlow::Create { .. } => self.create(intent).await,
      SubmissionFlow::UpdateStub => self.update_stub(intent, known_stub).await,
    }
  }

  async fn create(&self, intent: Intent) -> Result<Outcome, SubmitError> {
    let payload = NewConsent {
      event_id:       intent.key.event_id.clone(),
      student_id:     intent.key.student_id.clone(),
      guardian_id:    intent.key.guardian_id.clone(),
      school_year:    intent.school_year.clone(),
      decision:       intent.decision,
      status:         intent.status,
      consent_date:   intent.consent_date,
      decline_reason: intent.decline_reason.clone(),
      notes:          intent.notes.clone(),
    };
    tracing::debug!(key = %intent.key, status = %intent.status, "creating consent record");
    let err = match self.repository.create(payload).await {
      Ok(record) => return Ok(self.commit(&intent, record)),
      Err(err) => err,
    };
    match self.classifier.classify(&err) {
      FailureKind::Conflict => self.answer_conflicting_stub(intent, err).await,
      kind => self.on_failure(&intent, kind, err),
    }
  }

  /// A create that conflicts may have hit a school-created stub nobody has
  /// answered. That stub gets the decision; anything else is reconciled.
  async fn answer_conflicting_stub(
    &self,
    intent: Intent,
    conflict: R::Error,
  ) -> Result<Outcome, SubmitError> {
    match self.locate_stub(&intent.key).await {
      Ok(Some(stub)) => {
        tracing::info!(
          key = %intent.key,
          record = %stub.record_id,
          "create conflicted with a pending stub; answering the stub"
        );
        let intent = intent.answering_stub();
        self.apply_to_stub(intent, stub).await
      }
      Ok(None) => self.on_failure(&intent, FailureKind::Conflict, conflict),
      Err(err) => {
        tracing::warn!(key = %intent.key, error = %err, "could not inspect conflicting consent record");
        self.registry.lock().invalidate(&intent.key);
        Ok(Outcome::NeedsRefresh)
      }
    }
  }

  /// Stub-update flow. `known_stub` says whether the registry showed the
  /// guardian a stub for this key.
  async fn update_stub(&self, intent: Intent, known_stub: bool) -> Result<Outcome, SubmitError> {
    match self.locate_stub(&intent.key).await? {
      Some(stub) => self.apply_to_stub(intent, stub).await,
      None if known_stub => {
        tracing::warn!(key = %intent.key, "pending stub was answered elsewhere");
        self.registry.lock().invalidate(&intent.key);
        Ok(Outcome::NeedsRefresh)
      }
      None => Err(SubmitError::NotFound(intent.key.clone())),
    }
  }

  async fn apply_to_stub(
    &self,
    intent: Intent,
    stub: ConsentRecord,
  ) -> Result<Outcome, SubmitError> {
    let update = ConsentUpdate {
      decision:          intent.decision,
      status:            intent.status,
      consent_date:      intent.consent_date,
      decline_reason:    intent.decline_reason.clone(),
      notes:             intent.notes.clone(),
      expected_status:   ConsentStatus::Pending,
      expected_decision: None,
    };
    tracing::debug!(
      key = %intent.key,
      record = %stub.record_id,
      status = %intent.status,
      "updating pending consent stub"
    );
    match self.repository.update(stub.record_id, update).await {
      Ok(record) => Ok(self.commit(&intent, record)),
      Err(err) => {
        let kind = self.classifier.classify(&err);
        self.on_failure(&intent, kind, err)
      }
    }
  }

  /// The unanswered Pending stub for `key`, if the service holds one.
  async fn locate_stub(&self, key: &ConsentKey) -> Result<Option<ConsentRecord>, SubmitError> {
    let records = self
      .repository
      .find(ConsentFilter::pending(key))
      .await
      .map_err(|e| SubmitError::Transport(Box::new(e)))?;
    Ok(records.into_iter().find(|r| r.matches(key) && r.is_stub()))
  }

  fn commit(&self, intent: &Intent, record: ConsentRecord) -> Outcome {
    let record = intent.complete(record);
    let status = record.status;
    self.registry.lock().upsert(record);
    Outcome::Success { status }
  }

  fn on_failure(
    &self,
    intent: &Intent,
    kind: FailureKind,
    err: R::Error,
  ) -> Result<Outcome, SubmitError> {
    let key = &intent.key;
    match kind {
      FailureKind::Conflict => {
        tracing::warn!(%key, error = %err, "consent already exists server-side; reconciling");
        let record = intent.to_record(RecordId::synthesized());
        let synthesized_id = record.record_id.clone();
        self.registry.lock().upsert(record);
        self.schedule_refresh(key.clone(), synthesized_id);
        Ok(Outcome::Reconciled { status: intent.status })
      }
      FailureKind::StaleState => {
        tracing::warn!(%key, error = %err, "consent record no longer pending");
        self.registry.lock().invalidate(key);
        Ok(Outcome::NeedsRefresh)
      }
      FailureKind::NotFound => Err(SubmitError::NotFound(key.clone())),
      FailureKind::Transport => Err(SubmitError::Transport(Box::new(err))),
    }
  }

  /// Replace the synthesized record with the server's once it is visible.
  fn schedule_refresh(&self, key: ConsentKey, synthesized_id: RecordId) {
    let repository = Arc::clone(&self.repository);
    let registry = Arc::clone(&self.registry);
    let handle = tokio::spawn(async move {
      let records = match repository.find(ConsentFilter::for_key(&key)).await {
        Ok(records) => records,
        Err(err) => {
          tracing::warn!(%key, error = %err, "background consent refresh failed");
          return;
        }
      };
      let authoritative = records
        .into_iter()
        .filter(|r| r.matches(&key) && !r.is_cancelled())
        .last();
      match authoritative {
        Some(record) => {
          let record_id = record.record_id.clone();
          if registry.lock().replace_synthesized(&key, &synthesized_id, record) {
            tracing::debug!(%key, record = %record_id, "reconciled synthesized consent record");
          }
        }
        None => tracing::debug!(%key, "no authoritative consent record yet"),
      }
    });
    let mut refreshes = self.refreshes.lock();
    refreshes.retain(|h| !h.is_finished());
    refreshes.push(handle);
  }

  /// Wait for every background refresh scheduled so far.
  pub async fn settle(&self) {
    let handles = std::mem::take(&mut *self.refreshes.lock());
    for handle in handles {
      if let Err(err) = handle.await
        && err.is_panic()
      {
        tracing::warn!(error = %err, "background consent refresh panicked");
      }
    }
  }

  /// Handles currently tracked for background refreshes.
  #[cfg(test)]
  pub(crate) fn tracked_refreshes(&self) -> usize { self.refreshes.lock().len() }

  /// Abort any background refresh still running.
  pub fn abort_refreshes(&self) {
    for handle in self.refreshes.lock().drain(..) {
      handle.abort();
    }
  }

  fn status_view(
    &self,
    key: &ConsentKey,
    classification: window::EventClassification,
  ) -> StatusView {
    StatusView::new(classification, self.registry.lock().find(key))
  }
}

/// Status of a record created directly by the guardian.
fn created_status(decision: Decision, agree_status: AgreeStatus) -> ConsentStatus {
  match (decision, agree_status) {
    (Decision::Decline, _) => ConsentStatus::Rejected,
    (Decision::Agree, AgreeStatus::Pending) => ConsentStatus::Pending,
    (Decision::Agree, AgreeStatus::Approved) => ConsentStatus::Approved,
  }
}

/// Status of a school-created stub once the guardian has answered it.
fn answered_status(decision: Decision) -> ConsentStatus {
  match decision {
    Decision::Agree => ConsentStatus::Approved,
    Decision::Decline => ConsentStatus::Rejected,
  }
}

fn ineligibility_reason(
  window: RegistrationWindowState,
  existing: Option<&ConsentRecord>,
) -> String {
  match (window, existing) {
    (RegistrationWindowState::NotStarted, _) => {
      "registration has not opened yet".to_owned()
    }
    (RegistrationWindowState::Closed, _) => "registration has closed".to_owned(),
    (RegistrationWindowState::Open, Some(record)) => {
      format!("a consent record already exists with status {}", record.status)
    }
    (RegistrationWindowState::Open, None) => "registration is not available".to_owned(),
  }
}
