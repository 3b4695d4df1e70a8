//! [`ConsentSession`], the facade the presentation layer talks to.
//!
//! A session is bound to one event. It owns the registry for its lifetime
//! and hands it by reference to the workflow; closing the session aborts
//! background reconciliation and drops everything it learned.

use std::sync::Arc;

use crate::{
  Error, Result,
  classify::ErrorClassifier,
  clock::Clock,
  consent::{ConsentKey, ConsentRecord},
  event::Event,
  ids::EventId,
  presentation::StatusView,
  registry::{ConsentRegistry, SharedRegistry},
  repository::{ConsentFilter, ConsentRepository, EventDirectory},
  window::{self, EventClassification},
  workflow::{ConsentSubmissionWorkflow, FlowConfig, Outcome, Submission},
};

pub struct ConsentSession<R, C> {
  event:      Event,
  clock:      Arc<dyn Clock>,
  repository: Arc<R>,
  registry:   SharedRegistry,
  workflow:   ConsentSubmissionWorkflow<R, C>,
}

impl<R, C> ConsentSession<R, C>
where
  R: ConsentRepository + 'static,
  C: ErrorClassifier<R::Error>,
{
  /// Start a session for an already-fetched event with an empty registry.
  pub fn new(
    event: Event,
    repository: Arc<R>,
    classifier: C,
    clock: Arc<dyn Clock>,
    flows: FlowConfig,
  ) -> Self {
    let registry = ConsentRegistry::shared();
    let workflow = ConsentSubmissionWorkflow::new(
      Arc::clone(&repository),
      Arc::clone(&registry),
      classifier,
      Arc::clone(&clock),
      flows,
    );
    Self { event, clock, repository, registry, workflow }
  }

  /// Look `event_id` up in `directory` and start a session for it.
  pub async fn open<D: EventDirectory>(
    directory: &D,
    event_id: EventId,
    repository: Arc<R>,
    classifier: C,
    clock: Arc<dyn Clock>,
    flows: FlowConfig,
  ) -> Result<Self> {
    let event = directory
      .get_event(event_id.clone())
      .await
      .map_err(|e| Error::Directory(Box::new(e)))?
      .ok_or(Error::EventNotFound(event_id))?;
    Ok(Self::new(event, repository, classifier, clock, flows))
  }

  pub fn event(&self) -> &Event { &self.event }

  pub fn registry(&self) -> &SharedRegistry { &self.registry }

  /// Build the key for a student/guardian pair on this session's event.
  pub fn key(
    &self,
    student_id: impl Into<crate::ids::StudentId>,
    guardian_id: impl Into<crate::ids::GuardianId>,
  ) -> ConsentKey {
    ConsentKey::new(self.event.event_id.clone(), student_id, guardian_id)
  }

  /// Window and lifecycle of the event right now.
  pub fn classify(&self) -> EventClassification {
    window::classify(&self.event, self.clock.now())
  }

  /// Re-derive what is known about `key` from the repository. Required after
  /// [`Outcome::NeedsRefresh`] before the key can be submitted again.
  pub async fn refresh(&self, key: &ConsentKey) -> Result<()> {
    let records = self
      .repository
      .find(ConsentFilter::for_key(key))
      .await
      .map_err(|e| Error::Repository(Box::new(e)))?;
    tracing::debug!(%key, count = records.len(), "hydrating consent registry");
    self.registry.lock().hydrate(key, records);
    Ok(())
  }

  pub fn can_register(&self, key: &ConsentKey) -> bool {
    let window = self.classify().window;
    self.registry.lock().can_register(key, window)
  }

  pub fn record(&self, key: &ConsentKey) -> Option<ConsentRecord> {
    self.registry.lock().find(key).cloned()
  }

  pub fn current_status(&self, key: &ConsentKey) -> StatusView {
    let classification = self.classify();
    StatusView::new(classification, self.registry.lock().find(key))
  }

  pub async fn submit(&self, key: &ConsentKey, submission: Submission) -> Outcome {
    self.workflow.submit(&self.event, key, submission).await
  }

  /// Wait for background reconciliation started by earlier submissions.
  pub async fn settle(&self) { self.workflow.settle().await }

  /// Tear the session down.
  pub fn close(self) {
    self.workflow.abort_refreshes();
    self.registry.lock().clear();
  }
}
