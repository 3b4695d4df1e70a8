//! In-memory index of the consent records known to one session.
//!
//! The registry is scoped to a single screen/session: it is built fresh from
//! [`ConsentRepository::find`](crate::repository::ConsentRepository::find),
//! mutated only by the submission workflow, and dropped with the session.
//! Nothing here is global.

use std::{
  collections::{HashMap, HashSet},
  sync::Arc,
};

use parking_lot::Mutex;

use crate::{
  consent::{ConsentKey, ConsentRecord},
  ids::RecordId,
  window::RegistrationWindowState,
};

/// A registry shared between a session, its workflow, and any background
/// reconciliation task the workflow spawned.
pub type SharedRegistry = Arc<Mutex<ConsentRegistry>>;

#[derive(Debug, Default)]
pub struct ConsentRegistry {
  /// At most one non-cancelled record per key; cancelled ones are kept for
  /// display.
  records: HashMap<ConsentKey, Vec<ConsentRecord>>,
  /// Keys whose cached knowledge was dropped and must be re-fetched.
  stale:   HashSet<ConsentKey>,
}

impl ConsentRegistry {
  pub fn new() -> Self { Self::default() }

  pub fn shared() -> SharedRegistry { Arc::new(Mutex::new(Self::new())) }

  /// The record that governs `key`: the non-cancelled one if present,
  /// otherwise the most recently stored cancelled one.
  pub fn find(&self, key: &ConsentKey) -> Option<&ConsentRecord> {
    let records = self.records.get(key)?;
    records
      .iter()
      .find(|r| !r.is_cancelled())
      .or_else(|| records.last())
  }

  /// Every record held for `key`, cancelled ones included.
  pub fn records(&self, key: &ConsentKey) -> &[ConsentRecord] {
    self.records.get(key).map(Vec::as_slice).unwrap_or_default()
  }

  /// Whether a new submission for `key` is allowed right now.
  ///
  /// Requires an open window, fresh knowledge of the key, and either no
  /// record, a cancelled one, or a stub still waiting for the guardian.
  pub fn can_register(
    &self,
    key: &ConsentKey,
    window: RegistrationWindowState,
  ) -> bool {
    if window != RegistrationWindowState::Open || self.is_stale(key) {
      return false;
    }
    match self.find(key) {
      None => true,
      Some(record) => record.is_cancelled() || record.is_stub(),
    }
  }

  /// Insert or replace `record`, dropping every other non-cancelled record
  /// for its key so at most one remains.
  pub fn upsert(&mut self, record: ConsentRecord) {
    let key = record.key();
    let entries = self.records.entry(key.clone()).or_default();
    let before = entries.len();
    entries.retain(|r| r.is_cancelled() && r.record_id != record.record_id);
    let dropped = before - entries.len();
    if dropped > 0 {
      tracing::debug!(%key, dropped, "replaced consent records");
    }
    entries.push(record);
  }

  /// Forget everything known about `key` and mark it stale until the next
  /// [`hydrate`](Self::hydrate).
  pub fn invalidate(&mut self, key: &ConsentKey) {
    self.records.remove(key);
    self.stale.insert(key.clone());
    tracing::debug!(%key, "invalidated consent registry entry");
  }

  pub fn is_stale(&self, key: &ConsentKey) -> bool { self.stale.contains(key) }

  /// Replace everything known about `key` with freshly fetched `records`.
  /// Records for other keys are ignored.
  pub fn hydrate(&mut self, key: &ConsentKey, records: Vec<ConsentRecord>) {
    self.records.remove(key);
    self.stale.remove(key);
    // Cancelled first so the surviving non-cancelled record is the last one
    // the server returned.
    let (cancelled, active): (Vec<_>, Vec<_>) = records
      .into_iter()
      .filter(|r| r.matches(key))
      .partition(ConsentRecord::is_cancelled);
    for record in cancelled.into_iter().chain(active) {
      self.upsert(record);
    }
  }

  /// Swap the synthesized record `synthesized_id` for the authoritative one,
  /// but only if it still governs `key`. Returns whether a swap happened.
  pub fn replace_synthesized(
    &mut self,
    key: &ConsentKey,
    synthesized_id: &RecordId,
    authoritative: ConsentRecord,
  ) -> bool {
    let still_current = self
      .find(key)
      .is_some_and(|r| &r.record_id == synthesized_id);
    if !still_current || !authoritative.matches(key) {
      return false;
    }
    if let Some(entries) = self.records.get_mut(key) {
      entries.retain(|r| &r.record_id != synthesized_id);
    }
    self.upsert(authoritative);
    true
  }

  /// Drop all state. Called on session teardown.
  pub fn clear(&mut self) {
    self.records.clear();
    self.stale.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::consent::{ConsentStatus, Decision};

  fn key() -> ConsentKey { ConsentKey::new("E1", "S1", "G1") }

  fn record(id: &str, status: ConsentStatus) -> ConsentRecord {
    ConsentRecord {
      record_id:      RecordId::new(id),
      event_id:       "E1".into(),
      student_id:     "S1".into(),
      guardian_id:    "G1".into(),
      school_year:    "2024-2025".into(),
      decision:       Some(Decision::Agree),
      status,
      consent_date:   None,
      decline_reason: None,
      notes:          None,
    }
  }

  #[test]
  fn empty_registry_allows_registration_only_when_open() {
    let reg = ConsentRegistry::new();
    assert!(reg.can_register(&key(), RegistrationWindowState::Open));
    assert!(!reg.can_register(&key(), RegistrationWindowState::NotStarted));
    assert!(!reg.can_register(&key(), RegistrationWindowState::Closed));
  }

  #[test]
  fn blocking_statuses_forbid_registration() {
    for status in [
      ConsentStatus::Pending,
      ConsentStatus::Approved,
      ConsentStatus::Rejected,
      ConsentStatus::Expired,
      ConsentStatus::Unknown,
    ] {
      let mut reg = ConsentRegistry::new();
      reg.upsert(record("R1", status));
      assert!(
        !reg.can_register(&key(), RegistrationWindowState::Open),
        "{status} should block"
      );
    }
  }

  #[test]
  fn cancelled_record_allows_registration() {
    let mut reg = ConsentRegistry::new();
    reg.upsert(record("R1", ConsentStatus::Cancelled));
    assert!(reg.can_register(&key(), RegistrationWindowState::Open));
  }

  #[test]
  fn pending_stub_is_actionable() {
    let mut reg = ConsentRegistry::new();
    let mut stub = record("R1", ConsentStatus::Pending);
    stub.decision = None;
    reg.upsert(stub);
    assert!(reg.can_register(&key(), RegistrationWindowState::Open));
  }

  #[test]
  fn upsert_keeps_one_active_record_per_key() {
    let mut reg = ConsentRegistry::new();
    reg.upsert(record("R0", ConsentStatus::Cancelled));
    reg.upsert(record("R1", ConsentStatus::Pending));
    reg.upsert(record("R2", ConsentStatus::Approved));

    let active: Vec<_> = reg
      .records(&key())
      .iter()
      .filter(|r| !r.is_cancelled())
      .collect();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].record_id.as_str(), "R2");
    assert_eq!(reg.records(&key()).len(), 2);
    assert_eq!(reg.find(&key()).unwrap().record_id.as_str(), "R2");
  }

  #[test]
  fn invalidate_marks_stale_until_hydrated() {
    let mut reg = ConsentRegistry::new();
    reg.upsert(record("R1", ConsentStatus::Cancelled));
    reg.invalidate(&key());

    assert!(reg.find(&key()).is_none());
    assert!(reg.is_stale(&key()));
    assert!(!reg.can_register(&key(), RegistrationWindowState::Open));

    reg.hydrate(&key(), vec![]);
    assert!(!reg.is_stale(&key()));
    assert!(reg.can_register(&key(), RegistrationWindowState::Open));
  }

  #[test]
  fn hydrate_deduplicates_server_records() {
    let mut reg = ConsentRegistry::new();
    reg.hydrate(&key(), vec![
      record("R1", ConsentStatus::Pending),
      record("R0", ConsentStatus::Cancelled),
      record("R2", ConsentStatus::Approved),
    ]);
    assert_eq!(reg.find(&key()).unwrap().record_id.as_str(), "R2");
    assert_eq!(reg.records(&key()).len(), 2);
  }

  #[test]
  fn replace_synthesized_only_when_still_current() {
    let mut reg = ConsentRegistry::new();
    let synth = record("local-1", ConsentStatus::Pending);
    reg.upsert(synth.clone());

    assert!(reg.replace_synthesized(
      &key(),
      &synth.record_id,
      record("R9", ConsentStatus::Pending)
    ));
    assert_eq!(reg.find(&key()).unwrap().record_id.as_str(), "R9");

    // Already replaced: a second swap is a no-op.
    assert!(!reg.replace_synthesized(
      &key(),
      &synth.record_id,
      record("R10", ConsentStatus::Approved)
    ));
    assert_eq!(reg.find(&key()).unwrap().record_id.as_str(), "R9");
  }
}
