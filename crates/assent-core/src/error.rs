//! Error types for `assent-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{consent::ConsentKey, ids::EventId, presentation::StatusView};

/// Boxed error from an external collaborator (repository or directory).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  #[error("event not found: {0}")]
  EventNotFound(EventId),

  #[error("event directory error: {0}")]
  Directory(#[source] BoxError),

  #[error("consent repository error: {0}")]
  Repository(#[source] BoxError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can stop a guardian's submission.
///
/// Conflicts and stale records are not listed: the workflow absorbs them
/// into [`crate::workflow::Outcome::Reconciled`] and
/// [`crate::workflow::Outcome::NeedsRefresh`].
#[derive(Debug, Error)]
pub enum SubmitError {
  /// Missing or invalid input, caught before any network call.
  #[error("{0}")]
  Validation(String),

  /// The window is not open, or a record already blocks the key.
  #[error("registration not allowed: {reason}")]
  NotEligible {
    reason: String,
    /// What the guardian currently sees for this key.
    status: Box<StatusView>,
  },

  /// The stub-update flow found no pending application.
  #[error("no application found for {0}; contact the school")]
  NotFound(ConsentKey),

  /// Generic network or server failure.
  #[error("consent service unavailable: {0}")]
  Transport(#[source] BoxError),
}

/// The caller-facing category of a rejected submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
  Validation,
  NotEligible,
  NotFound,
  Transport,
}

impl SubmitError {
  pub fn rejection_kind(&self) -> RejectionKind {
    match self {
      Self::Validation(_) => RejectionKind::Validation,
      Self::NotEligible { .. } => RejectionKind::NotEligible,
      Self::NotFound(_) => RejectionKind::NotFound,
      Self::Transport(_) => RejectionKind::Transport,
    }
  }
}
