//! Classification of repository failures.
//!
//! The consent service does not promise a structured error taxonomy, so the
//! workflow asks an [`ErrorClassifier`] what a failure means. Keeping this
//! behind one trait lets a structured error contract replace message
//! matching without touching the workflow.

use serde::{Deserialize, Serialize};

/// What a repository failure means to the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
  /// A record for the key already exists server-side.
  Conflict,
  /// The update target is no longer Pending.
  StaleState,
  /// The update target does not exist.
  NotFound,
  /// Anything else.
  Transport,
}

/// Maps a repository error to a [`FailureKind`].
pub trait ErrorClassifier<E: ?Sized>: Send + Sync {
  fn classify(&self, error: &E) -> FailureKind;
}

// ─── Message markers ─────────────────────────────────────────────────────────

/// Classifies by case-insensitive substring match over the error's display
/// text. Only "duplicate" versus "not pending" is inferred; the exact wording
/// carries no further meaning.
#[derive(Debug, Clone)]
pub struct MarkerClassifier {
  conflict_markers: Vec<String>,
  stale_markers:    Vec<String>,
}

impl MarkerClassifier {
  pub fn new<I, J, S, T>(conflict_markers: I, stale_markers: J) -> Self
  where
    I: IntoIterator<Item = S>,
    J: IntoIterator<Item = T>,
    S: Into<String>,
    T: Into<String>,
  {
    Self {
      conflict_markers: conflict_markers
        .into_iter()
        .map(|m| m.into().to_lowercase())
        .collect(),
      stale_markers:    stale_markers
        .into_iter()
        .map(|m| m.into().to_lowercase())
        .collect(),
    }
  }

  fn classify_message(&self, message: &str) -> FailureKind {
    let message = message.to_lowercase();
    let hit = |markers: &[String]| markers.iter().any(|m| message.contains(m));
    if hit(&self.conflict_markers) {
      FailureKind::Conflict
    } else if hit(&self.stale_markers) {
      FailureKind::StaleState
    } else {
      FailureKind::Transport
    }
  }
}

impl Default for MarkerClassifier {
  fn default() -> Self {
    Self::new(
      ["duplicate", "already exists", "already registered", "đã tồn tại", "đã đăng ký"],
      ["not pending", "already processed", "đã được xử lý", "không ở trạng thái chờ"],
    )
  }
}

impl<E: std::fmt::Display + ?Sized> ErrorClassifier<E> for MarkerClassifier {
  fn classify(&self, error: &E) -> FailureKind {
    self.classify_message(&error.to_string())
  }
}

// ─── Structured errors ───────────────────────────────────────────────────────

/// Implemented by repository errors that know their own failure kind.
pub trait ClassifiedError {
  fn failure_kind(&self) -> FailureKind;
}

/// Trusts [`ClassifiedError::failure_kind`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredClassifier;

impl<E: ClassifiedError + ?Sized> ErrorClassifier<E> for StructuredClassifier {
  fn classify(&self, error: &E) -> FailureKind { error.failure_kind() }
}
