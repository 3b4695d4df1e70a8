//! Error type for `assent-store-sqlite`.

use assent_core::{
  classify::{ClassifiedError, FailureKind},
  consent::{ConsentKey, ConsentStatus},
  ids::RecordId,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unrecognised {column} value: {value:?}")]
  Decode { column: &'static str, value: String },

  /// A non-cancelled record already exists for the key.
  #[error("consent record already exists for {0}")]
  Duplicate(ConsentKey),

  /// The update precondition on the stored status did not hold.
  #[error("consent record {0} is not pending (status {1})")]
  NotPending(RecordId, ConsentStatus),

  /// The update precondition on the stored decision did not hold.
  #[error("consent record {0} was already processed")]
  AlreadyDecided(RecordId),

  #[error("consent record not found: {0}")]
  ConsentNotFound(RecordId),

  #[error("a decline must carry a non-empty reason")]
  MissingDeclineReason,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl ClassifiedError for Error {
  fn failure_kind(&self) -> FailureKind {
    match self {
      Self::Duplicate(_) => FailureKind::Conflict,
      Self::NotPending(..) | Self::AlreadyDecided(_) => FailureKind::StaleState,
      Self::ConsentNotFound(_) => FailureKind::NotFound,
      _ => FailureKind::Transport,
    }
  }
}
