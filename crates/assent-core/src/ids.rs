//! Opaque identifiers.
//!
//! The engine never interprets an identifier; it only compares and hashes
//! them. All ids are plain strings on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! opaque_id {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(
      Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
    )]
    #[serde(transparent)]
    pub struct $name(String);

    impl $name {
      pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

      pub fn as_str(&self) -> &str { &self.0 }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
      }
    }

    impl From<&str> for $name {
      fn from(s: &str) -> Self { Self(s.to_owned()) }
    }

    impl From<String> for $name {
      fn from(s: String) -> Self { Self(s) }
    }
  };
}

opaque_id!(
  /// Identifies a school health event in the event directory.
  EventId
);
opaque_id!(
  /// Identifies a student. Referenced by id only.
  StudentId
);
opaque_id!(
  /// Identifies the guardian account acting on behalf of a student.
  GuardianId
);
opaque_id!(
  /// Identifies a consent record. Assigned by the server, or synthesized
  /// locally (prefixed `local-`) during reconciliation.
  RecordId
);

impl RecordId {
  /// Prefix carried by ids the engine invents for synthesized records.
  pub const LOCAL_PREFIX: &'static str = "local-";

  /// A fresh locally-synthesized id.
  pub fn synthesized() -> Self {
    Self(format!("{}{}", Self::LOCAL_PREFIX, uuid::Uuid::new_v4()))
  }

  pub fn is_synthesized(&self) -> bool {
    self.0.starts_with(Self::LOCAL_PREFIX)
  }
}
