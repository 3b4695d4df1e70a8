//! [`SqliteStore`]: the SQLite implementation of [`ConsentRepository`] and
//! [`EventDirectory`].

use std::path::Path;

use assent_core::{
  consent::{ConsentKey, ConsentRecord, ConsentStatus, Decision},
  event::Event,
  ids::{EventId, RecordId},
  repository::{ConsentFilter, ConsentRepository, ConsentUpdate, EventDirectory, NewConsent},
};
use chrono::Utc;
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    CONSENT_COLUMNS, RawConsent, RawEvent, decode_status, encode_decision, encode_dt,
    encode_status,
  },
  schema::SCHEMA,
};

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn is_unique_violation(err: &rusqlite::Error) -> bool {
  matches!(
    err,
    rusqlite::Error::SqliteFailure(e, _)
      if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
  )
}

fn check_decline_reason(decision: Decision, reason: Option<&str>) -> Result<()> {
  if decision == Decision::Decline && reason.is_none_or(|r| r.trim().is_empty()) {
    return Err(Error::MissingDeclineReason);
  }
  Ok(())
}

/// What a conditional `UPDATE` found.
enum Conditional {
  Applied(RawConsent),
  /// Status differs from the expected one.
  Mismatch(String),
  /// Status matches but the record already carries another decision.
  Decided,
  Missing,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A consent store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Directory side (school-owned) ─────────────────────────────────────────

  /// Insert or replace an event.
  pub async fn put_event(&self, event: &Event) -> Result<()> {
    let event_id    = event.event_id.as_str().to_owned();
    let kind        = event.kind.as_ref().to_owned();
    let school_year = event.school_year.clone();
    let location    = event.location.clone();
    let event_date  = encode_dt(event.event_date);
    let start       = encode_dt(event.registration_window.start);
    let end         = encode_dt(event.registration_window.end);
    let lifecycle   = event.lifecycle_override.map(|l| l.as_ref().to_owned());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO events (
             event_id, kind, school_year, location, event_date,
             registration_start, registration_end, lifecycle_status
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            event_id, kind, school_year, location, event_date, start, end, lifecycle,
          ],
        )?;
        Ok(())
      })
      .await?;
    tracing::debug!(event = %event.event_id, "stored event");
    Ok(())
  }

  /// Pre-create a Pending stub for `key`, as the school system does before
  /// the guardian acts.
  pub async fn create_stub(
    &self,
    key: &ConsentKey,
    school_year: impl Into<String>,
  ) -> Result<ConsentRecord> {
    let record = ConsentRecord {
      record_id:      RecordId::new(Uuid::new_v4().to_string()),
      event_id:       key.event_id.clone(),
      student_id:     key.student_id.clone(),
      guardian_id:    key.guardian_id.clone(),
      school_year:    school_year.into(),
      decision:       None,
      status:         ConsentStatus::Pending,
      consent_date:   None,
      decline_reason: None,
      notes:          None,
    };
    self.insert(&record).await?;
    Ok(record)
  }

  /// Force a record's status, e.g. when the school expires or cancels it.
  pub async fn set_status(
    &self,
    record_id: &RecordId,
    status: ConsentStatus,
  ) -> Result<ConsentRecord> {
    let existing = self
      .get_consent(record_id)
      .await?
      .ok_or_else(|| Error::ConsentNotFound(record_id.clone()))?;

    let id     = record_id.as_str().to_owned();
    let status = encode_status(status).to_owned();
    let now    = encode_dt(Utc::now());
    let applied = self
      .conn
      .call(move |conn| {
        match conn.execute(
          "UPDATE consents SET status = ?2, updated_at = ?3 WHERE record_id = ?1",
          rusqlite::params![id, status, now],
        ) {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;
    if !applied {
      return Err(Error::Duplicate(existing.key()));
    }

    self
      .get_consent(record_id)
      .await?
      .ok_or_else(|| Error::ConsentNotFound(record_id.clone()))
  }

  /// Fetch one record by id.
  pub async fn get_consent(&self, record_id: &RecordId) -> Result<Option<ConsentRecord>> {
    let id  = record_id.as_str().to_owned();
    let sql = format!("SELECT {CONSENT_COLUMNS} FROM consents WHERE record_id = ?1");

    let raw: Option<RawConsent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(&sql, rusqlite::params![id], RawConsent::from_row)
            .optional()?,
        )
      })
      .await?;

    raw.map(RawConsent::into_record).transpose()
  }

  /// Insert a fully-built record; a clash on the active key is `Duplicate`.
  async fn insert(&self, record: &ConsentRecord) -> Result<()> {
    let record_id      = record.record_id.as_str().to_owned();
    let event_id       = record.event_id.as_str().to_owned();
    let student_id     = record.student_id.as_str().to_owned();
    let guardian_id    = record.guardian_id.as_str().to_owned();
    let school_year    = record.school_year.clone();
    let decision       = record.decision.map(encode_decision);
    let status         = encode_status(record.status);
    let consent_date   = record.consent_date.map(encode_dt);
    let decline_reason = record.decline_reason.clone();
    let notes          = record.notes.clone();
    let now            = encode_dt(Utc::now());

    let inserted = self
      .conn
      .call(move |conn| {
        let result = conn.execute(
          "INSERT INTO consents (
             record_id, event_id, student_id, guardian_id, school_year,
             decision, status, consent_date, decline_reason, notes,
             created_at, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
          rusqlite::params![
            record_id,
            event_id,
            student_id,
            guardian_id,
            school_year,
            decision,
            status,
            consent_date,
            decline_reason,
            notes,
            now,
          ],
        );
        match result {
          Ok(_) => Ok(true),
          Err(e) if is_unique_violation(&e) => Ok(false),
          Err(e) => Err(e.into()),
        }
      })
      .await?;

    if !inserted {
      return Err(Error::Duplicate(record.key()));
    }
    Ok(())
  }
}

// ─── ConsentRepository impl ──────────────────────────────────────────────────

impl ConsentRepository for SqliteStore {
  type Error = Error;

  async fn create(&self, input: NewConsent) -> Result<ConsentRecord> {
    check_decline_reason(input.decision, input.decline_reason.as_deref())?;

    let record = ConsentRecord {
      record_id:      RecordId::new(Uuid::new_v4().to_string()),
      event_id:       input.event_id,
      student_id:     input.student_id,
      guardian_id:    input.guardian_id,
      school_year:    input.school_year,
      decision:       Some(input.decision),
      status:         input.status,
      consent_date:   input.consent_date,
      decline_reason: input.decline_reason,
      notes:          input.notes,
    };

    self.insert(&record).await?;
    Ok(record)
  }

  async fn update(&self, record_id: RecordId, update: ConsentUpdate) -> Result<ConsentRecord> {
    check_decline_reason(update.decision, update.decline_reason.as_deref())?;

    let id             = record_id.as_str().to_owned();
    let decision       = encode_decision(update.decision);
    let status         = encode_status(update.status);
    let consent_date   = update.consent_date.map(encode_dt);
    let decline_reason = update.decline_reason;
    let notes          = update.notes;
    let expected       = encode_status(update.expected_status);
    let expected_dec   = update.expected_decision.map(encode_decision);
    let now            = encode_dt(Utc::now());
    let select         = format!("SELECT {CONSENT_COLUMNS} FROM consents WHERE record_id = ?1");

    let outcome = self
      .conn
      .call(move |conn| {
        // The status and decision predicates are the optimistic-concurrency
        // guard: a record processed since the caller last looked matches zero
        // rows. `IS` compares NULL decisions as equal.
        let changed = conn.execute(
          "UPDATE consents
              SET decision = ?2, status = ?3, consent_date = ?4,
                  decline_reason = ?5, notes = ?6, updated_at = ?7
            WHERE record_id = ?1 AND status = ?8 AND decision IS ?9",
          rusqlite::params![
            id,
            decision,
            status,
            consent_date,
            decline_reason,
            notes,
            now,
            expected,
            expected_dec,
          ],
        )?;

        if changed == 1 {
          let raw = conn.query_row(&select, rusqlite::params![id], RawConsent::from_row)?;
          return Ok(Conditional::Applied(raw));
        }

        let current: Option<String> = conn
          .query_row(
            "SELECT status FROM consents WHERE record_id = ?1",
            rusqlite::params![id],
            |r| r.get(0),
          )
          .optional()?;
        Ok(match current {
          Some(status) if status == expected => Conditional::Decided,
          Some(status) => Conditional::Mismatch(status),
          None => Conditional::Missing,
        })
      })
      .await?;

    match outcome {
      Conditional::Applied(raw) => raw.into_record(),
      Conditional::Mismatch(status) => {
        Err(Error::NotPending(record_id, decode_status(&status)))
      }
      Conditional::Decided => Err(Error::AlreadyDecided(record_id)),
      Conditional::Missing => Err(Error::ConsentNotFound(record_id)),
    }
  }

  async fn find(&self, filter: ConsentFilter) -> Result<Vec<ConsentRecord>> {
    let event_id    = filter.event_id.as_str().to_owned();
    let student_id  = filter.student_id.as_str().to_owned();
    let guardian_id = filter.guardian_id.as_str().to_owned();
    let status      = filter.status.map(encode_status);
    let sql         = format!(
      "SELECT {CONSENT_COLUMNS} FROM consents
        WHERE event_id = ?1 AND student_id = ?2 AND guardian_id = ?3
          AND (?4 IS NULL OR status = ?4)
        ORDER BY created_at, rowid"
    );

    let raws: Vec<RawConsent> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            rusqlite::params![event_id, student_id, guardian_id, status],
            RawConsent::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawConsent::into_record).collect()
  }
}

// ─── EventDirectory impl ─────────────────────────────────────────────────────

impl EventDirectory for SqliteStore {
  type Error = Error;

  async fn get_event(&self, id: EventId) -> Result<Option<Event>> {
    let id_str = id.as_str().to_owned();

    let raw: Option<RawEvent> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT event_id, kind, school_year, location, event_date,
                      registration_start, registration_end, lifecycle_status
                 FROM events WHERE event_id = ?1",
              rusqlite::params![id_str],
              |row| {
                Ok(RawEvent {
                  event_id:           row.get(0)?,
                  kind:               row.get(1)?,
                  school_year:        row.get(2)?,
                  location:           row.get(3)?,
                  event_date:         row.get(4)?,
                  registration_start: row.get(5)?,
                  registration_end:   row.get(6)?,
                  lifecycle_status:   row.get(7)?,
                })
              },
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawEvent::into_event).transpose()
  }
}
