//! SQL schema for the consent SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Read-only from the engine's side; filled by the school directory.
CREATE TABLE IF NOT EXISTS events (
    event_id           TEXT PRIMARY KEY,
    kind               TEXT NOT NULL,   -- 'health_check' | 'vaccination'
    school_year        TEXT NOT NULL,
    location           TEXT NOT NULL,
    event_date         TEXT NOT NULL,   -- RFC 3339 UTC
    registration_start TEXT NOT NULL,
    registration_end   TEXT NOT NULL,
    lifecycle_status   TEXT             -- authoritative override or NULL
);

CREATE TABLE IF NOT EXISTS consents (
    record_id      TEXT PRIMARY KEY,
    event_id       TEXT NOT NULL,
    student_id     TEXT NOT NULL,
    guardian_id    TEXT NOT NULL,
    school_year    TEXT NOT NULL,
    decision       TEXT,            -- 'agree' | 'decline'; NULL for a stub
    status         TEXT NOT NULL,   -- 'Pending' | 'Approved' | ...
    consent_date   TEXT,
    decline_reason TEXT,
    notes          TEXT,
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL,
    CHECK (decision IS NOT 'decline' OR coalesce(length(trim(decline_reason)), 0) > 0)
);

-- At most one non-cancelled consent per (event, student, guardian).
CREATE UNIQUE INDEX IF NOT EXISTS consents_active_key
    ON consents(event_id, student_id, guardian_id)
    WHERE status != 'Cancelled';

CREATE INDEX IF NOT EXISTS consents_event_idx ON consents(event_id);

PRAGMA user_version = 1;
";
