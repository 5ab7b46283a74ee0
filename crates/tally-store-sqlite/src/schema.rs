//! SQL schema for the tally SQLite store.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Finalized attendance records from the upstream pipeline. Consumed input;
-- the ledger never edits a row after insertion.
CREATE TABLE IF NOT EXISTS attendance_events (
    attendance_id  TEXT PRIMARY KEY,
    user_id        TEXT NOT NULL,
    violation_date TEXT NOT NULL,      -- ISO calendar date
    is_absent      INTEGER NOT NULL DEFAULT 0,
    minutes_late   INTEGER NOT NULL DEFAULT 0,
    minutes_early  INTEGER NOT NULL DEFAULT 0,
    is_advised     INTEGER NOT NULL DEFAULT 0,
    admin_verified INTEGER NOT NULL DEFAULT 0,
    recorded_at    TEXT NOT NULL       -- ISO 8601 UTC; server-assigned
);

CREATE TABLE IF NOT EXISTS points (
    point_id                  TEXT PRIMARY KEY,
    user_id                   TEXT NOT NULL,
    source_attendance_id      TEXT REFERENCES attendance_events(attendance_id),
    violation_date            TEXT NOT NULL,  -- ISO calendar date
    violation_type            TEXT NOT NULL,  -- discriminant of ViolationType
    point_value               TEXT NOT NULL,  -- canonical decimal string
    is_advised                INTEGER NOT NULL DEFAULT 0,
    is_manual                 INTEGER NOT NULL DEFAULT 0,
    is_excused                INTEGER NOT NULL DEFAULT 0,
    excuse_reason             TEXT,
    excused_by                TEXT,
    is_expired                INTEGER NOT NULL DEFAULT 0,
    expiration_kind           TEXT NOT NULL DEFAULT 'none',  -- 'none' | 'fixed' | 'behavioral'
    expires_at                TEXT NOT NULL,
    behavioral_eligible       INTEGER NOT NULL DEFAULT 1,
    projected_behavioral_date TEXT,
    behavioral_applied_at     TEXT,
    behavioral_batch_id       TEXT,
    note                      TEXT,
    created_at                TEXT NOT NULL   -- ISO 8601 UTC; server-assigned
);

CREATE INDEX IF NOT EXISTS points_user_idx       ON points(user_id);
CREATE INDEX IF NOT EXISTS points_expires_idx    ON points(expires_at);
CREATE INDEX IF NOT EXISTS points_source_idx     ON points(source_attendance_id);
CREATE INDEX IF NOT EXISTS attendance_user_idx   ON attendance_events(user_id);

PRAGMA user_version = 1;
";
