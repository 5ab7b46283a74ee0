//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as ISO
//! `YYYY-MM-DD` (which compares correctly as text), decimals in their
//! canonical string form, and UUIDs as hyphenated lowercase strings.

use std::str::FromStr as _;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tally_core::{
  attendance::AttendanceEvent,
  point::{ExpirationKind, Point},
  violation::ViolationType,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  s.parse().map_err(|_| Error::DateParse(format!("bad calendar date: {s:?}")))
}

// ─── Decimal ─────────────────────────────────────────────────────────────────

pub fn encode_decimal(d: Decimal) -> String { d.to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> {
  Decimal::from_str(s).map_err(|e| Error::DecimalParse(format!("{s:?}: {e}")))
}

// ─── ViolationType ───────────────────────────────────────────────────────────

pub fn encode_violation_type(vt: ViolationType) -> &'static str { vt.discriminant() }

pub fn decode_violation_type(s: &str) -> Result<ViolationType> {
  Ok(ViolationType::from_discriminant(s)?)
}

// ─── ExpirationKind ──────────────────────────────────────────────────────────

/// Writes use the literal kind strings in their UPDATE statements; this is
/// the single decode point for reads.
pub fn decode_expiration_kind(s: &str) -> Result<ExpirationKind> {
  match s {
    "none" => Ok(ExpirationKind::None),
    "fixed" => Ok(ExpirationKind::Fixed),
    "behavioral" => Ok(ExpirationKind::Behavioral),
    other => Err(Error::DateParse(format!("unknown expiration kind: {other:?}"))),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// The SELECT column list matching [`read_point_row`]. Keep in sync.
pub const POINT_COLUMNS: &str = "point_id, user_id, source_attendance_id, \
   violation_date, violation_type, point_value, is_advised, is_manual, \
   is_excused, excuse_reason, excused_by, is_expired, expiration_kind, \
   expires_at, behavioral_eligible, projected_behavioral_date, \
   behavioral_applied_at, behavioral_batch_id, note, created_at";

/// Raw values read directly from a `points` row.
pub struct RawPoint {
  pub point_id:                  String,
  pub user_id:                   String,
  pub source_attendance_id:      Option<String>,
  pub violation_date:            String,
  pub violation_type:            String,
  pub point_value:               String,
  pub is_advised:                bool,
  pub is_manual:                 bool,
  pub is_excused:                bool,
  pub excuse_reason:             Option<String>,
  pub excused_by:                Option<String>,
  pub is_expired:                bool,
  pub expiration_kind:           String,
  pub expires_at:                String,
  pub behavioral_eligible:       bool,
  pub projected_behavioral_date: Option<String>,
  pub behavioral_applied_at:     Option<String>,
  pub behavioral_batch_id:       Option<String>,
  pub note:                      Option<String>,
  pub created_at:                String,
}

/// Map a row selected with [`POINT_COLUMNS`] into a [`RawPoint`].
pub fn read_point_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPoint> {
  Ok(RawPoint {
    point_id:                  row.get(0)?,
    user_id:                   row.get(1)?,
    source_attendance_id:      row.get(2)?,
    violation_date:            row.get(3)?,
    violation_type:            row.get(4)?,
    point_value:               row.get(5)?,
    is_advised:                row.get(6)?,
    is_manual:                 row.get(7)?,
    is_excused:                row.get(8)?,
    excuse_reason:             row.get(9)?,
    excused_by:                row.get(10)?,
    is_expired:                row.get(11)?,
    expiration_kind:           row.get(12)?,
    expires_at:                row.get(13)?,
    behavioral_eligible:       row.get(14)?,
    projected_behavioral_date: row.get(15)?,
    behavioral_applied_at:     row.get(16)?,
    behavioral_batch_id:       row.get(17)?,
    note:                      row.get(18)?,
    created_at:                row.get(19)?,
  })
}

impl RawPoint {
  pub fn into_point(self) -> Result<Point> {
    Ok(Point {
      point_id:             decode_uuid(&self.point_id)?,
      user_id:              decode_uuid(&self.user_id)?,
      source_attendance_id: self
        .source_attendance_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      violation_date:       decode_date(&self.violation_date)?,
      violation_type:       decode_violation_type(&self.violation_type)?,
      point_value:          decode_decimal(&self.point_value)?,
      is_advised:           self.is_advised,
      is_manual:            self.is_manual,
      is_excused:           self.is_excused,
      excuse_reason:        self.excuse_reason,
      excused_by:           self.excused_by,
      is_expired:           self.is_expired,
      expiration_kind:      decode_expiration_kind(&self.expiration_kind)?,
      expires_at:           decode_date(&self.expires_at)?,
      behavioral_eligible:  self.behavioral_eligible,
      projected_behavioral_date: self
        .projected_behavioral_date
        .as_deref()
        .map(decode_date)
        .transpose()?,
      behavioral_applied_at: self
        .behavioral_applied_at
        .as_deref()
        .map(decode_date)
        .transpose()?,
      behavioral_batch_id:  self
        .behavioral_batch_id
        .as_deref()
        .map(decode_uuid)
        .transpose()?,
      note:                 self.note,
      created_at:           decode_dt(&self.created_at)?,
    })
  }
}

/// The SELECT column list matching [`read_attendance_row`]. Keep in sync.
pub const ATTENDANCE_COLUMNS: &str = "attendance_id, user_id, violation_date, \
   is_absent, minutes_late, minutes_early, is_advised, admin_verified, \
   recorded_at";

/// Raw values read directly from an `attendance_events` row.
pub struct RawAttendance {
  pub attendance_id:  String,
  pub user_id:        String,
  pub violation_date: String,
  pub is_absent:      bool,
  pub minutes_late:   i64,
  pub minutes_early:  i64,
  pub is_advised:     bool,
  pub admin_verified: bool,
  pub recorded_at:    String,
}

pub fn read_attendance_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawAttendance> {
  Ok(RawAttendance {
    attendance_id:  row.get(0)?,
    user_id:        row.get(1)?,
    violation_date: row.get(2)?,
    is_absent:      row.get(3)?,
    minutes_late:   row.get(4)?,
    minutes_early:  row.get(5)?,
    is_advised:     row.get(6)?,
    admin_verified: row.get(7)?,
    recorded_at:    row.get(8)?,
  })
}

impl RawAttendance {
  pub fn into_event(self) -> Result<AttendanceEvent> {
    Ok(AttendanceEvent {
      attendance_id:  decode_uuid(&self.attendance_id)?,
      user_id:        decode_uuid(&self.user_id)?,
      violation_date: decode_date(&self.violation_date)?,
      is_absent:      self.is_absent,
      minutes_late:   self.minutes_late.max(0) as u32,
      minutes_early:  self.minutes_early.max(0) as u32,
      is_advised:     self.is_advised,
      admin_verified: self.admin_verified,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}
