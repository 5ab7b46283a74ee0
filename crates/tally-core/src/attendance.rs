//! Finalized attendance events and the event → violation derivation rule.
//!
//! Attendance derivation itself (shift matching, clock-in/out inference)
//! happens upstream; the ledger only consumes finished records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::violation::{ViolationType, UNDERTIME_EXTENDED_MINUTES};

/// A finished attendance record as delivered by the upstream pipeline.
/// Only `admin_verified` events are eligible for automatic derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceEvent {
  pub attendance_id:  Uuid,
  pub user_id:        Uuid,
  pub violation_date: NaiveDate,
  pub is_absent:      bool,
  pub minutes_late:   u32,
  pub minutes_early:  u32,
  pub is_advised:     bool,
  pub admin_verified: bool,
  /// Server-assigned timestamp; never changes after creation.
  pub recorded_at:    DateTime<Utc>,
}

/// Input to [`crate::store::PointStore::record_attendance`].
/// `attendance_id` and `recorded_at` are assigned by the store.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAttendanceEvent {
  pub user_id:        Uuid,
  pub violation_date: NaiveDate,
  #[serde(default)]
  pub is_absent:      bool,
  #[serde(default)]
  pub minutes_late:   u32,
  #[serde(default)]
  pub minutes_early:  u32,
  #[serde(default)]
  pub is_advised:     bool,
  #[serde(default)]
  pub admin_verified: bool,
}

impl AttendanceEvent {
  /// The violation this event implies, if any.
  ///
  /// Absence wins over tardiness wins over undertime; an event matching no
  /// condition yields `None`, which is a no-op for derivation, not an
  /// error.
  pub fn violation(&self) -> Option<(ViolationType, bool)> {
    if self.is_absent {
      return Some((ViolationType::FullAbsence, self.is_advised));
    }
    if self.minutes_late > 0 {
      return Some((ViolationType::Tardy, self.is_advised));
    }
    if self.minutes_early > 0 {
      let vt = if self.minutes_early >= UNDERTIME_EXTENDED_MINUTES {
        ViolationType::UndertimeExtended
      } else {
        ViolationType::Undertime
      };
      return Some((vt, self.is_advised));
    }
    None
  }
}
