//! Point — the ledger's unit of state.
//!
//! A point's identity fields (`user_id`, `violation_date`, `violation_type`,
//! `point_value`) never change after creation. Everything the two decay
//! mechanisms touch is a separate, resettable group of fields, so a cascade
//! recompute can rewrite decay state without ever mutating what the point
//! *is*.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{violation::ViolationType, Result};

// ─── Expiration ──────────────────────────────────────────────────────────────

/// Which decay mechanism, if any, has fired on a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpirationKind {
  #[default]
  None,
  /// Fixed-duration (SRO) decay: `expires_at` passed.
  Fixed,
  /// Good-behavior (GBRO) roll-off: forgiven after a 60-day clean window.
  Behavioral,
}

// ─── Point ───────────────────────────────────────────────────────────────────

/// One disciplinary unit tied to a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Point {
  pub point_id:             Uuid,
  pub user_id:              Uuid,
  /// Back-reference to the originating attendance event; `None` for points
  /// entered manually.
  pub source_attendance_id: Option<Uuid>,
  /// The calendar date of the infraction — the ledger's sole time axis.
  pub violation_date:       NaiveDate,
  pub violation_type:       ViolationType,
  /// Set from `violation_type` at creation; immutable.
  pub point_value:          Decimal,
  /// Only meaningful for [`ViolationType::FullAbsence`]: the employee gave
  /// notice, but the absence is still unexcused.
  pub is_advised:           bool,
  pub is_manual:            bool,
  pub is_excused:           bool,
  pub excuse_reason:        Option<String>,
  pub excused_by:           Option<String>,
  pub is_expired:           bool,
  pub expiration_kind:      ExpirationKind,
  /// The fixed-decay trigger date: violation date + 12 months for an
  /// unadvised full absence, + 6 months otherwise.
  pub expires_at:           NaiveDate,
  pub behavioral_eligible:  bool,
  /// Display-only forward projection of the next behavioral decay;
  /// rewritten on every cascade, set only on the two most-recent eligible
  /// active points.
  pub projected_behavioral_date: Option<NaiveDate>,
  /// Set only when behavioral decay actually fires, not merely projects.
  pub behavioral_applied_at: Option<NaiveDate>,
  /// Shared by the (up to two) points forgiven in the same decay event.
  pub behavioral_batch_id:  Option<Uuid>,
  pub note:                 Option<String>,
  /// Server-assigned timestamp; never changes after creation.
  pub created_at:           DateTime<Utc>,
}

impl Point {
  /// A point counts toward totals and thresholds iff it is neither excused
  /// nor expired.
  pub fn is_active(&self) -> bool { !self.is_excused && !self.is_expired }
}

// ─── NewPoint ────────────────────────────────────────────────────────────────

/// Input to [`crate::store::PointStore::insert_point`].
///
/// All decay-policy fields are computed here, in one place, from the
/// violation type and date. `point_id` and `created_at` are assigned by the
/// store.
#[derive(Debug, Clone)]
pub struct NewPoint {
  pub user_id:              Uuid,
  pub source_attendance_id: Option<Uuid>,
  pub violation_date:       NaiveDate,
  pub violation_type:       ViolationType,
  pub point_value:          Decimal,
  pub is_advised:           bool,
  pub is_manual:            bool,
  pub expires_at:           NaiveDate,
  pub behavioral_eligible:  bool,
  pub note:                 Option<String>,
}

impl NewPoint {
  /// Build a point input with every derived field set per policy.
  pub fn build(
    user_id: Uuid,
    violation_date: NaiveDate,
    violation_type: ViolationType,
    is_advised: bool,
    is_manual: bool,
    source_attendance_id: Option<Uuid>,
    note: Option<String>,
  ) -> Result<Self> {
    Ok(Self {
      user_id,
      source_attendance_id,
      violation_date,
      violation_type,
      point_value: violation_type.point_value(),
      is_advised,
      is_manual,
      expires_at: violation_type.expires_at(violation_date, is_advised)?,
      behavioral_eligible: violation_type.behavioral_eligible(is_advised),
      note,
    })
  }
}
