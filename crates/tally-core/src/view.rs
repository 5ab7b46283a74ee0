//! The per-user ledger read model — never stored, always derived.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use uuid::Uuid;

use crate::point::Point;

/// Active totals at or above this many points flag the user for
/// disciplinary review.
pub const DISCIPLINARY_THRESHOLD: Decimal = dec!(6.00);

/// A user's points partitioned by status, with the active total.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerView {
  pub user_id:        Uuid,
  pub active:         Vec<Point>,
  pub excused:        Vec<Point>,
  pub expired:        Vec<Point>,
  pub active_total:   Decimal,
  pub over_threshold: bool,
}

impl LedgerView {
  /// Partition `points` (all belonging to `user_id`) and total the active
  /// ones. Excused wins over expired: an excused point never decays, so a
  /// record that is somehow both is a repair condition and is surfaced in
  /// the excused partition.
  pub fn assemble(user_id: Uuid, mut points: Vec<Point>) -> Self {
    points.sort_by_key(|p| (p.violation_date, p.point_id));

    let mut active = Vec::new();
    let mut excused = Vec::new();
    let mut expired = Vec::new();

    for p in points {
      if p.is_excused {
        excused.push(p);
      } else if p.is_expired {
        expired.push(p);
      } else {
        active.push(p);
      }
    }

    let active_total: Decimal = active.iter().map(|p| p.point_value).sum();
    let over_threshold = active_total >= DISCIPLINARY_THRESHOLD;

    Self { user_id, active, excused, expired, active_total, over_threshold }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Utc;

  use crate::{
    point::{ExpirationKind, NewPoint},
    violation::ViolationType,
  };

  fn point(vt: ViolationType, excused: bool, expired: bool) -> Point {
    let np = NewPoint::build(
      Uuid::from_u128(7),
      "2024-02-01".parse().unwrap(),
      vt,
      false,
      true,
      None,
      None,
    )
    .unwrap();
    Point {
      point_id: Uuid::new_v4(),
      user_id: np.user_id,
      source_attendance_id: None,
      violation_date: np.violation_date,
      violation_type: np.violation_type,
      point_value: np.point_value,
      is_advised: np.is_advised,
      is_manual: np.is_manual,
      is_excused: excused,
      excuse_reason: None,
      excused_by: None,
      is_expired: expired,
      expiration_kind: if expired { ExpirationKind::Fixed } else { ExpirationKind::None },
      expires_at: np.expires_at,
      behavioral_eligible: np.behavioral_eligible,
      projected_behavioral_date: None,
      behavioral_applied_at: None,
      behavioral_batch_id: None,
      note: None,
      created_at: Utc::now(),
    }
  }

  #[test]
  fn totals_count_only_active_points() {
    let view = LedgerView::assemble(
      Uuid::from_u128(7),
      vec![
        point(ViolationType::FullAbsence, false, false),
        point(ViolationType::Tardy, true, false),
        point(ViolationType::HalfDayAbsence, false, true),
      ],
    );

    assert_eq!(view.active.len(), 1);
    assert_eq!(view.excused.len(), 1);
    assert_eq!(view.expired.len(), 1);
    assert_eq!(view.active_total, dec!(1.00));
    assert!(!view.over_threshold);
  }

  #[test]
  fn threshold_flags_at_six_points() {
    let points: Vec<Point> =
      (0..6).map(|_| point(ViolationType::FullAbsence, false, false)).collect();
    let view = LedgerView::assemble(Uuid::from_u128(7), points);
    assert_eq!(view.active_total, dec!(6.00));
    assert!(view.over_threshold);
  }
}
