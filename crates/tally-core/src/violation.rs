//! The closed violation-type taxonomy.
//!
//! Each variant carries its point value, fixed-decay duration, and
//! behavioral-decay eligibility as data. Services never branch on type
//! strings; everything downstream asks the enum.

use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Undertime at or above this many minutes is the extended variant.
pub const UNDERTIME_EXTENDED_MINUTES: u32 = 60;

/// The kind of attendance infraction a point records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
  /// A full-day absence. `is_advised` on the point distinguishes
  /// "notified but unexcused" from a no-call-no-show.
  FullAbsence,
  /// An advised or partial half-day absence. Only entered manually; the
  /// attendance pipeline does not emit half-day events.
  HalfDayAbsence,
  Tardy,
  Undertime,
  UndertimeExtended,
}

impl ViolationType {
  /// The discriminant string stored in the `violation_type` column.
  /// Must match the `rename_all = "snake_case"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::FullAbsence => "full_absence",
      Self::HalfDayAbsence => "half_day_absence",
      Self::Tardy => "tardy",
      Self::Undertime => "undertime",
      Self::UndertimeExtended => "undertime_extended",
    }
  }

  pub fn from_discriminant(s: &str) -> Result<Self> {
    match s {
      "full_absence" => Ok(Self::FullAbsence),
      "half_day_absence" => Ok(Self::HalfDayAbsence),
      "tardy" => Ok(Self::Tardy),
      "undertime" => Ok(Self::Undertime),
      "undertime_extended" => Ok(Self::UndertimeExtended),
      other => Err(Error::UnknownViolationType(other.to_string())),
    }
  }

  /// The fixed point value assigned at creation. Never changes afterwards.
  pub fn point_value(&self) -> Decimal {
    match self {
      Self::FullAbsence => dec!(1.00),
      Self::HalfDayAbsence => dec!(0.50),
      Self::Tardy => dec!(0.25),
      Self::Undertime => dec!(0.25),
      Self::UndertimeExtended => dec!(0.50),
    }
  }

  /// Duration of the fixed (SRO) decay window, in months.
  ///
  /// Twelve months for a full absence the employee never advised;
  /// six months for everything else.
  pub fn fixed_decay_months(&self, is_advised: bool) -> u32 {
    if *self == Self::FullAbsence && !is_advised {
      12
    } else {
      6
    }
  }

  /// Whether good-behavior (GBRO) roll-off can ever forgive this point.
  /// The most severe violation, an unadvised full absence, never benefits.
  pub fn behavioral_eligible(&self, is_advised: bool) -> bool {
    !(*self == Self::FullAbsence && !is_advised)
  }

  /// The fixed-decay trigger date for a violation on `violation_date`.
  /// Derived purely from the date and the type; never user-settable.
  pub fn expires_at(&self, violation_date: NaiveDate, is_advised: bool) -> Result<NaiveDate> {
    violation_date
      .checked_add_months(Months::new(self.fixed_decay_months(is_advised)))
      .ok_or(Error::DateOverflow(violation_date))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn d(s: &str) -> NaiveDate { s.parse().unwrap() }

  #[test]
  fn point_values_match_policy() {
    assert_eq!(ViolationType::FullAbsence.point_value(), dec!(1.00));
    assert_eq!(ViolationType::HalfDayAbsence.point_value(), dec!(0.50));
    assert_eq!(ViolationType::Tardy.point_value(), dec!(0.25));
    assert_eq!(ViolationType::Undertime.point_value(), dec!(0.25));
    assert_eq!(ViolationType::UndertimeExtended.point_value(), dec!(0.50));
  }

  #[test]
  fn unadvised_full_absence_decays_after_a_year() {
    let vt = ViolationType::FullAbsence;
    assert_eq!(vt.fixed_decay_months(false), 12);
    assert_eq!(vt.expires_at(d("2024-03-01"), false).unwrap(), d("2025-03-01"));
  }

  #[test]
  fn advised_full_absence_decays_after_six_months() {
    let vt = ViolationType::FullAbsence;
    assert_eq!(vt.fixed_decay_months(true), 6);
    assert_eq!(vt.expires_at(d("2024-03-01"), true).unwrap(), d("2024-09-01"));
  }

  #[test]
  fn other_types_decay_after_six_months_regardless_of_advised() {
    for vt in [
      ViolationType::HalfDayAbsence,
      ViolationType::Tardy,
      ViolationType::Undertime,
      ViolationType::UndertimeExtended,
    ] {
      assert_eq!(vt.fixed_decay_months(false), 6);
      assert_eq!(vt.fixed_decay_months(true), 6);
    }
  }

  #[test]
  fn only_unadvised_full_absence_is_behaviorally_ineligible() {
    assert!(!ViolationType::FullAbsence.behavioral_eligible(false));
    assert!(ViolationType::FullAbsence.behavioral_eligible(true));
    assert!(ViolationType::Tardy.behavioral_eligible(false));
    assert!(ViolationType::HalfDayAbsence.behavioral_eligible(false));
  }

  #[test]
  fn month_end_expiry_clamps() {
    // Aug 31 + 6 months lands on Feb 28/29.
    let vt = ViolationType::Tardy;
    assert_eq!(vt.expires_at(d("2024-08-31"), false).unwrap(), d("2025-02-28"));
  }

  #[test]
  fn discriminant_roundtrip() {
    for vt in [
      ViolationType::FullAbsence,
      ViolationType::HalfDayAbsence,
      ViolationType::Tardy,
      ViolationType::Undertime,
      ViolationType::UndertimeExtended,
    ] {
      assert_eq!(ViolationType::from_discriminant(vt.discriminant()).unwrap(), vt);
    }
    assert!(matches!(
      ViolationType::from_discriminant("overtime"),
      Err(Error::UnknownViolationType(_))
    ));
  }
}
