//! End-to-end service tests against the in-memory SQLite store.
//!
//! Dates are expressed relative to the current day so the replay horizon
//! (always "today") lines up with the fixtures.

use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};

use chrono::{Days, NaiveDate, Utc};
use rust_decimal_macros::dec;
use uuid::Uuid;

use tally_core::{
  attendance::NewAttendanceEvent,
  point::{ExpirationKind, Point},
  store::PointStore,
  violation::ViolationType,
};
use tally_store_sqlite::SqliteStore;

use crate::{
  notify::{Notifier, TracingNotifier},
  service::{LedgerService, ManualEntry},
  Error,
};

fn today() -> NaiveDate { Utc::now().date_naive() }

fn days_ago(n: u64) -> NaiveDate { today() - Days::new(n) }

async fn service() -> LedgerService<SqliteStore, TracingNotifier> {
  LedgerService::new(SqliteStore::open_in_memory().await.unwrap(), TracingNotifier)
}

fn manual(user_id: Uuid, ago: u64, violation_type: ViolationType) -> ManualEntry {
  ManualEntry {
    user_id,
    violation_date: days_ago(ago),
    violation_type,
    is_advised: false,
    note: None,
  }
}

#[derive(Clone, Default)]
struct CountingNotifier {
  created: Arc<AtomicUsize>,
}

impl Notifier for CountingNotifier {
  async fn point_created(&self, _point: &Point) {
    self.created.fetch_add(1, Ordering::SeqCst);
  }
}

// ─── Behavioral decay through the service ────────────────────────────────────

#[tokio::test]
async fn clean_window_forgives_both_recent_points_in_one_batch() {
  let svc = service().await;
  let user = Uuid::new_v4();

  // Tardies 130 and 90 days ago, nothing since: the window runs from the
  // newest violation and closed 30 days ago.
  svc.record_manual(manual(user, 130, ViolationType::Tardy)).await.unwrap();
  svc.record_manual(manual(user, 90, ViolationType::Tardy)).await.unwrap();

  let view = svc.ledger_view(user).await.unwrap();
  assert!(view.active.is_empty());
  assert_eq!(view.expired.len(), 2);
  assert_eq!(view.active_total, dec!(0));

  for p in &view.expired {
    assert_eq!(p.expiration_kind, ExpirationKind::Behavioral);
    assert_eq!(p.behavioral_applied_at, Some(days_ago(30)));
    assert!(p.projected_behavioral_date.is_none());
  }
  assert_eq!(
    view.expired[0].behavioral_batch_id,
    view.expired[1].behavioral_batch_id
  );
  assert!(view.expired[0].behavioral_batch_id.is_some());
}

#[tokio::test]
async fn violation_inside_window_resets_the_clock() {
  let svc = service().await;
  let user = Uuid::new_v4();

  // 200 and 155 days ago, then one today. The first two were forgiven when
  // their window closed 95 days ago; today's violation starts a fresh
  // window projected to close 60 days from now.
  svc.record_manual(manual(user, 200, ViolationType::Tardy)).await.unwrap();
  svc.record_manual(manual(user, 155, ViolationType::Tardy)).await.unwrap();
  let latest = svc.record_manual(manual(user, 0, ViolationType::Tardy)).await.unwrap();

  let view = svc.ledger_view(user).await.unwrap();
  assert_eq!(view.expired.len(), 2);
  for p in &view.expired {
    assert_eq!(p.behavioral_applied_at, Some(days_ago(95)));
  }

  assert_eq!(view.active.len(), 1);
  let active = &view.active[0];
  assert_eq!(active.point_id, latest.point_id);
  assert_eq!(
    active.projected_behavioral_date,
    Some(today() + Days::new(60))
  );
  assert!(active.behavioral_applied_at.is_none());
}

#[tokio::test]
async fn recompute_is_idempotent() {
  let svc = service().await;
  let user = Uuid::new_v4();

  svc.record_manual(manual(user, 200, ViolationType::Tardy)).await.unwrap();
  svc.record_manual(manual(user, 155, ViolationType::Undertime)).await.unwrap();
  svc.record_manual(manual(user, 0, ViolationType::Tardy)).await.unwrap();

  svc.recompute_user(user).await.unwrap();
  let first = svc.points_for_user(user).await.unwrap();
  svc.recompute_user(user).await.unwrap();
  let second = svc.points_for_user(user).await.unwrap();

  // Batch ids are reassigned per recompute; everything else must match.
  let decay_state = |points: &[Point]| {
    let mut rows: Vec<_> = points
      .iter()
      .map(|p| {
        (
          p.point_id,
          p.is_expired,
          p.expiration_kind,
          p.behavioral_applied_at,
          p.projected_behavioral_date,
        )
      })
      .collect();
    rows.sort_by_key(|r| r.0);
    rows
  };
  assert_eq!(decay_state(&first), decay_state(&second));
}

#[tokio::test]
async fn excused_point_resets_clock_but_is_never_forgiven() {
  let svc = service().await;
  let user = Uuid::new_v4();

  let old = svc.record_manual(manual(user, 200, ViolationType::Tardy)).await.unwrap();
  let recent = svc.record_manual(manual(user, 150, ViolationType::Tardy)).await.unwrap();

  let excused = svc
    .excuse(recent.point_id, Some("jury duty".into()), Some("hr".into()))
    .await
    .unwrap();
  assert!(excused.is_excused);
  assert_eq!(excused.excuse_reason.as_deref(), Some("jury duty"));
  assert!(!excused.is_expired);

  // The clean window still runs from the excused violation's date, so the
  // older point was forgiven 90 days ago — alone.
  let view = svc.ledger_view(user).await.unwrap();
  assert_eq!(view.expired.len(), 1);
  assert_eq!(view.expired[0].point_id, old.point_id);
  assert_eq!(view.expired[0].behavioral_applied_at, Some(days_ago(90)));
  assert_eq!(view.excused.len(), 1);
}

#[tokio::test]
async fn unexcusing_restores_the_point_and_recomputes() {
  let svc = service().await;
  let user = Uuid::new_v4();

  let point = svc.record_manual(manual(user, 10, ViolationType::Tardy)).await.unwrap();
  svc.excuse(point.point_id, None, None).await.unwrap();
  let restored = svc.unexcuse(point.point_id).await.unwrap();

  assert!(!restored.is_excused);
  assert!(restored.excuse_reason.is_none());
  // Active again, with a fresh projection.
  assert_eq!(
    restored.projected_behavioral_date,
    Some(days_ago(10) + Days::new(60))
  );
}

#[tokio::test]
async fn excuse_validation_errors() {
  let svc = service().await;
  let user = Uuid::new_v4();
  let point = svc.record_manual(manual(user, 3, ViolationType::Tardy)).await.unwrap();

  assert!(matches!(
    svc.excuse(Uuid::new_v4(), None, None).await,
    Err(Error::Core(tally_core::Error::PointNotFound(_)))
  ));
  assert!(matches!(
    svc.unexcuse(point.point_id).await,
    Err(Error::Core(tally_core::Error::NotExcused(_)))
  ));

  svc.excuse(point.point_id, None, None).await.unwrap();
  assert!(matches!(
    svc.excuse(point.point_id, None, None).await,
    Err(Error::Core(tally_core::Error::AlreadyExcused(_)))
  ));
}

// ─── Manual entry ────────────────────────────────────────────────────────────

#[tokio::test]
async fn manual_entry_rejects_future_dates() {
  let svc = service().await;
  let cmd = ManualEntry {
    user_id:        Uuid::new_v4(),
    violation_date: today() + Days::new(1),
    violation_type: ViolationType::Tardy,
    is_advised:     false,
    note:           None,
  };
  assert!(matches!(
    svc.record_manual(cmd).await,
    Err(Error::Core(tally_core::Error::FutureViolationDate(_)))
  ));
}

#[tokio::test]
async fn manual_entry_replaces_points_on_the_same_date() {
  let svc = service().await;
  let user = Uuid::new_v4();

  svc.record_manual(manual(user, 5, ViolationType::Tardy)).await.unwrap();
  let replacement = svc
    .record_manual(manual(user, 5, ViolationType::HalfDayAbsence))
    .await
    .unwrap();

  let points = svc.points_for_user(user).await.unwrap();
  assert_eq!(points.len(), 1);
  assert_eq!(points[0].point_id, replacement.point_id);
  assert_eq!(points[0].violation_type, ViolationType::HalfDayAbsence);
  assert_eq!(points[0].point_value, dec!(0.50));
}

#[tokio::test]
async fn delete_manual_refuses_derived_points() {
  let svc = service().await;
  let user = Uuid::new_v4();

  let (_, derived) = svc
    .record_attendance(NewAttendanceEvent {
      user_id:        user,
      violation_date: days_ago(4),
      is_absent:      false,
      minutes_late:   10,
      minutes_early:  0,
      is_advised:     false,
      admin_verified: true,
    })
    .await
    .unwrap();
  let derived = derived.unwrap();

  assert!(matches!(
    svc.delete_manual(derived.point_id).await,
    Err(Error::Core(tally_core::Error::NotManual(_)))
  ));

  let entered = svc.record_manual(manual(user, 8, ViolationType::Undertime)).await.unwrap();
  svc.delete_manual(entered.point_id).await.unwrap();
  assert!(svc.get_point(entered.point_id).await.unwrap().is_none());
}

// ─── Attendance intake and derivation ────────────────────────────────────────

#[tokio::test]
async fn verified_attendance_derives_a_linked_point() {
  let svc = service().await;
  let user = Uuid::new_v4();

  let (event, point) = svc
    .record_attendance(NewAttendanceEvent {
      user_id:        user,
      violation_date: days_ago(2),
      is_absent:      false,
      minutes_late:   0,
      minutes_early:  75,
      is_advised:     false,
      admin_verified: true,
    })
    .await
    .unwrap();

  let point = point.unwrap();
  assert_eq!(point.source_attendance_id, Some(event.attendance_id));
  assert_eq!(point.violation_type, ViolationType::UndertimeExtended);
  assert!(!point.is_manual);
}

#[tokio::test]
async fn unverified_attendance_derives_nothing() {
  let svc = service().await;

  let (_, point) = svc
    .record_attendance(NewAttendanceEvent {
      user_id:        Uuid::new_v4(),
      violation_date: days_ago(2),
      is_absent:      true,
      minutes_late:   0,
      minutes_early:  0,
      is_advised:     false,
      admin_verified: false,
    })
    .await
    .unwrap();
  assert!(point.is_none());
}

#[tokio::test]
async fn duplicate_derivation_is_skipped() {
  let svc = service().await;
  let user = Uuid::new_v4();

  let event = |minutes_late| NewAttendanceEvent {
    user_id:        user,
    violation_date: days_ago(3),
    is_absent:      false,
    minutes_late,
    minutes_early:  0,
    is_advised:     false,
    admin_verified: true,
  };

  let (_, first) = svc.record_attendance(event(5)).await.unwrap();
  assert!(first.is_some());
  // Same user, date, and violation type from a second event: no new point.
  let (_, second) = svc.record_attendance(event(20)).await.unwrap();
  assert!(second.is_none());
  assert_eq!(svc.points_for_user(user).await.unwrap().len(), 1);
}

#[tokio::test]
async fn rederive_missing_restores_lost_points_once() {
  let svc = service().await;
  let user = Uuid::new_v4();

  let (event, point) = svc
    .record_attendance(NewAttendanceEvent {
      user_id:        user,
      violation_date: days_ago(6),
      is_absent:      true,
      minutes_late:   0,
      minutes_early:  0,
      is_advised:     true,
      admin_verified: true,
    })
    .await
    .unwrap();

  // Simulate a lost point through a direct store delete.
  svc.store().delete_point(point.unwrap().point_id).await.unwrap();
  assert!(svc.points_for_user(user).await.unwrap().is_empty());

  let report = svc.rederive_missing().await.unwrap();
  assert_eq!(report.created, 1);

  let points = svc.points_for_user(user).await.unwrap();
  assert_eq!(points.len(), 1);
  assert_eq!(points[0].source_attendance_id, Some(event.attendance_id));
  assert!(points[0].is_advised);

  let again = svc.rederive_missing().await.unwrap();
  assert_eq!(again.created, 0);
}

// ─── Fixed decay and maintenance ─────────────────────────────────────────────

#[tokio::test]
async fn sweep_expires_due_points_and_leaves_the_rest() {
  let svc = service().await;
  let user = Uuid::new_v4();

  // An unadvised full absence 400 days ago: behavioral decay never touches
  // it, and its 12-month fixed expiry has passed.
  let absence = svc
    .record_manual(manual(user, 400, ViolationType::FullAbsence))
    .await
    .unwrap();
  let tardy = svc.record_manual(manual(user, 10, ViolationType::Tardy)).await.unwrap();

  // Before the sweep the absence is still active and was never projected.
  let before = svc.get_point(absence.point_id).await.unwrap().unwrap();
  assert!(before.is_active());
  assert!(!before.behavioral_eligible);
  assert!(before.projected_behavioral_date.is_none());
  assert!(before.behavioral_applied_at.is_none());

  let report = svc.run_sweep(today()).await.unwrap();
  assert_eq!(report.points_expired, 1);
  assert_eq!(report.failures, 0);

  let after = svc.get_point(absence.point_id).await.unwrap().unwrap();
  assert!(after.is_expired);
  assert_eq!(after.expiration_kind, ExpirationKind::Fixed);

  let tardy = svc.get_point(tardy.point_id).await.unwrap().unwrap();
  assert!(tardy.is_active());

  // Running again changes nothing.
  let repeat = svc.run_sweep(today()).await.unwrap();
  assert_eq!(repeat.points_expired, 0);
}

#[tokio::test]
async fn dedup_prefers_the_excused_point() {
  let svc = service().await;
  let user = Uuid::new_v4();
  let date = days_ago(20);

  // Duplicates injected behind the service's back.
  let build = || {
    tally_core::point::NewPoint::build(
      user,
      date,
      ViolationType::Tardy,
      false,
      true,
      None,
      None,
    )
    .unwrap()
  };
  let plain = svc.store().insert_point(build()).await.unwrap();
  let excused = svc.store().insert_point(build()).await.unwrap();
  svc
    .store()
    .set_excused(excused.point_id, true, Some("approved leave".into()), None)
    .await
    .unwrap();
  // A different type on the same date is not a duplicate.
  let other = svc
    .store()
    .insert_point(
      tally_core::point::NewPoint::build(
        user,
        date,
        ViolationType::Undertime,
        false,
        true,
        None,
        None,
      )
      .unwrap(),
    )
    .await
    .unwrap();

  let report = svc.remove_duplicates().await.unwrap();
  assert_eq!(report.removed, 1);
  assert_eq!(report.users_affected, 1);

  let remaining = svc.points_for_user(user).await.unwrap();
  assert_eq!(remaining.len(), 2);
  assert!(remaining.iter().any(|p| p.point_id == excused.point_id));
  assert!(remaining.iter().any(|p| p.point_id == other.point_id));
  assert!(!remaining.iter().any(|p| p.point_id == plain.point_id));
}

// ─── Views, export, notifications ────────────────────────────────────────────

#[tokio::test]
async fn ledger_view_flags_users_at_the_threshold() {
  let svc = service().await;
  let user = Uuid::new_v4();

  for ago in 0..6 {
    svc
      .record_manual(manual(user, ago, ViolationType::FullAbsence))
      .await
      .unwrap();
  }

  let view = svc.ledger_view(user).await.unwrap();
  assert_eq!(view.active_total, dec!(6.00));
  assert!(view.over_threshold);
}

#[tokio::test]
async fn export_covers_all_users_in_order() {
  let svc = service().await;
  let user_a = Uuid::new_v4();
  let user_b = Uuid::new_v4();

  svc.record_manual(manual(user_a, 1, ViolationType::Tardy)).await.unwrap();
  svc.record_manual(manual(user_b, 2, ViolationType::Undertime)).await.unwrap();
  svc.record_manual(manual(user_a, 3, ViolationType::HalfDayAbsence)).await.unwrap();

  let rows = svc.export_rows().await.unwrap();
  assert_eq!(rows.len(), 3);
  let mut sorted = rows.clone();
  sorted.sort_by_key(|p| (p.user_id, p.violation_date, p.point_id));
  assert_eq!(
    rows.iter().map(|p| p.point_id).collect::<Vec<_>>(),
    sorted.iter().map(|p| p.point_id).collect::<Vec<_>>()
  );
}

#[tokio::test]
async fn notifier_fires_on_creation_only() {
  let notifier = CountingNotifier::default();
  let svc = LedgerService::new(
    SqliteStore::open_in_memory().await.unwrap(),
    notifier.clone(),
  );
  let user = Uuid::new_v4();

  let point = svc.record_manual(manual(user, 9, ViolationType::Tardy)).await.unwrap();
  assert_eq!(notifier.created.load(Ordering::SeqCst), 1);

  svc.excuse(point.point_id, None, None).await.unwrap();
  svc.recompute_user(user).await.unwrap();
  assert_eq!(notifier.created.load(Ordering::SeqCst), 1);
}
