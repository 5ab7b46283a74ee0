//! The `PointStore` trait and the replay write-set.
//!
//! The trait is implemented by storage backends (e.g. `tally-store-sqlite`).
//! Higher layers (`tally-ledger`, `tally-api`) depend on this abstraction,
//! not on any concrete backend.

use std::future::Future;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
  attendance::{AttendanceEvent, NewAttendanceEvent},
  point::{NewPoint, Point},
  replay::ReplayOutcome,
  violation::ViolationType,
};

// ─── Replay write-set ────────────────────────────────────────────────────────

/// One forgiveness event as persisted: the pair shares `batch_id`.
#[derive(Debug, Clone)]
pub struct AppliedBatch {
  pub batch_id:   Uuid,
  pub applied_on: NaiveDate,
  pub point_ids:  Vec<Uuid>,
}

/// Everything a cascade recompute writes for one user, applied atomically:
/// reset all behavioral decay state, re-apply `forgiven`, then set the new
/// projections. A store must never apply this partially.
#[derive(Debug, Clone, Default)]
pub struct ReplayWrite {
  pub forgiven:    Vec<AppliedBatch>,
  pub projections: Vec<(Uuid, NaiveDate)>,
}

impl ReplayWrite {
  /// Assign a fresh batch id to each forgiveness event of `outcome`.
  pub fn from_outcome(outcome: ReplayOutcome) -> Self {
    let forgiven = outcome
      .batches
      .into_iter()
      .map(|b| AppliedBatch {
        batch_id:   Uuid::new_v4(),
        applied_on: b.applied_on,
        point_ids:  b.point_ids,
      })
      .collect();

    let projections = match outcome.projection_date {
      Some(date) => outcome
        .projected_point_ids
        .into_iter()
        .map(|id| (id, date))
        .collect(),
      None => Vec::new(),
    };

    Self { forgiven, projections }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a tally ledger backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`). Per-user write
/// serialization is the caller's job; the store only guarantees that each
/// method, and in particular [`apply_replay`](PointStore::apply_replay), is
/// applied atomically.
pub trait PointStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Points ────────────────────────────────────────────────────────────

  /// Persist a new point. `point_id` and `created_at` are set by the store.
  fn insert_point(
    &self,
    input: NewPoint,
  ) -> impl Future<Output = Result<Point, Self::Error>> + Send + '_;

  /// Retrieve a point by id. Returns `None` if not found.
  fn get_point(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Point>, Self::Error>> + Send + '_;

  /// All points for one user, in no particular order.
  fn points_for_user(
    &self,
    user_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Point>, Self::Error>> + Send + '_;

  /// Every point in the ledger — the export feed and maintenance input.
  fn all_points(
    &self,
  ) -> impl Future<Output = Result<Vec<Point>, Self::Error>> + Send + '_;

  /// Every user id that owns at least one point.
  fn user_ids(
    &self,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// The kept point for `(user, violation_date, violation_type)`, if one
  /// exists. Used for duplicate prevention on derivation.
  fn find_point(
    &self,
    user_id: Uuid,
    violation_date: NaiveDate,
    violation_type: ViolationType,
  ) -> impl Future<Output = Result<Option<Point>, Self::Error>> + Send + '_;

  /// The point derived from a given attendance event, if any survives.
  fn point_for_attendance(
    &self,
    attendance_id: Uuid,
  ) -> impl Future<Output = Result<Option<Point>, Self::Error>> + Send + '_;

  /// Hard-delete a point. Returns `false` if it did not exist.
  fn delete_point(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Hard-delete every point a user holds on one date; the manual-entry
  /// duplicate-prevention rule. Returns the number removed.
  fn delete_points_on_date(
    &self,
    user_id: Uuid,
    violation_date: NaiveDate,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Decay writes ──────────────────────────────────────────────────────

  /// Set or clear the excusal fields on a point and return it updated.
  fn set_excused(
    &self,
    id: Uuid,
    excused: bool,
    reason: Option<String>,
    excused_by: Option<String>,
  ) -> impl Future<Output = Result<Point, Self::Error>> + Send + '_;

  /// Fixed (SRO) decay for one user: mark every active, non-excused point
  /// with `expires_at <= today` as expired. Returns the points that
  /// changed; already-expired points are untouched (idempotent).
  fn expire_fixed_for_user(
    &self,
    user_id: Uuid,
    today: NaiveDate,
  ) -> impl Future<Output = Result<Vec<Point>, Self::Error>> + Send + '_;

  /// Users holding a stale behavioral projection (`projected_behavioral_date
  /// <= today`) — their windows closed by the passage of time and a sweep
  /// must recompute them.
  fn users_with_due_projection(
    &self,
    today: NaiveDate,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  /// Atomically reset one user's behavioral decay state (revert forgiven
  /// points to active, clear all projections) and apply `write`.
  fn apply_replay(
    &self,
    user_id: Uuid,
    write: ReplayWrite,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Attendance events ─────────────────────────────────────────────────

  /// Persist a finalized attendance event. `attendance_id` and
  /// `recorded_at` are set by the store.
  fn record_attendance(
    &self,
    input: NewAttendanceEvent,
  ) -> impl Future<Output = Result<AttendanceEvent, Self::Error>> + Send + '_;

  /// Retrieve an attendance event by id.
  fn get_attendance(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<AttendanceEvent>, Self::Error>> + Send + '_;

  /// Admin-verified events with no surviving derived point — the
  /// re-derivation work list.
  fn verified_events_without_points(
    &self,
  ) -> impl Future<Output = Result<Vec<AttendanceEvent>, Self::Error>> + Send + '_;
}
