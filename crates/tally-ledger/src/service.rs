//! The ledger service.
//!
//! Every mutation follows the same shape: take the user's keyed lock, flush
//! any queued recompute for that user, mutate points through the store, then
//! run the cascade recompute. A recompute failure never fails the mutation
//! that triggered it; the user id is queued and retried before the next
//! mutation or authoritative read.

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use tally_core::{
  attendance::{AttendanceEvent, NewAttendanceEvent},
  point::{ExpirationKind, NewPoint, Point},
  replay::{replay_behavior, BehaviorSnapshot},
  store::{PointStore, ReplayWrite},
  view::LedgerView,
  violation::ViolationType,
};

use crate::{
  error::{Error, Result},
  locks::UserLocks,
  notify::Notifier,
};

// ─── Commands ────────────────────────────────────────────────────────────────

/// A manual point entry from an administrator.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualEntry {
  pub user_id:        Uuid,
  pub violation_date: NaiveDate,
  pub violation_type: ViolationType,
  #[serde(default)]
  pub is_advised:     bool,
  #[serde(default)]
  pub note:           Option<String>,
}

// ─── Service ─────────────────────────────────────────────────────────────────

pub struct LedgerService<S, N> {
  store:    S,
  notifier: N,
  locks:    UserLocks,
  /// Users whose last cascade recompute failed, awaiting retry.
  pending:  Mutex<HashSet<Uuid>>,
}

impl<S, N> LedgerService<S, N>
where
  S: PointStore,
  N: Notifier,
{
  pub fn new(store: S, notifier: N) -> Self {
    Self {
      store,
      notifier,
      locks: UserLocks::new(),
      pending: Mutex::new(HashSet::new()),
    }
  }

  pub(crate) fn store(&self) -> &S { &self.store }

  pub(crate) fn notifier(&self) -> &N { &self.notifier }

  pub(crate) async fn lock_user(
    &self,
    user_id: Uuid,
  ) -> tokio::sync::OwnedMutexGuard<()> {
    self.locks.acquire(user_id).await
  }

  fn today() -> NaiveDate { Utc::now().date_naive() }

  // ── Attendance intake ────────────────────────────────────────────────

  /// Record a finalized attendance event and, when it is admin-verified and
  /// implies a violation, derive the point for it.
  pub async fn record_attendance(
    &self,
    input: NewAttendanceEvent,
  ) -> Result<(AttendanceEvent, Option<Point>)> {
    let user_id = input.user_id;
    let _guard = self.lock_user(user_id).await;
    self.retry_pending(user_id).await;

    let event = self.store.record_attendance(input).await.map_err(Error::store)?;

    let point = if event.admin_verified {
      self.derive_point(&event).await?
    } else {
      None
    };

    if let Some(ref point) = point {
      self.cascade_or_queue(user_id).await;
      self.notifier.point_created(point).await;
    }

    Ok((event, point))
  }

  /// Derivation for one verified event. Skips silently when the event
  /// implies no violation, or when a point for this event or for the same
  /// `(user, date, type)` already exists.
  pub(crate) async fn derive_point(
    &self,
    event: &AttendanceEvent,
  ) -> Result<Option<Point>> {
    let Some((violation_type, is_advised)) = event.violation() else {
      return Ok(None);
    };

    if self
      .store
      .point_for_attendance(event.attendance_id)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Ok(None);
    }
    if self
      .store
      .find_point(event.user_id, event.violation_date, violation_type)
      .await
      .map_err(Error::store)?
      .is_some()
    {
      return Ok(None);
    }

    let input = NewPoint::build(
      event.user_id,
      event.violation_date,
      violation_type,
      is_advised,
      false,
      Some(event.attendance_id),
      None,
    )?;
    let point = self.store.insert_point(input).await.map_err(Error::store)?;
    Ok(Some(point))
  }

  // ── Manual entry ─────────────────────────────────────────────────────

  /// Record an administrator-entered point. Any points the user already
  /// holds on that date are replaced.
  pub async fn record_manual(&self, cmd: ManualEntry) -> Result<Point> {
    let today = Self::today();
    if cmd.violation_date > today {
      return Err(tally_core::Error::FutureViolationDate(cmd.violation_date).into());
    }

    let _guard = self.lock_user(cmd.user_id).await;
    self.retry_pending(cmd.user_id).await;

    let replaced = self
      .store
      .delete_points_on_date(cmd.user_id, cmd.violation_date)
      .await
      .map_err(Error::store)?;
    if replaced > 0 {
      tracing::info!(
        user_id = %cmd.user_id,
        violation_date = %cmd.violation_date,
        replaced,
        "manual entry replaced existing points on date"
      );
    }

    let input = NewPoint::build(
      cmd.user_id,
      cmd.violation_date,
      cmd.violation_type,
      cmd.is_advised,
      true,
      None,
      cmd.note,
    )?;
    let point = self.store.insert_point(input).await.map_err(Error::store)?;

    self.cascade_or_queue(cmd.user_id).await;
    self.notifier.point_created(&point).await;

    Ok(point)
  }

  // ── Excusal ──────────────────────────────────────────────────────────

  pub async fn excuse(
    &self,
    point_id: Uuid,
    reason: Option<String>,
    excused_by: Option<String>,
  ) -> Result<Point> {
    let point = self.require_point(point_id).await?;
    if point.is_excused {
      return Err(tally_core::Error::AlreadyExcused(point_id).into());
    }

    let _guard = self.lock_user(point.user_id).await;
    self.retry_pending(point.user_id).await;

    self
      .store
      .set_excused(point_id, true, reason, excused_by)
      .await
      .map_err(Error::store)?;
    self.cascade_or_queue(point.user_id).await;

    self.require_point(point_id).await
  }

  pub async fn unexcuse(&self, point_id: Uuid) -> Result<Point> {
    let point = self.require_point(point_id).await?;
    if !point.is_excused {
      return Err(tally_core::Error::NotExcused(point_id).into());
    }

    let _guard = self.lock_user(point.user_id).await;
    self.retry_pending(point.user_id).await;

    self
      .store
      .set_excused(point_id, false, None, None)
      .await
      .map_err(Error::store)?;
    self.cascade_or_queue(point.user_id).await;

    self.require_point(point_id).await
  }

  // ── Deletion ─────────────────────────────────────────────────────────

  /// Hard-delete a manual point. Derived points are corrected through their
  /// attendance event, never deleted here.
  pub async fn delete_manual(&self, point_id: Uuid) -> Result<()> {
    let point = self.require_point(point_id).await?;
    if !point.is_manual {
      return Err(tally_core::Error::NotManual(point_id).into());
    }

    let _guard = self.lock_user(point.user_id).await;
    self.retry_pending(point.user_id).await;

    self.store.delete_point(point_id).await.map_err(Error::store)?;
    self.cascade_or_queue(point.user_id).await;

    Ok(())
  }

  // ── Reads ────────────────────────────────────────────────────────────

  pub async fn get_point(&self, point_id: Uuid) -> Result<Option<Point>> {
    self.store.get_point(point_id).await.map_err(Error::store)
  }

  pub async fn points_for_user(&self, user_id: Uuid) -> Result<Vec<Point>> {
    self.store.points_for_user(user_id).await.map_err(Error::store)
  }

  /// The authoritative per-user ledger: any queued recompute is flushed
  /// first so the caller never sees decay state known to be stale.
  pub async fn ledger_view(&self, user_id: Uuid) -> Result<LedgerView> {
    let _guard = self.lock_user(user_id).await;
    self.retry_pending(user_id).await;

    let points = self.store.points_for_user(user_id).await.map_err(Error::store)?;
    Ok(LedgerView::assemble(user_id, points))
  }

  /// Flat rows of every point for all users, for external tabulation.
  pub async fn export_rows(&self) -> Result<Vec<Point>> {
    let mut points = self.store.all_points().await.map_err(Error::store)?;
    points.sort_by_key(|p| (p.user_id, p.violation_date, p.point_id));
    Ok(points)
  }

  // ── Cascade recompute ────────────────────────────────────────────────

  /// Explicit cascade trigger. Unlike the implicit post-mutation recompute
  /// this propagates failure to the caller.
  pub async fn recompute_user(&self, user_id: Uuid) -> Result<()> {
    let _guard = self.lock_user(user_id).await;
    let result = self.cascade(user_id).await;
    if result.is_ok() {
      self.pending.lock().await.remove(&user_id);
    }
    result
  }

  /// Rebuild one user's behavioral decay state from scratch: snapshot the
  /// eligible points, replay, and apply the outcome as one store
  /// transaction. Caller must hold the user's lock.
  pub(crate) async fn cascade(&self, user_id: Uuid) -> Result<()> {
    let points = self.store.points_for_user(user_id).await.map_err(Error::store)?;

    let snapshots: Vec<BehaviorSnapshot> = points
      .iter()
      .filter(|p| {
        p.behavioral_eligible
          && !(p.is_expired && p.expiration_kind == ExpirationKind::Fixed)
      })
      .map(|p| BehaviorSnapshot {
        point_id:       p.point_id,
        violation_date: p.violation_date,
        is_excused:     p.is_excused,
      })
      .collect();

    let outcome = replay_behavior(&snapshots, Self::today());
    let write = ReplayWrite::from_outcome(outcome);
    self.store.apply_replay(user_id, write).await.map_err(Error::store)
  }

  /// Post-mutation recompute: on failure, log and queue the user for retry
  /// rather than failing the mutation that already committed.
  pub(crate) async fn cascade_or_queue(&self, user_id: Uuid) {
    if let Err(error) = self.cascade(user_id).await {
      tracing::warn!(%user_id, %error, "cascade recompute failed, queued for retry");
      self.pending.lock().await.insert(user_id);
    }
  }

  /// Flush a queued recompute for `user_id` if one exists. Caller must hold
  /// the user's lock. A retry that fails again stays queued.
  pub(crate) async fn retry_pending(&self, user_id: Uuid) {
    if !self.pending.lock().await.remove(&user_id) {
      return;
    }
    match self.cascade(user_id).await {
      Ok(()) => {
        tracing::info!(%user_id, "queued cascade recompute succeeded on retry")
      }
      Err(error) => {
        tracing::warn!(%user_id, %error, "queued cascade recompute failed again");
        self.pending.lock().await.insert(user_id);
      }
    }
  }

  async fn require_point(&self, point_id: Uuid) -> Result<Point> {
    self
      .store
      .get_point(point_id)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| tally_core::Error::PointNotFound(point_id).into())
  }
}
