//! Ledger maintenance: the fixed-decay sweep, duplicate removal, and
//! re-derivation of points lost to deletion.
//!
//! All three iterate users and take each user's keyed lock in turn, so a
//! maintenance run never holds a global lock and never races a concurrent
//! mutation for the same user. A failure on one user is logged and skipped;
//! the run continues with the rest.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::Serialize;
use uuid::Uuid;

use tally_core::{attendance::AttendanceEvent, point::Point, store::PointStore};

use crate::{
  error::{Error, Result},
  notify::Notifier,
  service::LedgerService,
};

// ─── Reports ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepReport {
  pub users_swept:    usize,
  pub points_expired: usize,
  pub recomputed:     usize,
  pub failures:       usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DedupReport {
  pub removed:        usize,
  pub users_affected: usize,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RederiveReport {
  pub created: usize,
}

// ─── Operations ──────────────────────────────────────────────────────────────

impl<S, N> LedgerService<S, N>
where
  S: PointStore,
  N: Notifier,
{
  /// Fixed decay for everyone: expire every active, non-excused point whose
  /// `expires_at` has passed, then cascade-recompute each user whose state
  /// changed — including users whose behavioral projection came due purely
  /// by the passage of time.
  pub async fn run_sweep(&self, today: NaiveDate) -> Result<SweepReport> {
    let users = self.store().user_ids().await.map_err(Error::store)?;
    let due: HashSet<Uuid> = self
      .store()
      .users_with_due_projection(today)
      .await
      .map_err(Error::store)?
      .into_iter()
      .collect();

    let mut report = SweepReport::default();
    for user_id in users {
      let _guard = self.lock_user(user_id).await;
      self.retry_pending(user_id).await;
      report.users_swept += 1;

      let expired = match self.store().expire_fixed_for_user(user_id, today).await {
        Ok(expired) => expired,
        Err(error) => {
          tracing::warn!(%user_id, %error, "fixed decay failed for user, skipping");
          report.failures += 1;
          continue;
        }
      };
      report.points_expired += expired.len();

      if !expired.is_empty() || due.contains(&user_id) {
        self.cascade_or_queue(user_id).await;
        report.recomputed += 1;
      }
    }

    tracing::info!(
      users_swept = report.users_swept,
      points_expired = report.points_expired,
      recomputed = report.recomputed,
      failures = report.failures,
      "fixed decay sweep finished"
    );
    Ok(report)
  }

  /// Collapse points sharing `(user, violation_date, violation_type)` down
  /// to one. The keeper is an excused point if the group has one, otherwise
  /// the earliest-created; each affected user is recomputed.
  pub async fn remove_duplicates(&self) -> Result<DedupReport> {
    let all = self.store().all_points().await.map_err(Error::store)?;

    let mut by_user: BTreeMap<Uuid, Vec<Point>> = BTreeMap::new();
    for point in all {
      by_user.entry(point.user_id).or_default().push(point);
    }

    let mut report = DedupReport::default();
    for (user_id, points) in by_user {
      let mut groups: BTreeMap<(NaiveDate, &'static str), Vec<Point>> = BTreeMap::new();
      for point in points {
        groups
          .entry((point.violation_date, point.violation_type.discriminant()))
          .or_default()
          .push(point);
      }
      groups.retain(|_, group| group.len() > 1);
      if groups.is_empty() {
        continue;
      }

      let _guard = self.lock_user(user_id).await;
      self.retry_pending(user_id).await;

      let mut removed_here = 0;
      for (_, mut group) in groups {
        group.sort_by_key(|p| (!p.is_excused, p.created_at, p.point_id));
        // First entry is the keeper.
        for loser in &group[1..] {
          match self.store().delete_point(loser.point_id).await {
            Ok(true) => removed_here += 1,
            Ok(false) => {}
            Err(error) => {
              tracing::warn!(
                %user_id,
                point_id = %loser.point_id,
                %error,
                "failed to delete duplicate point, skipping"
              );
            }
          }
        }
      }

      if removed_here > 0 {
        report.removed += removed_here;
        report.users_affected += 1;
        self.cascade_or_queue(user_id).await;
      }
    }

    tracing::info!(
      removed = report.removed,
      users_affected = report.users_affected,
      "duplicate removal finished"
    );
    Ok(report)
  }

  /// Re-derive points for admin-verified attendance events whose derived
  /// point no longer exists. Safe to run repeatedly.
  pub async fn rederive_missing(&self) -> Result<RederiveReport> {
    let events = self
      .store()
      .verified_events_without_points()
      .await
      .map_err(Error::store)?;

    let mut by_user: BTreeMap<Uuid, Vec<AttendanceEvent>> = BTreeMap::new();
    for event in events {
      by_user.entry(event.user_id).or_default().push(event);
    }

    let mut report = RederiveReport::default();
    for (user_id, events) in by_user {
      let _guard = self.lock_user(user_id).await;
      self.retry_pending(user_id).await;

      let mut created_here = 0;
      for event in &events {
        match self.derive_point(event).await {
          Ok(Some(point)) => {
            created_here += 1;
            self.notifier().point_created(&point).await;
          }
          Ok(None) => {}
          Err(error) => {
            tracing::warn!(
              %user_id,
              attendance_id = %event.attendance_id,
              %error,
              "re-derivation failed for event, skipping"
            );
          }
        }
      }

      if created_here > 0 {
        report.created += created_here;
        self.cascade_or_queue(user_id).await;
      }
    }

    tracing::info!(created = report.created, "re-derivation finished");
    Ok(report)
  }
}
