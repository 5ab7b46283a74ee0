//! The behavioral-decay (GBRO) replay simulator.
//!
//! Models the two-strikes-then-forgiven policy: 60 consecutive days with no
//! new eligible violation forgive the two most-recent eligible active points
//! at the 60-day mark, and the clock restarts from the forgiveness date.
//!
//! The simulator is a pure function over an ordered snapshot of one user's
//! points. No per-user counter is ever stored; the reference date is
//! re-derived from the data itself on every run, so edits and deletions to
//! historical points can never leave the ledger inconsistent. Callers reset
//! previously-forgiven points before building the snapshot and apply the
//! outcome in a single transactional write.

use chrono::{Days, NaiveDate};
use uuid::Uuid;

/// Days of clean conduct required before a forgiveness fires.
pub const CLEAN_WINDOW_DAYS: u64 = 60;

/// A forgiveness event never removes more than this many points.
pub const FORGIVENESS_PER_CYCLE: usize = 2;

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// One behavioral-eligible, non-fixed-expired point, as the simulator sees
/// it. Excused points are included: their dates still reset the clean-streak
/// clock even though they are never forgiven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BehaviorSnapshot {
  pub point_id:       Uuid,
  pub violation_date: NaiveDate,
  pub is_excused:     bool,
}

// ─── Outputs ─────────────────────────────────────────────────────────────────

/// One historical forgiveness event: 1 or 2 non-excused points removed from
/// active status on `applied_on`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForgivenessBatch {
  pub applied_on: NaiveDate,
  /// Newest violation first; length 1..=FORGIVENESS_PER_CYCLE.
  pub point_ids:  Vec<Uuid>,
}

/// The full result of replaying one user's history up to `today`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
  /// Forgiveness events in chronological order.
  pub batches:             Vec<ForgivenessBatch>,
  /// Where the next clean window is measured from after the replay.
  pub reference_date:      Option<NaiveDate>,
  /// The first decay date that falls after `today` — display only.
  pub projection_date:     Option<NaiveDate>,
  /// The points (newest first, at most two) that would be forgiven on
  /// `projection_date`.
  pub projected_point_ids: Vec<Uuid>,
}

// ─── Simulator ───────────────────────────────────────────────────────────────

/// Replay a user's eligible point history chronologically, applying every
/// forgiveness that would have occurred up to and including `today`.
///
/// Anything that would be forgiven in the future is left active and
/// reported through `projection_date`/`projected_point_ids` instead.
pub fn replay_behavior(snapshots: &[BehaviorSnapshot], today: NaiveDate) -> ReplayOutcome {
  let mut points: Vec<BehaviorSnapshot> = snapshots.to_vec();
  // Equal dates tie-break on point id so the replay is deterministic.
  points.sort_by_key(|p| (p.violation_date, p.point_id));

  // Every date participates in reference computation — excused points and
  // points forgiven earlier in this same pass included.
  let dates: Vec<NaiveDate> = points.iter().map(|p| p.violation_date).collect();

  let mut forgiven: Vec<bool> = vec![false; points.len()];
  let mut reference: Option<NaiveDate> = None;
  let mut batches: Vec<ForgivenessBatch> = Vec::new();
  let mut projection: Option<NaiveDate> = None;

  loop {
    let any_active = points
      .iter()
      .enumerate()
      .any(|(i, p)| !p.is_excused && !forgiven[i]);
    if !any_active {
      // Nothing left to forgive or project.
      break;
    }

    let Some(candidate) = next_decay_date(&dates, reference) else {
      break;
    };

    if candidate > today {
      projection = Some(candidate);
      break;
    }

    // Forgive the up-to-two most recent non-excused active points that fall
    // strictly before the decay date.
    let mut chosen: Vec<Uuid> = Vec::new();
    for (i, p) in points.iter().enumerate().rev() {
      if chosen.len() == FORGIVENESS_PER_CYCLE {
        break;
      }
      if !p.is_excused && !forgiven[i] && p.violation_date < candidate {
        forgiven[i] = true;
        chosen.push(p.point_id);
      }
    }

    if !chosen.is_empty() {
      batches.push(ForgivenessBatch { applied_on: candidate, point_ids: chosen });
    }
    // An empty window still advances the clock: points on or after the
    // decay date belong to later windows.
    reference = Some(candidate);
  }

  let projected_point_ids = if projection.is_some() {
    points
      .iter()
      .enumerate()
      .rev()
      .filter(|(i, p)| !p.is_excused && !forgiven[*i])
      .take(FORGIVENESS_PER_CYCLE)
      .map(|(_, p)| p.point_id)
      .collect()
  } else {
    Vec::new()
  };

  ReplayOutcome {
    batches,
    reference_date: reference,
    projection_date: projection,
    projected_point_ids,
  }
}

/// Compute the next decay date, unclamped (it may lie after today).
///
/// First run: the first internal gap exceeding the clean window between
/// consecutive eligible dates sets the candidate; with no such gap the
/// window is measured from the newest violation. Subsequent runs: the
/// scheduled date is `reference + window`, unless an eligible violation
/// strictly inside the window broke the streak, in which case a fresh
/// window is measured from the newest violation date.
fn next_decay_date(dates: &[NaiveDate], reference: Option<NaiveDate>) -> Option<NaiveDate> {
  let window = Days::new(CLEAN_WINDOW_DAYS);
  let newest = *dates.last()?;

  match reference {
    None => {
      for pair in dates.windows(2) {
        let gap = pair[1].signed_duration_since(pair[0]).num_days();
        if gap > CLEAN_WINDOW_DAYS as i64 {
          return pair[0].checked_add_days(window);
        }
      }
      newest.checked_add_days(window)
    }
    Some(r) => {
      let scheduled = r.checked_add_days(window)?;
      let broken = dates.iter().any(|d| r < *d && *d < scheduled);
      if broken {
        newest.checked_add_days(window)
      } else {
        Some(scheduled)
      }
    }
  }
}
