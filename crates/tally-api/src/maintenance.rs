//! Handlers for `/maintenance` endpoints. All three are idempotent and
//! return a small JSON report.

use std::sync::Arc;

use axum::{Json, extract::State};
use chrono::Utc;
use tally_core::store::PointStore;
use tally_ledger::{
  DedupReport, LedgerService, Notifier, RederiveReport, SweepReport,
};

use crate::error::ApiError;

/// `POST /maintenance/sweep` — fixed decay for every user as of today.
pub async fn sweep<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
) -> Result<Json<SweepReport>, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let report = service.run_sweep(Utc::now().date_naive()).await?;
  Ok(Json(report))
}

/// `POST /maintenance/dedup`
pub async fn dedup<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
) -> Result<Json<DedupReport>, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let report = service.remove_duplicates().await?;
  Ok(Json(report))
}

/// `POST /maintenance/rederive`
pub async fn rederive<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
) -> Result<Json<RederiveReport>, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let report = service.rederive_missing().await?;
  Ok(Json(report))
}
