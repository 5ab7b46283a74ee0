//! Handler for the `/export` feed.

use std::sync::Arc;

use axum::{Json, extract::State};
use tally_core::{point::Point, store::PointStore};
use tally_ledger::{LedgerService, Notifier};

use crate::error::ApiError;

/// `GET /export` — every point for every user as flat rows, ordered by
/// user, violation date, then point id. Intended for external tabulation.
pub async fn handler<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
) -> Result<Json<Vec<Point>>, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let rows = service.export_rows().await?;
  Ok(Json(rows))
}
