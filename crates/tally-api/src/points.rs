//! Handlers for `/points` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`    | `/points?user_id=<uuid>` | All of one user's points |
//! | `POST`   | `/points` | Manual entry; replaces points on the same date |
//! | `DELETE` | `/points/:id` | Manual points only |
//! | `POST`   | `/points/:id/excuse` | Body: `{"reason": "...", "excused_by": "..."}` |
//! | `POST`   | `/points/:id/unexcuse` | |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use serde::Deserialize;
use tally_core::{point::Point, store::PointStore};
use tally_ledger::{LedgerService, ManualEntry, Notifier};
use uuid::Uuid;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub user_id: Uuid,
}

/// `GET /points?user_id=<uuid>`
pub async fn list<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Point>>, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let points = service.points_for_user(params.user_id).await?;
  Ok(Json(points))
}

// ─── Create (manual entry) ────────────────────────────────────────────────────

/// `POST /points` — body: a [`ManualEntry`].
pub async fn create<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
  Json(body): Json<ManualEntry>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let point = service.record_manual(body).await?;
  Ok((StatusCode::CREATED, Json(point)))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

/// `DELETE /points/:id` — manual points only; derived points are corrected
/// through their attendance event.
pub async fn delete_one<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  service.delete_manual(id).await?;
  Ok(StatusCode::NO_CONTENT)
}

// ─── Excusal ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ExcuseBody {
  pub reason:     Option<String>,
  pub excused_by: Option<String>,
}

/// `POST /points/:id/excuse`
pub async fn excuse_one<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ExcuseBody>,
) -> Result<Json<Point>, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let point = service.excuse(id, body.reason, body.excused_by).await?;
  Ok(Json(point))
}

/// `POST /points/:id/unexcuse`
pub async fn unexcuse_one<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Point>, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let point = service.unexcuse(id).await?;
  Ok(Json(point))
}
