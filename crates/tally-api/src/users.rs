//! Handlers for `/users` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/users/:id/ledger` | Partitioned view with active total and threshold flag |
//! | `POST` | `/users/:id/recompute` | Explicit cascade recompute |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use tally_core::{store::PointStore, view::LedgerView};
use tally_ledger::{LedgerService, Notifier};
use uuid::Uuid;

use crate::error::ApiError;

/// `GET /users/:id/ledger`
pub async fn ledger<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
  Path(id): Path<Uuid>,
) -> Result<Json<LedgerView>, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let view = service.ledger_view(id).await?;
  Ok(Json(view))
}

/// `POST /users/:id/recompute` — unlike the implicit post-mutation
/// recompute, failure here is reported to the caller.
pub async fn recompute<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
  Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  service.recompute_user(id).await?;
  Ok(StatusCode::NO_CONTENT)
}
