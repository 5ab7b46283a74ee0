//! Handler for the `/attendance` intake endpoint.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/attendance` | Records the event; derives a point when it is admin-verified and implies a violation |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tally_core::{
  attendance::{AttendanceEvent, NewAttendanceEvent},
  point::Point,
  store::PointStore,
};
use tally_ledger::{LedgerService, Notifier};

use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct RecordedAttendance {
  pub event: AttendanceEvent,
  /// The derived point, when the event implied one.
  pub point: Option<Point>,
}

/// `POST /attendance` — body: a finalized attendance event.
pub async fn record<S, N>(
  State(service): State<Arc<LedgerService<S, N>>>,
  Json(body): Json<NewAttendanceEvent>,
) -> Result<impl IntoResponse, ApiError>
where
  S: PointStore,
  N: Notifier,
{
  let (event, point) = service.record_attendance(body).await?;
  Ok((StatusCode::CREATED, Json(RecordedAttendance { event, point })))
}
