//! JSON REST API for the tally ledger.
//!
//! Exposes an axum [`Router`] backed by a [`tally_ledger::LedgerService`]
//! over any [`tally_core::store::PointStore`]. Auth, TLS, and transport
//! concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", tally_api::api_router(service.clone()))
//! ```

pub mod attendance;
pub mod error;
pub mod export;
pub mod maintenance;
pub mod points;
pub mod users;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post},
};
use tally_core::store::PointStore;
use tally_ledger::{LedgerService, Notifier};

pub use error::ApiError;


/// Build a fully-materialised API router for `service`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, N>(service: Arc<LedgerService<S, N>>) -> Router<()>
where
  S: PointStore + 'static,
  N: Notifier + 'static,
{
  Router::new()
    // Attendance intake
    .route("/attendance", post(attendance::record::<S, N>))
    // Points
    .route("/points", get(points::list::<S, N>).post(points::create::<S, N>))
    .route("/points/{id}", delete(points::delete_one::<S, N>))
    .route("/points/{id}/excuse", post(points::excuse_one::<S, N>))
    .route("/points/{id}/unexcuse", post(points::unexcuse_one::<S, N>))
    // Users
    .route("/users/{id}/ledger", get(users::ledger::<S, N>))
    .route("/users/{id}/recompute", post(users::recompute::<S, N>))
    // Maintenance
    .route("/maintenance/sweep", post(maintenance::sweep::<S, N>))
    .route("/maintenance/dedup", post(maintenance::dedup::<S, N>))
    .route("/maintenance/rederive", post(maintenance::rederive::<S, N>))
    // Export
    .route("/export", get(export::handler::<S, N>))
    .with_state(service)
}
