//! The notification sink.
//!
//! Delivery is fire-and-forget: a sink failure must never roll back the
//! ledger mutation that produced the event, so implementations swallow and
//! log their own errors.

use std::future::Future;

use tally_core::point::Point;

/// Receives "point created" events keyed by user, type, date, and value.
pub trait Notifier: Send + Sync {
  fn point_created(&self, point: &Point) -> impl Future<Output = ()> + Send;
}

/// Default sink: structured log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
  async fn point_created(&self, point: &Point) {
    tracing::info!(
      user_id = %point.user_id,
      violation_type = point.violation_type.discriminant(),
      violation_date = %point.violation_date,
      point_value = %point.point_value,
      manual = point.is_manual,
      "point created"
    );
  }
}
