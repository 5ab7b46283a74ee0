//! Error types for `tally-core`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("point not found: {0}")]
  PointNotFound(Uuid),

  #[error("attendance event not found: {0}")]
  AttendanceNotFound(Uuid),

  #[error("unknown violation type: {0:?}")]
  UnknownViolationType(String),

  #[error("violation date {0} is in the future")]
  FutureViolationDate(NaiveDate),

  #[error("point {0} was derived from attendance and cannot be deleted manually")]
  NotManual(Uuid),

  #[error("point {0} is already excused")]
  AlreadyExcused(Uuid),

  #[error("point {0} is not excused")]
  NotExcused(Uuid),

  #[error("fixed-decay date overflows the calendar for violation date {0}")]
  DateOverflow(NaiveDate),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
