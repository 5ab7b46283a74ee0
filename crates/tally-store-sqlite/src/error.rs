//! Error type for `tally-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] tally_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("decimal parse error: {0}")]
  DecimalParse(String),

  #[error("point not found: {0}")]
  PointNotFound(uuid::Uuid),

  #[error("attendance event not found: {0}")]
  AttendanceNotFound(uuid::Uuid),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
