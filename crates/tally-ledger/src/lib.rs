//! The tally service layer.
//!
//! Owns everything between the HTTP surface and the store: point
//! derivation, the cascade recompute orchestrator, the fixed-decay sweep,
//! ledger maintenance, per-user write serialization, and the notification
//! sink. All ledger mutations for one user are serialized through
//! [`locks::UserLocks`]; mutations for different users run in parallel.

pub mod error;
pub mod locks;
pub mod maintenance;
pub mod notify;
pub mod service;

pub use error::{Error, Result};
pub use maintenance::{DedupReport, RederiveReport, SweepReport};
pub use notify::{Notifier, TracingNotifier};
pub use service::{LedgerService, ManualEntry};

#[cfg(test)]
mod tests;
