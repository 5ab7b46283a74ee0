//! Core types and trait definitions for the tally point ledger.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.
//! The two decay computations live here as pure functions so they can be
//! unit-tested without a store.

pub mod attendance;
pub mod error;
pub mod point;
pub mod replay;
pub mod store;
pub mod view;
pub mod violation;

pub use error::{Error, Result};
