//! Per-user keyed locks.
//!
//! Single-writer-per-user: every "mutate points → cascade recompute"
//! sequence for one user must run as a unit, while different users proceed
//! in parallel. The map holds one `Arc<Mutex<()>>` per user id; entries are
//! bounded by the number of users ever touched and are never removed.

use std::{collections::HashMap, sync::Arc};

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Default)]
pub struct UserLocks {
  inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
  pub fn new() -> Self { Self::default() }

  /// Acquire the exclusive scope for `user_id`, waiting if another task
  /// holds it.
  pub async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
    let lock = {
      let mut map = self.inner.lock().await;
      map
        .entry(user_id)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
    };
    lock.lock_owned().await
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn same_user_is_serialized() {
    let locks = UserLocks::new();
    let user = Uuid::new_v4();

    let guard = locks.acquire(user).await;
    let second = tokio::time::timeout(Duration::from_millis(20), locks.acquire(user)).await;
    assert!(second.is_err(), "second acquire should wait");

    drop(guard);
    let third = tokio::time::timeout(Duration::from_millis(20), locks.acquire(user)).await;
    assert!(third.is_ok());
  }

  #[tokio::test]
  async fn different_users_are_independent() {
    let locks = UserLocks::new();

    let _a = locks.acquire(Uuid::new_v4()).await;
    let b = tokio::time::timeout(
      Duration::from_millis(20),
      locks.acquire(Uuid::new_v4()),
    )
    .await;
    assert!(b.is_ok());
  }
}
