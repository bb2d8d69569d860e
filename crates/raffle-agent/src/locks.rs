// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user mutual exclusion for purchase-session transitions.
//!
//! The message handler, the expiry sweeper and the admin service all take the
//! lock of the affected user before reading or changing that user's session
//! or pending record.

use std::sync::Arc;

use dashmap::DashMap;
use raffle_core::types::UserId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Held while a transition for one user is in progress.
pub type UserGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for and takes the lock of `user`.
    pub async fn lock(&self, user: &UserId) -> UserGuard {
        // Clone the Arc out first so no map shard stays locked across the await.
        let mutex = self
            .locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drops locks nobody holds or waits for. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - self.locks.len()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_user_is_serialized() {
        let locks = Arc::new(UserLocks::new());
        let user = UserId::new("3001234567");

        let guard = locks.lock(&user).await;
        let contender = {
            let locks = Arc::clone(&locks);
            let user = user.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(&user).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());
        drop(guard);
        contender.await.unwrap();
    }

    #[tokio::test]
    async fn different_users_do_not_block() {
        let locks = UserLocks::new();
        let _a = locks.lock(&UserId::new("3001234567")).await;
        let b = tokio::time::timeout(
            Duration::from_millis(50),
            locks.lock(&UserId::new("3007654321")),
        )
        .await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn prune_keeps_held_locks() {
        let locks = UserLocks::new();
        let held = locks.lock(&UserId::new("3001234567")).await;
        drop(locks.lock(&UserId::new("3007654321")).await);

        assert_eq!(locks.prune(), 1);
        assert_eq!(locks.len(), 1);
        drop(held);
        assert_eq!(locks.prune(), 1);
        assert!(locks.is_empty());
    }
}
