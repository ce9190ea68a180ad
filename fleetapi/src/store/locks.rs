use std::sync::Arc;

use crate::domain::prelude::VehicleId;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Serializes work per vehicle while letting different vehicles proceed in
/// parallel. Entries are dropped once nobody holds or waits on them.
#[derive(Debug, Clone, Default)]
pub struct KeyLocker {
    locks: Arc<DashMap<VehicleId, Arc<Mutex<()>>>>,
}

impl KeyLocker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, key: VehicleId) -> KeyLockGuard {
        let lock = self.locks.entry(key).or_insert_with(|| Arc::new(Mutex::new(()))).clone();
        let guard = lock.lock_owned().await;
        KeyLockGuard {
            key,
            locks: Arc::clone(&self.locks),
            guard: Some(guard),
        }
    }

    /// Number of keys currently locked or contended.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

pub struct KeyLockGuard {
    key: VehicleId,
    locks: Arc<DashMap<VehicleId, Arc<Mutex<()>>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for KeyLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locker = KeyLocker::new();
        let key = Uuid::new_v4();

        let guard = locker.lock(key).await;
        let contender = {
            let locker = locker.clone();
            tokio::spawn(async move { locker.lock(key).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        let second = contender.await.unwrap();
        drop(second);
        assert!(locker.is_empty());
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locker = KeyLocker::new();
        let _a = locker.lock(Uuid::new_v4()).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locker.lock(Uuid::new_v4()))
            .await
            .expect("second key should lock immediately");
        assert_eq!(locker.len(), 2);
    }
}
