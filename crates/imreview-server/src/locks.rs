//! Per-manuscript mutual exclusion
//!
//! A review change and the recomputation it triggers must not interleave
//! with another change to the same manuscript. Each manuscript gets its own
//! async mutex; acquisition is bounded by a timeout so a stuck holder shows
//! up as `Conflict` instead of a hung request.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use imreview_core::{ConcurrencyConfig, ManuscriptId, ReviewError};

/// Registry entries are pruned once it grows past this size
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of per-manuscript locks
#[derive(Debug)]
pub struct ManuscriptLocks {
    locks: Mutex<HashMap<ManuscriptId, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
    retries: u32,
}

impl ManuscriptLocks {
    pub fn new(timeout: Duration, retries: u32) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
            retries,
        }
    }

    pub fn from_config(config: &ConcurrencyConfig) -> Self {
        Self::new(config.lock_timeout(), config.lock_retries)
    }

    /// Acquire the lock for `id`, retrying after a timeout
    pub async fn acquire(&self, id: ManuscriptId) -> Result<OwnedMutexGuard<()>, ReviewError> {
        let lock = self.entry(id)?;
        for attempt in 0..=self.retries {
            match tokio::time::timeout(self.timeout, lock.clone().lock_owned()).await {
                Ok(guard) => return Ok(guard),
                Err(_) => {
                    tracing::warn!(manuscript = %id, attempt, "manuscript lock timed out");
                }
            }
        }
        Err(ReviewError::Conflict(format!(
            "manuscript {} is busy, try again",
            id
        )))
    }

    fn entry(&self, id: ManuscriptId) -> Result<Arc<AsyncMutex<()>>, ReviewError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| ReviewError::Conflict("lock registry unavailable".to_string()))?;
        if locks.len() > PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        Ok(locks.entry(id).or_default().clone())
    }

    /// Number of tracked manuscripts
    pub fn len(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ManuscriptLocks {
    fn default() -> Self {
        Self::from_config(&ConcurrencyConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_manuscript_serialized() {
        let locks = ManuscriptLocks::new(Duration::from_millis(20), 1);
        let id = ManuscriptId::new();

        let held = locks.acquire(id).await.unwrap();
        let err = locks.acquire(id).await.unwrap_err();
        assert!(matches!(err, ReviewError::Conflict(_)));

        drop(held);
        assert!(locks.acquire(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_different_manuscripts_independent() {
        let locks = ManuscriptLocks::new(Duration::from_millis(20), 0);
        let _a = locks.acquire(ManuscriptId::new()).await.unwrap();
        let _b = locks.acquire(ManuscriptId::new()).await.unwrap();
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_after_release() {
        let locks = Arc::new(ManuscriptLocks::new(Duration::from_millis(500), 0));
        let id = ManuscriptId::new();
        let held = locks.acquire(id).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire(id).await.is_ok() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }
}
