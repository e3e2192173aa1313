use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{StoreError, SyncError};
use crate::store::{keys, Store};

static LEASE_SEQ: AtomicU64 = AtomicU64::new(0);

/// A held run lock. Expires on its own if the holder dies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunLease {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// At most one sync run at a time, enforced through a store entry
#[derive(Clone)]
pub struct RunLock {
    store: Store,
    ttl: Duration,
}

impl RunLock {
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Take the lock, or report who holds it. The check and the write are one
    /// store operation, so concurrent callers cannot both succeed.
    pub async fn acquire(&self) -> Result<RunLease, SyncError> {
        let now = Utc::now();
        let lease = RunLease {
            owner: format!("pid-{}-{}", std::process::id(), LEASE_SEQ.fetch_add(1, Ordering::SeqCst)),
            acquired_at: now,
            expires_at: now + chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::hours(1)),
        };

        if !self.store.set_if_absent(keys::RUN_LOCK, &lease, Some(self.ttl)).await? {
            let owner = self
                .holder()
                .await?
                .map(|holder| holder.owner)
                .unwrap_or_else(|| "an expired run".to_string());
            return Err(SyncError::RunInProgress { owner });
        }
        debug!("Run lock acquired by {}", lease.owner);
        Ok(lease)
    }

    /// Release a lease. A lock taken over by someone else is left alone.
    pub async fn release(&self, lease: &RunLease) -> Result<(), StoreError> {
        match self.holder().await? {
            Some(current) if current.owner == lease.owner => {
                self.store.delete(keys::RUN_LOCK).await?;
                debug!("Run lock released by {}", lease.owner);
            }
            Some(current) => warn!(
                "Run lock is held by {} instead of {}; leaving it",
                current.owner, lease.owner
            ),
            None => debug!("Run lock for {} already expired", lease.owner),
        }
        Ok(())
    }

    pub async fn holder(&self) -> Result<Option<RunLease>, StoreError> {
        self.store.get(keys::RUN_LOCK).await
    }

    /// Drop whatever lock is stored, e.g. after a crash left one behind
    pub async fn force_release(&self) -> Result<bool, StoreError> {
        self.store.delete(keys::RUN_LOCK).await
    }
}
