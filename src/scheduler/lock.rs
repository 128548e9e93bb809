// src/scheduler/lock.rs
//! Advisory run lock. The marker holds the acquisition time as plain epoch
//! seconds; a marker older than `max_age_secs` is abandoned and reclaimable.

use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::error::{LockError, StoreError};
use crate::store::{Slot, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Free,
    Held { age_secs: u64 },
    /// Present but older than the limit, or unreadable.
    Stale { age_secs: Option<u64> },
}

impl LockStatus {
    pub fn is_live(self) -> bool {
        matches!(self, LockStatus::Held { .. })
    }
}

pub struct RunLock {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    max_age_secs: u64,
}

impl RunLock {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, max_age_secs: u64) -> Self {
        Self {
            store,
            clock,
            max_age_secs,
        }
    }

    pub async fn inspect(&self) -> Result<LockStatus, StoreError> {
        let Some(bytes) = self.store.read(Slot::Lock).await? else {
            return Ok(LockStatus::Free);
        };
        let acquired_at = std::str::from_utf8(&bytes)
            .ok()
            .and_then(|s| s.trim().parse::<i64>().ok());
        let Some(acquired_at) = acquired_at else {
            return Ok(LockStatus::Stale { age_secs: None });
        };
        let age_secs = (self.clock.unix() - acquired_at).max(0) as u64;
        if age_secs > self.max_age_secs {
            Ok(LockStatus::Stale {
                age_secs: Some(age_secs),
            })
        } else {
            Ok(LockStatus::Held { age_secs })
        }
    }

    /// Take the lock, overwriting a stale marker. A live marker is
    /// `LockError::Held`.
    pub async fn acquire(&self) -> Result<(), LockError> {
        match self.inspect().await? {
            LockStatus::Held { age_secs } => return Err(LockError::Held { age_secs }),
            LockStatus::Stale { age_secs } => {
                warn!(target: "scheduler", ?age_secs, "reclaiming stale run lock");
            }
            LockStatus::Free => {}
        }
        let stamp = self.clock.unix().to_string();
        self.store.write_atomic(Slot::Lock, stamp.as_bytes()).await?;
        info!(target: "scheduler", "run lock acquired");
        Ok(())
    }

    pub async fn release(&self) -> Result<(), StoreError> {
        self.store.remove(Slot::Lock).await
    }
}
