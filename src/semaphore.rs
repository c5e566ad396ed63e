//! Bounded admission semaphore with drain support.

use std::sync::RwLock;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// Fixed-capacity admission gate for in-flight jobs.
///
/// Tokens flow through a FIFO-fair tokio semaphore; the active count is
/// tracked separately so callers can observe load and wait for drain.
/// Releasing without a paired acquire is a no-op and the count never goes
/// negative.
pub struct Semaphore {
    permits: tokio::sync::Semaphore,
    capacity: usize,
    active: RwLock<usize>,
    drained: Notify,
}

impl Semaphore {
    /// Create a semaphore with the given capacity.
    ///
    /// A capacity of zero is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: tokio::sync::Semaphore::new(capacity),
            capacity,
            active: RwLock::new(0),
            drained: Notify::new(),
        }
    }

    /// Acquire a token, waiting until one is available.
    ///
    /// Returns `false` without acquiring if `cancel` is triggered before or
    /// while waiting.
    pub async fn acquire(&self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = cancel.cancelled() => false,
            permit = self.permits.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    let mut active = write_lock(&self.active);
                    *active += 1;
                    true
                }
                Err(_) => false,
            },
        }
    }

    /// Acquire a token without waiting.
    pub fn try_acquire(&self) -> bool {
        match self.permits.try_acquire() {
            Ok(permit) => {
                permit.forget();
                let mut active = write_lock(&self.active);
                *active += 1;
                true
            }
            Err(_) => false,
        }
    }

    /// Return one token and wake a drain waiter if this was the last one.
    pub fn release(&self) {
        let mut active = write_lock(&self.active);
        if *active == 0 {
            // Unpaired release; nothing was held.
            return;
        }
        *active -= 1;
        self.permits.add_permits(1);
        if *active == 0 {
            self.drained.notify_waiters();
        }
    }

    /// Number of tokens currently held.
    pub fn active(&self) -> usize {
        *read_lock(&self.active)
    }

    /// Maximum number of tokens.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Wait until every held token has been released.
    pub async fn wait(&self) {
        loop {
            let notified = self.drained.notified();
            if self.active() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for drain, giving up after `timeout`.
    ///
    /// Returns whether the active count reached zero in time.
    pub async fn wait_with_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }
}

fn write_lock(lock: &RwLock<usize>) -> std::sync::RwLockWriteGuard<'_, usize> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read_lock(lock: &RwLock<usize>) -> std::sync::RwLockReadGuard<'_, usize> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}
