//! In-process ordering gate using a tokio Semaphore.
//!
//! The automated browser is one stateful page: an open modal, a scroll
//! offset and a selected radio are shared by every caller.  All scraping
//! and cart mutation therefore runs under this single permit.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::AutomationError;

/// A single-permit gate that serializes browser work within a process.
///
/// Request handlers call `acquire()` and wait up to the configured bound.
/// Background maintenance calls `try_acquire()` and skips if busy.
#[derive(Clone)]
pub struct OrderGate {
    semaphore: Arc<Semaphore>,
    wait_limit: Duration,
}

impl OrderGate {
    pub fn new(wait_limit: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            wait_limit,
        }
    }

    /// Wait for the permit, giving up with [`AutomationError::Busy`] after
    /// the wait limit.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AutomationError> {
        let pending = self.semaphore.clone().acquire_owned();
        match tokio::time::timeout(self.wait_limit, pending).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_closed)) => Err(AutomationError::NotReady),
            Err(_) => {
                debug!(wait_ms = self.wait_limit.as_millis() as u64, "Order gate wait expired");
                Err(AutomationError::Busy)
            }
        }
    }

    /// Non-blocking try-acquire; returns `None` if an order is in flight.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        self.semaphore.clone().try_acquire_owned().ok()
    }

    /// Returns `true` if browser work is currently in progress.
    pub fn is_busy(&self) -> bool {
        self.semaphore.available_permits() == 0
    }
}

impl Default for OrderGate {
    fn default() -> Self {
        Self::new(Duration::from_secs(120))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn is_busy_reflects_permit_state() {
        let gate = OrderGate::default();
        assert!(!gate.is_busy());

        let permit = gate.acquire().await.unwrap();
        assert!(gate.is_busy());

        drop(permit);
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn second_acquire_times_out_as_busy() {
        let gate = OrderGate::new(Duration::from_millis(20));
        let _permit = gate.acquire().await.unwrap();

        let err = gate.acquire().await.unwrap_err();
        assert!(matches!(err, AutomationError::Busy));
    }

    #[tokio::test]
    async fn waiter_proceeds_once_released() {
        let gate = OrderGate::new(Duration::from_secs(5));
        let permit = gate.acquire().await.unwrap();

        let other = gate.clone();
        let waiter = tokio::spawn(async move { other.acquire().await.is_ok() });

        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(permit);
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let gate1 = OrderGate::default();
        let gate2 = gate1.clone();

        let _permit = gate1.acquire().await.unwrap();
        assert!(gate2.is_busy());
        assert!(gate2.try_acquire().is_none());
    }
}
