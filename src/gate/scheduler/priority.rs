//! Priority gate.
//!
//! Commanded order operations (`create_orders`, `cancel_orders`,
//! `cancel_all_orders`) take priority over the periodic private-API loops:
//! while any such command is in flight, the balance and order watchers must
//! not issue private calls. The gate is the notification primitive behind
//! that rule: a counter of in-flight priority tasks plus a waiter that
//! resolves when the counter hits zero.
//!
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;

/// Counts in-flight priority commands and wakes waiters when none remain.
///
#[derive(Default)]
pub struct PriorityGate {
    active: AtomicUsize,
    idle: Notify,
}

impl PriorityGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers one priority command. The returned permit keeps the gate
    /// busy until dropped.
    pub fn enter(self: &Arc<Self>) -> PriorityPermit {
        self.active.fetch_add(1, Ordering::AcqRel);
        PriorityPermit {
            gate: Arc::clone(self),
        }
    }

    /// Number of priority commands currently in flight.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Resolves once no priority command is in flight. Returns immediately
    /// when the gate is already idle.
    pub async fn wait_idle(&self) {
        loop {
            // Register interest before checking, so a release between the
            // check and the await cannot be missed.
            let notified = self.idle.notified();
            if self.active.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Keeps the [`PriorityGate`] busy while a priority command runs.
///
pub struct PriorityPermit {
    gate: Arc<PriorityGate>,
}

impl Drop for PriorityPermit {
    fn drop(&mut self) {
        if self.gate.active.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.gate.idle.notify_waiters();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_idle_resolves_immediately_when_idle() {
        let gate = PriorityGate::new();
        gate.wait_idle().await;
    }

    #[tokio::test]
    async fn test_wait_idle_blocks_until_all_permits_drop() {
        let gate = PriorityGate::new();
        let first = gate.enter();
        let second = gate.enter();
        assert_eq!(gate.active(), 2);

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait_idle().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(second);
        waiter.await.unwrap();
        assert_eq!(gate.active(), 0);
    }
}
