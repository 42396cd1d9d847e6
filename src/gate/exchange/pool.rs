//! Rate-limited session pools.
//!
//! A pool is an ordered multiset of exchange sessions, each carrying the
//! monotonic instant it was last handed out and a per-session minimum
//! inter-acquire interval. [`SessionPool::acquire`] rotates the head slot
//! to the tail and sleeps out the remainder of its interval, which gives a
//! per-session leaky bucket of rate `1/min_interval` and a pool-wide rate
//! of `N/min_interval`, with stable FIFO fairness between slots.
//!
//! Two flavors are constructed from configuration: the **public pool**
//! binds one anonymous session per source IP for market-data polling past
//! a single-IP rate limit, and the **private pool** binds one session per
//! API-key account. Without configured accounts the private side
//! degenerates to a single shared session.
//!
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use crate::gate::config::AccountCredentials;
use crate::gate::error::{GateError, Result};
use crate::gate::exchange::driver::{SessionBinding, SessionFactory};
use crate::gate::exchange::session::ExchangeSession;

struct SessionSlot {
    session: ExchangeSession,
    last_acquire: Instant,
    min_interval: Duration,
}

/// An ordered pool of exchange sessions with per-session pacing.
///
pub struct SessionPool {
    // `None` once the pool has been closed.
    slots: Mutex<Option<VecDeque<SessionSlot>>>,
}

impl SessionPool {
    /// Builds a pool over the given sessions with a common minimum
    /// inter-acquire interval.
    pub fn new(sessions: Vec<ExchangeSession>, min_interval: Duration) -> Result<Self> {
        if sessions.is_empty() {
            return Err(GateError::Config("session pool needs at least one session".into()));
        }
        let epoch = Instant::now()
            .checked_sub(min_interval)
            .unwrap_or_else(Instant::now);
        let slots = sessions
            .into_iter()
            .map(|session| SessionSlot {
                session,
                // Backdated so the first acquire of every slot is immediate.
                last_acquire: epoch,
                min_interval,
            })
            .collect();
        Ok(Self {
            slots: Mutex::new(Some(slots)),
        })
    }

    /// Builds the public pool: one anonymous session per source IP.
    pub fn public(
        factory: &dyn SessionFactory,
        ips: &[IpAddr],
        min_interval: Duration,
    ) -> Result<Self> {
        let sessions = ips
            .iter()
            .map(|&ip| Ok(ExchangeSession::new(factory.open(SessionBinding::SourceIp(ip))?)))
            .collect::<Result<Vec<_>>>()?;
        Self::new(sessions, min_interval)
    }

    /// Builds the private pool: one authenticated session per account.
    pub fn private(
        factory: &dyn SessionFactory,
        accounts: &[AccountCredentials],
        min_interval: Duration,
    ) -> Result<Self> {
        let sessions = accounts
            .iter()
            .map(|account| {
                Ok(ExchangeSession::new(
                    factory.open(SessionBinding::Account(account.clone()))?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(sessions, min_interval)
    }

    /// Number of slots in the pool; zero once closed.
    pub fn len(&self) -> usize {
        self.slots
            .lock()
            .expect("session pool lock poisoned")
            .as_ref()
            .map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the next session, sleeping out its remaining interval.
    ///
    /// The head slot is stamped and rotated to the tail before the sleep,
    /// so concurrent callers drain distinct slots and the pool as a whole
    /// sustains `N/min_interval`.
    pub async fn acquire(&self) -> Result<ExchangeSession> {
        let (session, ready_at) = {
            let mut guard = self.slots.lock().expect("session pool lock poisoned");
            let slots = guard.as_mut().ok_or(GateError::PoolClosed)?;
            let mut slot = slots.pop_front().ok_or(GateError::PoolClosed)?;
            let ready_at = Instant::now().max(slot.last_acquire + slot.min_interval);
            slot.last_acquire = ready_at;
            let session = slot.session.clone();
            slots.push_back(slot);
            (session, ready_at)
        };

        let remaining = ready_at.saturating_duration_since(Instant::now());
        if !remaining.is_zero() {
            debug!("session pool pacing: sleeping {:?}", remaining);
            tokio::time::sleep_until(ready_at).await;
        }
        Ok(session)
    }

    /// Closes every session and poisons the pool; later `acquire` calls
    /// fail with [`GateError::PoolClosed`].
    pub async fn close(&self) -> Result<()> {
        let slots = self
            .slots
            .lock()
            .expect("session pool lock poisoned")
            .take();
        if let Some(slots) = slots {
            for slot in &slots {
                slot.session.close().await?;
            }
        }
        Ok(())
    }
}
