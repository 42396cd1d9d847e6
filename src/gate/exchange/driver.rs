//! Trait definitions for the black-box exchange driver.
//!
//! The gateway does not implement REST or WebSocket exchange protocols
//! itself; it consumes a driver, an authenticated unified exchange client,
//! through the narrow [`ExchangeDriver`] interface defined here. Drivers
//! return raw JSON in their library's unified structure; the typed session
//! in [`crate::gate::exchange::session`] normalizes on top.
//!
//! # Traits
//!
//! - `ExchangeDriver`: One authenticated (or anonymous) exchange session:
//!     raw fetch/watch/create/cancel operations.
//! - `SessionFactory`: Opens drivers for a given [`SessionBinding`]; the
//!     session pools call it once per slot at startup.
//!
use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::Value;

use crate::gate::config::AccountCredentials;
use crate::gate::error::{DriverError, Result};

/// A `Result` alias for driver operations.
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// One exchange session as seen by the gateway.
///
/// `fetch_*` operations are single HTTP round trips. `watch_*` operations
/// block until the underlying stream produces the next delta and return the
/// latest snapshot; a stream that cannot continue surfaces
/// [`DriverErrorKind::StreamClosed`](crate::gate::error::DriverErrorKind).
///
/// Implementations must be safe to share across tasks: the session pools
/// hand the same driver to at most one caller at a time, but the shared
/// degenerate session is used concurrently.
///
#[async_trait]
pub trait ExchangeDriver: Send + Sync {
    /// Fetch an order book snapshot over HTTP.
    async fn fetch_order_book(&self, symbol: &str, limit: u32) -> DriverResult<Value>;

    /// Block until the next order book delta arrives over the stream.
    async fn watch_order_book(&self, symbol: &str, limit: u32) -> DriverResult<Value>;

    /// Fetch the full account balance over HTTP.
    async fn fetch_balance(&self) -> DriverResult<Value>;

    /// Block until the next balance delta arrives over the stream.
    async fn watch_balance(&self) -> DriverResult<Value>;

    /// Fetch one order by exchange id.
    async fn fetch_order(&self, id: &str, symbol: &str) -> DriverResult<Value>;

    /// Fetch the currently open orders for one symbol.
    async fn fetch_open_orders(&self, symbol: &str) -> DriverResult<Vec<Value>>;

    /// Fetch recently canceled orders for one symbol.
    async fn fetch_canceled_orders(&self, symbol: &str) -> DriverResult<Vec<Value>>;

    /// Block until the next batch of order deltas arrives over the stream.
    async fn watch_orders(&self) -> DriverResult<Vec<Value>>;

    /// Create one order. `price` is `0.0` for market orders.
    async fn create_order(
        &self,
        symbol: &str,
        order_type: &str,
        side: &str,
        amount: f64,
        price: f64,
    ) -> DriverResult<Value>;

    /// Cancel one order by exchange id.
    async fn cancel_order(&self, id: &str, symbol: &str) -> DriverResult<()>;

    /// Release the underlying connections. Idempotent.
    async fn close(&self) -> DriverResult<()>;
}

/// How a driver's outbound connections are bound.
///
#[derive(Clone, Debug)]
pub enum SessionBinding {
    /// No binding: the process default route and the configured primary
    /// credentials. Used when the configuration lists no accounts.
    Shared,

    /// Bind the outbound TCP socket to a specific local address (ephemeral
    /// port). Used by the public pool for anonymous market-data calls.
    SourceIp(IpAddr),

    /// Authenticate with a specific API-key account. Used by the private
    /// pool for account operations.
    Account(AccountCredentials),
}

/// Opens exchange drivers for the session pools.
///
/// One factory is constructed per gateway, around whatever concrete driver
/// the embedding process links in. The pools call `open` once per slot at
/// startup; drivers live for the process lifetime.
pub trait SessionFactory: Send + Sync {
    fn open(&self, binding: SessionBinding) -> Result<std::sync::Arc<dyn ExchangeDriver>>;
}

/// Builds a `reqwest::Client` whose outbound sockets are bound to `ip`.
///
/// Driver implementations use this for [`SessionBinding::SourceIp`] slots;
/// the local-address option is the firm dependency that makes parallel
/// polling past a single-IP rate limit possible.
pub fn bound_http_client(ip: IpAddr) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder().local_address(ip).build()?)
}

static LAST_NONCE: AtomicI64 = AtomicI64::new(0);

/// Returns a process-wide strictly increasing nonce in nanoseconds.
///
/// Injected into the driver's nonce hook so concurrent signers never reuse
/// a value, even when the system clock stalls within its resolution.
pub fn next_nonce() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    let mut last = LAST_NONCE.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_NONCE.compare_exchange_weak(
            last,
            candidate,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(observed) => last = observed,
        }
    }
}
