//! Error types.
//!
//! This module defines custom error types and handling mechanisms for the
//! `tidegate` crate. It includes various error types that represent different
//! failure scenarios when relaying commands between a trading core and an
//! exchange, and provides convenient error mapping from other crates like
//! `reqwest`, `serde_json` and `redis`.
//!
//! The primary error type is `GateError`, which consolidates all possible
//! errors that can occur during the execution of the gateway core. Failures
//! surfaced by the underlying exchange driver carry a structured
//! [`DriverErrorKind`], so the scheduler can distinguish a timeout from a
//! rate-limit rejection or a purged order without string matching.
//!
//! # Components
//!
//! - `GateError`: An enumeration of all the error types that may occur.
//! - `DriverError`: A structured error returned by the black-box exchange driver.
//! - `DriverErrorKind`: An enumeration of driver failure classes.
//! - `Result`: A custom `Result` type alias that uses `GateError` as the error type.
//!
use std::fmt;

/// A `Result` alias where the `Err` case is `tidegate::gate::GateError`.
pub type Result<T> = std::result::Result<T, GateError>;

/// An enumeration of all possible errors that may occur when using the
/// `tidegate` crate.
///
/// This enum provides a consolidated view of all error types, including those
/// originating from external crates like `reqwest` and `redis`. Each variant
/// represents a specific type of error that can be encountered during the
/// operation of the gateway core.
///
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// An error surfaced by the underlying exchange driver.
    #[error("exchange driver error: {0}")]
    Driver(#[from] DriverError),

    /// The configuration document is structurally valid JSON but violates a
    /// gateway constraint (overlapping IP pools, zero rate limits, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// A correlation lookup failed for an order the gateway is known to track.
    #[error("registry miss for tracked order `{0}`")]
    RegistryMiss(String),

    /// The associative cache backing the registry failed.
    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// The session pool was closed while a caller still held a reference to it.
    #[error("session pool is closed")]
    PoolClosed,

    /// A transport offer failed for a reason the retry discipline does not
    /// absorb.
    #[error("transport error: {0}")]
    Transport(#[from] OfferError),

    #[error("JSON deserialization error: {0}")]
    JsonDeserialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),

    // Internal tidegate errors
    #[error("Internal `tidegate` error: {0}")]
    Internal(String),
}

impl From<&str> for GateError {
    fn from(value: &str) -> Self {
        GateError::Internal(value.to_string())
    }
}

impl GateError {
    /// Returns the driver failure class if this error originated in the
    /// exchange driver.
    pub fn driver_kind(&self) -> Option<DriverErrorKind> {
        match self {
            GateError::Driver(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Represents an error returned by the black-box exchange driver.
///
/// The gateway never retries a failed business operation; it classifies the
/// failure, emits an error event and moves on. The classification lives in
/// [`DriverErrorKind`] so handlers can special-case the conditions the
/// protocol cares about (an order purged from the exchange's primary lookup
/// endpoint, a rate-limit rejection).
///
#[derive(Debug, Clone)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
}

impl std::error::Error for DriverError {}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

/// Enum representing the failure classes an exchange driver may report.
///
/// The set mirrors the error taxonomy of the unified exchange client the
/// driver wraps. Only a handful of variants change gateway behavior; the
/// rest exist so error events carry a stable, human-readable class.
///
/// # Variants
///
/// - `Timeout`: The driver's own request timeout elapsed. Not retried.
/// - `RateLimitExceeded`: The exchange rejected the call for pacing reasons.
///     Logged and reported; never retried.
/// - `OrderNotFound`: The order is unknown to the endpoint that was asked.
///     On cancel this is translated into a synthetic `canceled` update.
/// - `UnknownSymbol`: The market is not listed on the exchange.
/// - `InsufficientFunds`: The account cannot cover the requested order.
/// - `InvalidParams`: Missing required fields or bad values for parameters.
/// - `StreamClosed`: A watch stream ended and cannot produce further deltas.
/// - `Transport`: Any other network-level failure inside the driver.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    Timeout,
    RateLimitExceeded,
    OrderNotFound,
    UnknownSymbol,
    InsufficientFunds,
    InvalidParams,
    StreamClosed,
    Transport,
}

impl fmt::Display for DriverErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverErrorKind::Timeout => write!(f, "Timeout error"),
            DriverErrorKind::RateLimitExceeded => write!(f, "Rate limit exceeded"),
            DriverErrorKind::OrderNotFound => write!(f, "Order not found"),
            DriverErrorKind::UnknownSymbol => write!(f, "Unknown symbol"),
            DriverErrorKind::InsufficientFunds => write!(f, "Insufficient funds"),
            DriverErrorKind::InvalidParams => write!(f, "Invalid parameters"),
            DriverErrorKind::StreamClosed => write!(f, "Stream closed"),
            DriverErrorKind::Transport => write!(f, "Transport error"),
        }
    }
}

/// Enum representing the outcomes of a non-blocking transport offer, in the
/// terms of the underlying pub/sub transport.
///
/// The transport adaptor absorbs two of these: `NotConnected` is treated as
/// success-equivalent (the gateway does not require a subscriber to be
/// present), and `AdminAction` is retried until the transport finishes its
/// internal reshuffle. Everything else abandons the offer.
///
#[derive(Debug, Clone, thiserror::Error)]
pub enum OfferError {
    #[error("publication is not connected to a subscriber")]
    NotConnected,

    #[error("publication rejected the offer due to an administrative action")]
    AdminAction,

    #[error("publication is closed")]
    Closed,

    #[error("transport failure: {0}")]
    Other(String),
}

/// Utility function to map deserialization errors to `GateError` while logging
/// the JSON string that caused the error.
///
/// This function is useful for debugging deserialization issues by capturing
/// and logging the raw JSON string that failed to deserialize.
///
pub(crate) fn map_deserialization_error(e: serde_json::Error, json_str: &str) -> GateError {
    tracing::error!("failed deserialization of: {}", json_str);
    GateError::JsonDeserialize(e)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let e = DriverError::new(DriverErrorKind::Timeout, "request exceeded 10s");
        assert_eq!(e.to_string(), "Timeout error: request exceeded 10s");

        let e = DriverError::new(DriverErrorKind::RateLimitExceeded, "");
        assert_eq!(e.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn test_driver_kind_through_gate_error() {
        let e = GateError::from(DriverError::new(DriverErrorKind::OrderNotFound, "oid-1"));
        assert_eq!(e.driver_kind(), Some(DriverErrorKind::OrderNotFound));
        assert_eq!(GateError::from("boom").driver_kind(), None);
    }
}
