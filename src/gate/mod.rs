//! Gate module: the gateway core between a trading core and an exchange.
//!
//! This module provides the submodules the gateway is assembled from:
//! configuration, the exchange-facing session layer with its rate-limited
//! pools, the identifier registry, the transport adaptor towards the
//! trading core, and the scheduler that ties them together.
//!
//! # Submodules
//!
//! - `config`: Configuration model, validation and acquisition from a file
//!     or an HTTP endpoint.
//! - `error`: Defines custom error types and results used throughout the gateway.
//! - `exchange`: Typed exchange sessions over the black-box driver, data
//!     normalization and the public/private session pools.
//! - `registry`: Client/exchange order-id correlation tables and the open-order set.
//! - `scheduler`: Command dispatch, priority policy, periodic activities and
//!     latency statistics.
//! - `transport`: The messaging adaptor carrying structured events to and
//!     from the trading core.
//!
pub mod config;
pub mod error;
pub mod exchange;
pub mod registry;
pub mod scheduler;
pub mod transport;
