//! > **Tidegate** n.: A gate hung in a culvert or sluice that swings open with
//! > the ebbing tide and shuts against the flood, letting traffic pass in one
//! > direction only when the pressure is right.
//!
//! An asynchronous trading-gateway core: `tidegate` sits between an external
//! trading core and one cryptocurrency exchange, executes the core's
//! commands (create / cancel / query orders, query balances) against the
//! exchange, and continuously streams order books, balances and order-status
//! updates back over a low-latency messaging bus.
//!
//! # `tidegate` Features
//!
//! - **Priority-aware scheduling**: commanded order operations take priority
//!    over the periodic balance and order-status loops, so bursty trading
//!    moments get the full private API capacity. Market-data polling runs
//!    independently on the public side.
//! - **Rate-limited session pools**: one anonymous session per source IP for
//!    order-book polling past single-IP limits, one authenticated session
//!    per API-key account for order flow, each under a per-session minimum
//!    inter-acquire interval with FIFO fairness.
//! - **Order-lifecycle tracking**: client and exchange order identifiers are
//!    correlated through a cache-backed registry; terminal states are
//!    synthesized when the exchange has already forgotten an order.
//! - **Non-blocking publication**: events are offered to four destinations
//!    (order books, balances, core replies, logs) with an at-most-once
//!    discipline. A missing subscriber is not an error, transient transport
//!    reshuffles are retried with a backoff, and nothing ever blocks the
//!    scheduler.
//! - **Latency accounting**: order-book round trips feed an inclusive
//!    quantile estimator; the {50, 90, 99, 99.99} percentiles are published
//!    once a second together with the running request counters.
//!
//! The exchange client library and the messaging transport are consumed as
//! black boxes through the [`gate::exchange::driver::ExchangeDriver`] and
//! [`gate::transport::Publisher`] / [`gate::transport::Subscriber`] traits;
//! an in-memory channel transport ships with the crate.
//!
//! # Example:
//! ```ignore
//! use std::sync::Arc;
//!
//! use tidegate::gate::config::ConfigSource;
//! use tidegate::gate::registry::MemoryStore;
//! use tidegate::gate::scheduler::Gateway;
//! use tidegate::gate::transport::{publisher_pair, subscriber_pair, TransportBindings};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tracing_subscriber::fmt()
//!         .with_max_level(tracing::Level::INFO)
//!         .init();
//!
//!     let config = ConfigSource::File("config.json".into()).load().await?;
//!
//!     let (commands_tx, subscriber) = subscriber_pair();
//!     let (order_books, order_book_rx) = publisher_pair();
//!     let (balances, balance_rx) = publisher_pair();
//!     let (core, core_rx) = publisher_pair();
//!     let (logs, log_rx) = publisher_pair();
//!
//!     let gateway = Gateway::new(
//!         &config,
//!         // Any `SessionFactory` over the exchange driver linked into the
//!         // embedding process.
//!         &my_driver_factory,
//!         TransportBindings {
//!             subscriber: Box::new(subscriber),
//!             order_books: Box::new(order_books),
//!             balances: Box::new(balances),
//!             core: Box::new(core),
//!             logs: Box::new(logs),
//!         },
//!         Box::new(MemoryStore::new()),
//!     )?;
//!
//!     gateway.run().await?;
//!     Ok(())
//! }
//! ```
//!
#![warn(rust_2018_idioms)]

pub mod gate;
