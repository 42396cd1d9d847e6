//! Normalized exchange data model.
//!
//! This module defines the structures the gateway emits to the trading core
//! after normalizing raw driver output: order books, partial balances and
//! orders, plus the parameter types the core supplies with its commands.
//!
//! All timestamps are carried in microseconds (`timestamp_us`), converted
//! from the driver's milliseconds at the normalization boundary; `None`
//! whenever the exchange did not report one.
//!
mod book;
pub use book::{OrderBook, PriceLevel};

mod balance;
pub use balance::{AssetFunds, Balance};

mod order;
pub use order::{CreateOrderParams, FetchOrderParams, Order, OrderSide, OrderStatus, OrderType};
