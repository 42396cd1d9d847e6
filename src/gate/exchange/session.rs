//! Typed exchange session.
//!
//! `ExchangeSession` wraps one [`ExchangeDriver`] and exposes the typed
//! operations the scheduler works with: every raw driver structure passes
//! through the formatters in [`crate::gate::exchange::format`] on the way
//! out, so nothing above this layer ever touches unified JSON.
//!
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::gate::error::{DriverErrorKind, Result};
use crate::gate::exchange::driver::ExchangeDriver;
use crate::gate::exchange::format;
use crate::gate::exchange::models::{
    Balance, CreateOrderParams, FetchOrderParams, Order, OrderBook, OrderSide, OrderStatus,
    OrderType,
};

// Spacing between the individual cancels of a cancel_all batch. Exchanges
// that purge canceled orders aggressively also tend to rate-limit cancel
// endpoints harder than the rest of the private API.
const CANCEL_ALL_SPACING: Duration = Duration::from_millis(250);

/// A typed view over one exchange driver session.
///
/// Sessions are cheap handles: cloning the `Arc` inside is the intended way
/// to share one across tasks. The session itself holds no mutable state;
/// pacing and fairness live in the session pool.
///
#[derive(Clone)]
pub struct ExchangeSession {
    driver: Arc<dyn ExchangeDriver>,
}

impl ExchangeSession {
    pub fn new(driver: Arc<dyn ExchangeDriver>) -> Self {
        Self { driver }
    }

    /// Fetch an order book snapshot over HTTP.
    pub async fn fetch_order_book(&self, symbol: &str, depth: u32) -> Result<OrderBook> {
        debug!("trying to fetch order book: {}", symbol);
        let raw = self.driver.fetch_order_book(symbol, depth).await?;
        Ok(format::order_book(&raw))
    }

    /// Block until the next order book delta and return the latest snapshot.
    pub async fn watch_order_book(&self, symbol: &str, depth: u32) -> Result<OrderBook> {
        debug!("trying to watch order book: {}", symbol);
        let raw = self.driver.watch_order_book(symbol, depth).await?;
        Ok(format::order_book(&raw))
    }

    /// Fetch the account balance restricted to `assets`.
    pub async fn fetch_partial_balance(&self, assets: &[String]) -> Result<Balance> {
        info!("trying to fetch partial balance: {:?}", assets);
        let raw = self.driver.fetch_balance().await?;
        Ok(format::partial_balance(&raw, assets))
    }

    /// Block until the next balance delta, restricted to `assets`.
    pub async fn watch_partial_balance(&self, assets: &[String]) -> Result<Balance> {
        debug!("trying to watch partial balance: {:?}", assets);
        let raw = self.driver.watch_balance().await?;
        Ok(format::partial_balance(&raw, assets))
    }

    /// Fetch one order, falling back to endpoint scans when the primary
    /// lookup misses.
    ///
    /// Many exchanges purge completed orders from their primary lookup
    /// endpoint. The fallback chain masks that: (a) direct lookup by
    /// exchange id; (b) on not-found, scan the open orders of the symbol;
    /// (c) scan the recently canceled orders and force `status = canceled`
    /// on a match. Returns `Ok(None)` when every stage misses.
    pub async fn fetch_order(&self, params: &FetchOrderParams) -> Result<Option<Order>> {
        info!("trying to fetch order: {:?}", params);

        if let Some(id) = params.id.as_deref() {
            match self.driver.fetch_order(id, &params.symbol).await {
                Ok(raw) => {
                    let mut order = format::order(&raw);
                    // A null price on a fetched order means the exchange has
                    // already collapsed it; report it terminal.
                    if order.price.is_none() && order.order_type == Some(OrderType::Limit) {
                        order.status = Some(OrderStatus::Closed);
                    }
                    info!("fetched from primary lookup: {:?}", order.id);
                    return Ok(Some(order));
                }
                Err(e) if e.kind == DriverErrorKind::OrderNotFound => {
                    debug!("primary lookup missed, scanning: {:?}", params);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if let Some(order) = self.fetch_order_from_open(params).await? {
            info!("fetched from open orders: {:?}", order.id);
            return Ok(Some(order));
        }
        if let Some(order) = self.fetch_order_from_canceled(params).await? {
            info!("fetched from canceled orders: {:?}", order.id);
            return Ok(Some(order));
        }
        Ok(None)
    }

    async fn fetch_order_from_open(&self, params: &FetchOrderParams) -> Result<Option<Order>> {
        let open_orders = self
            .fetch_open_orders(std::slice::from_ref(&params.symbol))
            .await?;
        Ok(open_orders.into_iter().find(|order| matches(params, order)))
    }

    async fn fetch_order_from_canceled(&self, params: &FetchOrderParams) -> Result<Option<Order>> {
        let raw_orders = self.driver.fetch_canceled_orders(&params.symbol).await?;
        for raw in &raw_orders {
            let mut order = format::order(raw);
            if matches(params, &order) {
                order.status = Some(OrderStatus::Canceled);
                return Ok(Some(order));
            }
        }
        Ok(None)
    }

    /// Fetch open orders across `symbols`, concatenated in input order.
    pub async fn fetch_open_orders(&self, symbols: &[String]) -> Result<Vec<Order>> {
        info!("trying to fetch open orders: {:?}", symbols);
        let mut orders = Vec::new();
        for symbol in symbols {
            let raw_orders = self.driver.fetch_open_orders(symbol).await?;
            orders.extend(raw_orders.iter().map(format::order));
        }
        Ok(orders)
    }

    /// Block until the next batch of order deltas.
    pub async fn watch_orders(&self) -> Result<Vec<Order>> {
        debug!("trying to watch orders");
        let raw_orders = self.driver.watch_orders().await?;
        Ok(raw_orders.iter().map(format::order).collect())
    }

    /// Create one order as described by `params`.
    ///
    /// The driver's acknowledgment comes back normalized, with the core's
    /// `client_order_id` rewritten in locally: not every exchange echoes it.
    pub async fn create_order(&self, params: &CreateOrderParams) -> Result<Order> {
        info!("trying to create order: {:?}", params);
        let price = match params.order_type {
            OrderType::Market => 0.0,
            OrderType::Limit => params.price.unwrap_or(0.0),
        };
        let raw = self
            .driver
            .create_order(
                &params.symbol,
                type_str(params.order_type),
                side_str(params.side),
                params.amount,
                price,
            )
            .await?;
        let mut order = format::order(&raw);
        order.client_order_id = Some(params.client_order_id.clone());
        info!("order has been successfully created: {:?}", order.id);
        Ok(order)
    }

    /// Cancel one order by its exchange id.
    pub async fn cancel_order(&self, params: &FetchOrderParams) -> Result<()> {
        info!("trying to cancel order: {:?}", params);
        let id = params.id.as_deref().unwrap_or_default();
        self.driver.cancel_order(id, &params.symbol).await?;
        Ok(())
    }

    /// Cancel every order currently open across `symbols`.
    ///
    /// The open set is read from the exchange, not from local state, so a
    /// stale registry cannot cause misdirected cancels. Individual cancels
    /// are serialized with a small spacing.
    pub async fn cancel_all_orders(&self, symbols: &[String]) -> Result<()> {
        info!("trying to cancel all orders: {:?}", symbols);
        let open_orders = self.fetch_open_orders(symbols).await?;
        for order in &open_orders {
            let (Some(id), Some(symbol)) = (order.id.as_deref(), order.symbol.as_deref()) else {
                continue;
            };
            self.driver.cancel_order(id, symbol).await?;
            tokio::time::sleep(CANCEL_ALL_SPACING).await;
        }
        info!("all orders have been cancelled: {}", open_orders.len());
        Ok(())
    }

    /// Release the underlying driver session. Idempotent.
    pub async fn close(&self) -> Result<()> {
        self.driver.close().await?;
        Ok(())
    }
}

// An order matches fetch params on the exchange id when one is known,
// otherwise on the client order id.
fn matches(params: &FetchOrderParams, order: &Order) -> bool {
    match params.id.as_deref() {
        Some(id) => order.id.as_deref() == Some(id),
        None => {
            params.client_order_id.is_some()
                && order.client_order_id == params.client_order_id
        }
    }
}

fn type_str(order_type: OrderType) -> &'static str {
    match order_type {
        OrderType::Limit => "limit",
        OrderType::Market => "market",
    }
}

fn side_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}
