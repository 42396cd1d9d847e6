//! Command dispatch and scheduling.
//!
//! The [`Gateway`] is the concurrency core of the crate: it receives decoded
//! commands from the transport, classifies them priority versus background,
//! runs them against the session pools, keeps the order registry consistent,
//! and drives the periodic activities (order-book fan-out, balance watch,
//! order watch and metrics) as long-lived cooperative tasks.
//!
//! # Priority policy
//!
//! `create_orders`, `cancel_orders` and `cancel_all_orders` are priority
//! commands: each holds the [`PriorityGate`] from classification until its
//! task finishes. The periodic private-API loops wait for the gate to drain
//! at the top of every iteration, which hands bursty trading moments the
//! full private-pool capacity. Market-data polling never defers: it runs on
//! the public pool.
//!
mod priority;
pub use priority::{PriorityGate, PriorityPermit};

mod stats;
pub use stats::{inclusive_quantiles, latency_percentile, percentile, LatencyPercentiles, StatsRecorder};

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::{json, Value};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::gate::config::GateConfig;
use crate::gate::error::{DriverErrorKind, GateError, Result};
use crate::gate::exchange::driver::{SessionBinding, SessionFactory};
use crate::gate::exchange::models::{CreateOrderParams, FetchOrderParams, Order};
use crate::gate::exchange::pool::SessionPool;
use crate::gate::exchange::session::ExchangeSession;
use crate::gate::registry::{KvStore, OrderRegistry};
use crate::gate::transport::{
    Destination, Event, EventAction, EventFormatter, EventNode, Transmitter, TransportBindings,
};

// Spacing between the orders of one create_orders command, so concurrent
// signers never collide on exchanges that demand strictly increasing nonces.
const CREATE_SPACING: Duration = Duration::from_millis(1);

const METRICS_INTERVAL: Duration = Duration::from_secs(1);

fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

// Either a pool of per-account sessions, or the degenerate single shared
// session when the configuration lists no accounts.
enum PrivateSessions {
    Pool(SessionPool),
    Shared(ExchangeSession),
}

/// The gateway scheduler: command dispatch, order lifecycle tracking and
/// the periodic market-data, balance, order and metrics activities.
///
/// Constructed once per process and driven by [`Gateway::run`] until
/// [`Gateway::shutdown`] is called.
///
pub struct Gateway {
    tickers: Vec<String>,
    assets: Vec<String>,
    order_book_depth: u32,
    orderbook_delay: Duration,
    balance_delay: Duration,
    order_status_delay: Duration,

    registry: OrderRegistry,
    transmitter: Transmitter,
    public_pool: SessionPool,
    private_sessions: PrivateSessions,
    // Caps concurrent private REST calls at the account count. Watch
    // streams run outside it.
    private_sem: Semaphore,
    priority: Arc<PriorityGate>,
    stats: Mutex<StatsRecorder>,

    shutdown_tx: watch::Sender<bool>,
    // Strong references to in-flight command tasks, reaped as they finish.
    commands: Mutex<JoinSet<()>>,
}

impl Gateway {
    /// Builds a gateway from a validated configuration, a driver factory
    /// and bound transport channels.
    pub fn new(
        config: &GateConfig,
        factory: &dyn SessionFactory,
        bindings: TransportBindings,
        store: Box<dyn KvStore>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let public_pool =
            SessionPool::public(factory, config.public_ips(), config.public_delay())?;

        let (private_sessions, private_permits) = match config.accounts() {
            Some(accounts) if !accounts.is_empty() => (
                PrivateSessions::Pool(SessionPool::private(
                    factory,
                    accounts,
                    config.private_delay(),
                )?),
                accounts.len(),
            ),
            _ => (
                PrivateSessions::Shared(ExchangeSession::new(
                    factory.open(SessionBinding::Shared)?,
                )),
                1,
            ),
        };

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Arc::new(Self {
            tickers: config.tickers(),
            assets: config.assets(),
            order_book_depth: config.order_book_depth(),
            orderbook_delay: config.orderbook_delay(),
            balance_delay: config.balance_delay(),
            order_status_delay: config.order_status_delay(),
            registry: OrderRegistry::new(store),
            transmitter: Transmitter::new(bindings, EventFormatter::from_config(config)),
            public_pool,
            private_sessions,
            private_sem: Semaphore::new(private_permits),
            priority: PriorityGate::new(),
            stats: Mutex::new(StatsRecorder::new()),
            shutdown_tx,
            commands: Mutex::new(JoinSet::new()),
        }))
    }

    /// Runs the transport poll loop and every periodic activity until
    /// [`Gateway::shutdown`], then drains in-flight commands and closes the
    /// transport and the session pools.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        let shutdown = self.shutdown_tx.subscribe();

        let poller = {
            let transport = Arc::clone(self);
            let handler_gateway = Arc::clone(self);
            let shutdown = shutdown.clone();
            async move {
                transport
                    .transmitter
                    .run(move |message| handler_gateway.handle_message(message), shutdown)
                    .await;
            }
        };

        tokio::join!(
            poller,
            self.watch_order_books(shutdown.clone()),
            self.watch_balance(shutdown.clone()),
            self.watch_orders(shutdown.clone()),
            self.watch_metrics(shutdown.clone()),
        );

        // Let in-flight commands finish before tearing sessions down.
        let mut commands = {
            let mut guard = self.commands.lock().expect("command set lock poisoned");
            std::mem::take(&mut *guard)
        };
        while commands.join_next().await.is_some() {}

        self.close().await
    }

    /// Asks every loop to stop at its next suspension point.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Closes the transport first, then the session pools.
    async fn close(&self) -> Result<()> {
        self.transmitter.close();
        self.public_pool.close().await?;
        match &self.private_sessions {
            PrivateSessions::Pool(pool) => pool.close().await?,
            PrivateSessions::Shared(session) => session.close().await?,
        }
        Ok(())
    }

    /// Whether the registry still considers the order open. Exposed for
    /// embedding processes that reconcile on restart.
    pub fn is_order_open(&self, client_order_id: &str, symbol: &str) -> bool {
        self.registry.is_open(client_order_id, symbol)
    }

    // ===== [ Inbound path ] =====

    /// Decodes one inbound message and spawns the matching command task.
    ///
    /// Malformed JSON and unknown actions are logged and dropped; they
    /// never take the poll loop down.
    pub fn handle_message(self: &Arc<Self>, message: &str) {
        debug!("message: {}", message);
        let event: Event = match serde_json::from_str(message) {
            Ok(event) => event,
            Err(e) => {
                error!("message deserialize error: {}", e);
                return;
            }
        };
        self.log_echo(&event);

        match event.action {
            Some(action @ EventAction::CreateOrders)
            | Some(action @ EventAction::CancelOrders)
            | Some(action @ EventAction::CancelAllOrders) => self.spawn_priority(action, event),
            Some(action @ EventAction::GetOrders) | Some(action @ EventAction::GetBalance) => {
                self.spawn_background(action, event)
            }
            other => error!("unsupported command action dropped: {:?}", other),
        }
    }

    // Echo every received command to the log destination, marked as seen by
    // the gate.
    fn log_echo(&self, event: &Event) {
        let mut echo = event.clone();
        echo.node = Some(EventNode::Gate);
        self.transmitter.offer(&echo, Destination::Logs);
    }

    // The permit is taken before the task is spawned: from the moment a
    // priority command is classified, the periodic loops hold off.
    fn spawn_priority(self: &Arc<Self>, action: EventAction, event: Event) {
        let permit = self.priority.enter();
        let gateway = Arc::clone(self);
        let mut commands = self.commands.lock().expect("command set lock poisoned");
        commands.spawn(async move {
            let _permit = permit;
            match action {
                EventAction::CreateOrders => gateway.create_orders(event).await,
                EventAction::CancelOrders => gateway.cancel_orders(event).await,
                EventAction::CancelAllOrders => gateway.cancel_all_orders(event).await,
                _ => {}
            }
        });
        while commands.try_join_next().is_some() {}
    }

    fn spawn_background(self: &Arc<Self>, action: EventAction, event: Event) {
        let gateway = Arc::clone(self);
        let mut commands = self.commands.lock().expect("command set lock poisoned");
        commands.spawn(async move {
            match action {
                EventAction::GetOrders => gateway.get_orders(event).await,
                EventAction::GetBalance => gateway.get_balance(event).await,
                _ => {}
            }
        });
        while commands.try_join_next().is_some() {}
    }

    // ===== [ Command handlers ] =====

    async fn create_orders(&self, event: Event) {
        let event_id = event.event_id.clone().unwrap_or_else(new_event_id);
        let params: Vec<CreateOrderParams> = match serde_json::from_value(event.data.clone()) {
            Ok(params) => params,
            Err(e) => {
                error!("create_orders params rejected: {}", e);
                let reply = Event::error(EventAction::CreateOrders, e.to_string(), event.data)
                    .with_event_id(event_id);
                self.offer_core(&reply);
                return;
            }
        };

        for (index, param) in params.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(CREATE_SPACING).await;
            }
            self.create_order(param, &event_id).await;
        }
    }

    async fn create_order(&self, param: &CreateOrderParams, event_id: &str) {
        let result = async {
            let _permit = self.private_permit().await?;
            let session = self.private_session().await?;
            session.create_order(param).await
        }
        .await;

        match result {
            Ok(order) => {
                let order_id = order.id.clone().unwrap_or_default();
                if let Err(e) = self
                    .registry
                    .record_creation(&param.client_order_id, &order_id, &param.symbol, event_id)
                    .await
                {
                    error!("registry write failed for {}: {}", param.client_order_id, e);
                }
                info!("order created: {} -> {}", param.client_order_id, order_id);
                let reply = Event::data(EventAction::CreateOrders, json!([order]))
                    .with_event_id(event_id);
                self.offer_core(&reply);
            }
            Err(e) => {
                error!("create order failed for {}: {}", param.client_order_id, e);
                let reply = Event::error(EventAction::CreateOrders, e.to_string(), json!([param]))
                    .with_event_id(event_id);
                self.offer_core(&reply);
            }
        }
    }

    async fn cancel_orders(&self, event: Event) {
        let params: Vec<FetchOrderParams> = match serde_json::from_value(event.data.clone()) {
            Ok(params) => params,
            Err(e) => {
                error!("cancel_orders params rejected: {}", e);
                let reply = Event::error(EventAction::CancelOrders, e.to_string(), event.data)
                    .with_event_id(event.event_id.unwrap_or_else(new_event_id));
                self.offer_core(&reply);
                return;
            }
        };
        for param in &params {
            self.cancel_order(param).await;
        }
    }

    async fn cancel_order(&self, param: &FetchOrderParams) {
        let Some(cid) = param.client_order_id.as_deref() else {
            error!("cancel without client_order_id dropped: {:?}", param);
            return;
        };

        let order_id = match self.registry.order_id_for(cid).await {
            Ok(Some(order_id)) => order_id,
            Ok(None) => {
                let e = GateError::RegistryMiss(cid.to_string());
                error!("{}", e);
                let reply = Event::error(EventAction::CancelOrders, e.to_string(), json!([param]))
                    .with_event_id(new_event_id());
                self.offer_core(&reply);
                return;
            }
            Err(e) => {
                error!("registry read failed for {}: {}", cid, e);
                let reply = Event::error(EventAction::CancelOrders, e.to_string(), json!([param]))
                    .with_event_id(new_event_id());
                self.offer_core(&reply);
                return;
            }
        };

        let request = FetchOrderParams {
            id: Some(order_id.clone()),
            client_order_id: Some(cid.to_string()),
            symbol: param.symbol.clone(),
        };
        let result = async {
            let _permit = self.private_permit().await?;
            let session = self.private_session().await?;
            session.cancel_order(&request).await
        }
        .await;

        match result {
            Ok(()) => {}
            // The exchange has already forgotten the order: synthesize its
            // terminal state for the core instead of failing the command.
            Err(e) if e.driver_kind() == Some(DriverErrorKind::OrderNotFound) => {
                error!("cancel for unknown order {}: {}", cid, e);
                let event_id = self
                    .stored_event_id(cid)
                    .await
                    .unwrap_or_else(new_event_id);
                let order = Order::synthetic_canceled(Some(order_id), cid, &param.symbol);
                self.registry.remove_open(cid, &param.symbol);
                let update = Event::data(EventAction::OrdersUpdate, json!([order]))
                    .with_event_id(event_id);
                self.offer_core(&update);

                let log = Event::error(EventAction::CancelOrders, e.to_string(), json!([param]))
                    .with_event_id(new_event_id());
                self.offer_core(&log);
            }
            Err(e) => {
                error!("cancel order failed for {}: {}", cid, e);
                let reply = Event::error(EventAction::CancelOrders, e.to_string(), json!([param]))
                    .with_event_id(new_event_id());
                self.offer_core(&reply);
            }
        }
    }

    async fn cancel_all_orders(&self, _event: Event) {
        let result = async {
            let _permit = self.private_permit().await?;
            let session = self.private_session().await?;
            session.cancel_all_orders(&self.tickers).await
        }
        .await;
        if let Err(e) = result {
            error!("cancel all orders failed: {}", e);
        }
    }

    async fn get_orders(&self, event: Event) {
        let params: Vec<FetchOrderParams> = match serde_json::from_value(event.data.clone()) {
            Ok(params) => params,
            Err(e) => {
                error!("get_orders params rejected: {}", e);
                let reply = Event::error(EventAction::GetOrders, e.to_string(), event.data)
                    .with_event_id(event.event_id.unwrap_or_else(new_event_id));
                self.offer_core(&reply);
                return;
            }
        };
        for param in &params {
            self.get_order(param).await;
        }
    }

    async fn get_order(&self, param: &FetchOrderParams) {
        let Some(cid) = param.client_order_id.as_deref() else {
            error!("get_orders without client_order_id dropped: {:?}", param);
            return;
        };

        let order_id = self.registry.order_id_for(cid).await.ok().flatten();
        let request = FetchOrderParams {
            id: order_id.or_else(|| param.id.clone()),
            client_order_id: Some(cid.to_string()),
            symbol: param.symbol.clone(),
        };
        let result = async {
            let _permit = self.private_permit().await?;
            let session = self.private_session().await?;
            session.fetch_order(&request).await
        }
        .await;

        match result {
            Ok(Some(mut order)) => {
                order.client_order_id = Some(cid.to_string());
                let event_id = self
                    .stored_event_id(cid)
                    .await
                    .unwrap_or_else(new_event_id);
                let reply =
                    Event::data(EventAction::GetOrders, json!([order])).with_event_id(event_id);
                self.offer_core(&reply);
            }
            Ok(None) => {
                let reply = Event::error(
                    EventAction::GetOrders,
                    DriverErrorKind::OrderNotFound.to_string(),
                    json!([param]),
                )
                .with_event_id(new_event_id());
                self.offer_core(&reply);
            }
            Err(e) => {
                error!("fetch order failed for {}: {}", cid, e);
                let reply = Event::error(EventAction::GetOrders, e.to_string(), json!([param]))
                    .with_event_id(new_event_id());
                self.offer_core(&reply);
            }
        }
    }

    async fn get_balance(&self, event: Event) {
        let event_id = event.event_id.clone().unwrap_or_else(new_event_id);
        // An empty or missing asset list falls back to the configured set.
        let assets = match &event.data {
            Value::Array(entries) if !entries.is_empty() => {
                serde_json::from_value(event.data.clone()).unwrap_or_else(|_| self.assets.clone())
            }
            _ => self.assets.clone(),
        };

        let result = async {
            let _permit = self.private_permit().await?;
            let session = self.private_session().await?;
            session.fetch_partial_balance(&assets).await
        }
        .await;

        match result {
            Ok(balance) => {
                let reply = Event::data(EventAction::GetBalance, json!(balance))
                    .with_event_id(event_id);
                self.offer_balance(&reply);
            }
            Err(e) => {
                error!("get balance failed: {}", e);
                let reply = Event::error(EventAction::GetBalance, e.to_string(), json!(assets))
                    .with_event_id(event_id);
                self.offer_core(&reply);
            }
        }
    }

    // ===== [ Periodic activities ] =====

    async fn watch_order_books(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if !pause(self.orderbook_delay, &mut shutdown).await {
                break;
            }
            self.order_book_round().await;
        }
    }

    // One fan-out round: every symbol fetched in parallel, each on its own
    // public session, with one latency sample taken around the batch.
    async fn order_book_round(&self) {
        let started = Instant::now();
        let fetches = self.tickers.iter().map(|symbol| async move {
            let session = self.public_pool.acquire().await?;
            session.fetch_order_book(symbol, self.order_book_depth).await
        });
        let results = join_all(fetches).await;
        let latency_us = started.elapsed().as_micros() as u64;

        let mut books = Vec::new();
        let mut failure = None;
        for result in results {
            match result {
                Ok(book) => books.push(book),
                Err(e) => failure = Some(e),
            }
        }

        {
            let mut stats = self.stats.lock().expect("stats lock poisoned");
            stats.record_batch(latency_us, self.tickers.len() as u64);
            stats.record_order_books(books.len() as u64);
        }

        for book in &books {
            let update = Event::data(EventAction::OrderBookUpdate, json!(book))
                .with_event_id(new_event_id());
            self.transmitter.offer(&update, Destination::OrderBook);
            self.transmitter.offer(&update, Destination::Logs);
        }

        if let Some(e) = failure {
            error!("order book fan-out failed: {}", e);
            let report = Event::error(
                EventAction::OrderBookUpdate,
                e.to_string(),
                json!(self.tickers),
            )
            .with_event_id(new_event_id());
            self.offer_core(&report);
        }
    }

    async fn watch_balance(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.priority.wait_idle() => {}
                _ = shutdown.changed() => break,
            }

            // No semaphore around the watch: the stream may park between
            // deltas, and a parked long-poll must not pin account capacity
            // the command handlers need.
            let call = async {
                let session = self.private_session().await?;
                session.watch_partial_balance(&self.assets).await
            };
            // The watch may park on its stream indefinitely; shutdown must
            // still win.
            let result = tokio::select! {
                result = call => result,
                _ = shutdown.changed() => break,
            };

            match result {
                Ok(balance) => {
                    let update = Event::data(EventAction::BalanceUpdate, json!(balance))
                        .with_event_id(new_event_id());
                    self.offer_balance(&update);
                }
                Err(e) => {
                    error!("balance watch failed: {}", e);
                    let report =
                        Event::error(EventAction::BalanceUpdate, e.to_string(), json!(self.assets))
                            .with_event_id(new_event_id());
                    self.offer_core(&report);
                }
            }

            if !pause(self.balance_delay, &mut shutdown).await {
                break;
            }
        }
    }

    async fn watch_orders(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = self.priority.wait_idle() => {}
                _ = shutdown.changed() => break,
            }

            let call = async {
                let session = self.private_session().await?;
                session.watch_orders().await
            };
            let result = tokio::select! {
                result = call => result,
                _ = shutdown.changed() => break,
            };

            match result {
                Ok(orders) => {
                    for order in orders {
                        self.emit_order_update(order).await;
                    }
                    info!("open orders: {}", self.registry.open_orders().len());
                }
                Err(e) => {
                    error!("order watch failed: {}", e);
                    let report = Event::error(EventAction::OrdersUpdate, e.to_string(), json!([]))
                        .with_event_id(new_event_id());
                    self.offer_core(&report);
                }
            }

            if !pause(self.order_status_delay, &mut shutdown).await {
                break;
            }
        }
    }

    // Correlates one order delta through the registry and emits it. The
    // first terminal status prunes the order from the open set, matched
    // against a snapshot so concurrent inserts survive the iteration.
    async fn emit_order_update(&self, mut order: Order) {
        if order.client_order_id.is_none() {
            if let Some(order_id) = order.id.as_deref() {
                order.client_order_id = self
                    .registry
                    .client_order_id_for(order_id)
                    .await
                    .ok()
                    .flatten();
            }
        }

        let event_id = match order.client_order_id.as_deref() {
            Some(cid) => self.stored_event_id(cid).await,
            None => None,
        }
        .unwrap_or_else(new_event_id);

        if order.status.is_some_and(|status| status.is_terminal()) {
            if let Some(cid) = order.client_order_id.clone() {
                for (open_cid, symbol) in self.registry.open_orders() {
                    if open_cid == cid {
                        self.registry.remove_open(&open_cid, &symbol);
                    }
                }
            }
        }

        let update =
            Event::data(EventAction::OrdersUpdate, json!([order])).with_event_id(event_id);
        self.offer_core(&update);
    }

    async fn watch_metrics(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if !pause(METRICS_INTERVAL, &mut shutdown).await {
                break;
            }
            let window = {
                let mut stats = self.stats.lock().expect("stats lock poisoned");
                stats.take_window()
            };
            if let Some(data) = window {
                let report =
                    Event::data(EventAction::Metrics, data).with_event_id(new_event_id());
                self.transmitter.offer(&report, Destination::Logs);
            }
        }
    }

    // ===== [ Shared plumbing ] =====

    async fn private_session(&self) -> Result<ExchangeSession> {
        match &self.private_sessions {
            PrivateSessions::Pool(pool) => pool.acquire().await,
            PrivateSessions::Shared(session) => Ok(session.clone()),
        }
    }

    async fn private_permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.private_sem
            .acquire()
            .await
            .map_err(|_| GateError::Internal("private semaphore closed".into()))
    }

    async fn stored_event_id(&self, client_order_id: &str) -> Option<String> {
        self.registry
            .event_id_for(client_order_id)
            .await
            .ok()
            .flatten()
    }

    fn offer_core(&self, event: &Event) {
        self.transmitter.offer(event, Destination::Core);
        self.transmitter.offer(event, Destination::Logs);
    }

    fn offer_balance(&self, event: &Event) {
        self.transmitter.offer(event, Destination::Balance);
        self.transmitter.offer(event, Destination::Logs);
    }
}

// Sleeps `duration` unless shutdown lands first; returns whether the caller
// should keep looping.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.changed() => false,
    }
}
