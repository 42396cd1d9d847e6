//! ID correlation registry and open-order set.
//!
//! The gateway correlates three identifiers per order: the core-assigned
//! `client_order_id`, the exchange-assigned order id, and the `event_id` of
//! the command that created the order. The correlations live in three
//! string tables with prefixed namespaces inside an associative cache, so
//! two gateway processes on the same host (a rolling restart) can recover
//! recent correlations; durability is not required.
//!
//! The cache is consumed through the [`KvStore`] trait. [`RedisStore`]
//! backs production deployments; [`MemoryStore`] backs tests and
//! single-process runs.
//!
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use redis::AsyncCommands;

use crate::gate::error::Result;

const EVENT_ID_PREFIX: &str = "event_id:";
const ORDER_ID_PREFIX: &str = "order_id:";
const CLIENT_ORDER_ID_PREFIX: &str = "client_order_id:";

/// An asynchronous string key-value store.
///
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

/// In-memory [`KvStore`] for tests and single-process deployments.
///
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.map
            .lock()
            .expect("memory store lock poisoned")
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .map
            .lock()
            .expect("memory store lock poisoned")
            .get(key)
            .cloned())
    }
}

/// Redis-backed [`KvStore`].
///
/// Uses a multiplexed connection manager, so one store handle can be shared
/// across every task of the scheduler.
pub struct RedisStore {
    conn: redis::aio::ConnectionManager,
}

impl RedisStore {
    /// Connects to the Redis instance at `url` (e.g. `redis://127.0.0.1/`).
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        Ok(conn.get(key).await?)
    }
}

/// The gateway's view over the correlation tables and the open-order set.
///
/// The scheduler is the single writer; [`OrderRegistry::record_creation`]
/// updates all three tables and the open set in one critical section of the
/// scheduler, so readers never observe a partially recorded order.
///
pub struct OrderRegistry {
    store: Box<dyn KvStore>,
    open_orders: Mutex<HashSet<(String, String)>>,
}

impl OrderRegistry {
    pub fn new(store: Box<dyn KvStore>) -> Self {
        Self {
            store,
            open_orders: Mutex::new(HashSet::new()),
        }
    }

    /// Records a freshly created order: all three correlations plus the
    /// open-set entry.
    pub async fn record_creation(
        &self,
        client_order_id: &str,
        order_id: &str,
        symbol: &str,
        event_id: &str,
    ) -> Result<()> {
        self.store
            .set(&format!("{EVENT_ID_PREFIX}{client_order_id}"), event_id)
            .await?;
        self.store
            .set(&format!("{ORDER_ID_PREFIX}{client_order_id}"), order_id)
            .await?;
        self.store
            .set(&format!("{CLIENT_ORDER_ID_PREFIX}{order_id}"), client_order_id)
            .await?;
        self.insert_open(client_order_id, symbol);
        Ok(())
    }

    /// The `event_id` of the command that created `client_order_id`.
    pub async fn event_id_for(&self, client_order_id: &str) -> Result<Option<String>> {
        self.store
            .get(&format!("{EVENT_ID_PREFIX}{client_order_id}"))
            .await
    }

    /// The exchange order id assigned to `client_order_id`.
    pub async fn order_id_for(&self, client_order_id: &str) -> Result<Option<String>> {
        self.store
            .get(&format!("{ORDER_ID_PREFIX}{client_order_id}"))
            .await
    }

    /// The client order id behind an exchange `order_id`; `None` for orders
    /// the gateway never tracked.
    pub async fn client_order_id_for(&self, order_id: &str) -> Result<Option<String>> {
        self.store
            .get(&format!("{CLIENT_ORDER_ID_PREFIX}{order_id}"))
            .await
    }

    pub fn insert_open(&self, client_order_id: &str, symbol: &str) {
        self.open_orders
            .lock()
            .expect("open set lock poisoned")
            .insert((client_order_id.to_string(), symbol.to_string()));
    }

    /// Removes an order from the open set on its first terminal status.
    pub fn remove_open(&self, client_order_id: &str, symbol: &str) {
        self.open_orders
            .lock()
            .expect("open set lock poisoned")
            .remove(&(client_order_id.to_string(), symbol.to_string()));
    }

    pub fn is_open(&self, client_order_id: &str, symbol: &str) -> bool {
        self.open_orders
            .lock()
            .expect("open set lock poisoned")
            .contains(&(client_order_id.to_string(), symbol.to_string()))
    }

    /// A snapshot of the open set, so callers can iterate while inserts
    /// land concurrently.
    pub fn open_orders(&self) -> Vec<(String, String)> {
        self.open_orders
            .lock()
            .expect("open set lock poisoned")
            .iter()
            .cloned()
            .collect()
    }
}
