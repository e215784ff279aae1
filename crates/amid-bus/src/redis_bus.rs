//! Redis pub/sub publisher

use amid_core::config::BusConfig;
use amid_core::error::BusError;
use amid_core::models::BusEvent;
use amid_core::traits::BusPublisher;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, RedisError};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Publishes each event with `PUBLISH <exchange>.<routing_key> <json>`
///
/// The ConnectionManager reconnects on its own between publishes; a publish
/// that fails anyway is reported to the caller.
pub struct RedisBusPublisher {
    url: String,
    exchange: String,
    manager: RwLock<Option<ConnectionManager>>,
    connected: AtomicBool,
}

impl RedisBusPublisher {
    pub fn new(url: impl Into<String>, exchange: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            exchange: exchange.into(),
            manager: RwLock::new(None),
            connected: AtomicBool::new(false),
        }
    }

    pub fn from_config(config: &BusConfig) -> Self {
        Self::new(&config.url, &config.exchange_name)
    }

    /// Channel an event lands on
    pub fn channel_for(&self, event: &BusEvent) -> String {
        format!("{}.{}", self.exchange, event.routing_key())
    }

    fn map_redis_error(err: RedisError) -> BusError {
        match err.kind() {
            redis::ErrorKind::IoError => {
                error!("Redis I/O error: {}", err);
                BusError::Connection(format!("I/O error: {}", err))
            }
            _ => {
                error!("Redis error: {}", err);
                BusError::Publish(err.to_string())
            }
        }
    }
}

#[async_trait]
impl BusPublisher for RedisBusPublisher {
    async fn connect(&self) -> Result<(), BusError> {
        let mut guard = self.manager.write().await;
        if guard.is_some() {
            return Ok(());
        }

        debug!("Connecting to Redis bus at {}", self.url);
        let client = Client::open(self.url.as_str()).map_err(|e| {
            error!("Failed to create Redis client: {}", e);
            BusError::Connection(format!("Invalid Redis URL: {}", e))
        })?;

        let mut manager = ConnectionManager::new(client).await.map_err(|e| {
            error!("Failed to establish Redis connection: {}", e);
            BusError::Connection(format!("Connection failed: {}", e))
        })?;

        let _: String = redis::cmd("PING")
            .query_async(&mut manager)
            .await
            .map_err(|e| BusError::Connection(format!("Ping failed: {}", e)))?;

        info!(exchange = %self.exchange, "Connected to Redis bus");
        *guard = Some(manager);
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn publish(&self, event: &BusEvent) -> Result<(), BusError> {
        let mut conn = self
            .manager
            .read()
            .await
            .clone()
            .ok_or(BusError::NotConnected)?;

        let channel = self.channel_for(event);
        let payload = event.to_payload()?;

        let receivers: i64 = conn
            .publish(&channel, payload)
            .await
            .map_err(Self::map_redis_error)?;

        debug!(channel = %channel, receivers, "Published AMI event");
        Ok(())
    }

    async fn close_connection(&self) -> Result<(), BusError> {
        let previous = self.manager.write().await.take();
        self.connected.store(false, Ordering::SeqCst);

        match previous {
            Some(_) => info!("Closed Redis bus connection"),
            None => warn!("Redis bus connection already closed"),
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
