//! Reconnection loop between the AMI client and the bus

use crate::error::ServiceError;
use amid_ami::{AmiClient, AmiError, ConnectionState, Message, SharedState, StopHandle};
use amid_core::config::AppConfig;
use amid_core::models::BusEvent;
use amid_core::traits::BusPublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Keeps an AMI session alive and republishes every message on the bus
///
/// Connection errors are retried after `reconnect_delay`; anything else ends
/// `run()` with an error. The AMI socket and the bus connection are released
/// on every exit path.
pub struct AmiService {
    client: Mutex<AmiClient>,
    bus: Arc<dyn BusPublisher>,
    stop: StopHandle,
    state: SharedState,
    reconnect_delay: Duration,
    origin_uuid: Uuid,
}

impl AmiService {
    pub fn new(config: &AppConfig, bus: Arc<dyn BusPublisher>) -> Self {
        let client = AmiClient::new(config.ami.clone());
        Self {
            stop: client.stop_handle(),
            state: client.shared_state(),
            client: Mutex::new(client),
            bus,
            reconnect_delay: config.ami.reconnect_delay(),
            origin_uuid: config.service.uuid,
        }
    }

    /// Override the wait between reconnection attempts
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Ask `run()` to return; callable from any task or signal handler
    pub fn stop(&self) {
        info!("AMI service stop requested");
        self.stop.stop();
    }

    /// Run until `stop()` or a fatal error
    pub async fn run(&self) -> Result<(), ServiceError> {
        let mut client = self
            .client
            .try_lock()
            .map_err(|_| ServiceError::AlreadyRunning)?;

        info!(
            origin_uuid = %self.origin_uuid,
            reconnect_delay_ms = self.reconnect_delay.as_millis() as u64,
            "Starting AMI service"
        );

        let result = self.serve(&mut client).await;

        client.disconnect("service stopped");
        if let Err(e) = self.bus.close_connection().await {
            warn!(error = %e, "Failed to close bus connection");
        }

        match &result {
            Ok(()) => info!("AMI service stopped"),
            Err(e) => error!(error = %e, code = e.error_code(), "AMI service failed"),
        }
        result
    }

    async fn serve(&self, client: &mut AmiClient) -> Result<(), ServiceError> {
        tokio::select! {
            biased;
            result = self.bus.connect() => result?,
            _ = self.stop.stopped() => {
                info!("Stop requested while connecting to the bus");
                return Ok(());
            }
        }

        while !self.stop.is_stopped() {
            let reason = match self.stream(client).await {
                Ok(()) | Err(ServiceError::Ami(AmiError::Cancelled)) => break,
                Err(ServiceError::Ami(AmiError::Connection { reason })) => reason,
                Err(e) => {
                    client.disconnect(&e.to_string());
                    return Err(e);
                }
            };

            client.disconnect(&reason);
            warn!(
                reason = %reason,
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "AMI connection lost, reconnecting"
            );

            if timeout(self.reconnect_delay, self.stop.stopped())
                .await
                .is_ok()
            {
                break;
            }
        }
        Ok(())
    }

    /// One AMI session: log in, then publish until an error or a stop
    async fn stream(&self, client: &mut AmiClient) -> Result<(), ServiceError> {
        client.connect_and_login().await?;

        loop {
            let mut batch = client.parse_next_messages().await?;
            debug!(count = batch.len(), "Received AMI messages");

            while let Some(message) = batch.pop_front() {
                if self.stop.is_stopped() {
                    debug!(count = batch.len() + 1, "Stop requested, dropping unpublished messages");
                    return Ok(());
                }
                self.publish(message).await?;
            }
        }
    }

    /// Publish one message
    ///
    /// A stop arriving mid-publish leaves the publish one reconnect delay to
    /// finish; past that it is abandoned.
    async fn publish(&self, message: Message) -> Result<(), ServiceError> {
        let (name, headers) = message.into_parts();
        let event = BusEvent::ami(name, headers, self.origin_uuid);

        let publish = self.bus.publish(&event);
        tokio::pin!(publish);

        tokio::select! {
            biased;
            result = &mut publish => result?,
            _ = self.stop.stopped() => match timeout(self.reconnect_delay, &mut publish).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(event = %event.name, "Abandoning bus publish stalled after stop");
                    return Ok(());
                }
            },
        }

        debug!(event = %event.name, routing_key = %event.routing_key(), "Published AMI message");
        Ok(())
    }
}
