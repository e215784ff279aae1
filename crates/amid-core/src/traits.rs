//! Seams between the AMI bridge and its collaborators

use crate::error::BusError;
use crate::models::BusEvent;
use async_trait::async_trait;

/// Outbound side of the bridge: where parsed AMI messages are republished
///
/// Implementations must tolerate `close_connection` being called any number
/// of times, connected or not.
#[async_trait]
pub trait BusPublisher: Send + Sync {
    /// Establish the connection to the broker
    async fn connect(&self) -> Result<(), BusError>;

    /// Publish one event under its routing key
    async fn publish(&self, event: &BusEvent) -> Result<(), BusError>;

    /// Release the broker connection (idempotent)
    async fn close_connection(&self) -> Result<(), BusError>;

    /// Whether `connect` succeeded and `close_connection` was not called since
    fn is_connected(&self) -> bool;
}
