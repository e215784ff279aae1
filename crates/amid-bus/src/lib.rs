//! Message bus backends for accent-amid
//!
//! Both types implement [`amid_core::traits::BusPublisher`]:
//!
//! - [`RedisBusPublisher`] publishes each event on the Redis channel
//!   `<exchange>.ami.<name>` through a ConnectionManager
//! - [`MemoryBusPublisher`] keeps events in memory, for tests and dry runs
//!
//! # Example
//!
//! ```no_run
//! use amid_bus::RedisBusPublisher;
//! use amid_core::traits::BusPublisher;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bus = RedisBusPublisher::new("redis://127.0.0.1:6379", "accent-headers");
//!     bus.connect().await?;
//!     bus.close_connection().await?;
//!     Ok(())
//! }
//! ```

pub mod memory;
pub mod redis_bus;

pub use memory::MemoryBusPublisher;
pub use redis_bus::RedisBusPublisher;
