//! accent-amid core library
//!
//! Foundational pieces shared by every crate of the AMI bridge:
//!
//! - Application configuration (`config` + `.env`)
//! - Error types for configuration and the message bus
//! - The ordered header map and the bus event envelope
//! - The `BusPublisher` trait implemented by the bus backends

pub mod config;
pub mod error;
pub mod models;
pub mod traits;

pub use config::AppConfig;
pub use error::{AppError, BusError};
pub use models::{BusEvent, Headers};
pub use traits::BusPublisher;
