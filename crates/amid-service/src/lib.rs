//! AMI bridge service for accent-amid
//!
//! [`AmiService`] owns the AMI client, keeps it connected and publishes
//! every message it reads on a [`amid_core::traits::BusPublisher`].
//!
//! ```text
//! connect bus
//!     |
//!     v
//! connect_and_login --error--> disconnect, wait reconnect_delay --+
//!     |                                                           |
//!     v                                                           |
//! parse_next_messages -> publish (FIFO) ---connection error-------+
//!     |
//!   stop
//!     v
//! disconnect AMI, close bus
//! ```

pub mod error;
pub mod service;

pub use error::ServiceError;
pub use service::AmiService;
