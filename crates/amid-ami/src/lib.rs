//! Asterisk Manager Interface (AMI) client for accent-amid
//!
//! This crate speaks the AMI text protocol over TCP: it logs in, splits the
//! byte stream into `Key: Value` frames and hands them out as [`Message`]s.
//!
//! # Features
//!
//! - TCP connection management with bounded connect and login timeouts
//! - Incremental frame decoding that survives partial reads
//! - Cooperative cancellation through a cloneable [`StopHandle`]
//! - Observable connection state machine
//! - Scripted AMI server for integration tests (`simulator` feature)
//!
//! # Architecture
//!
//! ```text
//! Asterisk AMI (TCP 5038)
//!         |
//!         v
//!   AmiConnection (socket + buffer)
//!         |
//!         v
//!     AmiCodec (banner, frames)
//!         |
//!         v
//!      Message (Event / Response)
//!         |
//!         v
//!     AmiClient (login, state, stop)
//! ```
//!
//! # Example Usage
//!
//! ```rust,ignore
//! use amid_ami::AmiClient;
//! use amid_core::config::AmiConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = AmiClient::new(AmiConfig::default());
//!     client.connect_and_login().await?;
//!
//!     loop {
//!         for message in client.parse_next_messages().await? {
//!             println!("{}", message);
//!         }
//!     }
//! }
//! ```

pub mod action;
pub mod client;
pub mod codec;
pub mod connection;
pub mod error;
pub mod message;
#[cfg(feature = "simulator")]
pub mod simulator;
pub mod state;

pub use action::Action;
pub use client::{AmiClient, StopHandle};
pub use codec::AmiCodec;
pub use connection::AmiConnection;
pub use error::AmiError;
pub use message::{Message, MessageKind};
pub use state::{ConnectionState, SharedState};

/// AMI protocol constants
pub mod constants {
    /// Default AMI TCP port
    pub const DEFAULT_PORT: u16 = 5038;

    /// Prefix of the greeting line Asterisk sends on connect
    pub const BANNER_PREFIX: &str = "Asterisk Call Manager";

    /// Header naming an outbound action
    pub const ACTION_HEADER: &str = "Action";

    /// Header correlating an action with its response
    pub const ACTION_ID_HEADER: &str = "ActionID";

    /// Header naming an unsolicited event
    pub const EVENT_HEADER: &str = "Event";

    /// Header carrying a response status
    pub const RESPONSE_HEADER: &str = "Response";

    /// Human-readable text of a response
    pub const MESSAGE_HEADER: &str = "Message";

    /// Successful response status
    pub const RESPONSE_SUCCESS: &str = "Success";

    /// Failed response status
    pub const RESPONSE_ERROR: &str = "Error";

    /// Line terminator written on the wire
    pub const LINE_TERMINATOR: &str = "\r\n";

    /// Largest frame accepted before the stream is considered desynchronised
    pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

    /// Read buffer size for the TCP socket
    pub const READ_BUFFER_SIZE: usize = 8192;
}
