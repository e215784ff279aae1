//! AMI client: connection lifecycle on top of [`AmiConnection`]

use crate::action::Action;
use crate::connection::AmiConnection;
use crate::error::AmiError;
use crate::message::Message;
use crate::state::{ConnectionState, SharedState};
use amid_core::config::AmiConfig;
use std::collections::VecDeque;
use std::mem;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cooperative stop signal shared between the client and outside callers
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
    state: SharedState,
}

impl StopHandle {
    /// Request shutdown; suspended client operations return `Cancelled`
    ///
    /// Safe to call from any task, any number of times. It never touches the
    /// socket: the owner of the client disconnects at its next checkpoint.
    pub fn stop(&self) {
        if self.state.get() == ConnectionState::Streaming {
            self.state.transition(ConnectionState::Draining);
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once `stop` has been called
    pub async fn stopped(&self) {
        self.token.cancelled().await
    }
}

pub struct AmiClient {
    config: AmiConfig,
    connection: Option<AmiConnection<TcpStream>>,
    pending: VecDeque<Message>,
    state: SharedState,
    token: CancellationToken,
}

impl AmiClient {
    pub fn new(config: AmiConfig) -> Self {
        Self {
            config,
            connection: None,
            pending: VecDeque::new(),
            state: SharedState::new(),
            token: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &AmiConfig {
        &self.config
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.token.clone(),
            state: self.state.clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Handle for observing the state from other tasks
    pub fn shared_state(&self) -> SharedState {
        self.state.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Open the TCP connection, read the banner and log in
    ///
    /// On failure no socket is left open and the state is `Disconnected`.
    pub async fn connect_and_login(&mut self) -> Result<(), AmiError> {
        if self.connection.is_some() {
            self.disconnect("reconnecting");
        }
        if self.token.is_cancelled() {
            return Err(AmiError::Cancelled);
        }

        let addr = self.config.addr();
        self.state.transition(ConnectionState::Connecting);
        info!(host = %self.config.host, port = self.config.port, "Connecting to AMI");

        let token = self.token.clone();
        let connect_timeout = self.config.connect_timeout();
        let connected = tokio::select! {
            biased;
            _ = token.cancelled() => Err(AmiError::Cancelled),
            result = timeout(connect_timeout, TcpStream::connect(&addr)) => match result {
                Ok(Ok(stream)) => Ok(stream),
                Ok(Err(e)) => Err(AmiError::connection(format!("cannot connect to {}: {}", addr, e))),
                Err(_) => Err(AmiError::connection(format!(
                    "timed out after {}s connecting to {}",
                    connect_timeout.as_secs(),
                    addr
                ))),
            },
        };

        let stream = match connected {
            Ok(stream) => stream,
            Err(e) => {
                self.state.transition(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Could not set TCP_NODELAY on AMI socket");
        }

        self.state.transition(ConnectionState::Authenticating);
        let mut connection = AmiConnection::new(stream, addr.clone());
        let login = Action::login(&self.config.username, &self.config.password);
        let login_timeout = self.config.login_timeout();

        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(AmiError::Cancelled),
            result = timeout(login_timeout, connection.login(&login)) => match result {
                Ok(result) => result,
                Err(_) => Err(AmiError::connection(format!(
                    "timed out after {}s waiting for AMI login on {}",
                    login_timeout.as_secs(),
                    addr
                ))),
            },
        };

        match outcome {
            Ok(early) => {
                info!(
                    peer = %addr,
                    banner = connection.banner().unwrap_or("unknown"),
                    "Connected and authenticated to AMI"
                );
                self.pending = early;
                self.connection = Some(connection);
                self.state.transition(ConnectionState::Streaming);
                Ok(())
            }
            Err(e) => {
                drop(connection);
                self.state.transition(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Wait for at least one complete frame and return every available message
    ///
    /// Messages come out in arrival order. Never returns an empty queue.
    pub async fn parse_next_messages(&mut self) -> Result<VecDeque<Message>, AmiError> {
        if !self.pending.is_empty() {
            return Ok(mem::take(&mut self.pending));
        }

        let token = self.token.clone();
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| AmiError::connection("not connected"))?;

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(AmiError::Cancelled),
            result = connection.read_messages() => result,
        }
    }

    /// Send an action on the live connection without waiting for its response
    pub async fn send_action(&mut self, action: &Action) -> Result<(), AmiError> {
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| AmiError::connection("not connected"))?;
        connection.send_action(action).await
    }

    /// Close the socket right away, dropping unread data
    ///
    /// Idempotent; returns whether a socket was actually closed.
    pub fn disconnect(&mut self, reason: &str) -> bool {
        self.pending.clear();
        let closed = match self.connection.take() {
            Some(connection) => {
                if connection.buffered().is_empty() {
                    info!(peer = %connection.peer(), reason = %reason, "Disconnecting from AMI");
                } else {
                    warn!(
                        peer = %connection.peer(),
                        reason = %reason,
                        discarded = connection.buffered().len(),
                        "Disconnecting from AMI with unread data"
                    );
                }
                drop(connection.into_inner());
                true
            }
            None => false,
        };
        self.state.transition(ConnectionState::Disconnected);
        closed
    }

    /// Request graceful shutdown, same as [`StopHandle::stop`]
    pub fn stop(&self) {
        self.stop_handle().stop();
    }
}
