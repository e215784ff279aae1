//! AMI transport: one socket, its receive buffer and the frame codec

use crate::action::Action;
use crate::codec::AmiCodec;
use crate::constants::READ_BUFFER_SIZE;
use crate::error::AmiError;
use crate::message::Message;
use bytes::BytesMut;
use std::collections::VecDeque;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Decoder;
use tracing::{debug, info, warn};

pub struct AmiConnection<S = TcpStream> {
    stream: S,
    buffer: BytesMut,
    codec: AmiCodec,
    peer: String,
}

impl<S> AmiConnection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a freshly connected stream; the banner is still expected
    pub fn new(stream: S, peer: impl Into<String>) -> Self {
        Self::with_codec(stream, peer, AmiCodec::new())
    }

    pub fn with_codec(stream: S, peer: impl Into<String>, codec: AmiCodec) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(READ_BUFFER_SIZE),
            codec,
            peer: peer.into(),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn banner(&self) -> Option<&str> {
        self.codec.banner()
    }

    /// Bytes received but not yet part of a complete frame
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    /// Decode every complete frame already in the buffer
    pub fn drain_buffered(&mut self) -> Result<VecDeque<Message>, AmiError> {
        let mut messages = VecDeque::new();
        while let Some(message) = self.codec.decode(&mut self.buffer)? {
            messages.push_back(message);
        }
        Ok(messages)
    }

    /// One socket read into the buffer
    ///
    /// Cancel safe: bytes read before cancellation stay buffered.
    pub async fn fill_buffer(&mut self) -> Result<usize, AmiError> {
        self.buffer.reserve(READ_BUFFER_SIZE);
        let read = self.stream.read_buf(&mut self.buffer).await?;
        if read == 0 {
            return Err(AmiError::connection("connection closed by peer"));
        }
        Ok(read)
    }

    /// Wait until at least one complete frame is available and return all of them
    pub async fn read_messages(&mut self) -> Result<VecDeque<Message>, AmiError> {
        loop {
            let messages = self.drain_buffered()?;
            if !messages.is_empty() {
                return Ok(messages);
            }
            self.fill_buffer().await?;
        }
    }

    pub async fn send_action(&mut self, action: &Action) -> Result<(), AmiError> {
        let mut out = BytesMut::new();
        action.encode(&mut out)?;

        debug!(action = %action.name(), action_id = %action.action_id(), "Sending AMI action");
        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Wait for the banner, send `login` and wait for its response
    ///
    /// Messages received before the login response are returned so the caller
    /// can hand them out later.
    pub async fn login(&mut self, login: &Action) -> Result<VecDeque<Message>, AmiError> {
        let mut early = VecDeque::new();

        while !self.codec.banner_received() {
            early.extend(self.drain_buffered()?);
            if self.codec.banner_received() {
                break;
            }
            self.fill_buffer().await.map_err(|e| match e {
                AmiError::Connection { reason } => {
                    AmiError::connection(format!("no AMI banner received: {}", reason))
                }
                other => other,
            })?;
        }

        self.send_action(login).await?;

        loop {
            let mut batch = self.read_messages().await?;
            while let Some(message) = batch.pop_front() {
                let answers_login =
                    message.is_response() && message.action_id() == Some(login.action_id());
                if !answers_login {
                    early.push_back(message);
                    continue;
                }

                if message.is_success() {
                    info!(peer = %self.peer, "AMI login accepted");
                    early.extend(batch);
                    return Ok(early);
                }

                let reason = message.message_text().unwrap_or("no reason given");
                warn!(peer = %self.peer, reason = %reason, "AMI login rejected");
                return Err(AmiError::connection(format!(
                    "authentication rejected: {}",
                    reason
                )));
            }
        }
    }

    /// Give the stream back, dropping buffered data
    pub fn into_inner(self) -> S {
        self.stream
    }
}
