//! Incremental AMI frame codec
//!
//! The decoder consumes the single banner line Asterisk sends on connect,
//! then yields one [`Message`] per complete frame. Incomplete data stays in
//! the buffer until more bytes arrive.

use crate::action::Action;
use crate::constants::{BANNER_PREFIX, MAX_FRAME_SIZE};
use crate::error::AmiError;
use crate::message::Message;
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

#[derive(Debug)]
pub struct AmiCodec {
    banner: Option<String>,
    expect_banner: bool,
    max_frame_size: usize,
    /// Bytes of the current partial frame already scanned for a terminator
    scanned: usize,
}

impl AmiCodec {
    /// Codec for a fresh connection: the first line must be the banner
    pub fn new() -> Self {
        Self {
            banner: None,
            expect_banner: true,
            max_frame_size: MAX_FRAME_SIZE,
            scanned: 0,
        }
    }

    /// Codec for a stream positioned after the banner
    pub fn without_banner() -> Self {
        Self {
            expect_banner: false,
            ..Self::new()
        }
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Greeting line received from the server, once seen
    pub fn banner(&self) -> Option<&str> {
        self.banner.as_deref()
    }

    pub fn banner_received(&self) -> bool {
        !self.expect_banner
    }

    fn decode_banner(&mut self, src: &mut BytesMut) -> Result<bool, AmiError> {
        let Some(newline) = src.iter().position(|b| *b == b'\n') else {
            self.check_size(src.len())?;
            return Ok(false);
        };

        let line = src.split_to(newline + 1);
        let banner = String::from_utf8_lossy(&line).trim().to_string();
        if !banner.starts_with(BANNER_PREFIX) {
            return Err(AmiError::connection(format!(
                "unexpected AMI banner {:?}",
                banner
            )));
        }

        debug!(banner = %banner, "Received AMI banner");
        self.banner = Some(banner);
        self.expect_banner = false;
        Ok(true)
    }

    /// Offset just past the empty line closing the frame at the start of `src`
    fn find_frame_end(&mut self, src: &BytesMut) -> Option<usize> {
        let mut line_start = self.scanned;
        while let Some(offset) = src[line_start..].iter().position(|b| *b == b'\n') {
            let newline = line_start + offset;
            let line = &src[line_start..newline];
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.is_empty() {
                return Some(newline + 1);
            }
            line_start = newline + 1;
        }
        self.scanned = line_start;
        None
    }

    fn check_size(&self, len: usize) -> Result<(), AmiError> {
        if len > self.max_frame_size {
            return Err(AmiError::connection(format!(
                "frame exceeds {} bytes without terminator",
                self.max_frame_size
            )));
        }
        Ok(())
    }
}

impl Default for AmiCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip blank lines separating frames
fn skip_blank_lines(src: &mut BytesMut) {
    loop {
        if src.starts_with(b"\r\n") {
            src.advance(2);
        } else if src.starts_with(b"\n") {
            src.advance(1);
        } else {
            break;
        }
    }
}

impl Decoder for AmiCodec {
    type Item = Message;
    type Error = AmiError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Message>, AmiError> {
        if self.expect_banner && !self.decode_banner(src)? {
            return Ok(None);
        }

        loop {
            if self.scanned == 0 {
                skip_blank_lines(src);
            }
            if src.is_empty() {
                return Ok(None);
            }

            let Some(end) = self.find_frame_end(src) else {
                self.check_size(src.len())?;
                return Ok(None);
            };

            self.scanned = 0;
            let frame = src.split_to(end);
            if let Some(message) = Message::parse(&String::from_utf8_lossy(&frame)) {
                return Ok(Some(message));
            }
        }
    }
}

impl Encoder<&Action> for AmiCodec {
    type Error = AmiError;

    fn encode(&mut self, action: &Action, dst: &mut BytesMut) -> Result<(), AmiError> {
        action.encode(dst)
    }
}
