//! AMI message representation and frame parsing
//!
//! A frame is a run of `Key: Value` lines closed by an empty line. Frames
//! carrying an `Event` header are events, frames carrying a `Response`
//! header answer an action.

use crate::constants::{
    ACTION_ID_HEADER, EVENT_HEADER, MESSAGE_HEADER, RESPONSE_ERROR, RESPONSE_HEADER,
    RESPONSE_SUCCESS,
};
use amid_core::Headers;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Event,
    Response,
}

/// One parsed AMI frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    kind: MessageKind,
    name: String,
    headers: Headers,
}

impl Message {
    pub fn new(kind: MessageKind, name: impl Into<String>, headers: Headers) -> Self {
        Self {
            kind,
            name: name.into(),
            headers,
        }
    }

    /// Parse the text of one frame (without its closing empty line)
    ///
    /// Lines without a `:` are skipped with a warning. Returns `None` when
    /// the frame has neither an `Event` nor a `Response` header.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut headers = Headers::new();
        let mut identity: Option<(MessageKind, String)> = None;

        for line in raw.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.trim().is_empty() {
                continue;
            }

            let Some((key, value)) = line.split_once(':') else {
                warn!(line = %line, "Skipping malformed AMI line");
                continue;
            };

            let key = key.trim();
            let value = value.trim();

            if identity.is_none() {
                if key.eq_ignore_ascii_case(EVENT_HEADER) {
                    identity = Some((MessageKind::Event, value.to_string()));
                } else if key.eq_ignore_ascii_case(RESPONSE_HEADER) {
                    identity = Some((MessageKind::Response, value.to_string()));
                }
            }

            headers.push(key, value);
        }

        match identity {
            Some((kind, name)) => Some(Self {
                kind,
                name,
                headers,
            }),
            None => {
                if !headers.is_empty() {
                    warn!(
                        headers = headers.len(),
                        "Dropping AMI frame without Event or Response header"
                    );
                }
                None
            }
        }
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Event name, or response status for responses
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn into_parts(self) -> (String, Headers) {
        (self.name, self.headers)
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    pub fn action_id(&self) -> Option<&str> {
        self.get_header(ACTION_ID_HEADER)
    }

    /// Text of the `Message` header
    pub fn message_text(&self) -> Option<&str> {
        self.get_header(MESSAGE_HEADER)
    }

    pub fn is_event(&self) -> bool {
        self.kind == MessageKind::Event
    }

    pub fn is_response(&self) -> bool {
        self.kind == MessageKind::Response
    }

    pub fn is_success(&self) -> bool {
        self.is_response() && self.name.eq_ignore_ascii_case(RESPONSE_SUCCESS)
    }

    pub fn is_error(&self) -> bool {
        self.is_response() && self.name.eq_ignore_ascii_case(RESPONSE_ERROR)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            MessageKind::Event => "Event",
            MessageKind::Response => "Response",
        };
        write!(f, "{}: {}", kind, self.name)?;

        if let Some(action_id) = self.action_id() {
            write!(f, ", ActionID: {}", action_id)?;
        }

        write!(f, ", Headers: {}", self.headers.len())
    }
}
