//! Outbound AMI actions

use crate::constants::{ACTION_HEADER, ACTION_ID_HEADER, LINE_TERMINATOR};
use crate::error::AmiError;
use amid_core::Headers;
use bytes::{BufMut, BytesMut};
use uuid::Uuid;

/// An action frame sent to Asterisk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    action_id: String,
    headers: Headers,
}

impl Action {
    /// New action with a generated `ActionID`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            action_id: format!("amid-{}", Uuid::new_v4().simple()),
            headers: Headers::new(),
        }
    }

    pub fn with_action_id(mut self, action_id: impl Into<String>) -> Self {
        self.action_id = action_id.into();
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(key, value);
        self
    }

    /// `Login` action that also enables the event stream
    pub fn login(username: &str, secret: &str) -> Self {
        Self::new("Login")
            .header("Username", username)
            .header("Secret", secret)
            .header("Events", "on")
    }

    pub fn ping() -> Self {
        Self::new("Ping")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Serialize the action into `dst`
    ///
    /// Fails without writing anything when a key or value would break the
    /// framing (CR, LF, or a `:` inside a key).
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), AmiError> {
        validate_value(ACTION_HEADER, &self.name)?;
        validate_value(ACTION_ID_HEADER, &self.action_id)?;
        for (key, value) in self.headers.iter() {
            validate_key(key)?;
            validate_value(key, value)?;
        }

        write_line(dst, ACTION_HEADER, &self.name);
        write_line(dst, ACTION_ID_HEADER, &self.action_id);
        for (key, value) in self.headers.iter() {
            write_line(dst, key, value);
        }
        dst.put_slice(LINE_TERMINATOR.as_bytes());
        Ok(())
    }
}

fn write_line(dst: &mut BytesMut, key: &str, value: &str) {
    dst.reserve(key.len() + value.len() + 4);
    dst.put_slice(key.as_bytes());
    dst.put_slice(b": ");
    dst.put_slice(value.as_bytes());
    dst.put_slice(LINE_TERMINATOR.as_bytes());
}

fn validate_key(key: &str) -> Result<(), AmiError> {
    if key.is_empty() || key.contains([':', '\r', '\n']) {
        return Err(AmiError::fatal(format!("invalid action header name {:?}", key)));
    }
    Ok(())
}

fn validate_value(key: &str, value: &str) -> Result<(), AmiError> {
    if value.contains(['\r', '\n']) {
        return Err(AmiError::fatal(format!(
            "action header {} contains a line break",
            key
        )));
    }
    Ok(())
}
