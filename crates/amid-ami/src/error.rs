//! AMI error taxonomy
//!
//! Connection errors are recoverable and lead to a reconnect; fatal errors
//! are not retried; `Cancelled` reports that `stop()` interrupted a wait.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmiError {
    /// Socket failure, authentication rejection or protocol desync
    #[error("AMI connection error: {reason}")]
    Connection { reason: String },

    /// A failure retrying cannot fix
    #[error("AMI fatal error: {cause}")]
    Fatal { cause: String },

    /// The operation was interrupted by a stop request
    #[error("AMI operation cancelled")]
    Cancelled,
}

impl AmiError {
    pub fn connection(reason: impl Into<String>) -> Self {
        AmiError::Connection {
            reason: reason.into(),
        }
    }

    pub fn fatal(cause: impl Into<String>) -> Self {
        AmiError::Fatal {
            cause: cause.into(),
        }
    }

    /// Whether the reconnection loop should retry after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, AmiError::Connection { .. })
    }

    /// Human-readable reason, used as the disconnect reason
    pub fn reason(&self) -> &str {
        match self {
            AmiError::Connection { reason } => reason,
            AmiError::Fatal { cause } => cause,
            AmiError::Cancelled => "cancelled",
        }
    }
}

impl From<std::io::Error> for AmiError {
    fn from(err: std::io::Error) -> Self {
        AmiError::connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_split() {
        assert!(AmiError::connection("refused").is_recoverable());
        assert!(!AmiError::fatal("bad action").is_recoverable());
        assert!(!AmiError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_io_error_is_connection_error() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err: AmiError = io.into();
        assert_eq!(err.reason(), "reset by peer");
        assert!(err.is_recoverable());
    }
}
