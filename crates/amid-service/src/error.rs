//! Service-level errors

use amid_ami::AmiError;
use amid_core::error::BusError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Ami(#[from] AmiError),

    #[error(transparent)]
    Bus(#[from] BusError),

    /// `run()` was called while another `run()` owns the client
    #[error("AMI service is already running")]
    AlreadyRunning,
}

impl ServiceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Ami(AmiError::Connection { .. }) => "ami_connection_error",
            ServiceError::Ami(AmiError::Fatal { .. }) => "ami_fatal_error",
            ServiceError::Ami(AmiError::Cancelled) => "ami_cancelled",
            ServiceError::Bus(e) => e.error_code(),
            ServiceError::AlreadyRunning => "already_running",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        let err: ServiceError = AmiError::fatal("bad header").into();
        assert_eq!(err.error_code(), "ami_fatal_error");
        assert_eq!(err.to_string(), "AMI fatal error: bad header");

        let err: ServiceError = BusError::NotConnected.into();
        assert_eq!(err.error_code(), "bus_not_connected");
    }
}
