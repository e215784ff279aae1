//! Error handling shared across accent-amid
//!
//! `AppError` covers start-up failures (configuration, validation).
//! `BusError` is returned by every `BusPublisher` implementation.

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    // ==================== Configuration Errors ====================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

impl AppError {
    /// Returns a stable machine-readable code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Config(_) => "config_error",
            AppError::InvalidSetting { .. } => "invalid_setting",
        }
    }
}

/// Message bus errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("Bus connection failed: {0}")]
    Connection(String),

    #[error("Bus publish failed: {0}")]
    Publish(String),

    #[error("Bus is not connected")]
    NotConnected,

    #[error("Bus serialization error: {0}")]
    Serialization(String),
}

impl BusError {
    pub fn error_code(&self) -> &'static str {
        match self {
            BusError::Connection(_) => "bus_connection_error",
            BusError::Publish(_) => "bus_publish_error",
            BusError::NotConnected => "bus_not_connected",
            BusError::Serialization(_) => "bus_serialization_error",
        }
    }
}

// ==================== From implementations ====================

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BusError {
    fn from(err: serde_json::Error) -> Self {
        BusError::Serialization(err.to_string())
    }
}
