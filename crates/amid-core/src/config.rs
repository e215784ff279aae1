//! Application configuration
//!
//! Configuration is assembled with the `config` crate from built-in defaults,
//! optional `config/default` and `config/<RUN_MODE>` files, and environment
//! variables prefixed with `ACCENT_AMID` (`ACCENT_AMID__AMI__HOST=pbx1`).

use crate::error::AppError;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;
use uuid::Uuid;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ACCENT_AMID";

/// Main application configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub ami: AmiConfig,
    #[serde(default)]
    pub bus: BusConfig,
}

/// Process-level settings
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    /// Identifier stamped as `origin_uuid` on every published event
    #[serde(default = "Uuid::new_v4")]
    pub uuid: Uuid,

    /// Human-readable log output instead of JSON
    #[serde(default)]
    pub debug: bool,

    /// Default log level when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Start the AMI bridge at all
    #[serde(default = "default_publish_ami_events")]
    pub publish_ami_events: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_publish_ami_events() -> bool {
    true
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            uuid: Uuid::new_v4(),
            debug: false,
            log_level: default_log_level(),
            publish_ami_events: default_publish_ami_events(),
        }
    }
}

/// Asterisk Manager Interface connection settings
#[derive(Debug, Deserialize, Clone)]
pub struct AmiConfig {
    #[serde(default = "default_ami_host")]
    pub host: String,

    #[serde(default = "default_ami_port")]
    pub port: u16,

    #[serde(default = "default_ami_username")]
    pub username: String,

    #[serde(default = "default_ami_password")]
    pub password: String,

    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Banner + login response timeout in seconds
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,

    /// Wait between reconnection attempts in seconds
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

fn default_ami_host() -> String {
    "localhost".to_string()
}

fn default_ami_port() -> u16 {
    5038
}

fn default_ami_username() -> String {
    "accent_amid".to_string()
}

fn default_ami_password() -> String {
    "password123".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_login_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

impl Default for AmiConfig {
    fn default() -> Self {
        Self {
            host: default_ami_host(),
            port: default_ami_port(),
            username: default_ami_username(),
            password: default_ami_password(),
            connect_timeout_secs: default_connect_timeout(),
            login_timeout_secs: default_login_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
        }
    }
}

impl AmiConfig {
    /// `host:port` of the AMI endpoint
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}

/// Message bus settings
#[derive(Debug, Deserialize, Clone)]
pub struct BusConfig {
    /// Redis connection URL
    #[serde(default = "default_bus_url")]
    pub url: String,

    /// Prefix of every channel events are published on
    #[serde(default = "default_exchange_name")]
    pub exchange_name: String,
}

fn default_bus_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_exchange_name() -> String {
    "accent-headers".to_string()
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            url: default_bus_url(),
            exchange_name: default_exchange_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, optional config files and the environment
    pub fn load() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".to_string());

        let config = Self::builder()?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    /// Load configuration from a specific file, still honouring the environment
    pub fn from_file(path: &str) -> Result<Self, AppError> {
        let config = Self::builder()?
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("service.debug", false)?
            .set_default("service.log_level", "info")?
            .set_default("service.publish_ami_events", true)?
            .set_default("ami.host", "localhost")?
            .set_default("ami.port", 5038)?
            .set_default("ami.reconnect_delay_secs", 5)?
            .set_default("bus.url", "redis://127.0.0.1:6379")?
            .set_default("bus.exchange_name", "accent-headers")
    }

    /// Reject settings the bridge cannot work with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.ami.host.trim().is_empty() {
            return Err(AppError::InvalidSetting {
                field: "ami.host",
                reason: "must not be empty".to_string(),
            });
        }
        if self.ami.port == 0 {
            return Err(AppError::InvalidSetting {
                field: "ami.port",
                reason: "must not be zero".to_string(),
            });
        }
        if self.ami.username.trim().is_empty() {
            return Err(AppError::InvalidSetting {
                field: "ami.username",
                reason: "must not be empty".to_string(),
            });
        }
        if self.bus.url.trim().is_empty() {
            return Err(AppError::InvalidSetting {
                field: "bus.url",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ami_config() {
        let config = AmiConfig::default();
        assert_eq!(config.addr(), "localhost:5038");
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_default_app_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.service.publish_ami_events);
        assert_eq!(config.bus.exchange_name, "accent-headers");
    }

    #[test]
    fn test_validate_rejects_zero_port() {
        let mut config = AppConfig::default();
        config.ami.port = 0;
        let err = config.validate().unwrap_err();
        assert_eq!(err.error_code(), "invalid_setting");
    }

    #[test]
    fn test_validate_rejects_empty_host() {
        let mut config = AppConfig::default();
        config.ami.host = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_sections() {
        let config = Config::builder()
            .set_override("ami.host", "pbx1")
            .unwrap()
            .set_override("ami.port", 15038)
            .unwrap()
            .set_override("service.uuid", "6f1c2b4e-8f0e-4c4f-9a55-0b8a3d7f1e21")
            .unwrap()
            .build()
            .unwrap();

        let app_config: AppConfig = config.try_deserialize().unwrap();
        assert_eq!(app_config.ami.addr(), "pbx1:15038");
        assert_eq!(app_config.ami.username, "accent_amid");
        assert_eq!(
            app_config.service.uuid.to_string(),
            "6f1c2b4e-8f0e-4c4f-9a55-0b8a3d7f1e21"
        );
        assert_eq!(app_config.bus.url, "redis://127.0.0.1:6379");
    }
}
