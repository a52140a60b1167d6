// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants::{
    DEFAULT_BUFFER_MAX_BYTES, DEFAULT_BUFFER_MAX_EVENTS, DEFAULT_CONFIG_REFRESH_DELAY_MS,
    DEFAULT_LISTENER_HOST, DEFAULT_LISTENER_PORT, DEFAULT_TIMEOUT_MS,
};
use crate::errors::ConfigError;
use crate::intake::IntakeLimits;
use std::env;
use std::time::Duration;

/// Configuration of the analytics forwarder and its default collaborators
#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Scope the remote configuration is fetched for
    pub scope_id: String,
    /// Base url of the analytics backend
    pub endpoint: String,
    /// Delay between two remote configuration fetches
    pub configuration_refresh_delay: Duration,
    /// Timeout of every request to the analytics backend
    pub timeout: Duration,
    /// Buffered events per handler before a flush is triggered
    pub buffer_max_events: usize,
    /// Buffered payload bytes per handler before a flush is triggered
    pub buffer_max_bytes: usize,
    pub listener_host: String,
    pub listener_port: u16,
    /// HTTPS proxy URL
    pub https_proxy: Option<String>,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            scope_id: String::new(),
            endpoint: String::new(),
            configuration_refresh_delay: Duration::from_millis(DEFAULT_CONFIG_REFRESH_DELAY_MS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            buffer_max_events: DEFAULT_BUFFER_MAX_EVENTS,
            buffer_max_bytes: DEFAULT_BUFFER_MAX_BYTES,
            listener_host: DEFAULT_LISTENER_HOST.to_string(),
            listener_port: DEFAULT_LISTENER_PORT,
            https_proxy: None,
            log_level: "info".to_string(),
        }
    }
}

impl ForwarderConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from any key/value source using the environment variable names
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse_ms = |key: &str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(key) {
                Some(val) => val.trim().parse::<u64>().map(Duration::from_millis).map_err(|_| {
                    ConfigError::InvalidConfig(format!("{key} must be a number of milliseconds"))
                }),
                None => Ok(default),
            }
        };

        let config = Self {
            scope_id: lookup("ANALYTICS_SCOPE_ID").unwrap_or_default(),
            endpoint: lookup("ANALYTICS_ENDPOINT")
                .map(|val| val.trim_end_matches('/').to_string())
                .unwrap_or_default(),
            configuration_refresh_delay: parse_ms(
                "ANALYTICS_CONFIG_REFRESH_DELAY_MS",
                defaults.configuration_refresh_delay,
            )?,
            timeout: parse_ms("ANALYTICS_TIMEOUT_MS", defaults.timeout)?,
            buffer_max_events: lookup("ANALYTICS_BUFFER_MAX_EVENTS")
                .and_then(|val| val.parse::<usize>().ok())
                .unwrap_or(defaults.buffer_max_events),
            buffer_max_bytes: lookup("ANALYTICS_BUFFER_MAX_BYTES")
                .and_then(|val| val.parse::<usize>().ok())
                .unwrap_or(defaults.buffer_max_bytes),
            listener_host: lookup("ANALYTICS_LISTENER_HOST").unwrap_or(defaults.listener_host),
            listener_port: lookup("ANALYTICS_LISTENER_PORT")
                .and_then(|port| port.parse::<u16>().ok())
                .unwrap_or(defaults.listener_port),
            https_proxy: lookup("ANALYTICS_PROXY_HTTPS").or_else(|| lookup("HTTPS_PROXY")),
            log_level: lookup("ANALYTICS_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scope_id.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "ANALYTICS_SCOPE_ID cannot be empty".to_string(),
            ));
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "ANALYTICS_ENDPOINT cannot be empty".to_string(),
            ));
        }

        if self.configuration_refresh_delay.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Configuration refresh delay must be greater than 0".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidConfig(
                "Timeout must be greater than 0".to_string(),
            ));
        }

        if self.buffer_max_events == 0 || self.buffer_max_bytes == 0 {
            return Err(ConfigError::InvalidConfig(
                "Buffer limits must be greater than 0".to_string(),
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidConfig(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }

    pub fn intake_limits(&self) -> IntakeLimits {
        IntakeLimits {
            max_events: self.buffer_max_events,
            max_bytes: self.buffer_max_bytes,
        }
    }
}
