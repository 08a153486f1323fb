//! # Channel Configuration
//!
//! Connection parameters for a FINS/TCP channel.
//!
//! - **Endpoint**: remote host and port (default 9600)
//! - **Timeout**: default per-call budget for connect + send + receive
//! - **Retries**: extra attempts after the first failure, each on a fresh connection
//! - **Purge delay**: how long to wait for stale bytes after a service id mismatch
//! - **Reinitialize threshold**: consecutive exhausted requests before the
//!   channel reports that it needs to be reinitialized

use std::time::Duration;

use crate::constants::{
    DEFAULT_FINS_PORT, DEFAULT_REINITIALIZE_THRESHOLD, DEFAULT_RETRIES, DEFAULT_TIMEOUT,
    MIN_READ_WINDOW,
};
use crate::error::{FinsError, FinsResult};

/// FINS/TCP channel configuration.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use voltage_fins::ChannelConfig;
///
/// let config = ChannelConfig::new("192.168.1.10")
///     .with_timeout(Duration::from_millis(500))
///     .with_retries(2);
///
/// assert_eq!(config.endpoint(), "192.168.1.10:9600");
/// assert_eq!(config.purge_delay(), Duration::from_millis(125));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// PLC host name or IP address.
    pub host: String,
    /// PLC FINS port.
    pub port: u16,
    /// Default per-call timeout.
    pub timeout: Duration,
    /// Default retry count (attempts = retries + 1).
    pub retries: u32,
    /// Explicit purge delay; `None` uses a quarter of the call timeout.
    pub purge_delay: Option<Duration>,
    /// Consecutive exhausted requests that trigger the reinitialize signal.
    pub reinitialize_threshold: u32,
    /// Reads are skipped once less than this much of a budget remains.
    pub min_read_window: Duration,
}

impl ChannelConfig {
    /// Create a configuration for `host` with default values.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Set the PLC port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the default per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the default retry count.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set a fixed purge delay.
    pub fn with_purge_delay(mut self, delay: Duration) -> Self {
        self.purge_delay = Some(delay);
        self
    }

    /// Set the reinitialize threshold.
    pub fn with_reinitialize_threshold(mut self, threshold: u32) -> Self {
        self.reinitialize_threshold = threshold;
        self
    }

    /// Set the minimum read window.
    pub fn with_min_read_window(mut self, window: Duration) -> Self {
        self.min_read_window = window;
        self
    }

    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Purge delay for the default timeout.
    pub fn purge_delay(&self) -> Duration {
        self.purge_delay_for(self.timeout)
    }

    /// Purge delay for a call made with `timeout`.
    pub fn purge_delay_for(&self, timeout: Duration) -> Duration {
        self.purge_delay.unwrap_or(timeout / 4)
    }

    /// Check the configuration for values the channel cannot work with.
    pub fn validate(&self) -> FinsResult<()> {
        if self.host.trim().is_empty() {
            return Err(FinsError::configuration("host must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(FinsError::configuration("timeout must be greater than zero"));
        }
        if self.reinitialize_threshold == 0 {
            return Err(FinsError::configuration(
                "reinitialize threshold must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_FINS_PORT,
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            purge_delay: None,
            reinitialize_threshold: DEFAULT_REINITIALIZE_THRESHOLD,
            min_read_window: MIN_READ_WINDOW,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ChannelConfig::new("plc.local");
        assert_eq!(config.port, 9600);
        assert_eq!(config.timeout, Duration::from_millis(2000));
        assert_eq!(config.retries, 1);
        assert_eq!(config.reinitialize_threshold, 5);
        assert_eq!(config.min_read_window, Duration::from_millis(50));
        assert_eq!(config.purge_delay(), Duration::from_millis(500));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = ChannelConfig::new("10.0.0.5")
            .with_port(9601)
            .with_timeout(Duration::from_millis(800))
            .with_retries(0)
            .with_purge_delay(Duration::from_millis(20))
            .with_reinitialize_threshold(3)
            .with_min_read_window(Duration::from_millis(10));

        assert_eq!(config.endpoint(), "10.0.0.5:9601");
        assert_eq!(config.retries, 0);
        assert_eq!(config.purge_delay_for(Duration::from_secs(10)), Duration::from_millis(20));
        assert_eq!(config.reinitialize_threshold, 3);
    }

    #[test]
    fn test_purge_delay_follows_call_timeout() {
        let config = ChannelConfig::new("10.0.0.5");
        assert_eq!(
            config.purge_delay_for(Duration::from_millis(400)),
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        assert!(ChannelConfig::default().validate().is_err());
        assert!(ChannelConfig::new("  ").validate().is_err());
        assert!(ChannelConfig::new("plc")
            .with_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(matches!(
            ChannelConfig::new("plc")
                .with_reinitialize_threshold(0)
                .validate(),
            Err(FinsError::Configuration { .. })
        ));
    }
}
