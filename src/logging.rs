//! Request/response logging collaborator
//!
//! A [`CallbackLogger`] is handed to the channel at construction; there is no
//! process-wide logger. By default it forwards to `tracing`. Applications
//! that collect logs elsewhere install a callback instead.

use std::fmt;
use std::sync::Arc;

use crate::utils::hex_dump;

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Callback receiving formatted log lines
pub type LogCallback = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// Where log lines go
#[derive(Clone, Default)]
pub enum LoggingMode {
    /// Drop everything
    Disabled,
    /// Forward to `tracing` macros
    #[default]
    Tracing,
    /// Forward to a user callback
    Callback(LogCallback),
}

impl fmt::Debug for LoggingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingMode::Disabled => f.write_str("Disabled"),
            LoggingMode::Tracing => f.write_str("Tracing"),
            LoggingMode::Callback(_) => f.write_str("Callback(..)"),
        }
    }
}

/// Logger collaborator for request, response and raw frame events
#[derive(Debug, Clone, Default)]
pub struct CallbackLogger {
    mode: LoggingMode,
    min_level: Option<LogLevel>,
}

impl CallbackLogger {
    pub fn new(mode: LoggingMode) -> Self {
        Self {
            mode,
            min_level: None,
        }
    }

    /// Logger that drops everything
    pub fn disabled() -> Self {
        Self::new(LoggingMode::Disabled)
    }

    /// Logger that forwards every line to `callback`
    pub fn with_callback<F>(callback: F) -> Self
    where
        F: Fn(LogLevel, &str) + Send + Sync + 'static,
    {
        Self::new(LoggingMode::Callback(Arc::new(callback)))
    }

    /// Drop lines below `level`
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn mode(&self) -> &LoggingMode {
        &self.mode
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if self.min_level.is_some_and(|min| level < min) {
            return;
        }

        match &self.mode {
            LoggingMode::Disabled => {}
            LoggingMode::Tracing => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            LoggingMode::Callback(callback) => callback(level, message),
        }
    }

    /// Outgoing FINS command summary
    pub fn log_request(&self, service_id: u8, function_code: u8, sub_function_code: u8, body: &[u8]) {
        if matches!(self.mode, LoggingMode::Disabled) {
            return;
        }
        self.log(
            LogLevel::Debug,
            &format!(
                "FINS request: sid={} cmd={:02X}{:02X} body={}B",
                service_id,
                function_code,
                sub_function_code,
                body.len()
            ),
        );
    }

    /// Incoming FINS response summary
    pub fn log_response(&self, service_id: u8, main_code: u8, sub_code: u8, data: &[u8]) {
        if matches!(self.mode, LoggingMode::Disabled) {
            return;
        }
        self.log(
            LogLevel::Debug,
            &format!(
                "FINS response: sid={} end={:02X}{:02X} data={}B",
                service_id,
                main_code,
                sub_code,
                data.len()
            ),
        );
    }

    /// Raw frame bytes, `direction` is "TX" or "RX"
    pub fn log_frame(&self, direction: &str, frame: &[u8]) {
        if matches!(self.mode, LoggingMode::Disabled) {
            return;
        }
        self.log(
            LogLevel::Trace,
            &format!("{} {}B: {}", direction, frame.len(), hex_dump(frame)),
        );
    }
}
