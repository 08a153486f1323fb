//! # Voltage FINS - Omron FINS/TCP Client Library
//!
//! **Author:** Evan Liu <liuyifanz.1996@gmail.com>
//! **License:** MIT
//!
//! An async client for Omron's FINS protocol over TCP, for reading and
//! writing memory, clock and status on NJ/NX/NY/CJ/CP PLCs.
//!
//! ## Features
//!
//! - **Node Negotiation**: automatic FINS node address handshake after connect
//! - **Single-Flight Channel**: many tasks share one connection, one request on the wire at a time
//! - **Timeout Budgets**: connect, send and receive of an attempt draw from one deadline
//! - **Recovery**: retries on a fresh connection, stale-response purge, reinitialize signal
//! - **Typed Errors**: socket, framing, TCP error codes and FINS end codes kept apart
//!
//! ## Layers
//!
//! | Layer | Module |
//! |-------|--------|
//! | Commands (memory, clock, cycle time) | [`command`] |
//! | FINS envelope (10-byte header + function codes) | [`envelope`] |
//! | TCP encapsulation (16-byte `FINS` header) | [`frame`] |
//! | Node address negotiation | [`handshake`] |
//! | Request pipeline | [`channel`] |
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use voltage_fins::{ChannelConfig, FinsResult, FinsTcpClient, MemoryWordArea};
//!
//! #[tokio::main]
//! async fn main() -> FinsResult<()> {
//!     let config = ChannelConfig::new("192.168.250.1").with_timeout(Duration::from_secs(1));
//!     let client = FinsTcpClient::connect(config).await?;
//!
//!     let words = client.read_words(MemoryWordArea::DataMemory, 0, 4).await?;
//!     println!("D0..D3: {:?}", words);
//!
//!     let clock = client.read_clock().await?;
//!     println!("PLC clock: {}", clock.date_time);
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// FINS/TCP protocol constants
pub mod constants;

/// TCP error codes, end codes and socket error mapping
pub mod classify;

/// FINS envelope codec
pub mod envelope;

/// FINS/TCP frame codec
pub mod frame;

/// Node address negotiation
pub mod handshake;

/// Request pipeline
pub mod channel;

/// FINS commands
pub mod command;

/// High-level client
pub mod client;

/// Channel configuration
pub mod config;

/// Connection health signal
pub mod health;

/// Logging collaborator
pub mod logging;

/// Time budgets and formatting helpers
pub mod utils;

// ============================================================================
// Re-exports for convenience
// ============================================================================

// === Async runtime (users can use voltage_fins::tokio) ===
pub use tokio;

// === Core client API ===
pub use channel::{ChannelStats, FinsTcpChannel, ProcessRequestResult, ServiceIdCounter};
pub use client::FinsTcpClient;
pub use config::ChannelConfig;

// === Error handling ===
pub use classify::{EndCode, TcpErrorCode};
pub use error::{FinsError, FinsResult, FramingError};

// === Core types ===
pub use envelope::{FinsRequest, FinsResponse, NodeIds};
pub use frame::TcpCommand;

// === Commands ===
pub use command::{
    ClockReading, Command, CycleTime, MemoryBitArea, MemoryWordArea, ReadBits, ReadClock,
    ReadCycleTime, ReadWords, WriteBits, WriteClock, WriteWords,
};

// === Monitoring ===
pub use health::ChannelHealth;

// === Logging ===
pub use logging::{CallbackLogger, LogCallback, LogLevel, LoggingMode};

/// Default timeout for operations (2 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 2000;

/// FINS/TCP default port
pub const DEFAULT_TCP_PORT: u16 = constants::DEFAULT_FINS_PORT;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Voltage FINS v{} - Omron FINS/TCP client library by Evan Liu",
        VERSION
    )
}
