//! High-level FINS/TCP client
//!
//! [`FinsTcpClient`] pairs a shared [`FinsTcpChannel`] with the configured
//! timeout and retry defaults and runs [`Command`]s through it. Clones share
//! the channel, so many tasks can issue requests concurrently; the channel
//! serializes them on the wire.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use voltage_fins::{ChannelConfig, FinsResult, FinsTcpClient, MemoryWordArea};
//!
//! #[tokio::main]
//! async fn main() -> FinsResult<()> {
//!     let client = FinsTcpClient::connect(ChannelConfig::new("192.168.250.1")).await?;
//!
//!     // Read 10 words from D100
//!     let words = client.read_words(MemoryWordArea::DataMemory, 100, 10).await?;
//!     println!("D100..D109: {:?}", words);
//!
//!     // Write a value to D200
//!     client.write_words(MemoryWordArea::DataMemory, 200, &[0x1234]).await?;
//!
//!     client.close().await;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::channel::{ChannelStats, FinsTcpChannel, ProcessRequestResult};
use crate::command::{
    ClockReading, Command, CycleTime, MemoryBitArea, MemoryWordArea, ReadBits, ReadClock,
    ReadCycleTime, ReadWords, WriteBits, WriteClock, WriteWords,
};
use crate::config::ChannelConfig;
use crate::error::FinsResult;
use crate::health::ChannelHealth;
use crate::logging::CallbackLogger;

/// FINS/TCP client for one PLC
#[derive(Debug, Clone)]
pub struct FinsTcpClient {
    channel: Arc<FinsTcpChannel>,
}

impl FinsTcpClient {
    /// Create the channel and initialize it
    pub async fn connect(config: ChannelConfig) -> FinsResult<Self> {
        Self::with_logging(config, None).await
    }

    /// Create the channel with a logger and initialize it
    pub async fn with_logging(
        config: ChannelConfig,
        logger: Option<CallbackLogger>,
    ) -> FinsResult<Self> {
        let timeout = config.timeout;
        let channel = FinsTcpChannel::with_logger(config, logger.unwrap_or_default())?;
        channel.initialize(timeout).await?;
        Ok(Self::from_channel(Arc::new(channel)))
    }

    /// Wrap an existing channel (initialized or not)
    pub fn from_channel(channel: Arc<FinsTcpChannel>) -> Self {
        Self { channel }
    }

    pub fn channel(&self) -> &Arc<FinsTcpChannel> {
        &self.channel
    }

    pub fn health(&self) -> ChannelHealth {
        self.channel.health()
    }

    pub fn stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    /// Re-run the handshake on a fresh connection
    pub async fn reinitialize(&self) -> FinsResult<()> {
        info!("Reinitializing FINS channel to {}", self.channel.endpoint());
        self.channel.initialize(self.channel.config().timeout).await
    }

    pub async fn close(&self) {
        self.channel.close().await;
    }

    /// Run a command with the configured timeout and retries
    pub async fn execute<C: Command>(&self, command: &C) -> FinsResult<C::Output> {
        let config = self.channel.config();
        let (output, _) = self
            .execute_with(command, config.timeout, config.retries, &CancellationToken::new())
            .await?;
        Ok(output)
    }

    /// Run a command with explicit limits; also returns the transfer telemetry
    pub async fn execute_with<C: Command>(
        &self,
        command: &C,
        timeout: Duration,
        retries: u32,
        cancel: &CancellationToken,
    ) -> FinsResult<(C::Output, ProcessRequestResult)> {
        let request = command.request();
        let result = self
            .channel
            .process_with_cancel(&request, timeout, retries, cancel)
            .await?;
        let output = command.decode(&result.response)?;
        Ok((output, result))
    }

    pub async fn read_words(
        &self,
        area: MemoryWordArea,
        address: u16,
        count: u16,
    ) -> FinsResult<Vec<u16>> {
        self.execute(&ReadWords::new(area, address, count)?).await
    }

    pub async fn write_words(
        &self,
        area: MemoryWordArea,
        address: u16,
        values: &[u16],
    ) -> FinsResult<()> {
        self.execute(&WriteWords::new(area, address, values)?).await
    }

    pub async fn read_bits(
        &self,
        area: MemoryBitArea,
        address: u16,
        bit: u8,
        count: u16,
    ) -> FinsResult<Vec<bool>> {
        self.execute(&ReadBits::new(area, address, bit, count)?).await
    }

    pub async fn write_bits(
        &self,
        area: MemoryBitArea,
        address: u16,
        bit: u8,
        values: &[bool],
    ) -> FinsResult<()> {
        self.execute(&WriteBits::new(area, address, bit, values)?)
            .await
    }

    pub async fn read_clock(&self) -> FinsResult<ClockReading> {
        self.execute(&ReadClock).await
    }

    pub async fn write_clock(&self, date_time: NaiveDateTime) -> FinsResult<()> {
        self.execute(&WriteClock::new(date_time)?).await
    }

    pub async fn read_cycle_time(&self) -> FinsResult<CycleTime> {
        self.execute(&ReadCycleTime).await
    }
}
