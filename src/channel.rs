//! FINS/TCP request pipeline
//!
//! [`FinsTcpChannel`] owns one TCP connection to a PLC and the node ids
//! negotiated on it. Requests are single-flight: every socket use happens
//! under one `tokio::sync::Mutex`, whose FIFO fairness gives callers
//! arrival-order service.
//!
//! ## Attempt cycle
//!
//! ```text
//! lock -> [reconnect on retry] -> sid++ -> encode -> send -> read frame -> unlock
//! ```
//!
//! Each attempt draws the lock wait, reconnect, send and receive from one
//! [`Deadline`].
//! A failed attempt drops the socket and releases the lock before the next
//! attempt re-acquires it, so other callers may run in between. Once the
//! retries are exhausted the consecutive-error counter grows; reaching the
//! configured threshold asks the owner to reinitialize the channel.
//!
//! The FINS response is validated after the loop: a service id mismatch
//! purges stale bytes from the socket before anything is reported, and a
//! non-zero end code surfaces as [`FinsError::Application`] ahead of the
//! mismatch itself.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::classify::classify_io_error;
use crate::config::ChannelConfig;
use crate::constants::PURGE_BUFFER_SIZE;
use crate::envelope::{encode_request, FinsRequest, FinsResponse, NodeIds};
use crate::error::{FinsError, FinsResult};
use crate::frame::{encode_frame, read_frame, TcpCommand};
use crate::handshake;
use crate::health::{ChannelHealth, HealthSignal};
use crate::logging::CallbackLogger;
use crate::utils::Deadline;

/// Wrapping FINS service id source
///
/// Pre-increments, so a fresh counter hands out 1 first and 0 follows 255.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceIdCounter {
    current: u8,
}

impl ServiceIdCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter whose next id is `start + 1`
    pub fn starting_at(start: u8) -> Self {
        Self { current: start }
    }

    pub fn next_id(&mut self) -> u8 {
        self.current = self.current.wrapping_add(1);
        self.current
    }

    /// Last id handed out
    pub fn current(&self) -> u8 {
        self.current
    }
}

/// Outcome of a processed request
///
/// Counters cover every attempt of the call; `response` comes from the
/// attempt that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessRequestResult {
    pub bytes_sent: usize,
    pub packets_sent: usize,
    pub bytes_received: usize,
    pub packets_received: usize,
    pub duration: Duration,
    pub response: FinsResponse,
}

/// Cumulative channel counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub requests_sent: u64,
    pub responses_received: u64,
    /// Calls that ended in an error
    pub errors: u64,
    /// Attempts beyond the first
    pub retries: u64,
    /// Connections established, initialize included
    pub connects: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
}

#[derive(Debug, Default)]
struct StatsCounters {
    requests_sent: AtomicU64,
    responses_received: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
    connects: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl StatsCounters {
    fn bump(counter: &AtomicU64, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
    }

    fn snapshot(&self) -> ChannelStats {
        ChannelStats {
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            responses_received: self.responses_received.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
        }
    }
}

/// Socket state guarded by the single-flight lock
#[derive(Debug, Default)]
struct ChannelState {
    stream: Option<TcpStream>,
    nodes: Option<NodeIds>,
    service_ids: ServiceIdCounter,
}

#[derive(Debug, Default)]
struct Telemetry {
    bytes_sent: usize,
    packets_sent: usize,
    bytes_received: usize,
    packets_received: usize,
}

/// Ethernet/TCP channel to one PLC
#[derive(Debug)]
pub struct FinsTcpChannel {
    config: ChannelConfig,
    endpoint: String,
    state: Mutex<ChannelState>,
    initialized: AtomicBool,
    local_node: AtomicU8,
    remote_node: AtomicU8,
    consecutive_errors: AtomicU32,
    health: HealthSignal,
    stats: StatsCounters,
    logger: CallbackLogger,
}

impl FinsTcpChannel {
    /// Create an unconnected channel; call [`initialize`](Self::initialize) next
    pub fn new(config: ChannelConfig) -> FinsResult<Self> {
        Self::with_logger(config, CallbackLogger::default())
    }

    pub fn with_logger(config: ChannelConfig, logger: CallbackLogger) -> FinsResult<Self> {
        config.validate()?;
        Ok(Self {
            endpoint: config.endpoint(),
            config,
            state: Mutex::new(ChannelState::default()),
            initialized: AtomicBool::new(false),
            local_node: AtomicU8::new(0),
            remote_node: AtomicU8::new(0),
            consecutive_errors: AtomicU32::new(0),
            health: HealthSignal::new(),
            stats: StatsCounters::default(),
            logger,
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// `host:port` of the PLC
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Node ids from the latest handshake, `None` before initialize or after close
    pub fn node_ids(&self) -> Option<NodeIds> {
        NodeIds::new(
            self.local_node.load(Ordering::Acquire),
            self.remote_node.load(Ordering::Acquire),
        )
        .ok()
    }

    pub fn local_node_id(&self) -> Option<u8> {
        self.node_ids().map(|n| n.local())
    }

    pub fn remote_node_id(&self) -> Option<u8> {
        self.node_ids().map(|n| n.remote())
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors.load(Ordering::Acquire)
    }

    pub fn health(&self) -> ChannelHealth {
        self.health.current()
    }

    /// Subscribe to health changes
    pub fn subscribe_health(&self) -> watch::Receiver<ChannelHealth> {
        self.health.subscribe()
    }

    /// Times the channel has asked to be reinitialized
    pub fn reinitialize_requests(&self) -> u64 {
        self.health.reinitialize_requests()
    }

    pub fn stats(&self) -> ChannelStats {
        self.stats.snapshot()
    }

    /// Connect and negotiate node ids, replacing any existing connection
    pub async fn initialize(&self, timeout: Duration) -> FinsResult<()> {
        self.initialize_with_cancel(timeout, &CancellationToken::new())
            .await
    }

    pub async fn initialize_with_cancel(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> FinsResult<()> {
        let deadline = Deadline::after(timeout);
        let mut state = self.acquire(&deadline, cancel).await?;
        self.initialized.store(false, Ordering::Release);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FinsError::Cancelled),
            r = self.reconnect(&mut state, &deadline, "failed to connect to PLC") => r,
        };

        if let Err(e) = result {
            state.stream = None;
            warn!("FINS initialize of {} failed: {}", self.endpoint, e);
            return Err(e);
        }

        self.initialized.store(true, Ordering::Release);
        self.consecutive_errors.store(0, Ordering::Release);
        self.health.mark_healthy();
        info!(
            "FINS channel connected to {} (local node {}, remote node {})",
            self.endpoint,
            self.local_node.load(Ordering::Acquire),
            self.remote_node.load(Ordering::Acquire)
        );
        Ok(())
    }

    /// Release the connection; the channel must be initialized again before use
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if let Some(mut stream) = state.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("FINS shutdown of {}: {}", self.endpoint, e);
            }
        }
        state.nodes = None;
        self.local_node.store(0, Ordering::Release);
        self.remote_node.store(0, Ordering::Release);
        self.initialized.store(false, Ordering::Release);
        info!("FINS channel to {} closed", self.endpoint);
    }

    /// Send `request` and wait for its response with the configured defaults
    pub async fn execute(&self, request: &FinsRequest) -> FinsResult<ProcessRequestResult> {
        self.process(request, self.config.timeout, self.config.retries)
            .await
    }

    /// Send `request` and wait for its response
    ///
    /// `timeout` is the budget of each attempt, lock wait included.
    /// Attempts = `retries + 1`.
    pub async fn process(
        &self,
        request: &FinsRequest,
        timeout: Duration,
        retries: u32,
    ) -> FinsResult<ProcessRequestResult> {
        self.process_with_cancel(request, timeout, retries, &CancellationToken::new())
            .await
    }

    /// [`process`](Self::process) that stops waiting when `cancel` fires
    pub async fn process_with_cancel(
        &self,
        request: &FinsRequest,
        timeout: Duration,
        retries: u32,
        cancel: &CancellationToken,
    ) -> FinsResult<ProcessRequestResult> {
        let result = self.run_request(request, timeout, retries, cancel).await;
        if result.is_err() {
            StatsCounters::bump(&self.stats.errors, 1);
        }
        result
    }

    async fn run_request(
        &self,
        request: &FinsRequest,
        timeout: Duration,
        retries: u32,
        cancel: &CancellationToken,
    ) -> FinsResult<ProcessRequestResult> {
        if !self.is_initialized() {
            return Err(FinsError::NotInitialized);
        }

        let started = Instant::now();
        let mut telemetry = Telemetry::default();
        let mut attempt = 0u32;

        let (service_id, payload) = loop {
            let deadline = Deadline::after(timeout);
            let mut state = self.acquire(&deadline, cancel).await?;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(FinsError::Cancelled),
                r = self.attempt(&mut state, request, attempt, &deadline, &mut telemetry) => r,
            };

            match result {
                Ok(exchange) => break exchange,
                Err(e) => {
                    // Whatever is left on the socket belongs to the failed attempt
                    state.stream = None;
                    drop(state);

                    if !e.is_retryable() {
                        return Err(e);
                    }

                    warn!(
                        "FINS attempt {}/{} to {} failed: {}",
                        attempt + 1,
                        retries.saturating_add(1),
                        self.endpoint,
                        e
                    );

                    if attempt >= retries {
                        return Err(self.retries_exhausted(attempt + 1, e));
                    }
                    attempt += 1;
                    StatsCounters::bump(&self.stats.retries, 1);
                }
            }
        };

        self.consecutive_errors.store(0, Ordering::Release);
        self.health.mark_healthy();
        StatsCounters::bump(&self.stats.responses_received, 1);

        let response = FinsResponse::parse(&payload)?;
        self.logger.log_response(
            response.service_id(),
            response.end_code.main,
            response.end_code.sub,
            &response.data,
        );

        // Purge on a mismatch, but report a failing end code ahead of it
        let out_of_sequence = response.check_service_id(service_id).err();
        if let Some(e) = &out_of_sequence {
            warn!("FINS response from {} out of sequence: {}", self.endpoint, e);
            self.purge_receive_buffer(timeout, cancel).await;
        }
        response.check_end_code()?;
        if let Some(e) = out_of_sequence {
            return Err(e);
        }

        Ok(ProcessRequestResult {
            bytes_sent: telemetry.bytes_sent,
            packets_sent: telemetry.packets_sent,
            bytes_received: telemetry.bytes_received,
            packets_received: telemetry.packets_received,
            duration: started.elapsed(),
            response,
        })
    }

    /// One send/receive cycle under the lock
    async fn attempt(
        &self,
        state: &mut ChannelState,
        request: &FinsRequest,
        attempt: u32,
        deadline: &Deadline,
        telemetry: &mut Telemetry,
    ) -> FinsResult<(u8, Bytes)> {
        if attempt > 0 || state.stream.is_none() {
            self.reconnect(state, deadline, "failed to re-connect to PLC")
                .await?;
        }

        let nodes = state.nodes.ok_or(FinsError::NotInitialized)?;
        let service_id = state.service_ids.next_id();
        let envelope = encode_request(request, nodes, service_id);
        let frame = encode_frame(TcpCommand::FinsFrame, &envelope);

        self.logger.log_request(
            service_id,
            request.function_code,
            request.sub_function_code,
            &request.body,
        );
        self.logger.log_frame("TX", &frame);

        let stream = state
            .stream
            .as_mut()
            .ok_or_else(|| FinsError::connection("no open connection"))?;

        deadline
            .run("send FINS message", async {
                stream
                    .write_all(&frame)
                    .await
                    .map_err(|e| classify_io_error("failed to send FINS message", e))
            })
            .await?;
        telemetry.bytes_sent += frame.len();
        telemetry.packets_sent += 1;
        StatsCounters::bump(&self.stats.requests_sent, 1);
        StatsCounters::bump(&self.stats.bytes_sent, frame.len() as u64);

        let received = read_frame(
            stream,
            TcpCommand::FinsFrame,
            deadline,
            self.config.min_read_window,
        )
        .await?;
        telemetry.bytes_received += received.bytes;
        telemetry.packets_received += received.packets;
        StatsCounters::bump(&self.stats.bytes_received, received.bytes as u64);
        self.logger.log_frame("RX", &received.payload);

        Ok((service_id, received.payload))
    }

    /// Drop the current socket, connect a new one and negotiate node ids
    async fn reconnect(
        &self,
        state: &mut ChannelState,
        deadline: &Deadline,
        context: &str,
    ) -> FinsResult<()> {
        state.stream = None;

        let context = format!("{} '{}'", context, self.endpoint);
        let endpoint = self.endpoint.as_str();
        let mut stream = deadline
            .run(&context, async {
                TcpStream::connect(endpoint)
                    .await
                    .map_err(|e| classify_io_error(&context, e))
            })
            .await?;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY on {}: {}", self.endpoint, e);
        }

        let negotiated = handshake::negotiate(
            &mut stream,
            &self.endpoint,
            deadline,
            self.config.min_read_window,
        )
        .await?;

        state.nodes = Some(negotiated.nodes);
        state.stream = Some(stream);
        self.local_node
            .store(negotiated.nodes.local(), Ordering::Release);
        self.remote_node
            .store(negotiated.nodes.remote(), Ordering::Release);
        StatsCounters::bump(&self.stats.connects, 1);
        debug!(
            "Connected to {} ({}B handshake out, {}B in)",
            self.endpoint, negotiated.bytes_sent, negotiated.bytes_received
        );
        Ok(())
    }

    /// Wait for the single-flight lock out of `deadline`
    async fn acquire(
        &self,
        deadline: &Deadline,
        cancel: &CancellationToken,
    ) -> FinsResult<MutexGuard<'_, ChannelState>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FinsError::Cancelled),
            guard = tokio::time::timeout(deadline.remaining(), self.state.lock()) => {
                guard.map_err(|_| FinsError::concurrency_timeout(deadline.budget()))
            }
        }
    }

    fn retries_exhausted(&self, attempts: u32, last: FinsError) -> FinsError {
        let errors = self.consecutive_errors.fetch_add(1, Ordering::AcqRel) + 1;
        if errors == self.config.reinitialize_threshold {
            warn!(
                "FINS channel to {} failed {} consecutive requests, needs reinitialize",
                self.endpoint, errors
            );
            self.health.request_reinitialize();
        }

        FinsError::MaxRetriesExceeded {
            attempts,
            source: Box::new(last),
        }
    }

    /// Best-effort discard of unread bytes; never fails
    async fn purge_receive_buffer(&self, timeout: Duration, cancel: &CancellationToken) {
        let deadline = Deadline::after(timeout);
        let Ok(mut state) = self.acquire(&deadline, cancel).await else {
            return;
        };
        let Some(stream) = state.stream.as_mut() else {
            return;
        };

        let delay = self.config.purge_delay_for(timeout);
        let mut buf = [0u8; PURGE_BUFFER_SIZE];
        let mut purged = 0usize;
        let mut waited = false;

        while !deadline.is_expired() {
            match stream.try_read(&mut buf) {
                Ok(0) => break,
                Ok(n) => purged += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if waited {
                        break;
                    }
                    // Give a slow PLC time to flush its stale reply
                    waited = true;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay.min(deadline.remaining())) => {}
                    }
                }
                Err(_) => break,
            }
        }

        debug!("Purged {}B from {}", purged, self.endpoint);
    }
}
