//! Error types for FINS/TCP communication
//!
//! Every public operation returns [`FinsResult`]. The variants follow the
//! layers a request passes through: socket ([`FinsError::Connection`]),
//! node negotiation ([`FinsError::Handshake`]), TCP framing
//! ([`FinsError::Framing`], [`FinsError::Protocol`]) and the FINS application
//! layer ([`FinsError::Application`], [`FinsError::ServiceIdMismatch`]).

use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::classify::{EndCode, TcpErrorCode};

/// Result type alias for FINS operations
pub type FinsResult<T> = std::result::Result<T, FinsError>;

/// Errors that can occur during FINS/TCP communication
#[derive(Debug, Error)]
pub enum FinsError {
    /// Socket create/connect/send/receive failure, or the peer closed the connection
    #[error("Connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// Node address negotiation failed after connecting
    #[error("Failed to negotiate connection with {endpoint}: {message}")]
    Handshake {
        endpoint: String,
        message: String,
        #[source]
        source: Option<Box<FinsError>>,
    },

    /// The byte stream did not contain a well-formed FINS/TCP frame
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),

    /// The PLC reported an error in the TCP encapsulation header
    #[error("FINS/TCP error: {0}")]
    Protocol(TcpErrorCode),

    /// The PLC answered with a non-zero FINS end code
    #[error("FINS error response: main code 0x{main_code:02X}, sub code 0x{sub_code:02X}")]
    Application {
        main_code: u8,
        sub_code: u8,
        /// Response data following the end code (diagnostics for some commands)
        data: Vec<u8>,
    },

    /// The response echoed a different service id than the request carried
    #[error("Service ID mismatch: expected 0x{expected:02X}, received 0x{received:02X}")]
    ServiceIdMismatch { expected: u8, received: u8 },

    /// A phase exceeded its time budget
    #[error("Timeout: {operation} (budget {timeout_ms}ms)")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Exclusive access to the channel was not acquired in time
    #[error("Timed out after {timeout_ms}ms waiting for exclusive channel access")]
    ConcurrencyTimeout { timeout_ms: u64 },

    /// The caller cancelled the operation
    #[error("Operation cancelled")]
    Cancelled,

    /// Every attempt failed; `source` is the last failure
    #[error("Max retries exceeded after {attempts} attempts: {source}")]
    MaxRetriesExceeded {
        attempts: u32,
        #[source]
        source: Box<FinsError>,
    },

    /// `process` was called before a successful `initialize`
    #[error("Channel is not initialized")]
    NotInitialized,

    /// A node id outside 1-254, or local and remote ids that collide
    #[error("Invalid {role} node id {value}: {reason}")]
    InvalidNodeId {
        role: &'static str,
        value: u8,
        reason: &'static str,
    },

    /// Invalid configuration values
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Command parameters or response data could not be encoded/decoded
    #[error("Invalid data: {message}")]
    InvalidData { message: String },
}

/// Reasons a received byte stream is rejected by the frame codec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FramingError {
    /// Nothing arrived before the budget was spent
    #[error("no data was received")]
    NoData,

    /// Some bytes arrived but not a full 16-byte header
    #[error("incomplete TCP header after timeout ({received} of 16 bytes)")]
    IncompleteHeader { received: usize },

    /// The first four bytes were not `FINS`
    #[error("invalid TCP header magic {0:02X?}")]
    InvalidMagic([u8; 4]),

    /// Declared body length was non-positive or above the protocol maximum
    #[error("invalid TCP message length {0}")]
    InvalidLength(i64),

    /// Reserved header bytes were set or the command differed from the expected one
    #[error("TCP command {received} did not match expected command {expected}")]
    UnexpectedCommand { expected: u8, received: u8 },

    /// A FINS frame body cannot hold an envelope header and response code
    #[error("TCP message length {0} is too short for a FINS frame")]
    TooShortForFins(usize),

    /// The header arrived but no body bytes followed
    #[error("no data was received after the TCP header")]
    NoDataAfterHeader,

    /// The body was still incomplete when the budget ran out
    #[error("incomplete message body after timeout ({received} of {expected} bytes)")]
    IncompleteBody { expected: usize, received: usize },

    /// The first envelope byte was not a FINS response marker (0xC0/0xC1)
    #[error("invalid FINS response header marker 0x{0:02X}")]
    InvalidResponseMarker(u8),
}

impl FinsError {
    /// Create a connection error without an underlying I/O cause
    pub fn connection<S: Into<String>>(message: S) -> Self {
        FinsError::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection error wrapping an I/O cause
    pub fn connection_io<S: Into<String>>(message: S, source: io::Error) -> Self {
        FinsError::Connection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a handshake error
    pub fn handshake<E: Into<String>, S: Into<String>>(endpoint: E, message: S) -> Self {
        FinsError::Handshake {
            endpoint: endpoint.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, budget: Duration) -> Self {
        FinsError::Timeout {
            operation: operation.into(),
            timeout_ms: budget.as_millis() as u64,
        }
    }

    /// Create a concurrency timeout error
    pub fn concurrency_timeout(budget: Duration) -> Self {
        FinsError::ConcurrencyTimeout {
            timeout_ms: budget.as_millis() as u64,
        }
    }

    /// Create an application error from a FINS end code
    pub fn application(main_code: u8, sub_code: u8, data: Vec<u8>) -> Self {
        FinsError::Application {
            main_code,
            sub_code,
            data,
        }
    }

    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        FinsError::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid data error
    pub fn invalid_data<S: Into<String>>(message: S) -> Self {
        FinsError::InvalidData {
            message: message.into(),
        }
    }

    /// Whether the request pipeline may absorb this error with a reconnect + resend
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FinsError::Connection { .. }
                | FinsError::Handshake { .. }
                | FinsError::Framing(_)
                | FinsError::Protocol(_)
                | FinsError::Timeout { .. }
        )
    }

    /// Whether this is (or wraps) a timeout of any kind
    pub fn is_timeout(&self) -> bool {
        match self {
            FinsError::Timeout { .. } | FinsError::ConcurrencyTimeout { .. } => true,
            FinsError::MaxRetriesExceeded { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// The FINS end code carried by an application error
    pub fn end_code(&self) -> Option<EndCode> {
        match self {
            FinsError::Application {
                main_code,
                sub_code,
                ..
            } => Some(EndCode::new(*main_code, *sub_code)),
            _ => None,
        }
    }

    /// The innermost error, unwrapping `MaxRetriesExceeded`
    pub fn last_error(&self) -> &FinsError {
        match self {
            FinsError::MaxRetriesExceeded { source, .. } => source.last_error(),
            other => other,
        }
    }
}

impl From<io::Error> for FinsError {
    fn from(err: io::Error) -> Self {
        crate::classify::classify_io_error("socket I/O failed", err)
    }
}
