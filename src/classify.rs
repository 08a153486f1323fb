//! Error classification
//!
//! Maps the three kinds of failure signals a FINS/TCP exchange produces into
//! [`FinsError`]:
//!
//! | Signal | Source | Result |
//! |--------|--------|--------|
//! | `std::io::Error` | socket | `Connection` / `Timeout` |
//! | TCP header error byte (offset 15) | PLC Ethernet unit | `Protocol(TcpErrorCode)` |
//! | FINS end code (main, sub) | PLC CPU unit | `Application` |

use std::fmt;
use std::io;

use crate::error::FinsError;

/// Error codes reported in the FINS/TCP header
///
/// | Code | Meaning |
/// |------|---------|
/// | 1 | FINS identifier (ASCII code) invalid |
/// | 2 | Data length too long |
/// | 3 | Command not supported |
/// | 20 | All connections in use |
/// | 21 | Specified node already connected |
/// | 22 | Protected node accessed from an unspecified IP address |
/// | 23 | Client FINS node address out of range |
/// | 24 | Same FINS node address used by client and server |
/// | 25 | No node addresses available for allocation |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpErrorCode {
    InvalidIdentifier,
    DataLengthTooLong,
    CommandNotSupported,
    AllConnectionsInUse,
    NodeAlreadyConnected,
    ProtectedNodeAccess,
    ClientNodeOutOfRange,
    DuplicateNodeAddress,
    NoNodeAddressesAvailable,
    /// Any code not listed above, carrying the raw byte
    Unknown(u8),
}

impl TcpErrorCode {
    /// Classify the raw error byte of a TCP header
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => TcpErrorCode::InvalidIdentifier,
            2 => TcpErrorCode::DataLengthTooLong,
            3 => TcpErrorCode::CommandNotSupported,
            20 => TcpErrorCode::AllConnectionsInUse,
            21 => TcpErrorCode::NodeAlreadyConnected,
            22 => TcpErrorCode::ProtectedNodeAccess,
            23 => TcpErrorCode::ClientNodeOutOfRange,
            24 => TcpErrorCode::DuplicateNodeAddress,
            25 => TcpErrorCode::NoNodeAddressesAvailable,
            other => TcpErrorCode::Unknown(other),
        }
    }

    /// Raw wire value
    pub fn to_u8(self) -> u8 {
        match self {
            TcpErrorCode::InvalidIdentifier => 1,
            TcpErrorCode::DataLengthTooLong => 2,
            TcpErrorCode::CommandNotSupported => 3,
            TcpErrorCode::AllConnectionsInUse => 20,
            TcpErrorCode::NodeAlreadyConnected => 21,
            TcpErrorCode::ProtectedNodeAccess => 22,
            TcpErrorCode::ClientNodeOutOfRange => 23,
            TcpErrorCode::DuplicateNodeAddress => 24,
            TcpErrorCode::NoNodeAddressesAvailable => 25,
            TcpErrorCode::Unknown(code) => code,
        }
    }

    /// Human-readable description
    pub fn description(self) -> &'static str {
        match self {
            TcpErrorCode::InvalidIdentifier => "the FINS identifier (ASCII code) was invalid",
            TcpErrorCode::DataLengthTooLong => "the data length is too long",
            TcpErrorCode::CommandNotSupported => "the command is not supported",
            TcpErrorCode::AllConnectionsInUse => "all connections are in use",
            TcpErrorCode::NodeAlreadyConnected => "the specified node is already connected",
            TcpErrorCode::ProtectedNodeAccess => {
                "attempt to access a protected node from an unspecified IP address"
            }
            TcpErrorCode::ClientNodeOutOfRange => "the client FINS node address is out of range",
            TcpErrorCode::DuplicateNodeAddress => {
                "the same FINS node address is being used by the client and server"
            }
            TcpErrorCode::NoNodeAddressesAvailable => {
                "all the node addresses available for allocation have been used"
            }
            TcpErrorCode::Unknown(_) => "unknown code",
        }
    }
}

impl fmt::Display for TcpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TcpErrorCode::Unknown(code) => write!(f, "unknown code '{}'", code),
            known => write!(f, "{} (code {})", known.description(), known.to_u8()),
        }
    }
}

/// FINS end code (main response code, sub response code)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndCode {
    pub main: u8,
    pub sub: u8,
}

impl EndCode {
    pub const NORMAL_COMPLETION: EndCode = EndCode { main: 0x00, sub: 0x00 };

    pub fn new(main: u8, sub: u8) -> Self {
        Self { main, sub }
    }

    /// Both codes zero
    pub fn is_success(self) -> bool {
        self.main == 0 && self.sub == 0
    }

    /// Description of the main code class
    pub fn description(self) -> &'static str {
        // Bit 7 of the main code flags a relay error, bits 6/7 of the sub code
        // flag CPU errors; neither changes the class.
        match self.main & 0x7F {
            0x00 => "normal completion",
            0x01 => "local node error",
            0x02 => "destination node error",
            0x03 => "controller error",
            0x04 => "service not supported",
            0x05 => "routing table error",
            0x10 => "command format error",
            0x11 => "parameter error",
            0x20 => "read not possible",
            0x21 => "write not possible",
            0x22 => "not executable in current mode",
            0x23 => "no such device",
            0x24 => "cannot start/stop",
            0x25 => "unit error",
            0x26 => "command error",
            0x30 => "access right error",
            0x40 => "abort",
            _ => "unknown end code",
        }
    }
}

impl fmt::Display for EndCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02X}{:02X} ({})", self.main, self.sub, self.description())
    }
}

/// Classify the error byte (and command byte) of a TCP header
///
/// Returns `None` for a header that does not signal an error.
pub fn classify_tcp_error(command: u8, error_code: u8) -> Option<FinsError> {
    if command == crate::frame::TcpCommand::Error.to_u8() || error_code != 0 {
        Some(FinsError::Protocol(TcpErrorCode::from_u8(error_code)))
    } else {
        None
    }
}

/// Classify a FINS end code
pub fn classify_end_code(end_code: EndCode, data: &[u8]) -> Result<(), FinsError> {
    if end_code.is_success() {
        Ok(())
    } else {
        Err(FinsError::application(end_code.main, end_code.sub, data.to_vec()))
    }
}

/// Classify a socket error
pub fn classify_io_error(context: &str, err: io::Error) -> FinsError {
    match err.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FinsError::Timeout {
            operation: format!("{context}: {err}"),
            timeout_ms: 0,
        },
        io::ErrorKind::UnexpectedEof
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::NotConnected => FinsError::connection_io(
            format!("{context} - the underlying socket connection was closed"),
            err,
        ),
        _ => FinsError::connection_io(context.to_string(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_error_table() {
        let table = [
            (1, TcpErrorCode::InvalidIdentifier),
            (2, TcpErrorCode::DataLengthTooLong),
            (3, TcpErrorCode::CommandNotSupported),
            (20, TcpErrorCode::AllConnectionsInUse),
            (21, TcpErrorCode::NodeAlreadyConnected),
            (22, TcpErrorCode::ProtectedNodeAccess),
            (23, TcpErrorCode::ClientNodeOutOfRange),
            (24, TcpErrorCode::DuplicateNodeAddress),
            (25, TcpErrorCode::NoNodeAddressesAvailable),
        ];

        for (raw, expected) in table {
            assert_eq!(TcpErrorCode::from_u8(raw), expected);
            assert_eq!(expected.to_u8(), raw);
            match classify_tcp_error(2, raw) {
                Some(FinsError::Protocol(code)) => assert_eq!(code, expected),
                other => panic!("unexpected classification for {}: {:?}", raw, other),
            }
        }
    }

    #[test]
    fn test_unknown_tcp_error_keeps_raw_value() {
        let code = TcpErrorCode::from_u8(99);
        assert_eq!(code, TcpErrorCode::Unknown(99));
        assert_eq!(code.to_u8(), 99);
        assert_eq!(code.to_string(), "unknown code '99'");
    }

    #[test]
    fn test_error_command_without_error_byte() {
        // Command 3 with a zero error byte is still a TCP-level error
        assert!(matches!(
            classify_tcp_error(3, 0),
            Some(FinsError::Protocol(TcpErrorCode::Unknown(0)))
        ));
        assert!(classify_tcp_error(2, 0).is_none());
        assert!(classify_tcp_error(1, 0).is_none());
    }

    #[test]
    fn test_end_code_classification() {
        assert!(classify_end_code(EndCode::NORMAL_COMPLETION, &[]).is_ok());

        let err = classify_end_code(EndCode::new(0x22, 0x01), &[0xAA]).unwrap_err();
        match err {
            FinsError::Application {
                main_code,
                sub_code,
                data,
            } => {
                assert_eq!((main_code, sub_code), (0x22, 0x01));
                assert_eq!(data, vec![0xAA]);
            }
            other => panic!("expected application error, got {:?}", other),
        }
    }

    #[test]
    fn test_end_code_description_ignores_flag_bits() {
        assert_eq!(EndCode::new(0x81, 0x01).description(), "local node error");
        assert_eq!(EndCode::new(0x11, 0x40).description(), "parameter error");
        assert_eq!(EndCode::new(0x11, 0x03).to_string(), "1103 (parameter error)");
    }

    #[test]
    fn test_io_error_classification() {
        let err = classify_io_error("send", io::Error::from(io::ErrorKind::TimedOut));
        assert!(matches!(err, FinsError::Timeout { .. }));

        let err = classify_io_error("send", io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, FinsError::Connection { .. }));
        assert!(err.to_string().contains("closed"));
    }
}
