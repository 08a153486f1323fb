//! FINS/TCP protocol constants
//!
//! Values come from the Omron FINS/TCP encapsulation (W342 manual, section 7):
//! - Every TCP frame starts with a 16-byte header (`"FINS"`, length, command, error code)
//! - The FINS envelope inside a frame starts with a 10-byte header and 2 function code bytes

use std::time::Duration;

// ============================================================================
// TCP Encapsulation Header
// ============================================================================

/// FINS/TCP header length
/// Format: Magic(4) + Length(4) + Reserved(3) + Command(1) + Reserved(3) + Error Code(1) = 16 bytes
pub const TCP_HEADER_LEN: usize = 16;

/// Magic bytes at the start of every FINS/TCP frame
pub const FINS_MAGIC: [u8; 4] = *b"FINS";

/// Bytes counted by the length field besides the payload (command + error code words)
pub const TCP_LENGTH_OVERHEAD: usize = 8;

/// Largest payload accepted after the TCP header (`i16::MAX`)
pub const MAX_TCP_BODY_LEN: usize = 32767;

/// Offset of the command code byte in the TCP header
pub const TCP_COMMAND_OFFSET: usize = 11;

/// Offset of the error code byte in the TCP header
pub const TCP_ERROR_OFFSET: usize = 15;

/// Handshake request payload length (client node address, 0 = auto-assign)
pub const HANDSHAKE_REQUEST_LEN: usize = 4;

/// Minimum handshake response payload length
/// Format: Client Node(4) + Server Node(4); the node id is the last byte of each word
pub const HANDSHAKE_RESPONSE_LEN: usize = 8;

/// Receive buffer size used for each socket read
pub const RECEIVE_CHUNK_SIZE: usize = 4096;

// ============================================================================
// FINS Envelope
// ============================================================================

/// FINS header length (ICF, RSV, GCT, DNA, DA1, DA2, SNA, SA1, SA2, SID)
pub const FINS_HEADER_LEN: usize = 10;

/// Main + sub function code bytes following the FINS header
pub const FINS_COMMAND_LEN: usize = 2;

/// End code bytes (main + sub) following the function codes of a response
pub const FINS_END_CODE_LEN: usize = 2;

/// Smallest TCP body accepted for a FINS frame command
///
/// Header(10) + Function Codes(2) + at least the main response code(1).
pub const MIN_FINS_FRAME_BODY_LEN: usize = FINS_HEADER_LEN + FINS_COMMAND_LEN + 1;

/// Information control field for commands (response required)
pub const ICF_COMMAND: u8 = 0x80;

/// Information control fields a PLC uses in response envelopes
pub const ICF_RESPONSES: [u8; 2] = [0xC0, 0xC1];

/// Permissible number of gateways for TCP requests
pub const GATEWAY_COUNT: u8 = 0x02;

// ============================================================================
// Channel Defaults
// ============================================================================

/// Default FINS port
pub const DEFAULT_FINS_PORT: u16 = 9600;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Default retry count (attempts = retries + 1)
pub const DEFAULT_RETRIES: u32 = 1;

/// Consecutive exhausted requests before the channel asks to be reinitialized
pub const DEFAULT_REINITIALIZE_THRESHOLD: u32 = 5;

/// Reads are skipped once less than this much of the budget remains
pub const MIN_READ_WINDOW: Duration = Duration::from_millis(50);

/// Scratch buffer size used while purging stale bytes
pub const PURGE_BUFFER_SIZE: usize = 2000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_constants() {
        assert_eq!(TCP_HEADER_LEN, 16);
        assert_eq!(&FINS_MAGIC, b"FINS");
        assert_eq!(MAX_TCP_BODY_LEN, i16::MAX as usize);
    }

    #[test]
    fn test_fins_frame_minimum() {
        assert_eq!(MIN_FINS_FRAME_BODY_LEN, 13);
        assert!(MIN_FINS_FRAME_BODY_LEN < FINS_HEADER_LEN + FINS_COMMAND_LEN + FINS_END_CODE_LEN);
    }

    #[test]
    fn test_header_offsets_inside_header() {
        assert!(TCP_COMMAND_OFFSET < TCP_HEADER_LEN);
        assert_eq!(TCP_ERROR_OFFSET, TCP_HEADER_LEN - 1);
    }
}
