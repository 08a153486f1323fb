//! FINS/TCP frame codec
//!
//! Every unit on the wire is a 16-byte encapsulation header followed by a
//! payload (a handshake word pair or a FINS envelope):
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | `"FINS"` |
//! | 4 | 4 | Length, big-endian (= 8 + payload length) |
//! | 8 | 3 | Reserved (0) |
//! | 11 | 1 | Command code |
//! | 12 | 3 | Reserved (0) |
//! | 15 | 1 | Error code (0 = success) |
//!
//! Decoding reads from a byte stream that may deliver a frame in arbitrary
//! pieces. Each socket read is bounded by what is left of the caller's
//! [`Deadline`]; once less than the minimum read window remains the read is
//! not attempted and the budget counts as spent.

use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, warn};

use crate::classify::{classify_io_error, classify_tcp_error};
use crate::constants::{
    FINS_MAGIC, ICF_RESPONSES, MAX_TCP_BODY_LEN, MIN_FINS_FRAME_BODY_LEN, RECEIVE_CHUNK_SIZE,
    TCP_COMMAND_OFFSET, TCP_ERROR_OFFSET, TCP_HEADER_LEN, TCP_LENGTH_OVERHEAD,
};
use crate::error::{FinsError, FinsResult, FramingError};
use crate::utils::Deadline;

/// Command codes of the TCP encapsulation header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpCommand {
    /// Client node address announcement (handshake request)
    NodeAddressToPlc,
    /// Node address assignment (handshake response)
    NodeAddressFromPlc,
    /// FINS envelope
    FinsFrame,
    /// Frame send error notification
    Error,
}

impl TcpCommand {
    pub fn to_u8(self) -> u8 {
        match self {
            TcpCommand::NodeAddressToPlc => 0,
            TcpCommand::NodeAddressFromPlc => 1,
            TcpCommand::FinsFrame => 2,
            TcpCommand::Error => 3,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TcpCommand::NodeAddressToPlc),
            1 => Some(TcpCommand::NodeAddressFromPlc),
            2 => Some(TcpCommand::FinsFrame),
            3 => Some(TcpCommand::Error),
            _ => None,
        }
    }
}

/// Parsed view of a 16-byte TCP header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: [u8; 4],
    /// Raw length field (payload + 8)
    pub length: u32,
    pub reserved: [u8; 3],
    pub command: u8,
    pub error_code: u8,
}

impl FrameHeader {
    /// Header for a frame carrying `payload_len` bytes
    pub fn new(command: TcpCommand, payload_len: usize) -> Self {
        Self {
            magic: FINS_MAGIC,
            length: (TCP_LENGTH_OVERHEAD + payload_len) as u32,
            reserved: [0; 3],
            command: command.to_u8(),
            error_code: 0,
        }
    }

    /// Read the header fields without validating them
    pub fn parse(data: &[u8]) -> FinsResult<Self> {
        if data.len() < TCP_HEADER_LEN {
            return Err(FramingError::IncompleteHeader {
                received: data.len(),
            }
            .into());
        }

        Ok(Self {
            magic: [data[0], data[1], data[2], data[3]],
            length: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            reserved: [data[8], data[9], data[10]],
            command: data[TCP_COMMAND_OFFSET],
            error_code: data[TCP_ERROR_OFFSET],
        })
    }

    /// Payload length declared by the length field (may be negative)
    pub fn declared_body_len(&self) -> i64 {
        self.length as i64 - TCP_LENGTH_OVERHEAD as i64
    }

    /// Validate a received header against the command the caller expects
    ///
    /// Returns the declared body length.
    pub fn validate(&self, expected: TcpCommand) -> FinsResult<usize> {
        if self.magic != FINS_MAGIC {
            return Err(FramingError::InvalidMagic(self.magic).into());
        }

        let body_len = self.declared_body_len();
        if body_len <= 0 || body_len > MAX_TCP_BODY_LEN as i64 {
            return Err(FramingError::InvalidLength(body_len).into());
        }
        let body_len = body_len as usize;

        if let Some(err) = classify_tcp_error(self.command, self.error_code) {
            return Err(err);
        }

        if self.reserved != [0; 3] || self.command != expected.to_u8() {
            return Err(FramingError::UnexpectedCommand {
                expected: expected.to_u8(),
                received: self.command,
            }
            .into());
        }

        if expected == TcpCommand::FinsFrame && body_len < MIN_FINS_FRAME_BODY_LEN {
            return Err(FramingError::TooShortForFins(body_len).into());
        }

        Ok(body_len)
    }

    pub fn write_to(&self, buf: &mut BytesMut) {
        buf.put_slice(&self.magic);
        buf.put_u32(self.length);
        buf.put_slice(&self.reserved);
        buf.put_u8(self.command);
        buf.put_slice(&[0, 0, 0]);
        buf.put_u8(self.error_code);
    }
}

/// Build a complete frame: header + payload
pub fn encode_frame(command: TcpCommand, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(TCP_HEADER_LEN + payload.len());
    FrameHeader::new(command, payload.len()).write_to(&mut buf);
    buf.put_slice(payload);
    buf.freeze()
}

/// A decoded frame and the read telemetry spent on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub header: FrameHeader,
    pub payload: Bytes,
    /// Bytes read from the stream, header included
    pub bytes: usize,
    /// Successful read calls
    pub packets: usize,
}

#[derive(Debug, Default)]
struct ReadCounters {
    bytes: usize,
    packets: usize,
}

/// Read until `buf` holds `target` bytes or the budget is spent
///
/// Returning `Ok` does not mean the target was reached; callers check.
async fn fill<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    target: usize,
    deadline: &Deadline,
    min_window: Duration,
    counters: &mut ReadCounters,
) -> FinsResult<()>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; RECEIVE_CHUNK_SIZE];

    while buf.len() < target {
        let remaining = deadline.remaining();
        if remaining < min_window {
            break;
        }

        match tokio::time::timeout(remaining, reader.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                return Err(FinsError::connection(
                    "failed to receive FINS message - the connection was closed by the PLC",
                ));
            }
            Ok(Ok(n)) => {
                buf.extend_from_slice(&chunk[..n]);
                counters.bytes += n;
                counters.packets += 1;
            }
            Ok(Err(e)) => return Err(classify_io_error("failed to receive FINS message", e)),
            Err(_) => break,
        }
    }

    Ok(())
}

/// Read and validate one frame whose command must be `expected`
pub async fn read_frame<R>(
    reader: &mut R,
    expected: TcpCommand,
    deadline: &Deadline,
    min_window: Duration,
) -> FinsResult<ReceivedFrame>
where
    R: AsyncRead + Unpin,
{
    let mut counters = ReadCounters::default();
    let mut buf = BytesMut::with_capacity(RECEIVE_CHUNK_SIZE);

    fill(reader, &mut buf, TCP_HEADER_LEN, deadline, min_window, &mut counters).await?;

    if buf.is_empty() {
        return Err(FramingError::NoData.into());
    }
    if buf.len() < TCP_HEADER_LEN {
        return Err(FramingError::IncompleteHeader {
            received: buf.len(),
        }
        .into());
    }

    let header = FrameHeader::parse(&buf[..TCP_HEADER_LEN])?;
    let body_len = header.validate(expected).inspect_err(|e| {
        warn!("TCP header rejected: {}", e);
    })?;
    buf.advance(TCP_HEADER_LEN);

    fill(reader, &mut buf, body_len, deadline, min_window, &mut counters).await?;

    if buf.is_empty() {
        return Err(FramingError::NoDataAfterHeader.into());
    }
    if buf.len() < body_len {
        return Err(FramingError::IncompleteBody {
            expected: body_len,
            received: buf.len(),
        }
        .into());
    }
    if buf.len() > body_len {
        debug!("TCP RX: discarding {}B past frame end", buf.len() - body_len);
        buf.truncate(body_len);
    }

    if expected == TcpCommand::FinsFrame && !ICF_RESPONSES.contains(&buf[0]) {
        return Err(FramingError::InvalidResponseMarker(buf[0]).into());
    }

    debug!(
        "TCP RX: cmd={} body={}B ({}B in {} reads)",
        header.command, body_len, counters.bytes, counters.packets
    );

    Ok(ReceivedFrame {
        header,
        payload: buf.freeze(),
        bytes: counters.bytes,
        packets: counters.packets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::TcpErrorCode;
    use crate::constants::MIN_READ_WINDOW;
    use tokio::io::AsyncWriteExt;

    fn fins_payload() -> Vec<u8> {
        vec![
            0xC0, 0x00, 0x02, 0x00, 0x01, 0x00, 0x00, 0x0A, 0x00, 0x01, 0x01, 0x01, 0x00, 0x00,
            0x12, 0x34,
        ]
    }

    fn raw_header(length: u32, command: u8, error: u8) -> Vec<u8> {
        let mut h = b"FINS".to_vec();
        h.extend_from_slice(&length.to_be_bytes());
        h.extend_from_slice(&[0, 0, 0, command, 0, 0, 0, error]);
        h
    }

    async fn decode(bytes: &[u8], expected: TcpCommand) -> FinsResult<ReceivedFrame> {
        let mut reader = bytes;
        let deadline = Deadline::after(Duration::from_millis(500));
        read_frame(&mut reader, expected, &deadline, MIN_READ_WINDOW).await
    }

    #[test]
    fn test_encode_frame_layout() {
        let frame = encode_frame(TcpCommand::NodeAddressToPlc, &[0, 0, 0, 0]);
        assert_eq!(
            &frame[..],
            &[
                0x46, 0x49, 0x4E, 0x53, // FINS
                0x00, 0x00, 0x00, 0x0C, // length = 8 + 4
                0x00, 0x00, 0x00, 0x00, // command 0
                0x00, 0x00, 0x00, 0x00, // error 0
                0x00, 0x00, 0x00, 0x00, // payload
            ]
        );
    }

    #[test]
    fn test_header_length_invariant() {
        let header = FrameHeader::new(TcpCommand::FinsFrame, 100);
        assert_eq!(header.length, 108);
        assert_eq!(header.declared_body_len(), 100);
    }

    #[tokio::test]
    async fn test_decode_complete_fins_frame() {
        let frame = encode_frame(TcpCommand::FinsFrame, &fins_payload());
        let received = decode(&frame, TcpCommand::FinsFrame).await.unwrap();

        assert_eq!(&received.payload[..], &fins_payload()[..]);
        assert_eq!(received.bytes, frame.len());
        assert_eq!(received.packets, 1);
        assert_eq!(received.header.command, 2);
    }

    #[tokio::test]
    async fn test_decode_split_reads() {
        let frame = encode_frame(TcpCommand::FinsFrame, &fins_payload());
        let mut reader = tokio_test::io::Builder::new()
            .read(&frame[..5])
            .read(&frame[5..18])
            .read(&frame[18..])
            .build();

        let deadline = Deadline::after(Duration::from_secs(1));
        let received = read_frame(&mut reader, TcpCommand::FinsFrame, &deadline, MIN_READ_WINDOW)
            .await
            .unwrap();

        assert_eq!(&received.payload[..], &fins_payload()[..]);
        assert_eq!(received.packets, 3);
        assert_eq!(received.bytes, frame.len());
    }

    #[tokio::test]
    async fn test_decode_rejects_bad_magic() {
        let mut frame = encode_frame(TcpCommand::FinsFrame, &fins_payload()).to_vec();
        frame[0] = b'X';
        assert!(matches!(
            decode(&frame, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::InvalidMagic(_)))
        ));
    }

    #[tokio::test]
    async fn test_decode_rejects_invalid_lengths() {
        let zero = raw_header(8, 2, 0);
        assert!(matches!(
            decode(&zero, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::InvalidLength(0)))
        ));

        let negative = raw_header(4, 2, 0);
        assert!(matches!(
            decode(&negative, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::InvalidLength(-4)))
        ));

        let huge = raw_header(8 + 32768, 2, 0);
        assert!(matches!(
            decode(&huge, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::InvalidLength(32768)))
        ));
    }

    #[tokio::test]
    async fn test_decode_length_checked_before_error_byte() {
        let zero = raw_header(8, 2, 21);
        assert!(matches!(
            decode(&zero, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::InvalidLength(0)))
        ));

        let huge = raw_header(8 + 40000, 3, 1);
        assert!(matches!(
            decode(&huge, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::InvalidLength(40000)))
        ));
    }

    #[tokio::test]
    async fn test_decode_classifies_tcp_error_byte() {
        let mut frame = raw_header(8 + 8, 1, 21);
        frame.extend_from_slice(&[0; 8]);
        assert!(matches!(
            decode(&frame, TcpCommand::NodeAddressFromPlc).await,
            Err(FinsError::Protocol(TcpErrorCode::NodeAlreadyConnected))
        ));

        let mut frame = raw_header(8 + 4, 3, 99);
        frame.extend_from_slice(&[0; 4]);
        assert!(matches!(
            decode(&frame, TcpCommand::FinsFrame).await,
            Err(FinsError::Protocol(TcpErrorCode::Unknown(99)))
        ));
    }

    #[tokio::test]
    async fn test_decode_rejects_unexpected_command() {
        let frame = encode_frame(TcpCommand::NodeAddressFromPlc, &[0; 8]);
        assert!(matches!(
            decode(&frame, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::UnexpectedCommand {
                expected: 2,
                received: 1
            }))
        ));

        let mut frame = encode_frame(TcpCommand::FinsFrame, &fins_payload()).to_vec();
        frame[9] = 0x01;
        assert!(matches!(
            decode(&frame, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::UnexpectedCommand { .. }))
        ));
    }

    #[tokio::test]
    async fn test_decode_rejects_short_fins_body() {
        let frame = encode_frame(TcpCommand::FinsFrame, &fins_payload()[..12]);
        assert!(matches!(
            decode(&frame, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::TooShortForFins(12)))
        ));

        // The handshake has no envelope minimum
        let frame = encode_frame(TcpCommand::NodeAddressFromPlc, &[0, 0, 0, 1]);
        assert!(decode(&frame, TcpCommand::NodeAddressFromPlc).await.is_ok());
    }

    #[tokio::test]
    async fn test_decode_rejects_bad_response_marker() {
        let mut payload = fins_payload();
        payload[0] = 0x80;
        let frame = encode_frame(TcpCommand::FinsFrame, &payload);
        assert!(matches!(
            decode(&frame, TcpCommand::FinsFrame).await,
            Err(FinsError::Framing(FramingError::InvalidResponseMarker(0x80)))
        ));
    }

    #[tokio::test]
    async fn test_decode_no_data_after_timeout() {
        let (mut client, _server) = tokio::io::duplex(64);
        let deadline = Deadline::after(Duration::from_millis(120));
        let result =
            read_frame(&mut client, TcpCommand::FinsFrame, &deadline, MIN_READ_WINDOW).await;
        assert!(matches!(
            result,
            Err(FinsError::Framing(FramingError::NoData))
        ));
    }

    #[tokio::test]
    async fn test_decode_incomplete_header_after_timeout() {
        let (mut client, mut server) = tokio::io::duplex(64);
        server.write_all(b"FINS\x00\x00").await.unwrap();

        let deadline = Deadline::after(Duration::from_millis(120));
        let result =
            read_frame(&mut client, TcpCommand::FinsFrame, &deadline, MIN_READ_WINDOW).await;
        assert!(matches!(
            result,
            Err(FinsError::Framing(FramingError::IncompleteHeader { received: 6 }))
        ));
    }

    #[tokio::test]
    async fn test_decode_no_data_after_header() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let frame = encode_frame(TcpCommand::FinsFrame, &fins_payload());
        server.write_all(&frame[..TCP_HEADER_LEN]).await.unwrap();

        let deadline = Deadline::after(Duration::from_millis(120));
        let result =
            read_frame(&mut client, TcpCommand::FinsFrame, &deadline, MIN_READ_WINDOW).await;
        assert!(matches!(
            result,
            Err(FinsError::Framing(FramingError::NoDataAfterHeader))
        ));
    }

    #[tokio::test]
    async fn test_decode_incomplete_body_after_timeout() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let frame = encode_frame(TcpCommand::FinsFrame, &fins_payload());
        server.write_all(&frame[..TCP_HEADER_LEN + 4]).await.unwrap();

        let deadline = Deadline::after(Duration::from_millis(120));
        let result =
            read_frame(&mut client, TcpCommand::FinsFrame, &deadline, MIN_READ_WINDOW).await;
        assert!(matches!(
            result,
            Err(FinsError::Framing(FramingError::IncompleteBody {
                expected: 16,
                received: 4
            }))
        ));
    }

    #[tokio::test]
    async fn test_decode_peer_close_is_connection_error() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);

        let deadline = Deadline::after(Duration::from_millis(200));
        let result =
            read_frame(&mut client, TcpCommand::FinsFrame, &deadline, MIN_READ_WINDOW).await;
        assert!(matches!(result, Err(FinsError::Connection { .. })));
    }

    #[tokio::test]
    async fn test_read_skipped_below_min_window() {
        let frame = encode_frame(TcpCommand::FinsFrame, &fins_payload());
        let mut reader = &frame[..];
        let deadline = Deadline::after(Duration::from_millis(30));

        // 30ms left is under the 50ms floor, so nothing is read
        let result = read_frame(&mut reader, TcpCommand::FinsFrame, &deadline, MIN_READ_WINDOW).await;
        assert!(matches!(
            result,
            Err(FinsError::Framing(FramingError::NoData))
        ));
    }
}
